//! Configuration file handling

pub mod schema;

pub use schema::Config;

use crate::error::{KilnError, KilnResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Locates, loads and saves `config.toml`, and derives the directories a
/// run writes to
pub struct ConfigManager {
    config_path: PathBuf,
}

fn user_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join("kiln")
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// `<config dir>/kiln/config.toml`
    pub fn default_config_path() -> PathBuf {
        user_dir(dirs::config_dir()).join("config.toml")
    }

    pub fn state_dir() -> PathBuf {
        user_dir(dirs::state_dir().or_else(dirs::data_local_dir))
    }

    /// Local compile cache used when none is configured
    pub fn default_cache_dir() -> PathBuf {
        user_dir(dirs::cache_dir()).join("compile")
    }

    /// Run metadata root for `config`
    pub fn workdir(config: &Config) -> PathBuf {
        config.general.workdir.clone().unwrap_or_else(Self::state_dir)
    }

    /// `(read_from, write_to)`; an empty list means the local cache dir
    pub fn cache_locations(config: &Config) -> (Vec<String>, Vec<String>) {
        let or_local = |locations: &[String]| {
            if locations.is_empty() {
                vec![Self::default_cache_dir().display().to_string()]
            } else {
                locations.to_vec()
            }
        };
        (or_local(&config.cache.read_from), or_local(&config.cache.write_to))
    }

    /// A missing file is not an error: every section has defaults
    pub async fn load(&self) -> KilnResult<Config> {
        if !self.config_path.exists() {
            debug!("No config at {}, using defaults", self.config_path.display());
            return Ok(Config::default());
        }
        self.load_from_file(&self.config_path).await
    }

    pub async fn load_from_file(&self, path: &Path) -> KilnResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| KilnError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| KilnError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub async fn save(&self, config: &Config) -> KilnResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| KilnError::io(format!("creating {}", parent.display()), e))?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content)
            .await
            .map_err(|e| KilnError::io(format!("writing config to {}", self.config_path.display()), e))?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::JdkSelector;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.jdk.selector, JdkSelector::System);
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.jdk.selector = JdkSelector::from("adopt:1.11");
        config.cache.read_from = vec!["https://cache.example.com/kiln".into()];

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.jdk.selector, JdkSelector::from("adopt:1.11"));
        assert_eq!(loaded.cache.read_from, vec!["https://cache.example.com/kiln"]);
    }

    #[tokio::test]
    async fn invalid_toml_names_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[compile\nincremental = true").unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        assert!(matches!(err, KilnError::ConfigInvalid { path: ref p, .. } if p == &path));
    }

    #[test]
    fn workdir_defaults_to_state_dir() {
        let mut config = Config::default();
        assert_eq!(ConfigManager::workdir(&config), ConfigManager::state_dir());
        config.general.workdir = Some(PathBuf::from("/tmp/kiln-runs"));
        assert_eq!(ConfigManager::workdir(&config), PathBuf::from("/tmp/kiln-runs"));
    }

    #[test]
    fn cache_locations_fall_back_to_local_dir() {
        let mut config = Config::default();
        let local = ConfigManager::default_cache_dir().display().to_string();
        assert_eq!(ConfigManager::cache_locations(&config), (vec![local.clone()], vec![local.clone()]));

        config.cache.read_from = vec!["https://cache.example.com/kiln".into()];
        let (read_from, write_to) = ConfigManager::cache_locations(&config);
        assert_eq!(read_from, vec!["https://cache.example.com/kiln"]);
        assert_eq!(write_to, vec![local]);
    }
}
