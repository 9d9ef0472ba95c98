//! JDK sandbox preparation
//!
//! The sandbox digest carries a small preparation script, the persistent
//! compiler server jar and the JDK locator tool. The real JDK home is looked
//! up again inside every process invocation by the script, so the digest is
//! machine independent while the JDK location is not.

use crate::classpath::{ClasspathResolver, Coordinate, LockfileEntry};
use crate::error::{KilnError, KilnResult};
use crate::memo::OnceMap;
use crate::process::{CacheScope, Process, ProcessExecutor};
use crate::store::{ContentStore, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// In-sandbox name of the preparation script
pub const PREPARATION_SCRIPT: &str = "__jdk.sh";

/// In-sandbox symlink to the real JDK home
pub const JAVA_HOME_LINK: &str = "__java_home";

/// Which JDK to run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JdkSelector {
    /// Whatever JDK the machine has installed
    System,
    /// A managed JDK version, downloaded by the locator
    Managed(String),
}

impl JdkSelector {
    /// Flag selecting this JDK on the locator command line
    pub fn locator_option(&self) -> String {
        match self {
            Self::System => "--system-jvm".to_string(),
            Self::Managed(version) => format!("--jvm={}", version),
        }
    }
}

impl From<String> for JdkSelector {
    fn from(value: String) -> Self {
        if value == "system" {
            Self::System
        } else {
            Self::Managed(value)
        }
    }
}

impl From<&str> for JdkSelector {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<JdkSelector> for String {
    fn from(selector: JdkSelector) -> Self {
        selector.to_string()
    }
}

impl fmt::Display for JdkSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Managed(version) => write!(f, "{}", version),
        }
    }
}

/// The JDK locator tool and the digest that carries it into a sandbox
///
/// `exe` is invoked as `<exe> java-home <selector option>` and must print the
/// JDK home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JdkLocator {
    pub exe: String,
    pub digest: Digest,
}

impl JdkLocator {
    pub fn new(exe: impl Into<String>, digest: Digest) -> Self {
        Self {
            exe: exe.into(),
            digest,
        }
    }

    fn java_home_command(&self, selector: &JdkSelector) -> String {
        format!("{} java-home {}", self.exe, selector.locator_option())
    }
}

/// A prepared, reusable JDK sandbox
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JdkSandbox {
    pub digest: Digest,
    pub persistent_server_artifact_name: String,
}

impl JdkSandbox {
    /// Argv running `java -cp <server jar>:<entries...>` through the
    /// preparation script
    pub fn args<S: AsRef<str>>(&self, shell: &str, classpath_entries: &[S]) -> Vec<String> {
        let classpath = std::iter::once(self.persistent_server_artifact_name.as_str())
            .chain(classpath_entries.iter().map(AsRef::as_ref))
            .collect::<Vec<_>>()
            .join(":");
        vec![
            shell.to_string(),
            PREPARATION_SCRIPT.to_string(),
            format!("{}/bin/java", JAVA_HOME_LINK),
            "-cp".to_string(),
            classpath,
        ]
    }
}

fn preparation_script(java_home_command: &str, selector: &JdkSelector, java_version: &str) -> String {
    let version = java_version.lines().next().unwrap_or_default();
    format!(
        "# kiln JDK sandbox for {} (`java -version`: {})\n\
         set -eu\n\
         \n\
         /bin/ln -s \"$({})\" \"{}\"\n\
         exec \"$@\"\n",
        selector.locator_option(),
        version,
        java_home_command,
        JAVA_HOME_LINK
    )
}

type SandboxKey = (JdkSelector, Coordinate, Digest);

/// Builds JDK sandboxes, at most once per selector and server artifact
pub struct JdkSandboxBuilder {
    resolver: Arc<ClasspathResolver>,
    executor: Arc<dyn ProcessExecutor>,
    store: Arc<dyn ContentStore>,
    locator: JdkLocator,
    shell: String,
    prepared: OnceMap<SandboxKey, JdkSandbox>,
}

impl JdkSandboxBuilder {
    pub fn new(
        resolver: Arc<ClasspathResolver>,
        executor: Arc<dyn ProcessExecutor>,
        store: Arc<dyn ContentStore>,
        locator: JdkLocator,
        shell: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            executor,
            store,
            locator,
            shell: shell.into(),
            prepared: OnceMap::new(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// The sandbox for `selector` running `server`
    ///
    /// Concurrent callers with the same key share one preparation; its
    /// outcome, failure included, is kept for the life of the builder.
    pub async fn prepare(&self, selector: &JdkSelector, server: &LockfileEntry) -> KilnResult<JdkSandbox> {
        let key = (selector.clone(), server.coord.clone(), server.file_digest.clone());
        self.prepared
            .get_or_compute(key, || self.build(selector, server))
            .await
    }

    async fn build(&self, selector: &JdkSelector, server: &LockfileEntry) -> KilnResult<JdkSandbox> {
        let (resolved_server, java_version) =
            tokio::try_join!(self.resolver.resolve_entry(server), self.locate(selector))?;

        let script = preparation_script(&self.locator.java_home_command(selector), selector, &java_version);
        let script_digest = self
            .store
            .create_file(PREPARATION_SCRIPT, script.into_bytes(), true)
            .await?;

        let digest = self
            .store
            .merge(&[self.locator.digest.clone(), script_digest, resolved_server.digest])
            .await?;
        info!("Prepared JDK sandbox for {} ({})", selector, digest.short());

        Ok(JdkSandbox {
            digest,
            persistent_server_artifact_name: resolved_server.file_name,
        })
    }

    /// Run `java -version` under the located JDK home
    async fn locate(&self, selector: &JdkSelector) -> KilnResult<String> {
        let argv = vec![
            self.shell.clone(),
            "-c".to_string(),
            format!("$({})/bin/java -version", self.locator.java_home_command(selector)),
        ];
        let process = Process::new(
            argv,
            self.locator.digest.clone(),
            format!("Ensure download of JDK {}.", selector.locator_option()),
        )
        .with_cache_scope(CacheScope::PerRestartSuccessful);

        let result = self.executor.execute(&process).await?;
        if !result.success() {
            return Err(KilnError::JdkNotFound {
                selector: selector.to_string(),
                stderr: result.stderr_lossy(),
            });
        }

        // `java -version` prints to stderr on most JDKs.
        let stdout = result.stdout_lossy();
        let version = if stdout.trim().is_empty() {
            result.stderr_lossy()
        } else {
            stdout
        };
        debug!("Located JDK {}: {}", selector, version.trim());
        Ok(version.trim().to_string())
    }
}
