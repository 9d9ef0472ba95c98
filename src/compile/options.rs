//! Compiler argument assembly
//!
//! Base arguments come from configuration and the unit request. Named option
//! sets then adjust them. An active set removes its disabled args from the
//! base list and appends its enabled args. A declared set that is not active
//! appends its disabled args instead. Both keep declared order.

use crate::cache::Platform;
use crate::error::{KilnError, KilnResult};
use std::collections::{BTreeMap, HashSet};

/// Compiler-server flags that still work but carry no compatibility promise
pub const UNSUPPORTED_FLAGS: &[&str] = &[
    "-recompile-all-fraction",
    "-transitive-step",
    "-name-hashing",
    "-no-name-hashing",
    "-analysis-cache",
];

/// Option-related compile settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSettings {
    pub args: Vec<String>,
    pub default_option_sets: Vec<String>,
    pub enabled_args: BTreeMap<String, Vec<String>>,
    pub disabled_args: BTreeMap<String, Vec<String>>,
    pub debug_symbols: bool,
    pub platforms: BTreeMap<String, Platform>,
    pub default_platform: Option<String>,
}

/// Final arguments for one unit plus the warnings raised building them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerArgs {
    pub args: Vec<String>,
    pub platform: Option<Platform>,
    pub warnings: Vec<String>,
}

impl OptionSettings {
    /// Whether an option-set name is declared anywhere
    pub fn knows_option_set(&self, name: &str) -> bool {
        self.enabled_args.contains_key(name) || self.disabled_args.contains_key(name)
    }

    /// Reject configuration that could only fail later
    pub fn validate(&self) -> KilnResult<()> {
        for name in &self.default_option_sets {
            if !self.knows_option_set(name) {
                return Err(unknown_option_set(name));
            }
        }
        if let Some(name) = &self.default_platform {
            if !self.platforms.contains_key(name) {
                return Err(KilnError::config(format!(
                    "default platform `{}` is not declared under [platforms]",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Resolve the platform a unit compiles for
    ///
    /// An explicit name must be declared. Without one the default platform
    /// applies, and without a default no `-source`/`-target` is passed.
    pub fn platform(&self, requested: Option<&str>) -> KilnResult<Option<Platform>> {
        match requested.or(self.default_platform.as_deref()) {
            Some(name) => self
                .platforms
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| KilnError::config(format!("unknown platform `{}`", name))),
            None => Ok(None),
        }
    }

    /// Apply option sets to `base`
    ///
    /// Enabled args of active sets come first, in activation order, then the
    /// disabled args of every inactive set, by set name.
    pub fn apply_option_sets(&self, base: &[String], active: &[String]) -> KilnResult<Vec<String>> {
        for name in active {
            if !self.knows_option_set(name) {
                return Err(unknown_option_set(name));
            }
        }
        let is_active = |name: &String| active.contains(name);

        let removed: HashSet<&str> = self
            .disabled_args
            .iter()
            .filter(|(name, _)| is_active(name))
            .flat_map(|(_, args)| args)
            .map(String::as_str)
            .collect();
        let mut args: Vec<String> = base
            .iter()
            .filter(|arg| !removed.contains(arg.as_str()))
            .cloned()
            .collect();

        for name in active {
            if let Some(enabled) = self.enabled_args.get(name) {
                args.extend(enabled.iter().cloned());
            }
        }
        for (_, disabled) in self.disabled_args.iter().filter(|(name, _)| !is_active(name)) {
            args.extend(disabled.iter().cloned());
        }
        Ok(args)
    }

    /// Build the full argument list for a unit
    pub fn compiler_args(
        &self,
        request_args: &[String],
        request_sets: &[String],
        platform: Option<&str>,
    ) -> KilnResult<CompilerArgs> {
        let mut active: Vec<String> = Vec::new();
        for name in self.default_option_sets.iter().chain(request_sets) {
            if !active.contains(name) {
                active.push(name.clone());
            }
        }

        let base: Vec<String> = self.args.iter().chain(request_args).cloned().collect();
        let mut args = self.apply_option_sets(&base, &active)?;

        if self.debug_symbols && !args.iter().any(|a| a == "-g") {
            args.push("-g".to_string());
        }

        let platform = self.platform(platform)?;
        if let Some(p) = &platform {
            args.extend([
                "-source".to_string(),
                p.source_version.clone(),
                "-target".to_string(),
                p.target_version.clone(),
            ]);
        }

        let warnings = unsupported_flag_warnings(&args);
        Ok(CompilerArgs {
            args,
            platform,
            warnings,
        })
    }
}

fn unknown_option_set(name: &str) -> KilnError {
    KilnError::config(format!(
        "unknown compiler option set `{}`; declare it under compile.compiler_option_sets_enabled_args or compile.compiler_option_sets_disabled_args",
        name
    ))
}

/// One warning per unsupported flag present in `args`
pub fn unsupported_flag_warnings(args: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    args.iter()
        .filter(|arg| UNSUPPORTED_FLAGS.contains(&arg.as_str()))
        .filter(|arg| seen.insert(arg.as_str()))
        .map(|arg| format!("Option `{}` is not supported, and is subject to change/removal", arg))
        .collect()
}
