//! Configuration for codecomet
//!
//! Everything comes from `CODECOMET_*` environment variables and command-line
//! flags; there is no config file. The environment is read through
//! [`EnvSource`] so resolution can be exercised without touching the real
//! process environment.

use crate::provenance::Provenance;
use std::collections::HashMap;
use std::path::Path;

/// Prefix namespacing all of our environment variables
pub const ENV_PREFIX: &str = "CODECOMET_";

/// Ingestion endpoint used when `CODECOMET_REMOTE_SERVER` is unset
pub const DEFAULT_REMOTE_SERVER: &str = "https://app.codecomet.io/api";

/// Read-only view of environment variables
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;

    /// Like [`EnvSource::var`], treating an empty value as unset.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key).filter(|v| !v.is_empty())
    }
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Full name of one of our variables, e.g. `prefixed("API_KEY")`.
pub fn prefixed(name: &str) -> String {
    format!("{}{}", ENV_PREFIX, name)
}

/// Connection settings for the ingestion service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub remote_server: String,
}

impl Settings {
    pub fn from_env(env: &dyn EnvSource) -> Self {
        Self {
            api_key: env.non_empty(&prefixed("API_KEY")),
            remote_server: env
                .non_empty(&prefixed("REMOTE_SERVER"))
                .unwrap_or_else(|| DEFAULT_REMOTE_SERVER.to_string()),
        }
    }
}

/// Suite identification flags as given on the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub suite: Option<String>,
    pub run_id: Option<String>,
}

/// Suite name and run id, resolved once per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub suite_name: String,
    pub run_id: String,
}

impl RunConfig {
    /// Fill in whatever the flags left out: the suite name from the working
    /// directory, the run id from the CI build id.
    pub fn resolve(options: &RunOptions, cwd: &Path, provenance: &Provenance) -> Self {
        let suite_name = options
            .suite
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_suite_name(cwd, dirs::home_dir().as_deref()));
        let run_id = options
            .run_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| provenance.build_id.clone());

        Self { suite_name, run_id }
    }
}

/// The working directory relative to the home directory, so the same checkout
/// gets the same name on every developer machine.
fn default_suite_name(cwd: &Path, home: Option<&Path>) -> String {
    let relative = home
        .and_then(|home| cwd.strip_prefix(home).ok())
        .filter(|rel| !rel.as_os_str().is_empty());

    match relative {
        Some(rel) => rel.display().to_string(),
        None => cwd
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| cwd.display().to_string()),
    }
}
