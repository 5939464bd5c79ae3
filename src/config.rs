use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::process::StartOptions;

const CONFIG_PATH: &str = ".aider-driver/config.toml";

/// Project-level configuration from `.aider-driver/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Program to launch.
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Arguments always passed to aider, before any given on the command line.
    #[serde(default)]
    pub args: Vec<String>,
    /// How long the CLI waits for a prompt before giving up. Unset waits forever.
    #[serde(default)]
    pub prompt_timeout_secs: Option<u64>,
}

fn default_executable() -> String {
    "aider".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            args: Vec::new(),
            prompt_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn prompt_timeout(&self) -> Option<Duration> {
        self.prompt_timeout_secs.map(Duration::from_secs)
    }

    /// Launch options for `working_dir`, with `extra_args` after the configured ones.
    pub fn start_options(&self, working_dir: &Path, extra_args: &[String]) -> StartOptions {
        StartOptions::new(working_dir)
            .executable(self.executable.clone())
            .args(self.args.iter().chain(extra_args).cloned())
    }
}

/// Load configuration from `.aider-driver/config.toml` under `project_dir`.
///
/// Falls back to defaults if the file is missing.
pub fn load(project_dir: &Path) -> Result<Config> {
    let path = project_dir.join(CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents =
        std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(config)
}
