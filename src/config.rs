/*
 * Tinker - Sandboxed Tool-Calling Agent
 * File Path: src/config.rs
 * Responsibility: YAML configuration structure, discovery, and credential lookup
 */
use crate::agent_loop::DEFAULT_MAX_ROUNDS;
use crate::tools::{DEFAULT_INTERPRETER, DEFAULT_MAX_READ_BYTES, DEFAULT_SCRIPT_TIMEOUT, ToolSettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "tinker.yml";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    pub working_dir: PathBuf,
    pub max_rounds: usize,
    pub max_read_bytes: usize,
    pub script_timeout_secs: u64,
    pub interpreter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            script_timeout_secs: DEFAULT_SCRIPT_TIMEOUT.as_secs(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file at {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;
        Ok(config)
    }

    /// An explicit path must exist. Otherwise `./tinker.yml`, then
    /// `<config dir>/tinker/tinker.yml`, then built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        let user = dirs::config_dir().map(|dir| dir.join("tinker").join(CONFIG_FILE_NAME));
        match std::iter::once(local).chain(user).find(|path| path.is_file()) {
            Some(path) => {
                tracing::debug!(?path, "loading config");
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// The environment wins over the file; empty values count as missing.
    pub fn api_key(&self) -> Result<String> {
        self.api_key_with(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_with(&self, from_env: Option<String>) -> Result<String> {
        from_env
            .into_iter()
            .chain(self.gemini.api_key.clone())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
            .with_context(|| format!("{} not found in environment variables", API_KEY_ENV))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.gemini.request_timeout_secs.max(1))
    }

    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            max_read_bytes: self.runtime.max_read_bytes,
            script_timeout: Duration::from_secs(self.runtime.script_timeout_secs.max(1)),
            interpreter: self.runtime.interpreter.clone(),
        }
    }
}
