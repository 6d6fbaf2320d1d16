//! Configuration for lint-cli
//!
//! Stores settings in `.lint-cli/config.json` under the project directory and
//! merges them with environment variables and command-line flags.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Project-local state directory (memory and config)
pub const STATE_DIR: &str = ".lint-cli";
pub const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_MODEL: &str = "qwen3:8b";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 25;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

pub const MODEL_ENV: &str = "OLLAMA_MODEL";
pub const API_ENV: &str = "OLLAMA_API";
pub const OPENWEBUI_API_ENV: &str = "OPENWEBUI_API";

/// The persisted settings. Every key is optional; absent keys fall through
/// to the environment or the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_enabled: Option<bool>,
    /// Replaces the built-in system prompt when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Model round-trips allowed per turn while tools are being called (0 = no limit)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_rounds: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

impl Config {
    pub fn path(state_dir: &Path) -> PathBuf {
        state_dir.join(CONFIG_FILE)
    }

    /// Load config from disk, or return default
    pub fn load(state_dir: &Path) -> Self {
        let path = Self::path(state_dir);
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(&path, &content);
                warn!(
                    "Config file {} was corrupted ({}). A backup was saved and defaults were loaded.",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Save config to disk
    pub fn save(&self, state_dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create {}", state_dir.display()))?;

        let path = Self::path(state_dir);
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        write_config_atomic(&path, &content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Saved config to {}", path.display());
        Ok(())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
//  RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════

/// Settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub memory: Option<bool>,
}

/// The environment variables that feed into settings
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    pub model: Option<String>,
    pub api: Option<String>,
    pub openwebui_api: Option<String>,
}

impl EnvSettings {
    pub fn from_process() -> Self {
        Self {
            model: read_env(MODEL_ENV),
            api: read_env(API_ENV),
            openwebui_api: read_env(OPENWEBUI_API_ENV),
        }
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// The settings a session runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: String,
    /// `None` uses the gateway's default endpoint
    pub api_url: Option<String>,
    pub memory_enabled: bool,
    /// Custom system prompt; `None` uses the built-in one
    pub system_prompt: Option<String>,
    pub max_tool_rounds: usize,
    pub command_timeout: Duration,
}

impl Settings {
    /// Command line beats environment beats config file beats defaults.
    pub fn resolve(config: &Config, env: &EnvSettings, overrides: &Overrides) -> Self {
        let model = first_non_empty([&overrides.model, &env.model, &config.model])
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_url = first_non_empty([
            &overrides.api_url,
            &env.api,
            &env.openwebui_api,
            &config.api_url,
        ]);
        let memory_enabled = overrides
            .memory
            .or(config.memory_enabled)
            .unwrap_or(true);

        let settings = Self {
            model,
            api_url,
            memory_enabled,
            system_prompt: config
                .system_prompt
                .clone()
                .filter(|p| !p.trim().is_empty()),
            max_tool_rounds: config.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS),
            command_timeout: Duration::from_secs(
                config
                    .command_timeout_secs
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
            ),
        };
        debug!(
            "Resolved settings: model={} api={:?} memory={}",
            settings.model, settings.api_url, settings.memory_enabled
        );
        settings
    }
}

fn first_non_empty<const N: usize>(candidates: [&Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}
