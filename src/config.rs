//! Appraiser configuration.
//!
//! A single JSON file selects the vision backend and holds the pricing
//! constants. Every field has a default, so an absent file is a valid setup
//! as long as an LM command or endpoint arrives from the CLI or environment.
use crate::extraction::GenerationConfig;
use crate::valuation::PricingConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const LM_COMMAND_ENV: &str = "APPRAISE_LM_COMMAND";
pub const MODEL_ENDPOINT_ENV: &str = "APPRAISE_MODEL_ENDPOINT";
const DEFAULT_API_KEY_ENV: &str = "APPRAISE_API_KEY";
const CONFIG_DIR_NAME: &str = "firearm-appraiser";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionBackend {
    #[default]
    Command,
    Http,
}

/// How to reach the vision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisionSettings {
    pub backend: VisionBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the endpoint API key.
    pub api_key_env: String,
    /// Per-call limit for either backend. An overrunning LM command is killed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub generation: GenerationConfig,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            backend: VisionBackend::Command,
            command: None,
            endpoint: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: Some(60),
            generation: GenerationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub vision: VisionSettings,
    #[serde(default)]
    pub pricing: PricingConfig,
}

pub fn default_config() -> AppConfig {
    AppConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        vision: VisionSettings::default(),
        pricing: PricingConfig::default(),
    }
}

/// Render the default config as pretty JSON.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&default_config()).context("serialize config stub")
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: AppConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

/// `<config dir>/firearm-appraiser/config.json`, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the explicit config, else the per-user config when present, else
/// defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => {
            tracing::debug!(path = %path.display(), "using per-user config");
            load_config(&path)
        }
        _ => Ok(default_config()),
    }
}

/// Fill the model command or endpoint from CLI flags, then the environment.
///
/// A CLI flag always wins and also selects its backend. Environment values
/// only fill settings the config file left empty.
pub fn apply_model_overrides(
    settings: &mut VisionSettings,
    lm_command: Option<&str>,
    endpoint: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) {
    if let Some(command) = lm_command {
        settings.backend = VisionBackend::Command;
        settings.command = Some(command.to_string());
        return;
    }
    if let Some(endpoint) = endpoint {
        settings.backend = VisionBackend::Http;
        settings.endpoint = Some(endpoint.to_string());
        return;
    }
    let non_blank = |name: &str| env(name).filter(|value| !value.trim().is_empty());
    match settings.backend {
        VisionBackend::Command if settings.command.is_none() => {
            if let Some(command) = non_blank(LM_COMMAND_ENV) {
                settings.command = Some(command);
            } else if settings.endpoint.is_none() {
                if let Some(endpoint) = non_blank(MODEL_ENDPOINT_ENV) {
                    settings.backend = VisionBackend::Http;
                    settings.endpoint = Some(endpoint);
                }
            }
        }
        VisionBackend::Http if settings.endpoint.is_none() => {
            settings.endpoint = non_blank(MODEL_ENDPOINT_ENV);
        }
        _ => {}
    }
}

pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schemaVersion {}",
            config.schema_version
        ));
    }
    validate_generation(&config.vision.generation)?;
    if config.vision.timeout_secs == Some(0) {
        return Err(anyhow!("vision.timeoutSecs must be greater than 0"));
    }
    if config.vision.api_key_env.trim().is_empty() {
        return Err(anyhow!("vision.apiKeyEnv must be non-empty"));
    }
    config.pricing.validate()
}

/// Checks that only apply once CLI and environment overrides are merged in.
pub fn validate_vision_ready(settings: &VisionSettings) -> Result<()> {
    match settings.backend {
        VisionBackend::Command => match settings.command.as_deref() {
            Some(command) if !command.trim().is_empty() => Ok(()),
            _ => Err(anyhow!(
                "no LM command configured (pass --lm, set {LM_COMMAND_ENV}, or set vision.command)"
            )),
        },
        VisionBackend::Http => match settings.endpoint.as_deref() {
            Some(endpoint) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {
                Ok(())
            }
            Some(endpoint) => Err(anyhow!(
                "vision.endpoint must be an http(s) URL (got {endpoint:?})"
            )),
            None => Err(anyhow!(
                "no model endpoint configured (pass --endpoint, set {MODEL_ENDPOINT_ENV}, or set vision.endpoint)"
            )),
        },
    }
}

fn validate_generation(generation: &GenerationConfig) -> Result<()> {
    if generation.max_output_tokens == 0 {
        return Err(anyhow!("vision.generation.maxOutputTokens must be greater than 0"));
    }
    if !(0.0..=2.0).contains(&generation.temperature) {
        return Err(anyhow!(
            "vision.generation.temperature must be within [0, 2] (got {})",
            generation.temperature
        ));
    }
    if !(generation.top_p > 0.0 && generation.top_p <= 1.0) {
        return Err(anyhow!(
            "vision.generation.topP must be within (0, 1] (got {})",
            generation.top_p
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
