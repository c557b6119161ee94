use crate::error::{ProxyError, Result};
use crate::providers::BackendPreset;
use crate::translate::request::RequestOptions;
use crate::translate::streaming::TranscoderOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub backend: BackendConfig,
    /// Client-facing model name -> backend model name.
    #[serde(default)]
    pub models: HashMap<String, String>,
    /// Backend model names clients may request directly.
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub params: ParamsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Fold `reasoning_content` into `<think>` blocks instead of dropping it.
    #[serde(default)]
    pub show: bool,
    /// Ask the backend to produce reasoning (`chat_template_kwargs.thinking`).
    #[serde(default)]
    pub thinking_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamsConfig {
    #[serde(default = "default_drop_params")]
    pub drop: Vec<String>,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            drop: default_drop_params(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_temperature() -> f64 {
    0.6
}

fn default_max_tokens() -> u64 {
    9024
}

fn default_drop_params() -> Vec<String> {
    vec![
        "reasoning_effort".to_string(),
        "store".to_string(),
        "metadata".to_string(),
    ]
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        let candidates = config_search_paths();
        for candidate in &candidates {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        Err(ProxyError::config(format!(
            "No config file found. Searched: {}. Create one from config.example.toml",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Resolve the effective base URL (config override or backend preset default)
    pub fn effective_base_url(&self) -> Result<String> {
        if let Some(ref url) = self.backend.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }

        let preset = BackendPreset::from_name(&self.backend.name).ok_or_else(|| {
            ProxyError::config(format!(
                "Unknown backend '{}' and no base_url configured. Known backends: {}",
                self.backend.name,
                BackendPreset::known_names()
            ))
        })?;

        Ok(preset.base_url.to_string())
    }

    /// Name of the environment variable holding the backend API key.
    pub fn api_key_env(&self) -> String {
        if let Some(ref env) = self.backend.api_key_env {
            return env.clone();
        }
        BackendPreset::from_name(&self.backend.name)
            .map(|p| p.default_api_key_env.to_string())
            .unwrap_or_else(|| "API_KEY".to_string())
    }

    /// Resolve the API key from the configured environment variable
    pub fn resolve_api_key(&self) -> Result<String> {
        let env = self.api_key_env();
        std::env::var(&env).map_err(|_| {
            ProxyError::config(format!(
                "Environment variable '{}' not set. Set it with your backend API key.",
                env
            ))
        })
    }

    pub fn request_options(&self, thinking_mode: bool) -> RequestOptions {
        RequestOptions {
            default_temperature: self.defaults.temperature,
            default_max_tokens: self.defaults.max_tokens,
            thinking_mode,
            drop_params: self.params.drop.clone(),
        }
    }
}

impl ReasoningConfig {
    /// Apply per-request overrides on top of the configured settings.
    pub fn with_overrides(self, show: Option<bool>, thinking_mode: Option<bool>) -> Self {
        Self {
            show: show.unwrap_or(self.show),
            thinking_mode: thinking_mode.unwrap_or(self.thinking_mode),
        }
    }

    pub fn transcoder_options(&self) -> TranscoderOptions {
        TranscoderOptions {
            show_reasoning: self.show,
        }
    }
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("think-proxy.toml"));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = dirs_path() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("think-proxy")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("think-proxy").join("config.toml"));
        }
        if let Some(home) = dirs_path() {
            paths.push(home.join(".config").join("think-proxy").join("config.toml"));
        }
    }

    // Home directory fallback
    if let Some(home) = dirs_path() {
        paths.push(home.join(".think-proxy.toml"));
    }

    paths
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
