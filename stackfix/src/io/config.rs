//! Configuration: tunables in `.stackfix/config.toml` and provider settings
//! read from the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::agents::request::{DEFAULT_MAX_TOKENS, RequestOptions};
use crate::io::transport::TransportError;

pub const STATE_DIR: &str = ".stackfix";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_RELAY_URL: &str = "https://api.stackfix.ai/v1";

/// Stackfix configuration (TOML).
///
/// Missing fields default to the values below, so an absent file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StackfixConfig {
    /// Client timeout for each outbound model call.
    pub http_timeout_secs: u64,

    /// Wall-clock limit for the wrapped command and its rerun.
    pub command_timeout_secs: u64,

    /// Bytes of stdout/stderr kept in memory per stream while a command runs.
    pub command_output_limit_bytes: usize,

    pub max_stdio_chars: usize,
    pub max_git_chars: usize,
    pub max_file_chars: usize,

    /// Manifests larger than this are skipped entirely.
    pub max_file_bytes: u64,

    /// `AGENTS.md` files larger than this are skipped entirely.
    pub max_agent_instruction_bytes: u64,
}

impl Default for StackfixConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 60,
            command_timeout_secs: 60 * 60,
            command_output_limit_bytes: 1_000_000,
            max_stdio_chars: 20_000,
            max_git_chars: 20_000,
            max_file_chars: 12_000,
            max_file_bytes: 200_000,
            max_agent_instruction_bytes: 12_000,
        }
    }
}

impl StackfixConfig {
    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            return Err(anyhow!("http_timeout_secs must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(anyhow!("command_output_limit_bytes must be > 0"));
        }
        if self.max_stdio_chars == 0 || self.max_git_chars == 0 || self.max_file_chars == 0 {
            return Err(anyhow!("context character limits must be > 0"));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    state_dir(root).join(CONFIG_FILE)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StackfixConfig::default()`.
pub fn load_config(path: &Path) -> Result<StackfixConfig> {
    if !path.exists() {
        return Ok(StackfixConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StackfixConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Write `contents` next to `path` and rename it into place.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Where model calls go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// An OpenAI-compatible API called with the user's own key.
    Direct { base_url: String, api_key: String },
    /// The hosted relay, authenticated with an anonymous device token.
    Relay { relay_url: String, state_dir: PathBuf },
    /// A custom endpoint that takes the request body and answers with the
    /// agent object (or text) directly. No authentication.
    Endpoint { url: String },
}

impl Provider {
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Direct { .. } => "direct",
            Provider::Relay { .. } => "relay",
            Provider::Endpoint { .. } => "endpoint",
        }
    }
}

/// Provider plus request options, resolved from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub options: RequestOptions,
}

impl ProviderSettings {
    /// Resolve settings from the process environment. `root` anchors the
    /// relay credential cache.
    pub fn from_env(root: &Path) -> Result<Self, TransportError> {
        Self::from_lookup(root, |key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`. Blank values count as unset.
    ///
    /// An explicit `STACKFIX_ENDPOINT` wins, then `STACKFIX_PROVIDER`. With
    /// neither, direct mode is used when both `MODEL_BASE_URL` and
    /// `MODEL_API_KEY` are set, and the relay otherwise.
    pub fn from_lookup<F>(root: &Path, lookup: F) -> Result<Self, TransportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(TransportError::MissingEnv(key));

        let max_tokens = match get("MODEL_MAX_TOKENS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| TransportError::InvalidEnv {
                    key: "MODEL_MAX_TOKENS",
                    value: raw.clone(),
                })?,
            None => DEFAULT_MAX_TOKENS,
        };
        let json_response = lookup("STACKFIX_NO_RESPONSE_FORMAT").as_deref() != Some("1");

        let relay = || Provider::Relay {
            relay_url: get("STACKFIX_RELAY_URL")
                .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            state_dir: state_dir(root),
        };
        let direct = || -> Result<Provider, TransportError> {
            Ok(Provider::Direct {
                base_url: require("MODEL_BASE_URL")?,
                api_key: require("MODEL_API_KEY")?,
            })
        };

        let provider = if let Some(url) = get("STACKFIX_ENDPOINT") {
            Provider::Endpoint { url }
        } else {
            match get("STACKFIX_PROVIDER").as_deref().map(str::trim) {
                Some("direct") => direct()?,
                Some("stackfix") | Some("relay") => relay(),
                Some(other) => {
                    return Err(TransportError::InvalidEnv {
                        key: "STACKFIX_PROVIDER",
                        value: other.to_string(),
                    });
                }
                None if get("MODEL_BASE_URL").is_some() && get("MODEL_API_KEY").is_some() => {
                    direct()?
                }
                None => relay(),
            }
        };

        let model = match provider {
            Provider::Relay { .. } => get("MODEL_NAME"),
            _ => Some(require("MODEL_NAME")?),
        };

        Ok(Self {
            provider,
            options: RequestOptions {
                model,
                max_tokens,
                json_response,
            },
        })
    }

    /// The API key to scrub from logged response bodies, if any.
    pub fn api_key(&self) -> Option<&str> {
        match &self.provider {
            Provider::Direct { api_key, .. } => Some(api_key),
            _ => None,
        }
    }
}
