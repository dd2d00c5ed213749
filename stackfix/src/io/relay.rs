//! Relay credential cache (`.stackfix/relay.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::config::write_atomic;

pub const RELAY_FILE: &str = "relay.json";

/// Tokens are refreshed this many seconds before they expire.
pub const TOKEN_SKEW_SECS: i64 = 60;

/// Anonymous device identity and the last token the relay issued for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayCredentials {
    pub device_fingerprint: String,
    pub token: Option<String>,
    /// Unix seconds.
    pub expires_at: Option<i64>,
}

impl RelayCredentials {
    /// Fresh credentials with a random fingerprint and no token.
    pub fn generate() -> Self {
        Self {
            device_fingerprint: uuid::Uuid::new_v4().to_string(),
            token: None,
            expires_at: None,
        }
    }

    pub fn path(state_dir: &Path) -> PathBuf {
        state_dir.join(RELAY_FILE)
    }

    /// Load cached credentials, generating and persisting new ones if the
    /// file is missing or unreadable.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = Self::path(state_dir);
        if path.exists() {
            let parsed = fs::read_to_string(&path)
                .ok()
                .and_then(|contents| serde_json::from_str::<Self>(&contents).ok());
            if let Some(credentials) = parsed {
                debug!(path = %path.display(), "relay credentials loaded");
                return Ok(credentials);
            }
            debug!(path = %path.display(), "relay credentials unreadable; regenerating");
        }
        let credentials = Self::generate();
        credentials.save(state_dir)?;
        Ok(credentials)
    }

    /// Atomically write credentials to disk (temp file + rename).
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let path = Self::path(state_dir);
        let mut buf = serde_json::to_string_pretty(self).context("serialize relay credentials")?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }

    /// The cached token, if it stays valid for at least the skew window.
    pub fn valid_token(&self, now: i64) -> Option<&str> {
        let token = self.token.as_deref().filter(|token| !token.is_empty())?;
        is_token_valid(self.expires_at, now).then_some(token)
    }
}

pub fn is_token_valid(expires_at: Option<i64>, now: i64) -> bool {
    expires_at.is_some_and(|expires_at| now + TOKEN_SKEW_SECS < expires_at)
}
