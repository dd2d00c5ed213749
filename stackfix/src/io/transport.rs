//! Transport abstraction for model calls.
//!
//! The [`Transport`] trait decouples the agent client from the network. The
//! production [`HttpTransport`] speaks to a direct OpenAI-compatible API, the
//! hosted relay, or a custom endpoint; tests use scripted transports that
//! return predetermined bodies without any I/O.

use std::cell::OnceCell;
use std::path::Path;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::agents::request::ChatRequest;
use crate::io::config::{Provider, ProviderSettings, StackfixConfig};
use crate::io::relay::RelayCredentials;

const LOG_PREFIX_CHARS: usize = 500;
const ERROR_BODY_CHARS: usize = 2000;
const REDACTED_WORDS: [&str; 5] = ["api_key", "apikey", "token", "authorization", "bearer"];

/// Decoded body of one model call.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// A chat-completion response; content must still be extracted.
    Completion(Value),
    /// The agent reply itself: either text to parse or an already-decoded object.
    Agent(Value),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} from model endpoint: {body}")]
    Status { status: u16, body: String },
    #[error("decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("relay credentials: {0}")]
    Credentials(String),
}

impl TransportError {
    fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else {
            TransportError::Http {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Abstraction over model backends.
pub trait Transport {
    /// Send one request and return the decoded body.
    fn send(&self, request: &ChatRequest) -> Result<RawResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        (**self).send(request)
    }
}

/// Blocking HTTP transport.
pub struct HttpTransport {
    client: Client,
    provider: Provider,
    api_key: Option<String>,
    announced: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    token: String,
    expires_at: i64,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    device_fingerprint: &'a str,
}

impl HttpTransport {
    pub fn new(settings: &ProviderSettings, config: &StackfixConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self {
            client,
            provider: settings.provider.clone(),
            api_key: settings.api_key().map(str::to_string),
            announced: OnceCell::new(),
        })
    }

    /// The endpoint this instance has called, once it has called one.
    pub fn endpoint(&self) -> Option<&str> {
        self.announced.get().map(String::as_str)
    }

    fn announce(&self, url: &str) {
        if self.announced.set(url.to_string()).is_ok() {
            info!(url, "using model endpoint");
        }
    }

    fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        bearer: Option<&str>,
        log_body: bool,
    ) -> Result<Value, TransportError> {
        let mut builder = self.client.post(url).json(body);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        let response = builder
            .send()
            .map_err(|source| TransportError::from_reqwest(url, source))?;
        let status = response.status();
        debug!(status = status.as_u16(), "http status");
        let text = response
            .text()
            .map_err(|source| TransportError::from_reqwest(url, source))?;
        if log_body {
            let prefix: String = text.chars().take(LOG_PREFIX_CHARS).collect();
            debug!(
                body = %redact_secrets(&prefix, self.api_key.as_deref()),
                "raw response prefix"
            );
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: redact_secrets(
                    &text.chars().take(ERROR_BODY_CHARS).collect::<String>(),
                    self.api_key.as_deref(),
                ),
            });
        }
        serde_json::from_str(&text).map_err(|source| TransportError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Reuse a cached relay token while it is fresh, else request a new one.
    #[instrument(skip_all)]
    fn relay_token(&self, relay_url: &str, state_dir: &Path) -> Result<String, TransportError> {
        let credentials_err = |err: anyhow::Error| TransportError::Credentials(format!("{err:#}"));
        let mut credentials = RelayCredentials::load(state_dir).map_err(credentials_err)?;
        let now = chrono::Utc::now().timestamp();
        if let Some(token) = credentials.valid_token(now) {
            debug!("reusing cached relay token");
            return Ok(token.to_string());
        }

        let url = format!("{relay_url}/anon-token");
        let fingerprint = credentials.device_fingerprint.clone();
        let body = self.post_json(
            &url,
            &TokenRequest {
                device_fingerprint: &fingerprint,
            },
            None,
            false,
        )?;
        let grant: TokenGrant =
            serde_json::from_value(body).map_err(|source| TransportError::Decode {
                url: url.clone(),
                source,
            })?;
        credentials.token = Some(grant.token.clone());
        credentials.expires_at = Some(grant.expires_at);
        credentials.save(state_dir).map_err(credentials_err)?;
        debug!(expires_at = grant.expires_at, "relay token issued");
        Ok(grant.token)
    }
}

impl Transport for HttpTransport {
    #[instrument(skip_all, fields(provider = self.provider.label()))]
    fn send(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        match &self.provider {
            Provider::Direct { base_url, api_key } => {
                let url = chat_completions_url(base_url);
                self.announce(&url);
                let body = self.post_json(&url, request, Some(api_key), true)?;
                Ok(RawResponse::Completion(body))
            }
            Provider::Relay {
                relay_url,
                state_dir,
            } => {
                let token = self.relay_token(relay_url, state_dir)?;
                let url = format!("{relay_url}/chat/completions");
                self.announce(&url);
                let body = self.post_json(&url, request, Some(&token), true)?;
                Ok(RawResponse::Completion(body))
            }
            Provider::Endpoint { url } => {
                self.announce(url);
                let body = self.post_json(url, request, None, true)?;
                Ok(RawResponse::Agent(endpoint_content(body)))
            }
        }
    }
}

/// `{base}/chat/completions`, inserting `/v1` unless the base already ends with it.
pub fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

/// The first non-empty of `content`, `response`, or the whole body.
fn endpoint_content(body: Value) -> Value {
    if let Value::Object(map) = &body {
        for key in ["content", "response"] {
            if let Some(value) = map.get(key)
                && is_present(value)
            {
                return value.clone();
            }
        }
    }
    body
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Mask the API key and credential-looking words before text reaches a log.
pub fn redact_secrets(text: &str, api_key: Option<&str>) -> String {
    let mut redacted = match api_key.filter(|key| !key.is_empty()) {
        Some(key) => text.replace(key, "[REDACTED]"),
        None => text.to_string(),
    };
    for word in REDACTED_WORDS {
        redacted = redacted.replace(word, &format!("{}***", &word[..2]));
    }
    redacted
}
