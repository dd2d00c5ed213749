//! Agent client: one call, plus at most one strict retry.
//!
//! A reply whose patch is non-empty but structurally invalid earns exactly
//! one more attempt with [`SystemPrompt::StrictDiff`]. The second reply is
//! returned whatever its validity; the applier has its own fallback.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::agents::prompts::{PromptEngine, SystemPrompt};
use crate::agents::request::{ChatRequest, RequestError, RequestOptions};
use crate::core::diff_validator::validate_unified_diff;
use crate::core::extract::{NoContentError, extract_content};
use crate::core::normalize::{normalize_text, normalize_value};
use crate::core::types::{AgentContext, AgentResult};
use crate::io::transport::{RawResponse, Transport, TransportError};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    NoContent(#[from] NoContentError),
}

pub struct AgentClient<T> {
    transport: T,
    options: RequestOptions,
    prompts: PromptEngine,
}

impl<T: Transport> AgentClient<T> {
    pub fn new(transport: T, options: RequestOptions) -> Self {
        Self {
            transport,
            options,
            prompts: PromptEngine::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Ask the agent about `context`. Transport and extraction failures
    /// propagate without a retry.
    #[instrument(skip_all, fields(mode = ?context.mode))]
    pub fn call(&self, context: &AgentContext) -> Result<AgentResult, AgentError> {
        let first = self.attempt(context, SystemPrompt::Default)?;
        if !first.has_patch() {
            return Ok(first);
        }
        match validate_unified_diff(&first.patch) {
            Ok(()) => return Ok(first),
            Err(reason) => {
                debug!(%reason, "invalid patch format; retrying once with strict diff prompt");
            }
        }

        let second = self.attempt(context, SystemPrompt::StrictDiff)?;
        if second.has_patch()
            && let Err(reason) = validate_unified_diff(&second.patch)
        {
            warn!(%reason, "invalid unified diff after retry; passing to fallback applier");
        }
        Ok(second)
    }

    fn attempt(
        &self,
        context: &AgentContext,
        system: SystemPrompt,
    ) -> Result<AgentResult, AgentError> {
        let request = ChatRequest::build(context, system, &self.options, &self.prompts)?;
        let result = match self.transport.send(&request)? {
            RawResponse::Completion(body) => {
                let text = extract_content(&body)?;
                normalize_text(Some(&text))
            }
            RawResponse::Agent(Value::String(text)) => normalize_text(Some(&text)),
            RawResponse::Agent(Value::Null) => normalize_text(None),
            RawResponse::Agent(value) => normalize_value(&value, None),
        };
        if let Some(warning) = &result.warning {
            debug!(warning = warning.as_str(), "degraded agent reply");
        }
        Ok(result)
    }
}
