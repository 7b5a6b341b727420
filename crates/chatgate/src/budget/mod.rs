//! Token-budget construction of the upstream request
//!
//! The budgeter resolves the effective system prompt and temperature, then
//! walks the message history newest to oldest, keeping the maximal suffix
//! that fits the entity's request token limit. The system-prompt cost is
//! charged unconditionally, even when it alone exceeds the budget; in that
//! case the forwarded history is simply empty.

use uuid::Uuid;

use crate::catalog::{Entity, EntityKind, ModelFamily};
use crate::chat::{ChatRequest, CustomContent, Message, Role};
use crate::config::DefaultsConfig;
use crate::error::{RelayError, Result};
use crate::tokens::CountTokens;

/// Only this many trailing messages are ever considered for forwarding.
const HISTORY_WINDOW: usize = 1000;

/// Fixed priming cost the upstream adds to every completion request.
/// Counted for telemetry only, never for truncation decisions.
const REPLY_PRIMING_TOKENS: usize = 3;

/// The budgeted upstream request
#[derive(Debug, Clone)]
pub struct BudgetedRequest {
    pub entity: Entity,
    pub system_prompt: String,
    pub temperature: f32,
    /// Accepted history suffix, in original chronological order
    pub messages: Vec<Message>,
    /// Token cost of the forwarded prompt and history; telemetry only
    pub token_count: usize,
}

/// Builds a [`BudgetedRequest`] from an inbound chat request
pub struct RequestBudgeter<'a> {
    counter: &'a dyn CountTokens,
    defaults: &'a DefaultsConfig,
}

impl<'a> RequestBudgeter<'a> {
    pub fn new(counter: &'a dyn CountTokens, defaults: &'a DefaultsConfig) -> Self {
        Self { counter, defaults }
    }

    pub fn build(&self, entity: &Entity, request: &ChatRequest) -> Result<BudgetedRequest> {
        Uuid::parse_str(&request.id).map_err(|_| {
            RelayError::BadRequest(format!(
                "conversation id {:?} is not a valid UUID",
                request.id
            ))
        })?;

        let system_prompt = self.effective_prompt(entity, request.prompt.as_deref());
        let temperature = self.effective_temperature(entity, request.temperature);

        let overhead = ModelFamily::of(&entity.id).per_message_overhead();
        let mut total = self.counter.count(&system_prompt) + overhead;

        let mut accepted: Vec<Message> = Vec::new();
        for message in request.messages.iter().rev().take(HISTORY_WINDOW) {
            let forwarded = forward_message(message);
            let tokens = self.counter.count(&forwarded.content);
            if total + tokens + overhead > entity.request_token_limit {
                break;
            }
            total += tokens + overhead;
            accepted.push(forwarded);
        }
        accepted.reverse();

        let token_count = total + REPLY_PRIMING_TOKENS;
        tracing::debug!(
            "Budgeted {} of {} messages at {token_count} tokens (limit {})",
            accepted.len(),
            request.messages.len(),
            entity.request_token_limit
        );

        Ok(BudgetedRequest {
            entity: entity.clone(),
            system_prompt,
            temperature,
            messages: accepted,
            token_count,
        })
    }

    /// Overrides win; plain models without one fall back to the configured
    /// default prompt, everything else to no prompt at all.
    fn effective_prompt(&self, entity: &Entity, prompt: Option<&str>) -> String {
        match prompt {
            Some(prompt) => prompt.to_string(),
            None if entity.kind == EntityKind::Model => self.defaults.system_prompt.clone(),
            None => String::new(),
        }
    }

    /// Only applications honor the caller's temperature.
    fn effective_temperature(&self, entity: &Entity, temperature: Option<f32>) -> f32 {
        match temperature {
            Some(temperature) if entity.kind == EntityKind::Application => temperature,
            _ => self.defaults.temperature,
        }
    }
}

/// Shape a message for forwarding: assistant-authored attachments are
/// dropped, the opaque `state` payload always passes through.
fn forward_message(message: &Message) -> Message {
    let custom_content = message.custom_content.as_ref().and_then(|custom| {
        let attachments = if message.role == Role::Assistant {
            None
        } else {
            custom.attachments.clone()
        };
        let state = custom.state.clone();
        if attachments.is_none() && state.is_none() {
            None
        } else {
            Some(CustomContent { attachments, state })
        }
    });

    Message {
        role: message.role,
        content: message.content.clone(),
        custom_content,
    }
}
