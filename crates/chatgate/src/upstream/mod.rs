//! Construction of the upstream completion request

use serde::Serialize;

use crate::budget::BudgetedRequest;
use crate::catalog::EntityKind;
use crate::chat::{CallerIdentity, Message, Role};
use crate::config::{DefaultsConfig, UpstreamConfig};

/// Addon reference in the upstream request body
#[derive(Debug, Clone, Serialize)]
pub struct AddonRef {
    pub name: String,
}

/// JSON body of the upstream completion call
#[derive(Debug, Clone, Serialize)]
pub struct CompletionBody {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub stream: bool,
    pub model: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub addons: Vec<AddonRef>,
}

/// A fully routed upstream request
#[derive(Debug, Clone)]
pub struct RoutedRequest {
    pub url: String,
    pub body: CompletionBody,
}

/// Maps a budgeted request onto an upstream deployment
pub struct UpstreamRouter<'a> {
    config: &'a UpstreamConfig,
    defaults: &'a DefaultsConfig,
}

impl<'a> UpstreamRouter<'a> {
    pub fn new(config: &'a UpstreamConfig, defaults: &'a DefaultsConfig) -> Self {
        Self { config, defaults }
    }

    /// Pick the deployment endpoint and build the request body.
    ///
    /// Plain models with selected addons go to the combined deployment;
    /// everything else is keyed by the entity id. Assistants run on the
    /// requested submodel, falling back to the configured default.
    pub fn route(
        &self,
        budgeted: &BudgetedRequest,
        selected_addons: &[String],
        assistant_model_id: Option<&str>,
    ) -> RoutedRequest {
        let entity = &budgeted.entity;

        let deployment = if entity.kind == EntityKind::Model && !selected_addons.is_empty() {
            self.config.combined_deployment.as_str()
        } else {
            entity.id.as_str()
        };

        let model = match entity.kind {
            EntityKind::Assistant => assistant_model_id
                .unwrap_or(&self.defaults.assistant_submodel)
                .to_string(),
            _ => entity.id.clone(),
        };

        let mut messages = Vec::with_capacity(budgeted.messages.len() + 1);
        if !budgeted.system_prompt.is_empty() {
            messages.push(Message::new(Role::System, budgeted.system_prompt.clone()));
        }
        messages.extend(budgeted.messages.iter().cloned());

        let url = format!(
            "{}/deployments/{deployment}/chat/completions",
            self.config.completions_url.trim_end_matches('/')
        );

        RoutedRequest {
            url,
            body: CompletionBody {
                messages,
                temperature: budgeted.temperature,
                stream: true,
                model,
                addons: selected_addons
                    .iter()
                    .map(|name| AddonRef { name: name.clone() })
                    .collect(),
            },
        }
    }

    /// Prepare the outgoing HTTP request: JSON body, upstream key, the
    /// conversation correlation header and the opaque caller identity.
    pub fn send(
        &self,
        client: &reqwest::Client,
        routed: &RoutedRequest,
        api_key: &str,
        conversation_id: &str,
        identity: &CallerIdentity,
    ) -> reqwest::RequestBuilder {
        let mut builder = client
            .post(&routed.url)
            .header("Api-Key", api_key)
            .header("x-conversation-id", conversation_id)
            .json(&routed.body);

        if let Some(bearer) = &identity.bearer {
            builder = builder.header("authorization", bearer);
        }
        if let Some(job_title) = &identity.job_title {
            builder = builder.header("x-job-title", job_title);
        }

        builder
    }
}
