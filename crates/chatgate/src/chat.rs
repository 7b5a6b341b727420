//! Chat wire types shared by the inbound API and the upstream request

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Opaque per-message extras carried alongside the text content
///
/// `attachments` is stripped from assistant messages before forwarding;
/// `state` always passes through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

/// One chat message; ordering in a history is chronological, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(
        default,
        rename = "custom_content",
        alias = "customContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_content: Option<CustomContent>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            custom_content: None,
        }
    }
}

/// Inbound chat request body (`POST /api/chat`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Id of the entity the caller wants to talk to
    pub model_id: String,
    /// Full message history, oldest first
    pub messages: Vec<Message>,
    /// Conversation id; must be a syntactically valid UUID
    pub id: String,
    /// System prompt override; an empty string is honored as-is
    #[serde(default)]
    pub prompt: Option<String>,
    /// Temperature override; only honored for applications
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Addons the caller selected for this conversation
    #[serde(default)]
    pub selected_addons: Vec<String>,
    /// Submodel an assistant should run on
    #[serde(default)]
    pub assistant_model_id: Option<String>,
}

/// Opaque caller identity, forwarded to the upstream without re-validation
#[derive(Debug, Clone, Default)]
pub struct CallerIdentity {
    /// Raw `authorization` header value
    pub bearer: Option<String>,
    /// Raw `x-job-title` claim header value
    pub job_title: Option<String>,
}

impl CallerIdentity {
    /// Extract the pass-through identity headers from an inbound request.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header_string = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        Self {
            bearer: header_string("authorization"),
            job_title: header_string("x-job-title"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_message_serializes_snake_case_custom_content() {
        let message = Message {
            role: Role::User,
            content: "hi".to_string(),
            custom_content: Some(CustomContent {
                attachments: Some(serde_json::json!([{"title": "doc"}])),
                state: None,
            }),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("custom_content").is_some());
        assert!(json.get("customContent").is_none());
        assert!(json["custom_content"].get("state").is_none());
    }

    #[test]
    fn test_message_accepts_camel_case_custom_content() {
        let json = r#"{"role":"assistant","content":"ok","customContent":{"state":{"step":1}}}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        let custom = message.custom_content.unwrap();
        assert_eq!(custom.state.unwrap()["step"], 1);
        assert!(custom.attachments.is_none());
    }

    #[test]
    fn test_chat_request_camel_case_fields() {
        let json = r#"{
            "modelId": "gpt-4",
            "messages": [{"role": "user", "content": "Hello"}],
            "id": "0e46e65e-8a9b-4c55-9d82-6c8e54a1f3d7",
            "selectedAddons": ["search"],
            "assistantModelId": "gpt-4-32k"
        }"#;

        let request: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.model_id, "gpt-4");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.selected_addons, vec!["search".to_string()]);
        assert_eq!(request.assistant_model_id.as_deref(), Some("gpt-4-32k"));
        assert!(request.prompt.is_none());
        assert!(request.temperature.is_none());
    }

    #[test]
    fn test_chat_request_optional_fields_default() {
        let json = r#"{
            "modelId": "gpt-4",
            "messages": [],
            "id": "0e46e65e-8a9b-4c55-9d82-6c8e54a1f3d7"
        }"#;

        let request: ChatRequest = serde_json::from_str(json).unwrap();
        assert!(request.selected_addons.is_empty());
        assert!(request.assistant_model_id.is_none());
    }

    #[test]
    fn test_caller_identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        headers.insert("x-job-title", HeaderValue::from_static("engineer"));

        let identity = CallerIdentity::from_headers(&headers);
        assert_eq!(identity.bearer.as_deref(), Some("Bearer abc"));
        assert_eq!(identity.job_title.as_deref(), Some("engineer"));
    }

    #[test]
    fn test_caller_identity_missing_headers() {
        let identity = CallerIdentity::from_headers(&HeaderMap::new());
        assert!(identity.bearer.is_none());
        assert!(identity.job_title.is_none());
    }
}
