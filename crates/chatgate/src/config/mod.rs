use serde::Deserialize;

/// Main configuration structure for Chatgate
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream directory and completion API configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Fallback values applied when a request or entity omits them
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8790")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8790".to_string()
}

/// Upstream API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the entity directory
    #[serde(default = "default_directory_url")]
    pub directory_url: String,
    /// Base URL of the completion API
    #[serde(default = "default_completions_url")]
    pub completions_url: String,
    /// Environment variable name for the upstream API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Deployment handling model-plus-addon requests
    #[serde(default = "default_combined_deployment")]
    pub combined_deployment: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            directory_url: default_directory_url(),
            completions_url: default_completions_url(),
            api_key_env: default_api_key_env(),
            combined_deployment: default_combined_deployment(),
        }
    }
}

fn default_directory_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_completions_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_api_key_env() -> String {
    "CHATGATE_API_KEY".to_string()
}

fn default_combined_deployment() -> String {
    "assistant".to_string()
}

/// Fallbacks for requests and for entities absent from the known-model
/// registry
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    /// Entity elected as default when visible to the caller
    #[serde(default = "default_entity_id")]
    pub entity_id: String,
    /// Submodel used for assistants when the request names none
    #[serde(default = "default_assistant_submodel")]
    pub assistant_submodel: String,
    /// System prompt substituted for plain models without an override
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Temperature used whenever the override is not honored
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Context window for entities missing from the registry
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// Request token budget for entities missing from the registry
    #[serde(default = "default_request_token_limit")]
    pub request_token_limit: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            entity_id: default_entity_id(),
            assistant_submodel: default_assistant_submodel(),
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_context_tokens: default_max_context_tokens(),
            request_token_limit: default_request_token_limit(),
        }
    }
}

fn default_entity_id() -> String {
    "gpt-35-turbo".to_string()
}

fn default_assistant_submodel() -> String {
    "gpt-4".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_max_context_tokens() -> usize {
    4096
}

fn default_request_token_limit() -> usize {
    3000
}
