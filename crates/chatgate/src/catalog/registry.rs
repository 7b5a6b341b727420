//! Static token-limit metadata for known upstream models

/// Families of upstream chat models with distinct request framing costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Gpt35,
    Gpt4,
    Other,
}

impl ModelFamily {
    /// Classify a model id by its deployment name prefix.
    pub fn of(model_id: &str) -> Self {
        if model_id.starts_with("gpt-35") || model_id.starts_with("gpt-3.5") {
            ModelFamily::Gpt35
        } else if model_id.starts_with("gpt-4") {
            ModelFamily::Gpt4
        } else {
            ModelFamily::Other
        }
    }

    /// Fixed per-message token overhead the upstream chat format charges.
    ///
    /// Unrecognized families are charged nothing; adding a family is a
    /// single arm here.
    pub fn per_message_overhead(self) -> usize {
        match self {
            ModelFamily::Gpt35 => 4,
            ModelFamily::Gpt4 => 3,
            ModelFamily::Other => 0,
        }
    }
}

/// Token limits attached to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimits {
    /// Total context window of the model
    pub max_context_tokens: usize,
    /// Budget the combined prompt and forwarded history may occupy
    pub request_token_limit: usize,
}

const KNOWN_LIMITS: &[(&str, TokenLimits)] = &[
    (
        "gpt-35-turbo",
        TokenLimits {
            max_context_tokens: 4096,
            request_token_limit: 3000,
        },
    ),
    (
        "gpt-35-turbo-16k",
        TokenLimits {
            max_context_tokens: 16384,
            request_token_limit: 12000,
        },
    ),
    (
        "gpt-4",
        TokenLimits {
            max_context_tokens: 8192,
            request_token_limit: 6000,
        },
    ),
    (
        "gpt-4-32k",
        TokenLimits {
            max_context_tokens: 32768,
            request_token_limit: 24000,
        },
    ),
    (
        "gpt-4-turbo",
        TokenLimits {
            max_context_tokens: 128000,
            request_token_limit: 16000,
        },
    ),
];

/// Look up the registry entry for a known model id.
pub fn known_limits(model_id: &str) -> Option<TokenLimits> {
    KNOWN_LIMITS
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, limits)| *limits)
}
