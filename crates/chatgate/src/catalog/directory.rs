//! Read-only client for the upstream entity directory

use serde::Deserialize;

use super::EntityKind;
use crate::error::{RelayError, Result};

/// Capability flags published by the directory for an entity
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub embeddings: bool,
    #[serde(default)]
    pub chat_completion: bool,
}

/// One raw directory listing entry, before catalog admission
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub addons: Vec<String>,
    #[serde(default)]
    pub capabilities: Capabilities,
}

/// HTTP client for the `GET {directory_url}/entities/{kind}` collaborator
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DirectoryClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// List all directory entries of one kind.
    pub async fn list(&self, kind: EntityKind) -> Result<Vec<DirectoryEntry>> {
        let url = format!(
            "{}/entities/{}",
            self.base_url.trim_end_matches('/'),
            kind.as_path()
        );

        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| RelayError::General(format!("directory request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::General(format!(
                "directory returned {status} for {}",
                kind.as_path()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RelayError::General(format!("invalid directory listing: {e}")))
    }
}
