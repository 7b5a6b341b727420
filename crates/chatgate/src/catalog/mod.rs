//! Entity catalog: the set of models, applications and assistants a caller
//! may talk to
//!
//! The catalog is rebuilt per request from the upstream directory, merged
//! with the static known-model registry, narrowed by the per-user allow-list
//! policy, and carries a single elected default. A failed directory fetch of
//! one kind never aborts the whole build.

mod directory;
mod registry;

pub use directory::{Capabilities, DirectoryClient, DirectoryEntry};
pub use registry::{ModelFamily, TokenLimits, known_limits};

use serde::Serialize;

use crate::chat::CallerIdentity;
use crate::config::DefaultsConfig;

/// Kind of a callable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Model,
    Application,
    Assistant,
}

impl EntityKind {
    /// All kinds, in the order the catalog lists them.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Model,
        EntityKind::Application,
        EntityKind::Assistant,
    ];

    /// Path segment of the directory endpoint for this kind.
    pub fn as_path(self) -> &'static str {
        match self {
            EntityKind::Model => "model",
            EntityKind::Application => "application",
            EntityKind::Assistant => "assistant",
        }
    }
}

/// A callable entity with its merged token limits
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub addons: Vec<String>,
    pub max_context_tokens: usize,
    pub request_token_limit: usize,
}

/// Per-user visibility filter over entity ids, consumed as an opaque policy.
pub trait EntityPolicy: Send + Sync {
    fn is_visible(&self, identity: &CallerIdentity, entity_id: &str) -> bool;
}

/// Policy that keeps every entity visible
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl EntityPolicy for AllowAll {
    fn is_visible(&self, _identity: &CallerIdentity, _entity_id: &str) -> bool {
        true
    }
}

/// The resolved, caller-visible entity set
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub entities: Vec<Entity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_id: Option<String>,
}

impl Catalog {
    pub fn find(&self, entity_id: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == entity_id)
    }
}

/// Builds the per-request catalog
pub struct EntityCatalog<'a> {
    directory: &'a DirectoryClient,
    policy: &'a dyn EntityPolicy,
    defaults: &'a DefaultsConfig,
}

impl<'a> EntityCatalog<'a> {
    pub fn new(
        directory: &'a DirectoryClient,
        policy: &'a dyn EntityPolicy,
        defaults: &'a DefaultsConfig,
    ) -> Self {
        Self {
            directory,
            policy,
            defaults,
        }
    }

    /// Resolve the visible entity set for a caller.
    ///
    /// Always returns a (possibly empty) catalog; directory failures are
    /// logged and the affected kind is treated as empty.
    pub async fn resolve(&self, identity: &CallerIdentity) -> Catalog {
        let mut entities = Vec::new();

        for kind in EntityKind::ALL {
            let entries = match self.directory.list(kind).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Directory fetch for {} failed: {e}", kind.as_path());
                    Vec::new()
                }
            };

            let mut batch: Vec<Entity> = entries
                .into_iter()
                .filter_map(|entry| self.admit(kind, entry))
                .collect();
            sort_by_display_name(&mut batch);
            entities.extend(batch);
        }

        entities.retain(|entity| self.policy.is_visible(identity, &entity.id));

        let default_id = elect_default(&entities, &self.defaults.entity_id);
        Catalog {
            entities,
            default_id,
        }
    }

    /// Apply the capability filters and merge registry limits.
    fn admit(&self, kind: EntityKind, entry: DirectoryEntry) -> Option<Entity> {
        if entry.capabilities.embeddings {
            return None;
        }
        if kind == EntityKind::Model && !entry.capabilities.chat_completion {
            return None;
        }

        let limits = known_limits(&entry.id).unwrap_or(TokenLimits {
            max_context_tokens: self.defaults.max_context_tokens,
            request_token_limit: self.defaults.request_token_limit,
        });

        Some(Entity {
            display_name: entry.display_name.unwrap_or_else(|| entry.id.clone()),
            id: entry.id,
            description: entry.description,
            icon_url: entry.icon_url,
            kind,
            addons: entry.addons,
            max_context_tokens: limits.max_context_tokens,
            request_token_limit: limits.request_token_limit,
        })
    }
}

fn sort_by_display_name(entities: &mut [Entity]) {
    entities.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// The configured default when visible, else the first visible entity.
fn elect_default(entities: &[Entity], configured: &str) -> Option<String> {
    entities
        .iter()
        .find(|entity| entity.id == configured)
        .or_else(|| entities.first())
        .map(|entity| entity.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, display_name: &str) -> Entity {
        Entity {
            id: id.to_string(),
            display_name: display_name.to_string(),
            description: None,
            icon_url: None,
            kind: EntityKind::Model,
            addons: Vec::new(),
            max_context_tokens: 4096,
            request_token_limit: 3000,
        }
    }

    fn entry(id: &str, embeddings: bool, chat_completion: bool) -> DirectoryEntry {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "capabilities": {"embeddings": embeddings, "chat_completion": chat_completion},
        }))
        .unwrap()
    }

    fn catalog_builder<'a>(
        directory: &'a DirectoryClient,
        defaults: &'a DefaultsConfig,
    ) -> EntityCatalog<'a> {
        EntityCatalog::new(directory, &AllowAll, defaults)
    }

    #[test]
    fn test_admit_drops_embeddings_entities() {
        let directory = DirectoryClient::new(reqwest::Client::new(), "http://unused", "");
        let defaults = DefaultsConfig::default();
        let catalog = catalog_builder(&directory, &defaults);

        assert!(
            catalog
                .admit(EntityKind::Model, entry("ada-embedding", true, false))
                .is_none()
        );
        assert!(
            catalog
                .admit(EntityKind::Application, entry("embed-app", true, false))
                .is_none()
        );
    }

    #[test]
    fn test_admit_requires_chat_completion_for_models_only() {
        let directory = DirectoryClient::new(reqwest::Client::new(), "http://unused", "");
        let defaults = DefaultsConfig::default();
        let catalog = catalog_builder(&directory, &defaults);

        assert!(
            catalog
                .admit(EntityKind::Model, entry("whisper", false, false))
                .is_none()
        );
        assert!(
            catalog
                .admit(EntityKind::Model, entry("gpt-4", false, true))
                .is_some()
        );
        // Applications and assistants skip the chat-completion check.
        assert!(
            catalog
                .admit(EntityKind::Application, entry("my-app", false, false))
                .is_some()
        );
        assert!(
            catalog
                .admit(EntityKind::Assistant, entry("helper", false, false))
                .is_some()
        );
    }

    #[test]
    fn test_admit_merges_registry_limits() {
        let directory = DirectoryClient::new(reqwest::Client::new(), "http://unused", "");
        let defaults = DefaultsConfig::default();
        let catalog = catalog_builder(&directory, &defaults);

        let known = catalog
            .admit(EntityKind::Model, entry("gpt-4", false, true))
            .unwrap();
        assert_eq!(known.max_context_tokens, 8192);
        assert_eq!(known.request_token_limit, 6000);

        let unknown = catalog
            .admit(EntityKind::Model, entry("mystery-model", false, true))
            .unwrap();
        assert_eq!(unknown.max_context_tokens, defaults.max_context_tokens);
        assert_eq!(unknown.request_token_limit, defaults.request_token_limit);
    }

    #[test]
    fn test_admit_falls_back_to_id_for_display_name() {
        let directory = DirectoryClient::new(reqwest::Client::new(), "http://unused", "");
        let defaults = DefaultsConfig::default();
        let catalog = catalog_builder(&directory, &defaults);

        let admitted = catalog
            .admit(EntityKind::Model, entry("gpt-4", false, true))
            .unwrap();
        assert_eq!(admitted.display_name, "gpt-4");
    }

    #[test]
    fn test_sort_by_display_name_is_case_insensitive() {
        let mut entities = vec![
            entity("c", "zeta"),
            entity("a", "Alpha"),
            entity("b", "beta"),
        ];
        sort_by_display_name(&mut entities);

        let names: Vec<&str> = entities.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "zeta"]);
    }

    #[test]
    fn test_elect_default_prefers_configured_id() {
        let entities = vec![entity("a", "A"), entity("b", "B")];
        assert_eq!(elect_default(&entities, "b"), Some("b".to_string()));
    }

    #[test]
    fn test_elect_default_falls_back_to_first() {
        let entities = vec![entity("a", "A"), entity("b", "B")];
        assert_eq!(elect_default(&entities, "missing"), Some("a".to_string()));
        assert_eq!(elect_default(&[], "missing"), None);
    }

    #[test]
    fn test_catalog_find() {
        let catalog = Catalog {
            entities: vec![entity("a", "A"), entity("b", "B")],
            default_id: Some("a".to_string()),
        };
        assert!(catalog.find("b").is_some());
        assert!(catalog.find("c").is_none());
    }

    #[test]
    fn test_policy_narrows_visible_set() {
        struct DenyList(&'static str);
        impl EntityPolicy for DenyList {
            fn is_visible(&self, _identity: &CallerIdentity, entity_id: &str) -> bool {
                entity_id != self.0
            }
        }

        let mut entities = vec![entity("a", "A"), entity("b", "B")];
        let policy = DenyList("a");
        let identity = CallerIdentity::default();
        entities.retain(|e| policy.is_visible(&identity, &e.id));

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id, "b");
    }
}
