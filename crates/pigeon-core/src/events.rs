use serde::{Deserialize, Serialize};

use crate::page::Entity;

/// A live notification pushed by a remote collection's subscription stream.
///
/// `Added` may arrive thin (id only); the merger completes it with a point
/// fetch before touching the local store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiveEvent<T> {
    Added { id: String, entity: Option<T> },
    Updated { entity: T },
    Removed { id: String },
}

impl<T: Entity> LiveEvent<T> {
    pub fn added(entity: T) -> Self {
        Self::Added {
            id: entity.entity_id().to_string(),
            entity: Some(entity),
        }
    }

    pub fn added_thin(id: impl Into<String>) -> Self {
        Self::Added {
            id: id.into(),
            entity: None,
        }
    }

    pub fn updated(entity: T) -> Self {
        Self::Updated { entity }
    }

    pub fn removed(id: impl Into<String>) -> Self {
        Self::Removed { id: id.into() }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Self::Added { id, .. } | Self::Removed { id } => id,
            Self::Updated { entity } => entity.entity_id(),
        }
    }
}
