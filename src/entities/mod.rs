// Entity Models - the nodes and artifacts of network discovery
//
// Principals and businesses are read-only inputs owned by ingestion;
// networks and memberships are the persisted outputs of a rebuild.
// EntityRef is the polymorphic node key used everywhere in between.

pub mod business;
pub mod network;
pub mod principal;

pub use business::Business;
pub use network::{Network, NetworkMembership};
pub use principal::Principal;

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ENTITY TYPE
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Principal,
    Business,
}

impl EntityType {
    /// Storage tag used in membership and property-link rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Principal => "principal",
            EntityType::Business => "business",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "principal" => Some(EntityType::Principal),
            "business" => Some(EntityType::Business),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ENTITY REF
// ============================================================================

/// Polymorphic node key: identifiers are unique within a variant, so the
/// pair (variant, id) is unique across the whole graph. Ord gives the
/// deterministic iteration order the rest of the pipeline relies on.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: String,
}

impl EntityRef {
    pub fn principal(id: &str) -> Self {
        EntityRef {
            entity_type: EntityType::Principal,
            id: id.to_string(),
        }
    }

    pub fn business(id: &str) -> Self {
        EntityRef {
            entity_type: EntityType::Business,
            id: id.to_string(),
        }
    }

    /// Parse "principal:P123" / "business:B42" (the CLI and audit format).
    pub fn parse(s: &str) -> Option<Self> {
        let (tag, id) = s.split_once(':')?;
        let entity_type = EntityType::parse(tag)?;
        if id.is_empty() {
            return None;
        }
        Some(EntityRef {
            entity_type,
            id: id.to_string(),
        })
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}
