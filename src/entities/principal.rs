// Principal - an individual associated with businesses as owner/officer
// Read-only input owned by the ingestion pipeline; this subsystem never
// creates or mutates principal records.

use serde::{Deserialize, Serialize};

use super::{EntityRef, EntityType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier, unique among principals.
    pub id: String,

    /// Name as reported by the registry.
    pub display_name: String,

    /// Upstream-normalized name, used for shared-name edges.
    pub normalized_name: String,
}

impl Principal {
    pub fn new(id: &str, display_name: &str, normalized_name: &str) -> Self {
        Principal {
            id: id.to_string(),
            display_name: display_name.to_string(),
            normalized_name: normalized_name.to_string(),
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            entity_type: EntityType::Principal,
            id: self.id.clone(),
        }
    }
}
