// 🕸️ Network - a materialized ownership cluster
// The only artifacts this subsystem persists: Network rows plus the
// membership rows tying each entity to exactly one network. A full
// rebuild replaces the whole generation; ids are regenerated each run.

use serde::{Deserialize, Serialize};

use super::{EntityRef, EntityType};

// ============================================================================
// NETWORK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Generated identifier (UUID), fresh per rebuild generation.
    pub id: String,

    /// Display name derived from the dominant principals (see aggregation).
    pub canonical_name: String,

    /// Distinct member businesses.
    pub business_count: i64,

    /// Distinct member principals.
    pub principal_count: i64,

    /// Distinct properties linked to any member.
    pub property_count: i64,

    /// Summed assessed value across those properties.
    pub total_assessed_value: f64,
}

impl Network {
    /// Create a network with a fresh identifier.
    pub fn new(canonical_name: &str) -> Self {
        Network {
            id: uuid::Uuid::new_v4().to_string(),
            canonical_name: canonical_name.to_string(),
            business_count: 0,
            principal_count: 0,
            property_count: 0,
            total_assessed_value: 0.0,
        }
    }
}

// ============================================================================
// MEMBERSHIP
// ============================================================================

/// Ties one entity to exactly one network. "At most one network per
/// entity" is the defining post-condition of a clustering run; the
/// materializer verifies it before committing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkMembership {
    pub network_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
}

impl NetworkMembership {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            entity_type: self.entity_type,
            id: self.entity_id.clone(),
        }
    }
}
