// Business - a registered legal entity linked to properties and principals
// Read-only input owned by the ingestion pipeline. The nullable contact
// fields feed the shared-attribute edge adapters.

use serde::{Deserialize, Serialize};

use super::{EntityRef, EntityType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    /// Stable identifier, unique among businesses.
    pub id: String,

    /// Name as registered.
    pub display_name: String,

    /// Upstream-normalized name, used for shared-name edges.
    pub normalized_name: String,

    /// Normalized email address, if the registry carries one.
    pub email: Option<String>,

    /// Normalized business/mailing address string, if present.
    pub mailing_address: Option<String>,
}

impl Business {
    pub fn new(id: &str, display_name: &str, normalized_name: &str) -> Self {
        Business {
            id: id.to_string(),
            display_name: display_name.to_string(),
            normalized_name: normalized_name.to_string(),
            email: None,
            mailing_address: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_mailing_address(mut self, address: &str) -> Self {
        self.mailing_address = Some(address.to_string());
        self
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            entity_type: EntityType::Business,
            id: self.id.clone(),
        }
    }
}
