// 🎛️ Clustering Policy - Thresholds as data
// Every knob that decides what counts as a hub lives here, loaded from
// JSON, validated once at startup, and passed explicitly into each
// component. No module-level defaults buried in the algorithm.

use anyhow::Context as AnyhowContext;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{DiscoveryError, Result};

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringPolicy {
    /// A principal whose distinct-business ownership degree exceeds this
    /// stops bridging businesses (its direct links still count toward stats).
    #[serde(default = "default_ownership_threshold")]
    pub hub_degree_threshold_ownership: usize,

    /// A shared email/address/name value connecting more distinct entities
    /// than this is suppressed entirely.
    #[serde(default = "default_shared_threshold")]
    pub hub_degree_threshold_shared: usize,

    /// Email domains that never propagate connectivity regardless of degree
    /// (public providers; .edu/.gov are always excluded on top of this set).
    #[serde(default = "default_excluded_email_domains")]
    pub excluded_email_domains: HashSet<String>,

    /// Case-insensitive substrings of addresses that never propagate
    /// connectivity (registered agents, law firms, shared billing offices).
    #[serde(default)]
    pub excluded_address_patterns: HashSet<String>,

    /// Components smaller than this are not materialized as networks.
    #[serde(default = "default_min_network_size")]
    pub min_network_size: usize,
}

fn default_ownership_threshold() -> usize {
    250
}

fn default_shared_threshold() -> usize {
    25
}

fn default_min_network_size() -> usize {
    2
}

fn default_excluded_email_domains() -> HashSet<String> {
    [
        "gmail.com",
        "yahoo.com",
        "hotmail.com",
        "aol.com",
        "outlook.com",
        "icloud.com",
    ]
    .iter()
    .map(|d| d.to_string())
    .collect()
}

impl Default for ClusteringPolicy {
    fn default() -> Self {
        ClusteringPolicy {
            hub_degree_threshold_ownership: default_ownership_threshold(),
            hub_degree_threshold_shared: default_shared_threshold(),
            excluded_email_domains: default_excluded_email_domains(),
            excluded_address_patterns: HashSet::new(),
            min_network_size: default_min_network_size(),
        }
    }
}

impl ClusteringPolicy {
    /// Load policy from a JSON file. Missing fields fall back to defaults;
    /// out-of-range values (negative thresholds) fail deserialization.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading policy file {}", path.display()))
            .map_err(|e| DiscoveryError::PolicyMisconfiguration(format!("{e:#}")))?;

        let policy: ClusteringPolicy = serde_json::from_str(&raw)
            .map_err(|e| DiscoveryError::PolicyMisconfiguration(e.to_string()))?;

        policy.validate()?;
        Ok(policy)
    }

    /// Reject unusable configurations before any clustering starts.
    pub fn validate(&self) -> Result<()> {
        if self.hub_degree_threshold_ownership == 0 {
            return Err(DiscoveryError::PolicyMisconfiguration(
                "hub_degree_threshold_ownership must be at least 1 \
                 (0 would suppress every ownership link)"
                    .to_string(),
            ));
        }

        if self.hub_degree_threshold_shared == 0 {
            return Err(DiscoveryError::PolicyMisconfiguration(
                "hub_degree_threshold_shared must be at least 1 \
                 (0 would suppress every shared attribute)"
                    .to_string(),
            ));
        }

        if self.min_network_size < 2 {
            return Err(DiscoveryError::PolicyMisconfiguration(format!(
                "min_network_size must be at least 2, got {}",
                self.min_network_size
            )));
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
