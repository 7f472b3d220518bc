// Error taxonomy for network discovery runs
//
// Two classes of failure:
// - Systemic (storage unreachable, invalid policy, concurrent rebuild):
//   run-fatal, no partial commit.
// - Local (one malformed attribute value): the offending edge is skipped
//   and counted, the run continues.

use thiserror::Error;

use crate::edges::EdgeKind;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// An edge adapter could not read its backing data.
    /// Fatal: clustering must never commit a partial view of the edge universe.
    #[error("edge source unavailable ({kind}): {source}")]
    SourceUnavailable {
        kind: EdgeKind,
        #[source]
        source: rusqlite::Error,
    },

    /// Another rebuild holds the run lock. Retry later; the data is fine.
    #[error("a network rebuild is already in progress")]
    RebuildInProgress,

    /// An entity was found in two materialized networks. Defensive
    /// post-commit check; carries full identifiers for postmortem.
    #[error(
        "entity {entity_type}:{entity_id} belongs to networks {first_network} and {second_network}"
    )]
    InvariantViolation {
        entity_type: String,
        entity_id: String,
        first_network: String,
        second_network: String,
    },

    /// Rejected at startup, never reaches clustering.
    #[error("invalid clustering policy: {0}")]
    PolicyMisconfiguration(String),

    /// Persistence failure inside the materializer. The surrounding
    /// transaction rolls back; the prior generation stays visible.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Cooperative cancellation observed before the commit phase.
    #[error("rebuild cancelled")]
    Cancelled,
}

impl DiscoveryError {
    pub fn source_unavailable(kind: EdgeKind, source: rusqlite::Error) -> Self {
        DiscoveryError::SourceUnavailable { kind, source }
    }

    /// True for conditions the caller may retry without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DiscoveryError::RebuildInProgress)
    }
}
