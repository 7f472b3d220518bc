// Entity-Network Discovery - Core Library
// Groups business entities and their principals into ownership networks:
// edge adapters read relationship facts, the hub classifier suppresses
// structural connectors, union-find computes the partition, the
// aggregator names and sizes each network, and the materializer swaps
// the stored generation atomically.

pub mod aggregation;
pub mod audit;
pub mod clustering;
pub mod db;
pub mod edges;
pub mod entities;
pub mod error;
pub mod hubs;
pub mod materializer;
pub mod pathfind;
pub mod policy;
pub mod runner;

// Re-export commonly used types
pub use aggregation::{
    is_corporate_name, NetworkAggregator, NetworkSummary, NoPropertyStats, PropertyRollup,
    PropertyStatsSource, CORPORATE_KEYWORDS,
};
pub use clustering::{ClusteringEngine, DisjointSet, Partition};
pub use db::{
    acquire_rebuild_lock, load_entity_display_names, load_memberships, load_networks,
    release_rebuild_lock, setup_database, RebuildLock, SqlitePropertyStats,
};
pub use edges::{
    Edge, EdgeBatch, EdgeKind, EdgeSource, EdgeUniverse, OwnershipLinkSource,
    SharedAddressSource, SharedEmailSource, SharedOwnerNameSource,
};
pub use entities::{Business, EntityRef, EntityType, Network, NetworkMembership, Principal};
pub use error::{DiscoveryError, Result};
pub use hubs::{HubClassifier, HubEntry, HubReason, HubReport};
pub use materializer::{
    apply_incremental, compute_fingerprint, materialize_full, plan_incremental,
    IncrementalPlan, RebuildOutcome,
};
pub use pathfind::{PathHop, PathQuery};
pub use policy::ClusteringPolicy;
pub use runner::{CancellationToken, RebuildRunner, RunMode, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
