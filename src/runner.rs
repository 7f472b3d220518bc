// 🔁 Rebuild Runner - one run, end to end
// Wires adapters → hub classifier → clustering engine → aggregator →
// materializer, under the run-level lock. Single-threaded batch is the
// correctness model: the whole edge universe is read before any union,
// and the write phase is one serialized transaction. Cancellation is
// cooperative, checked at adapter boundaries and once more before the
// commit phase begins.

use chrono::Utc;
use log::info;
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregation::NetworkAggregator;
use crate::clustering::ClusteringEngine;
use crate::db::{
    acquire_rebuild_lock, load_entity_display_names, load_memberships, record_rebuild_run,
    release_rebuild_lock, RebuildRun, SqlitePropertyStats,
};
use crate::edges::EdgeUniverse;
use crate::entities::EntityRef;
use crate::error::{DiscoveryError, Result};
use crate::hubs::{HubClassifier, HubEntry};
use crate::materializer::{
    apply_incremental, materialize_full, plan_incremental, RebuildOutcome,
};
use crate::policy::ClusteringPolicy;

// ============================================================================
// CANCELLATION
// ============================================================================

/// Shared cooperative-cancellation flag. Once the materializer's commit
/// has begun the token is no longer consulted: the transaction either
/// fully commits or fully rolls back.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DiscoveryError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    Incremental,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub mode: RunMode,
    pub network_count: usize,
    pub membership_count: usize,
    pub suppressed_edge_count: usize,
    pub skipped_value_count: usize,
    pub hub_node_count: usize,
    pub hub_value_count: usize,
    pub fingerprint: String,

    /// Flagged hubs of this run, for logs and the audit export.
    pub hub_entries: Vec<HubEntry>,
}

// ============================================================================
// RUNNER
// ============================================================================

pub struct RebuildRunner {
    policy: ClusteringPolicy,
    cancel: CancellationToken,
}

impl RebuildRunner {
    pub fn new(policy: ClusteringPolicy, cancel: CancellationToken) -> Self {
        RebuildRunner { policy, cancel }
    }

    /// Full rebuild: recompute the partition from scratch and replace the
    /// stored generation atomically.
    pub fn run_full(&self, conn: &mut Connection) -> Result<RunReport> {
        self.policy.validate()?;
        let lock = acquire_rebuild_lock(conn)?;
        let result = self.run_full_locked(conn);
        let released = release_rebuild_lock(conn, &lock);
        match (result, released) {
            (Ok(report), Ok(())) => Ok(report),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Incremental update for newly-linked entities. Takes the same lock
    /// as a full rebuild; never merges, splits, or renames networks.
    pub fn run_incremental(
        &self,
        conn: &mut Connection,
        new_entities: &[EntityRef],
    ) -> Result<RunReport> {
        self.policy.validate()?;
        let lock = acquire_rebuild_lock(conn)?;
        let result = self.run_incremental_locked(conn, new_entities);
        let released = release_rebuild_lock(conn, &lock);
        match (result, released) {
            (Ok(report), Ok(())) => Ok(report),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    fn run_full_locked(&self, conn: &mut Connection) -> Result<RunReport> {
        let started_at = Utc::now();

        let universe = EdgeUniverse::collect(conn, &self.cancel)?;
        info!(
            "edge universe: {} edge(s), {} skipped value(s)",
            universe.edges.len(),
            universe.skipped_total
        );

        let hub_report = HubClassifier::new(&self.policy).classify(&universe.edges);
        let partition = ClusteringEngine::cluster(&universe.edges, &hub_report);
        let suppressed_edge_count =
            ClusteringEngine::suppressed_edge_count(&universe.edges, &hub_report);

        let summaries = {
            let names = load_entity_display_names(conn)?;
            let stats = SqlitePropertyStats::new(conn);
            let aggregator =
                NetworkAggregator::new(&universe.ownership_link_counts, &names, &stats);

            let mut out = Vec::new();
            for members in partition.components() {
                if members.len() >= self.policy.min_network_size {
                    out.push(aggregator.summarize(members)?);
                }
            }
            out
        };

        // Last cancellation point; after this the transaction decides.
        self.cancel.check()?;
        let outcome = materialize_full(conn, &summaries)?;

        self.finish_run(
            conn,
            RunMode::Full,
            started_at,
            outcome,
            suppressed_edge_count,
            universe.skipped_total,
            hub_report.hub_node_count(),
            hub_report.hub_value_count(),
            hub_report.entries,
        )
    }

    fn run_incremental_locked(
        &self,
        conn: &mut Connection,
        new_entities: &[EntityRef],
    ) -> Result<RunReport> {
        let started_at = Utc::now();

        let universe = EdgeUniverse::collect(conn, &self.cancel)?;
        let hub_report = HubClassifier::new(&self.policy).classify(&universe.edges);
        let partition = ClusteringEngine::cluster(&universe.edges, &hub_report);
        let suppressed_edge_count =
            ClusteringEngine::suppressed_edge_count(&universe.edges, &hub_report);

        let plan = {
            let memberships = load_memberships(conn)?;
            let names = load_entity_display_names(conn)?;
            let stats = SqlitePropertyStats::new(conn);
            let aggregator =
                NetworkAggregator::new(&universe.ownership_link_counts, &names, &stats);

            plan_incremental(
                new_entities,
                &partition,
                &memberships,
                &aggregator,
                self.policy.min_network_size,
            )?
        };

        self.cancel.check()?;
        let outcome = apply_incremental(conn, &plan)?;

        self.finish_run(
            conn,
            RunMode::Incremental,
            started_at,
            outcome,
            suppressed_edge_count,
            universe.skipped_total,
            hub_report.hub_node_count(),
            hub_report.hub_value_count(),
            hub_report.entries,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_run(
        &self,
        conn: &Connection,
        mode: RunMode,
        started_at: chrono::DateTime<Utc>,
        outcome: RebuildOutcome,
        suppressed_edge_count: usize,
        skipped_value_count: usize,
        hub_node_count: usize,
        hub_value_count: usize,
        hub_entries: Vec<HubEntry>,
    ) -> Result<RunReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        record_rebuild_run(
            conn,
            &RebuildRun {
                run_id: run_id.clone(),
                mode: mode.as_str().to_string(),
                started_at,
                finished_at: Utc::now(),
                network_count: outcome.network_count as i64,
                membership_count: outcome.membership_count as i64,
                suppressed_edge_count: suppressed_edge_count as i64,
                hub_node_count: hub_node_count as i64,
                hub_value_count: hub_value_count as i64,
                fingerprint: outcome.fingerprint.clone(),
            },
        )?;

        info!(
            "{} run {} finished: {} network(s), {} membership(s), {} suppressed edge(s)",
            mode.as_str(),
            run_id,
            outcome.network_count,
            outcome.membership_count,
            suppressed_edge_count
        );

        Ok(RunReport {
            run_id,
            mode,
            network_count: outcome.network_count,
            membership_count: outcome.membership_count,
            suppressed_edge_count,
            skipped_value_count,
            hub_node_count,
            hub_value_count,
            fingerprint: outcome.fingerprint,
            hub_entries,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
