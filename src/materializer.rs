// 💾 Materializer - persist a computed partition
// Full rebuild clears and rewrites the whole generation inside one
// transaction; a reader never observes a mixed old/new state, and a
// failed run leaves the prior generation untouched. Incremental mode
// only attaches newly-linked entities to existing networks (or creates
// new ones); it never merges, splits, or renames.

use chrono::Utc;
use log::info;
use rusqlite::{params, Connection, Transaction};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::aggregation::{NetworkAggregator, NetworkSummary};
use crate::clustering::Partition;
use crate::entities::{EntityRef, Network, NetworkMembership};
use crate::error::{DiscoveryError, Result};

// ============================================================================
// OUTCOME & FINGERPRINT
// ============================================================================

#[derive(Debug, Clone)]
pub struct RebuildOutcome {
    pub network_count: usize,
    pub membership_count: usize,

    /// sha256 over the sorted (canonical_name, entity_type, entity_id)
    /// membership set. Network ids are regenerated every run, so the
    /// fingerprint is what two runs on identical data have in common.
    pub fingerprint: String,
}

pub fn compute_fingerprint(summaries: &[NetworkSummary]) -> String {
    let mut lines: Vec<String> = summaries
        .iter()
        .flat_map(|s| {
            s.members.iter().map(|(member, _)| {
                format!(
                    "{}|{}|{}",
                    s.canonical_name,
                    member.entity_type.as_str(),
                    member.id
                )
            })
        })
        .collect();
    lines.sort();

    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of the generation currently in storage, same format as
/// `compute_fingerprint`.
pub fn fingerprint_current_generation(conn: &Connection) -> Result<String> {
    let mut stmt = conn.prepare(
        "SELECT n.canonical_name, m.entity_type, m.entity_id
         FROM entity_network_memberships m
         JOIN networks n ON n.id = m.network_id",
    )?;

    let mut lines = stmt
        .query_map([], |row| {
            Ok(format!(
                "{}|{}|{}",
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    lines.sort();

    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// INVARIANT CHECK
// ============================================================================

/// Defensive post-insert check: at most one network per entity. Runs
/// inside the open transaction so a violation rolls everything back.
fn verify_single_membership(tx: &Transaction) -> Result<()> {
    let violation = tx
        .query_row(
            "SELECT entity_type, entity_id, MIN(network_id), MAX(network_id)
             FROM entity_network_memberships
             GROUP BY entity_type, entity_id
             HAVING COUNT(DISTINCT network_id) > 1
             LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    if let Some((entity_type, entity_id, first_network, second_network)) = violation {
        return Err(DiscoveryError::InvariantViolation {
            entity_type,
            entity_id,
            first_network,
            second_network,
        });
    }
    Ok(())
}

fn insert_network(tx: &Transaction, network: &Network) -> Result<()> {
    tx.execute(
        "INSERT INTO networks (
            id, canonical_name, business_count, principal_count,
            property_count, total_assessed_value, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            network.id,
            network.canonical_name,
            network.business_count,
            network.principal_count,
            network.property_count,
            network.total_assessed_value,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_membership(tx: &Transaction, membership: &NetworkMembership) -> Result<()> {
    tx.execute(
        "INSERT INTO entity_network_memberships (
            network_id, entity_type, entity_id, entity_name
        ) VALUES (?1, ?2, ?3, ?4)",
        params![
            membership.network_id,
            membership.entity_type.as_str(),
            membership.entity_id,
            membership.entity_name,
        ],
    )?;
    Ok(())
}

fn network_from_summary(summary: &NetworkSummary) -> Network {
    let mut network = Network::new(&summary.canonical_name);
    network.business_count = summary.business_count;
    network.principal_count = summary.principal_count;
    network.property_count = summary.property_count;
    network.total_assessed_value = summary.total_assessed_value;
    network
}

// ============================================================================
// FULL REBUILD
// ============================================================================

/// Replace the entire generation atomically.
pub fn materialize_full(
    conn: &mut Connection,
    summaries: &[NetworkSummary],
) -> Result<RebuildOutcome> {
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM entity_network_memberships", [])?;
    tx.execute("DELETE FROM networks", [])?;

    let mut membership_count = 0;
    for summary in summaries {
        let network = network_from_summary(summary);
        insert_network(&tx, &network)?;

        for (member, name) in &summary.members {
            insert_membership(
                &tx,
                &NetworkMembership {
                    network_id: network.id.clone(),
                    entity_type: member.entity_type,
                    entity_id: member.id.clone(),
                    entity_name: name.clone(),
                },
            )?;
            membership_count += 1;
        }
    }

    verify_single_membership(&tx)?;
    tx.commit()?;

    let outcome = RebuildOutcome {
        network_count: summaries.len(),
        membership_count,
        fingerprint: compute_fingerprint(summaries),
    };
    info!(
        "materialized full generation: {} network(s), {} membership(s)",
        outcome.network_count, outcome.membership_count
    );
    Ok(outcome)
}

// ============================================================================
// INCREMENTAL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkStats {
    pub business_count: i64,
    pub principal_count: i64,
    pub property_count: i64,
    pub total_assessed_value: f64,
}

/// New members for one existing network, with that network's refreshed
/// counts. The name is deliberately absent: incremental never renames.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub network_id: String,
    pub members: Vec<(EntityRef, String)>,
    pub refreshed: NetworkStats,
}

#[derive(Debug, Clone, Default)]
pub struct IncrementalPlan {
    pub attachments: Vec<Attachment>,
    pub new_networks: Vec<NetworkSummary>,
}

impl IncrementalPlan {
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty() && self.new_networks.is_empty()
    }
}

/// Decide, read-only, what an incremental run would write. For each
/// component of the (already hub-suppressed) partition:
/// - newly-linked members joining a component that contains materialized
///   members attach to that network (lowest network id when the
///   component spans several — merging is deferred to the next full
///   rebuild);
/// - components made purely of newly-linked entities become a new
///   network when they reach the size floor;
/// - everything else is left for the next full rebuild.
pub fn plan_incremental(
    new_entities: &[EntityRef],
    partition: &Partition,
    memberships: &[NetworkMembership],
    aggregator: &NetworkAggregator,
    min_network_size: usize,
) -> Result<IncrementalPlan> {
    let new_set: HashSet<&EntityRef> = new_entities.iter().collect();
    let membership_index: HashMap<EntityRef, String> = memberships
        .iter()
        .map(|m| (m.entity_ref(), m.network_id.clone()))
        .collect();
    let mut network_members: HashMap<&str, Vec<EntityRef>> = HashMap::new();
    for m in memberships {
        network_members
            .entry(m.network_id.as_str())
            .or_default()
            .push(m.entity_ref());
    }

    let mut added_per_network: HashMap<String, Vec<EntityRef>> = HashMap::new();
    let mut new_networks = Vec::new();

    for members in partition.components() {
        let fresh_new: Vec<&EntityRef> = members
            .iter()
            .filter(|m| !membership_index.contains_key(*m) && new_set.contains(*m))
            .collect();
        if fresh_new.is_empty() {
            continue;
        }

        let mut candidate_networks: Vec<&String> = members
            .iter()
            .filter_map(|m| membership_index.get(m))
            .collect();
        candidate_networks.sort();
        candidate_networks.dedup();

        if let Some(target) = candidate_networks.first() {
            added_per_network
                .entry((*target).clone())
                .or_default()
                .extend(fresh_new.iter().map(|m| (*m).clone()));
        } else if fresh_new.len() >= min_network_size {
            let group: Vec<EntityRef> = fresh_new.iter().map(|m| (*m).clone()).collect();
            new_networks.push(aggregator.summarize(&group)?);
        }
    }

    let mut attachments = Vec::new();
    let mut network_ids: Vec<String> = added_per_network.keys().cloned().collect();
    network_ids.sort();
    for network_id in network_ids {
        let added = &added_per_network[&network_id];

        let mut combined: Vec<EntityRef> = network_members
            .get(network_id.as_str())
            .cloned()
            .unwrap_or_default();
        combined.extend(added.iter().cloned());
        combined.sort();
        combined.dedup();

        let refreshed = aggregator.summarize(&combined)?;
        attachments.push(Attachment {
            network_id,
            members: aggregator.member_rows(added),
            refreshed: NetworkStats {
                business_count: refreshed.business_count,
                principal_count: refreshed.principal_count,
                property_count: refreshed.property_count,
                total_assessed_value: refreshed.total_assessed_value,
            },
        });
    }

    Ok(IncrementalPlan {
        attachments,
        new_networks,
    })
}

/// Apply a plan in one transaction. Existing networks keep their id and
/// canonical name; only counts are refreshed.
pub fn apply_incremental(
    conn: &mut Connection,
    plan: &IncrementalPlan,
) -> Result<RebuildOutcome> {
    let tx = conn.transaction()?;

    let mut membership_count = 0;
    for attachment in &plan.attachments {
        for (member, name) in &attachment.members {
            insert_membership(
                &tx,
                &NetworkMembership {
                    network_id: attachment.network_id.clone(),
                    entity_type: member.entity_type,
                    entity_id: member.id.clone(),
                    entity_name: name.clone(),
                },
            )?;
            membership_count += 1;
        }
        tx.execute(
            "UPDATE networks SET
                business_count = ?1,
                principal_count = ?2,
                property_count = ?3,
                total_assessed_value = ?4
             WHERE id = ?5",
            params![
                attachment.refreshed.business_count,
                attachment.refreshed.principal_count,
                attachment.refreshed.property_count,
                attachment.refreshed.total_assessed_value,
                attachment.network_id,
            ],
        )?;
    }

    for summary in &plan.new_networks {
        let network = network_from_summary(summary);
        insert_network(&tx, &network)?;
        for (member, name) in &summary.members {
            insert_membership(
                &tx,
                &NetworkMembership {
                    network_id: network.id.clone(),
                    entity_type: member.entity_type,
                    entity_id: member.id.clone(),
                    entity_name: name.clone(),
                },
            )?;
            membership_count += 1;
        }
    }

    verify_single_membership(&tx)?;
    tx.commit()?;

    let fingerprint = fingerprint_current_generation(conn)?;
    info!(
        "incremental update: {} attachment(s), {} new network(s), {} membership(s) added",
        plan.attachments.len(),
        plan.new_networks.len(),
        membership_count
    );
    Ok(RebuildOutcome {
        network_count: plan.new_networks.len(),
        membership_count,
        fingerprint,
    })
}

// ============================================================================
// TESTS
// ============================================================================
