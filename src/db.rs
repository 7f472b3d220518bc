// 🗄️ Storage access - schema, shared reads, run lock, rebuild audit log
// Input tables (principals, businesses, ownership_links, properties,
// property_links) are owned by the ingestion pipeline; this subsystem
// only reads them. Output tables (networks, entity_network_memberships)
// are owned by the materializer. rebuild_lock and rebuild_runs carry the
// run-level mutual exclusion and the per-run audit trail.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};

use crate::aggregation::{PropertyRollup, PropertyStatsSource};
use crate::entities::{EntityRef, EntityType, Network, NetworkMembership};
use crate::error::{DiscoveryError, Result};

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; readers keep seeing the prior generation
    // while a rebuild transaction is open.
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Input tables (ingestion-owned; created here for fixtures and dev setups)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS principals (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            normalized_name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS businesses (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            normalized_name TEXT NOT NULL,
            email TEXT,
            mailing_address TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ownership_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            principal_id TEXT NOT NULL,
            business_id TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS properties (
            id TEXT PRIMARY KEY,
            assessed_value REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS property_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Output tables (one generation at a time, replaced atomically)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS networks (
            id TEXT PRIMARY KEY,
            canonical_name TEXT NOT NULL,
            business_count INTEGER NOT NULL,
            principal_count INTEGER NOT NULL,
            property_count INTEGER NOT NULL,
            total_assessed_value REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS entity_network_memberships (
            network_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            entity_name TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Run coordination and audit
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rebuild_lock (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            holder TEXT NOT NULL,
            acquired_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rebuild_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            mode TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            network_count INTEGER NOT NULL,
            membership_count INTEGER NOT NULL,
            suppressed_edge_count INTEGER NOT NULL,
            hub_node_count INTEGER NOT NULL,
            hub_value_count INTEGER NOT NULL,
            fingerprint TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_links_principal ON ownership_links(principal_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_links_business ON ownership_links(business_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_property_links_entity
         ON property_links(entity_type, entity_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_memberships_entity
         ON entity_network_memberships(entity_type, entity_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_memberships_network
         ON entity_network_memberships(network_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SHARED READS
// ============================================================================

/// Display name per entity, for membership rows and canonical naming.
pub fn load_entity_display_names(conn: &Connection) -> Result<HashMap<EntityRef, String>> {
    let mut names = HashMap::new();

    let mut stmt = conn.prepare("SELECT id, display_name FROM principals")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (id, name) = row?;
        names.insert(EntityRef::principal(&id), name);
    }

    let mut stmt = conn.prepare("SELECT id, display_name FROM businesses")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (id, name) = row?;
        names.insert(EntityRef::business(&id), name);
    }

    Ok(names)
}

pub fn load_networks(conn: &Connection) -> Result<Vec<Network>> {
    let mut stmt = conn.prepare(
        "SELECT id, canonical_name, business_count, principal_count,
                property_count, total_assessed_value
         FROM networks
         ORDER BY canonical_name, id",
    )?;

    let networks = stmt
        .query_map([], |row| {
            Ok(Network {
                id: row.get(0)?,
                canonical_name: row.get(1)?,
                business_count: row.get(2)?,
                principal_count: row.get(3)?,
                property_count: row.get(4)?,
                total_assessed_value: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(networks)
}

pub fn load_memberships(conn: &Connection) -> Result<Vec<NetworkMembership>> {
    let mut stmt = conn.prepare(
        "SELECT network_id, entity_type, entity_id, entity_name
         FROM entity_network_memberships
         ORDER BY network_id, entity_type, entity_id",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut memberships = Vec::new();
    for row in rows {
        let (network_id, type_tag, entity_id, entity_name) = row?;
        // Unknown tags would mean a foreign writer touched the table;
        // surface them instead of guessing.
        let entity_type = EntityType::parse(&type_tag).ok_or_else(|| {
            DiscoveryError::InvariantViolation {
                entity_type: type_tag.clone(),
                entity_id: entity_id.clone(),
                first_network: network_id.clone(),
                second_network: "<unparsable entity_type>".to_string(),
            }
        })?;
        memberships.push(NetworkMembership {
            network_id,
            entity_type,
            entity_id,
            entity_name,
        });
    }

    Ok(memberships)
}

// ============================================================================
// RUN LOCK
// ============================================================================

/// Run-level advisory lock: one row, one holder. Full and incremental
/// runs both take it, so membership is never mutated while another run
/// reads the prior generation.
#[derive(Debug, Clone)]
pub struct RebuildLock {
    pub holder: String,
}

pub fn acquire_rebuild_lock(conn: &Connection) -> Result<RebuildLock> {
    let holder = uuid::Uuid::new_v4().to_string();
    let result = conn.execute(
        "INSERT INTO rebuild_lock (id, holder, acquired_at) VALUES (1, ?1, ?2)",
        params![holder, Utc::now().to_rfc3339()],
    );

    match result {
        Ok(_) => Ok(RebuildLock { holder }),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(DiscoveryError::RebuildInProgress)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn release_rebuild_lock(conn: &Connection, lock: &RebuildLock) -> Result<()> {
    conn.execute(
        "DELETE FROM rebuild_lock WHERE id = 1 AND holder = ?1",
        params![lock.holder],
    )?;
    Ok(())
}

// ============================================================================
// REBUILD RUN AUDIT LOG
// ============================================================================

#[derive(Debug, Clone)]
pub struct RebuildRun {
    pub run_id: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub network_count: i64,
    pub membership_count: i64,
    pub suppressed_edge_count: i64,
    pub hub_node_count: i64,
    pub hub_value_count: i64,
    pub fingerprint: String,
}

pub fn record_rebuild_run(conn: &Connection, run: &RebuildRun) -> Result<()> {
    conn.execute(
        "INSERT INTO rebuild_runs (
            run_id, mode, started_at, finished_at,
            network_count, membership_count, suppressed_edge_count,
            hub_node_count, hub_value_count, fingerprint
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            run.run_id,
            run.mode,
            run.started_at.to_rfc3339(),
            run.finished_at.to_rfc3339(),
            run.network_count,
            run.membership_count,
            run.suppressed_edge_count,
            run.hub_node_count,
            run.hub_value_count,
            run.fingerprint,
        ],
    )?;
    Ok(())
}

// ============================================================================
// PROPERTY STATS (SQLite-backed collaborator)
// ============================================================================

pub struct SqlitePropertyStats<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePropertyStats<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqlitePropertyStats { conn }
    }
}

impl PropertyStatsSource for SqlitePropertyStats<'_> {
    /// Distinct properties linked to any member; each property's assessed
    /// value counted once even when several members link to it.
    fn rollup(&self, members: &[EntityRef]) -> Result<PropertyRollup> {
        let mut stmt = self.conn.prepare(
            "SELECT pl.property_id, p.assessed_value
             FROM property_links pl
             JOIN properties p ON p.id = pl.property_id
             WHERE pl.entity_type = ?1 AND pl.entity_id = ?2",
        )?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut total = 0.0_f64;

        for member in members {
            let rows = stmt.query_map(params![member.entity_type.as_str(), member.id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (property_id, assessed_value) = row?;
                if seen.insert(property_id) {
                    total += assessed_value;
                }
            }
        }

        Ok(PropertyRollup {
            property_count: seen.len() as i64,
            total_assessed_value: total,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = test_conn();
        setup_database(&conn).unwrap();
    }

    #[test]
    fn test_lock_conflict_yields_rebuild_in_progress() {
        let conn = test_conn();

        let lock = acquire_rebuild_lock(&conn).unwrap();
        let err = acquire_rebuild_lock(&conn).unwrap_err();
        assert!(matches!(err, DiscoveryError::RebuildInProgress));
        assert!(err.is_retryable());

        release_rebuild_lock(&conn, &lock).unwrap();
        let relock = acquire_rebuild_lock(&conn).unwrap();
        release_rebuild_lock(&conn, &relock).unwrap();
    }

    #[test]
    fn test_release_with_wrong_holder_keeps_lock() {
        let conn = test_conn();
        let lock = acquire_rebuild_lock(&conn).unwrap();

        let stranger = RebuildLock {
            holder: "not-the-holder".to_string(),
        };
        release_rebuild_lock(&conn, &stranger).unwrap();

        // Still held by the original holder
        assert!(matches!(
            acquire_rebuild_lock(&conn).unwrap_err(),
            DiscoveryError::RebuildInProgress
        ));
        release_rebuild_lock(&conn, &lock).unwrap();
    }

    #[test]
    fn test_property_rollup_counts_distinct_properties() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO properties (id, assessed_value) VALUES ('PR1', 100000.0), ('PR2', 250000.0)",
            [],
        )
        .unwrap();
        // Both members link to PR1; only one of them links to PR2.
        conn.execute(
            "INSERT INTO property_links (property_id, entity_type, entity_id) VALUES
             ('PR1', 'business', 'B1'),
             ('PR1', 'principal', 'P1'),
             ('PR2', 'business', 'B1')",
            [],
        )
        .unwrap();

        let stats = SqlitePropertyStats::new(&conn);
        let rollup = stats
            .rollup(&[EntityRef::business("B1"), EntityRef::principal("P1")])
            .unwrap();

        assert_eq!(rollup.property_count, 2);
        assert!((rollup.total_assessed_value - 350000.0).abs() < 0.01);
    }

    #[test]
    fn test_rebuild_run_recorded() {
        let conn = test_conn();
        let now = Utc::now();
        let run = RebuildRun {
            run_id: uuid::Uuid::new_v4().to_string(),
            mode: "full".to_string(),
            started_at: now,
            finished_at: now,
            network_count: 2,
            membership_count: 5,
            suppressed_edge_count: 1,
            hub_node_count: 0,
            hub_value_count: 1,
            fingerprint: "abc".to_string(),
        };
        record_rebuild_run(&conn, &run).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM rebuild_runs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
