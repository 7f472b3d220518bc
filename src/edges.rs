// 🔗 Edge Sources - relationship facts read fresh from storage
// One adapter per edge kind. Adapters are deterministic, side-effect-free
// reads and know nothing about hub suppression: they only filter values
// that are not minimally well-formed, counting what they skip. A backing
// store failure aborts the whole run (SourceUnavailable) so clustering
// never works from a partial edge universe.

use log::warn;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::entities::EntityRef;
use crate::error::{DiscoveryError, Result};
use crate::runner::CancellationToken;

// ============================================================================
// EDGE KIND
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Principal owns/controls business (direct registry link).
    Ownership,

    /// Two businesses share a normalized email address.
    SharedEmail,

    /// Two businesses share a normalized mailing address string.
    SharedAddress,

    /// Two records (business/principal) normalize to the same name.
    SharedOwnerName,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Ownership => "ownership",
            EdgeKind::SharedEmail => "shared_email",
            EdgeKind::SharedAddress => "shared_address",
            EdgeKind::SharedOwnerName => "shared_owner_name",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EDGE
// ============================================================================

/// An unordered pair of entities plus the provenance of the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub a: EntityRef,
    pub b: EntityRef,

    /// The normalized attribute value that produced this edge (shared_*
    /// kinds only). The value itself is a virtual hub candidate.
    pub shared_value: Option<String>,
}

impl Edge {
    pub fn ownership(principal: EntityRef, business: EntityRef) -> Self {
        Edge {
            kind: EdgeKind::Ownership,
            a: principal,
            b: business,
            shared_value: None,
        }
    }

    pub fn shared(kind: EdgeKind, a: EntityRef, b: EntityRef, value: &str) -> Self {
        Edge {
            kind,
            a,
            b,
            shared_value: Some(value.to_string()),
        }
    }

    pub fn touches(&self, entity: &EntityRef) -> bool {
        &self.a == entity || &self.b == entity
    }

    /// The endpoint opposite to `entity`, if `entity` is an endpoint.
    pub fn other(&self, entity: &EntityRef) -> Option<&EntityRef> {
        if &self.a == entity {
            Some(&self.b)
        } else if &self.b == entity {
            Some(&self.a)
        } else {
            None
        }
    }
}

// ============================================================================
// EDGE SOURCE CONTRACT
// ============================================================================

/// A fetched batch plus the count of values skipped as malformed.
/// Upstream data is known-dirty, so skips are recovered locally;
/// only a failed read is fatal.
#[derive(Debug, Clone)]
pub struct EdgeBatch {
    pub kind: EdgeKind,
    pub edges: Vec<Edge>,
    pub skipped: usize,
}

pub trait EdgeSource {
    fn kind(&self) -> EdgeKind;

    /// Read the current relationship facts of this kind. Deterministic,
    /// read-only; fails with SourceUnavailable if the store cannot be read.
    fn fetch(&self, conn: &Connection) -> Result<EdgeBatch>;
}

fn unavailable(kind: EdgeKind) -> impl Fn(rusqlite::Error) -> DiscoveryError {
    move |e| DiscoveryError::source_unavailable(kind, e)
}

/// Chain a group of entities sharing one attribute value: members sorted
/// by ref, consecutive pairs linked. Connectivity and the value's degree
/// (distinct entities touched) are identical to the pairwise closure,
/// while the edge count stays linear in the group size.
fn chain_group(kind: EdgeKind, value: &str, mut members: Vec<EntityRef>, out: &mut Vec<Edge>) {
    members.sort();
    members.dedup();
    for pair in members.windows(2) {
        out.push(Edge::shared(kind, pair[0].clone(), pair[1].clone(), value));
    }
}

// ============================================================================
// OWNERSHIP LINKS
// ============================================================================

/// Direct principal→business control links from the registry.
pub struct OwnershipLinkSource;

impl EdgeSource for OwnershipLinkSource {
    fn kind(&self) -> EdgeKind {
        EdgeKind::Ownership
    }

    fn fetch(&self, conn: &Connection) -> Result<EdgeBatch> {
        let kind = self.kind();
        let mut stmt = conn
            .prepare("SELECT principal_id, business_id FROM ownership_links")
            .map_err(unavailable(kind))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(unavailable(kind))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(unavailable(kind))?;

        let mut edges = Vec::with_capacity(rows.len());
        let mut skipped = 0;

        for (principal_id, business_id) in rows {
            if principal_id.trim().is_empty() || business_id.trim().is_empty() {
                skipped += 1;
                continue;
            }
            edges.push(Edge::ownership(
                EntityRef::principal(principal_id.trim()),
                EntityRef::business(business_id.trim()),
            ));
        }

        Ok(EdgeBatch {
            kind,
            edges,
            skipped,
        })
    }
}

// ============================================================================
// SHARED EMAIL
// ============================================================================

/// Well-formed email: exactly one '@' with text on both sides.
fn is_well_formed_email(email: &str) -> bool {
    let mut parts = email.splitn(3, '@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => !local.is_empty() && !domain.is_empty(),
        _ => false,
    }
}

pub struct SharedEmailSource;

impl EdgeSource for SharedEmailSource {
    fn kind(&self) -> EdgeKind {
        EdgeKind::SharedEmail
    }

    fn fetch(&self, conn: &Connection) -> Result<EdgeBatch> {
        let kind = self.kind();
        let mut stmt = conn
            .prepare("SELECT id, email FROM businesses WHERE email IS NOT NULL")
            .map_err(unavailable(kind))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(unavailable(kind))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(unavailable(kind))?;

        let mut skipped = 0;
        let mut groups: BTreeMap<String, Vec<EntityRef>> = BTreeMap::new();

        for (business_id, email) in rows {
            let email = email.trim().to_lowercase();
            if !is_well_formed_email(&email) {
                skipped += 1;
                continue;
            }
            groups.entry(email).or_default().push(EntityRef::business(&business_id));
        }

        let mut edges = Vec::new();
        for (email, members) in groups {
            if members.len() >= 2 {
                chain_group(kind, &email, members, &mut edges);
            }
        }

        Ok(EdgeBatch {
            kind,
            edges,
            skipped,
        })
    }
}

// ============================================================================
// SHARED ADDRESS
// ============================================================================

const MIN_ADDRESS_LEN: usize = 5;

pub struct SharedAddressSource;

impl EdgeSource for SharedAddressSource {
    fn kind(&self) -> EdgeKind {
        EdgeKind::SharedAddress
    }

    fn fetch(&self, conn: &Connection) -> Result<EdgeBatch> {
        let kind = self.kind();
        let mut stmt = conn
            .prepare("SELECT id, mailing_address FROM businesses WHERE mailing_address IS NOT NULL")
            .map_err(unavailable(kind))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(unavailable(kind))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(unavailable(kind))?;

        let mut skipped = 0;
        let mut groups: BTreeMap<String, Vec<EntityRef>> = BTreeMap::new();

        for (business_id, address) in rows {
            let address = address.trim().to_uppercase();
            if address.len() < MIN_ADDRESS_LEN {
                skipped += 1;
                continue;
            }
            groups
                .entry(address)
                .or_default()
                .push(EntityRef::business(&business_id));
        }

        let mut edges = Vec::new();
        for (address, members) in groups {
            if members.len() >= 2 {
                chain_group(kind, &address, members, &mut edges);
            }
        }

        Ok(EdgeBatch {
            kind,
            edges,
            skipped,
        })
    }
}

// ============================================================================
// SHARED OWNER NAME
// ============================================================================

/// Principals and businesses whose upstream-normalized names collide.
/// Catches the owner-as-individual vs owner-as-entity duplication that
/// otherwise fragments one real owner into several networks.
pub struct SharedOwnerNameSource;

impl EdgeSource for SharedOwnerNameSource {
    fn kind(&self) -> EdgeKind {
        EdgeKind::SharedOwnerName
    }

    fn fetch(&self, conn: &Connection) -> Result<EdgeBatch> {
        let kind = self.kind();
        let mut groups: BTreeMap<String, Vec<EntityRef>> = BTreeMap::new();
        let mut skipped = 0;

        {
            let mut stmt = conn
                .prepare("SELECT id, normalized_name FROM principals")
                .map_err(unavailable(kind))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(unavailable(kind))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(unavailable(kind))?;

            for (id, name) in rows {
                let name = name.trim().to_uppercase();
                if name.is_empty() {
                    skipped += 1;
                    continue;
                }
                groups.entry(name).or_default().push(EntityRef::principal(&id));
            }
        }

        {
            let mut stmt = conn
                .prepare("SELECT id, normalized_name FROM businesses")
                .map_err(unavailable(kind))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(unavailable(kind))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(unavailable(kind))?;

            for (id, name) in rows {
                let name = name.trim().to_uppercase();
                if name.is_empty() {
                    skipped += 1;
                    continue;
                }
                groups.entry(name).or_default().push(EntityRef::business(&id));
            }
        }

        let mut edges = Vec::new();
        for (name, members) in groups {
            if members.len() >= 2 {
                chain_group(kind, &name, members, &mut edges);
            }
        }

        Ok(EdgeBatch {
            kind,
            edges,
            skipped,
        })
    }
}

// ============================================================================
// EDGE UNIVERSE
// ============================================================================

/// The full edge multiset for one run, plus the raw ownership-link count
/// per entity. Link counts are taken before any suppression: naming and
/// property stats use them as-is even when the principal is later flagged
/// as a hub.
#[derive(Debug, Clone)]
pub struct EdgeUniverse {
    pub edges: Vec<Edge>,
    pub ownership_link_counts: HashMap<EntityRef, usize>,
    pub skipped_total: usize,
}

impl EdgeUniverse {
    /// Run all four adapters. Cancellation is honored between adapters
    /// (the natural fetch boundaries); no clustering state exists yet.
    pub fn collect(conn: &Connection, cancel: &CancellationToken) -> Result<Self> {
        let sources: [&dyn EdgeSource; 4] = [
            &OwnershipLinkSource,
            &SharedEmailSource,
            &SharedAddressSource,
            &SharedOwnerNameSource,
        ];

        let mut edges = Vec::new();
        let mut skipped_total = 0;

        for source in sources {
            cancel.check()?;
            let batch = source.fetch(conn)?;
            if batch.skipped > 0 {
                warn!(
                    "{}: skipped {} malformed value(s)",
                    batch.kind, batch.skipped
                );
            }
            skipped_total += batch.skipped;
            edges.extend(batch.edges);
        }

        let mut ownership_link_counts: HashMap<EntityRef, usize> = HashMap::new();
        for edge in edges.iter().filter(|e| e.kind == EdgeKind::Ownership) {
            *ownership_link_counts.entry(edge.a.clone()).or_insert(0) += 1;
            *ownership_link_counts.entry(edge.b.clone()).or_insert(0) += 1;
        }

        Ok(EdgeUniverse {
            edges,
            ownership_link_counts,
            skipped_total,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::runner::CancellationToken;
    use rusqlite::params;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn insert_business(conn: &Connection, id: &str, email: Option<&str>, address: Option<&str>) {
        conn.execute(
            "INSERT INTO businesses (id, display_name, normalized_name, email, mailing_address)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, id, id, email, address],
        )
        .unwrap();
    }

    fn insert_principal(conn: &Connection, id: &str, normalized_name: &str) {
        conn.execute(
            "INSERT INTO principals (id, display_name, normalized_name) VALUES (?1, ?2, ?3)",
            params![id, normalized_name, normalized_name],
        )
        .unwrap();
    }

    fn insert_link(conn: &Connection, principal_id: &str, business_id: &str) {
        conn.execute(
            "INSERT INTO ownership_links (principal_id, business_id) VALUES (?1, ?2)",
            params![principal_id, business_id],
        )
        .unwrap();
    }

    #[test]
    fn test_ownership_edges_skip_blank_ids() {
        let conn = test_conn();
        insert_link(&conn, "P1", "B1");
        insert_link(&conn, "  ", "B2");

        let batch = OwnershipLinkSource.fetch(&conn).unwrap();
        assert_eq!(batch.edges.len(), 1);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.edges[0].a, EntityRef::principal("P1"));
        assert_eq!(batch.edges[0].b, EntityRef::business("B1"));
    }

    #[test]
    fn test_shared_email_groups_chain_not_pairwise() {
        let conn = test_conn();
        insert_business(&conn, "B1", Some("OFFICE@EXAMPLE.COM"), None);
        insert_business(&conn, "B2", Some("office@example.com"), None);
        insert_business(&conn, "B3", Some("office@example.com "), None);
        insert_business(&conn, "B4", Some("other@example.com"), None);

        let batch = SharedEmailSource.fetch(&conn).unwrap();
        // Three businesses on one value chain into two edges; the lone
        // fourth business produces none.
        assert_eq!(batch.edges.len(), 2);
        for edge in &batch.edges {
            assert_eq!(edge.shared_value.as_deref(), Some("office@example.com"));
        }
    }

    #[test]
    fn test_malformed_email_skipped_not_fatal() {
        let conn = test_conn();
        insert_business(&conn, "B1", Some("not-an-email"), None);
        insert_business(&conn, "B2", Some("two@@example.com"), None);
        insert_business(&conn, "B3", Some("ok@example.com"), None);

        let batch = SharedEmailSource.fetch(&conn).unwrap();
        assert_eq!(batch.skipped, 2);
        assert!(batch.edges.is_empty());
    }

    #[test]
    fn test_short_address_skipped() {
        let conn = test_conn();
        insert_business(&conn, "B1", None, Some("X"));
        insert_business(&conn, "B2", None, Some("12 MAIN ST"));
        insert_business(&conn, "B3", None, Some("12 main st"));

        let batch = SharedAddressSource.fetch(&conn).unwrap();
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.edges.len(), 1, "case-folded addresses should group");
    }

    #[test]
    fn test_shared_owner_name_bridges_variants() {
        let conn = test_conn();
        insert_principal(&conn, "P1", "JOHN SMITH");
        insert_business(&conn, "B1", None, None);
        conn.execute(
            "UPDATE businesses SET normalized_name = 'JOHN SMITH' WHERE id = 'B1'",
            [],
        )
        .unwrap();

        let batch = SharedOwnerNameSource.fetch(&conn).unwrap();
        assert_eq!(batch.edges.len(), 1);
        let edge = &batch.edges[0];
        assert!(edge.touches(&EntityRef::principal("P1")));
        assert!(edge.touches(&EntityRef::business("B1")));
        assert_eq!(edge.shared_value.as_deref(), Some("JOHN SMITH"));
    }

    #[test]
    fn test_universe_counts_raw_ownership_links() {
        let conn = test_conn();
        insert_principal(&conn, "P1", "ALICE EXAMPLE");
        insert_business(&conn, "B1", None, None);
        insert_business(&conn, "B2", None, None);
        insert_link(&conn, "P1", "B1");
        insert_link(&conn, "P1", "B2");

        let cancel = CancellationToken::new();
        let universe = EdgeUniverse::collect(&conn, &cancel).unwrap();

        assert_eq!(
            universe.ownership_link_counts[&EntityRef::principal("P1")],
            2
        );
        assert_eq!(
            universe.ownership_link_counts[&EntityRef::business("B1")],
            1
        );
    }

    #[test]
    fn test_collect_honors_cancellation() {
        let conn = test_conn();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = EdgeUniverse::collect(&conn, &cancel).unwrap_err();
        assert!(matches!(err, crate::error::DiscoveryError::Cancelled));
    }

    #[test]
    fn test_source_unavailable_on_missing_table() {
        // A bare connection without the schema stands in for an
        // unreachable backing store.
        let conn = Connection::open_in_memory().unwrap();
        let err = OwnershipLinkSource.fetch(&conn).unwrap_err();
        assert!(matches!(
            err,
            crate::error::DiscoveryError::SourceUnavailable { .. }
        ));
    }
}
