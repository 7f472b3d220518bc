// 🚦 Hub Classifier - keep structural connectors from merging strangers
// Registered agents, management companies, law-firm addresses and
// free-mail domains connect thousands of entities without implying common
// ownership. Left alone they collapse the graph into one implausible
// meganetwork. The classifier computes degrees over the full edge
// multiset BEFORE any union happens, so each edge's suppression decision
// is order-independent.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::edges::{Edge, EdgeKind};
use crate::entities::EntityRef;
use crate::policy::ClusteringPolicy;

// ============================================================================
// HUB REASON
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubReason {
    /// Degree exceeded the kind-specific policy threshold.
    DegreeThreshold,

    /// Email domain on the exclusion list (or .edu/.gov).
    ExcludedDomain,

    /// Address matched an exclusion pattern.
    ExcludedPattern,
}

impl HubReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubReason::DegreeThreshold => "degree_threshold",
            HubReason::ExcludedDomain => "excluded_domain",
            HubReason::ExcludedPattern => "excluded_pattern",
        }
    }
}

// ============================================================================
// HUB REPORT
// ============================================================================

/// One flagged node or shared value, with enough context for an operator
/// to audit why it was suppressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEntry {
    pub kind: EdgeKind,
    /// Entity ref string for nodes, the shared value for attributes.
    pub key: String,
    pub degree: usize,
    pub reason: HubReason,
}

/// The computed hub set for one run. Ephemeral: recomputed from current
/// data every run, never persisted. This is the primary lever operators
/// use to chase fragmentation / over-merge reports, so the full set is
/// exposed for logging and export.
#[derive(Debug, Clone, Default)]
pub struct HubReport {
    hub_nodes: HashSet<EntityRef>,
    hub_values: HashMap<EdgeKind, HashSet<String>>,
    pub entries: Vec<HubEntry>,
}

impl HubReport {
    pub fn hub_node_count(&self) -> usize {
        self.hub_nodes.len()
    }

    pub fn hub_value_count(&self) -> usize {
        self.hub_values.values().map(|s| s.len()).sum()
    }

    pub fn is_hub_node(&self, entity: &EntityRef) -> bool {
        self.hub_nodes.contains(entity)
    }

    pub fn is_hub_value(&self, kind: EdgeKind, value: &str) -> bool {
        self.hub_values
            .get(&kind)
            .map(|set| set.contains(value))
            .unwrap_or(false)
    }

    /// Whether this edge must not union its endpoints.
    pub fn suppresses(&self, edge: &Edge) -> bool {
        if let Some(value) = &edge.shared_value {
            if self.is_hub_value(edge.kind, value) {
                return true;
            }
        }
        self.hub_nodes.contains(&edge.a) || self.hub_nodes.contains(&edge.b)
    }

    fn flag_node(&mut self, entity: EntityRef, kind: EdgeKind, degree: usize) {
        self.entries.push(HubEntry {
            kind,
            key: entity.to_string(),
            degree,
            reason: HubReason::DegreeThreshold,
        });
        self.hub_nodes.insert(entity);
    }

    fn flag_value(&mut self, kind: EdgeKind, value: &str, degree: usize, reason: HubReason) {
        self.entries.push(HubEntry {
            kind,
            key: value.to_string(),
            degree,
            reason,
        });
        self.hub_values
            .entry(kind)
            .or_default()
            .insert(value.to_string());
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct HubClassifier {
    policy: ClusteringPolicy,
}

impl HubClassifier {
    pub fn new(policy: &ClusteringPolicy) -> Self {
        HubClassifier {
            policy: policy.clone(),
        }
    }

    /// Compute degrees per node and per shared value over the whole edge
    /// multiset, then flag everything over threshold or on a deny list.
    pub fn classify(&self, edges: &[Edge]) -> HubReport {
        let mut report = HubReport::default();

        // Ownership degree: distinct businesses per principal.
        let mut principal_neighbors: HashMap<&EntityRef, HashSet<&EntityRef>> = HashMap::new();
        // Shared-value degree: distinct entities per (kind, value).
        let mut value_members: HashMap<(EdgeKind, &str), HashSet<&EntityRef>> = HashMap::new();

        for edge in edges {
            match edge.kind {
                EdgeKind::Ownership => {
                    principal_neighbors
                        .entry(&edge.a)
                        .or_default()
                        .insert(&edge.b);
                }
                _ => {
                    if let Some(value) = &edge.shared_value {
                        let members = value_members
                            .entry((edge.kind, value.as_str()))
                            .or_default();
                        members.insert(&edge.a);
                        members.insert(&edge.b);
                    }
                }
            }
        }

        for (principal, neighbors) in principal_neighbors {
            let degree = neighbors.len();
            if degree > self.policy.hub_degree_threshold_ownership {
                debug!("hub principal {principal} with ownership degree {degree}");
                report.flag_node(principal.clone(), EdgeKind::Ownership, degree);
            }
        }

        let mut flagged: Vec<((EdgeKind, &str), usize, HubReason)> = Vec::new();
        for ((kind, value), members) in &value_members {
            let degree = members.len();
            if let Some(reason) = self.deny_reason(*kind, value) {
                flagged.push(((*kind, *value), degree, reason));
            } else if degree > self.policy.hub_degree_threshold_shared {
                flagged.push(((*kind, *value), degree, HubReason::DegreeThreshold));
            }
        }
        for ((kind, value), degree, reason) in flagged {
            debug!("hub value {kind}={value} degree {degree} ({})", reason.as_str());
            report.flag_value(kind, value, degree, reason);
        }

        // Deterministic entry order for logs and audit export.
        report
            .entries
            .sort_by(|a, b| (a.kind, &a.key).cmp(&(b.kind, &b.key)));

        info!(
            "hub classification: {} hub node(s), {} suppressed shared value(s)",
            report.hub_node_count(),
            report.hub_value_count()
        );

        report
    }

    /// Allow-deny policy applied regardless of degree.
    fn deny_reason(&self, kind: EdgeKind, value: &str) -> Option<HubReason> {
        match kind {
            EdgeKind::SharedEmail => {
                let domain = value.rsplit('@').next().unwrap_or("");
                if domain.ends_with(".edu") || domain.ends_with(".gov") {
                    return Some(HubReason::ExcludedDomain);
                }
                if self.policy.excluded_email_domains.contains(domain) {
                    return Some(HubReason::ExcludedDomain);
                }
                None
            }
            EdgeKind::SharedAddress => {
                let value_lower = value.to_lowercase();
                let hit = self
                    .policy
                    .excluded_address_patterns
                    .iter()
                    .any(|p| value_lower.contains(&p.to_lowercase()));
                if hit {
                    Some(HubReason::ExcludedPattern)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(ownership: usize, shared: usize) -> ClusteringPolicy {
        ClusteringPolicy {
            hub_degree_threshold_ownership: ownership,
            hub_degree_threshold_shared: shared,
            ..Default::default()
        }
    }

    fn ownership_fan(principal: &str, businesses: usize) -> Vec<Edge> {
        (0..businesses)
            .map(|i| {
                Edge::ownership(
                    EntityRef::principal(principal),
                    EntityRef::business(&format!("B{i}")),
                )
            })
            .collect()
    }

    #[test]
    fn test_principal_over_threshold_is_hub() {
        let classifier = HubClassifier::new(&policy_with(3, 25));
        let edges = ownership_fan("P1", 4);

        let report = classifier.classify(&edges);
        assert!(report.is_hub_node(&EntityRef::principal("P1")));
        assert_eq!(report.hub_node_count(), 1);
        assert!(report.suppresses(&edges[0]));
    }

    #[test]
    fn test_principal_at_threshold_is_not_hub() {
        let classifier = HubClassifier::new(&policy_with(4, 25));
        let edges = ownership_fan("P1", 4);

        let report = classifier.classify(&edges);
        assert!(!report.is_hub_node(&EntityRef::principal("P1")));
        assert!(!report.suppresses(&edges[0]));
    }

    #[test]
    fn test_ownership_degree_counts_distinct_businesses() {
        // Two links to the same business count once.
        let classifier = HubClassifier::new(&policy_with(1, 25));
        let edges = vec![
            Edge::ownership(EntityRef::principal("P1"), EntityRef::business("B1")),
            Edge::ownership(EntityRef::principal("P1"), EntityRef::business("B1")),
        ];

        let report = classifier.classify(&edges);
        assert!(!report.is_hub_node(&EntityRef::principal("P1")));
    }

    #[test]
    fn test_shared_value_over_threshold_is_hub() {
        let classifier = HubClassifier::new(&policy_with(250, 2));
        let edges = vec![
            Edge::shared(
                EdgeKind::SharedAddress,
                EntityRef::business("B1"),
                EntityRef::business("B2"),
                "100 LAW FIRM WAY",
            ),
            Edge::shared(
                EdgeKind::SharedAddress,
                EntityRef::business("B2"),
                EntityRef::business("B3"),
                "100 LAW FIRM WAY",
            ),
        ];

        // Value touches three distinct businesses; threshold 2 suppresses it.
        let report = classifier.classify(&edges);
        assert!(report.is_hub_value(EdgeKind::SharedAddress, "100 LAW FIRM WAY"));
        assert!(report.suppresses(&edges[0]));
        assert!(report.suppresses(&edges[1]));
    }

    #[test]
    fn test_public_email_domain_always_excluded() {
        // Degree 2 is far under threshold, the domain alone excludes it.
        let classifier = HubClassifier::new(&policy_with(250, 25));
        let edges = vec![Edge::shared(
            EdgeKind::SharedEmail,
            EntityRef::business("B1"),
            EntityRef::business("B2"),
            "landlord@gmail.com",
        )];

        let report = classifier.classify(&edges);
        assert!(report.is_hub_value(EdgeKind::SharedEmail, "landlord@gmail.com"));
        let entry = report
            .entries
            .iter()
            .find(|e| e.key == "landlord@gmail.com")
            .unwrap();
        assert_eq!(entry.reason, HubReason::ExcludedDomain);
    }

    #[test]
    fn test_edu_and_gov_domains_always_excluded() {
        let classifier = HubClassifier::new(&policy_with(250, 25));
        let edges = vec![
            Edge::shared(
                EdgeKind::SharedEmail,
                EntityRef::business("B1"),
                EntityRef::business("B2"),
                "facilities@university.edu",
            ),
            Edge::shared(
                EdgeKind::SharedEmail,
                EntityRef::business("B3"),
                EntityRef::business("B4"),
                "records@city.gov",
            ),
        ];

        let report = classifier.classify(&edges);
        assert!(report.is_hub_value(EdgeKind::SharedEmail, "facilities@university.edu"));
        assert!(report.is_hub_value(EdgeKind::SharedEmail, "records@city.gov"));
    }

    #[test]
    fn test_address_pattern_exclusion() {
        let mut policy = policy_with(250, 25);
        policy
            .excluded_address_patterns
            .insert("REGISTERED AGENT".to_string());
        let classifier = HubClassifier::new(&policy);

        let edges = vec![Edge::shared(
            EdgeKind::SharedAddress,
            EntityRef::business("B1"),
            EntityRef::business("B2"),
            "C/O REGISTERED AGENT SOLUTIONS, 99 STATE ST",
        )];

        let report = classifier.classify(&edges);
        assert!(report.suppresses(&edges[0]));
        assert_eq!(report.entries[0].reason, HubReason::ExcludedPattern);
    }

    #[test]
    fn test_private_low_degree_value_not_suppressed() {
        let classifier = HubClassifier::new(&policy_with(250, 25));
        let edges = vec![Edge::shared(
            EdgeKind::SharedAddress,
            EntityRef::business("B1"),
            EntityRef::business("B2"),
            "17 ELM ST APT 2",
        )];

        let report = classifier.classify(&edges);
        assert!(!report.suppresses(&edges[0]));
        assert_eq!(report.hub_value_count(), 0);
    }
}
