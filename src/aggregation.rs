// 📊 Network Aggregator - summaries and canonical names per component
// Counts members by variant, rolls up linked properties through the
// collaborator interface, and derives the display name from the dominant
// principals. The naming rule prefers humans over corporate principals
// even at lower link counts — corporate agents ranking above the true
// owner was a recurring mislabeling bug.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entities::{EntityRef, EntityType};
use crate::error::Result;

// ============================================================================
// CORPORATE NAME HEURISTIC
// ============================================================================

/// Whole-token, case-insensitive keywords marking a principal record as a
/// corporate entity rather than an individual.
pub const CORPORATE_KEYWORDS: [&str; 18] = [
    "LLC",
    "INC",
    "CORP",
    "LTD",
    "REALTY",
    "MANAGEMENT",
    "PROPERTIES",
    "GROUP",
    "HOLDINGS",
    "ASSOCIATES",
    "PARTNERS",
    "TRUST",
    "ESTATE",
    "HOUSING",
    "APTS",
    "APARTMENTS",
    "CONDO",
    "CONDOMINIUM",
];

/// Token-wise keyword scan: "GARDEN HILL APTS, LLC" and "SMITH REALTY
/// GROUP" are corporate, "ZVI HOROWITZ" is not. Tokens are split on any
/// non-alphanumeric character, so punctuation never hides a keyword.
pub fn is_corporate_name(name: &str) -> bool {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| {
            CORPORATE_KEYWORDS
                .iter()
                .any(|keyword| token.eq_ignore_ascii_case(keyword))
        })
}

// ============================================================================
// PROPERTY ROLLUP (external collaborator interface)
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyRollup {
    pub property_count: i64,
    pub total_assessed_value: f64,
}

/// Property linkage is owned by the upstream pipeline; the aggregator
/// only needs count and summed assessed value for a member set.
pub trait PropertyStatsSource {
    fn rollup(&self, members: &[EntityRef]) -> Result<PropertyRollup>;
}

/// Stand-in for runs that do not need property stats (diagnostics, tests).
pub struct NoPropertyStats;

impl PropertyStatsSource for NoPropertyStats {
    fn rollup(&self, _members: &[EntityRef]) -> Result<PropertyRollup> {
        Ok(PropertyRollup::default())
    }
}

// ============================================================================
// NETWORK SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub canonical_name: String,
    pub business_count: i64,
    pub principal_count: i64,
    pub property_count: i64,
    pub total_assessed_value: f64,

    /// Members with their display names, in stable order; these become
    /// the membership rows.
    pub members: Vec<(EntityRef, String)>,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct NetworkAggregator<'a> {
    /// Raw global ownership-link counts (no hub suppression applied).
    link_counts: &'a HashMap<EntityRef, usize>,

    /// Display name per entity, from the ingestion-owned records.
    display_names: &'a HashMap<EntityRef, String>,

    property_stats: &'a dyn PropertyStatsSource,
}

impl<'a> NetworkAggregator<'a> {
    pub fn new(
        link_counts: &'a HashMap<EntityRef, usize>,
        display_names: &'a HashMap<EntityRef, String>,
        property_stats: &'a dyn PropertyStatsSource,
    ) -> Self {
        NetworkAggregator {
            link_counts,
            display_names,
            property_stats,
        }
    }

    pub fn summarize(&self, members: &[EntityRef]) -> Result<NetworkSummary> {
        let business_count = members
            .iter()
            .filter(|m| m.entity_type == EntityType::Business)
            .count() as i64;
        let principal_count = members
            .iter()
            .filter(|m| m.entity_type == EntityType::Principal)
            .count() as i64;

        let rollup = self.property_stats.rollup(members)?;
        let member_rows = self.member_rows(members);

        Ok(NetworkSummary {
            canonical_name: self.canonical_name(members),
            business_count,
            principal_count,
            property_count: rollup.property_count,
            total_assessed_value: rollup.total_assessed_value,
            members: member_rows,
        })
    }

    /// Members paired with their display names, in the given order.
    pub fn member_rows(&self, members: &[EntityRef]) -> Vec<(EntityRef, String)> {
        members
            .iter()
            .map(|m| (m.clone(), self.display_name(m)))
            .collect()
    }

    fn display_name(&self, entity: &EntityRef) -> String {
        self.display_names
            .get(entity)
            .cloned()
            .unwrap_or_else(|| entity.id.clone())
    }

    fn link_count(&self, entity: &EntityRef) -> usize {
        self.link_counts.get(entity).copied().unwrap_or(0)
    }

    /// Deterministic naming rule:
    /// 1. split member principals into human vs corporate;
    /// 2. two or more humans -> "top1 & top2" by (link count desc, id asc),
    ///    exactly one -> that human;
    /// 3. otherwise the top corporate principal, same ordering;
    /// 4. otherwise the member of any variant with the most links.
    fn canonical_name(&self, members: &[EntityRef]) -> String {
        let mut principals: Vec<&EntityRef> = members
            .iter()
            .filter(|m| m.entity_type == EntityType::Principal)
            .collect();
        self.sort_by_dominance(&mut principals);

        let (humans, corporates): (Vec<&EntityRef>, Vec<&EntityRef>) = principals
            .into_iter()
            .partition(|p| !is_corporate_name(&self.display_name(p)));

        if humans.len() >= 2 {
            return format!(
                "{} & {}",
                self.display_name(humans[0]),
                self.display_name(humans[1])
            );
        }
        if let Some(human) = humans.first() {
            return self.display_name(human);
        }
        if let Some(corporate) = corporates.first() {
            return self.display_name(corporate);
        }

        let mut fallback: Vec<&EntityRef> = members.iter().collect();
        self.sort_by_dominance(&mut fallback);
        fallback
            .first()
            .map(|m| self.display_name(m))
            .unwrap_or_default()
    }

    fn sort_by_dominance(&self, entities: &mut [&EntityRef]) {
        entities.sort_by(|a, b| {
            self.link_count(b)
                .cmp(&self.link_count(a))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        link_counts: HashMap<EntityRef, usize>,
        display_names: HashMap<EntityRef, String>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                link_counts: HashMap::new(),
                display_names: HashMap::new(),
            }
        }

        fn principal(&mut self, id: &str, name: &str, links: usize) -> EntityRef {
            let r = EntityRef::principal(id);
            self.display_names.insert(r.clone(), name.to_string());
            self.link_counts.insert(r.clone(), links);
            r
        }

        fn business(&mut self, id: &str, name: &str, links: usize) -> EntityRef {
            let r = EntityRef::business(id);
            self.display_names.insert(r.clone(), name.to_string());
            self.link_counts.insert(r.clone(), links);
            r
        }

        fn name_of(&self, members: &[EntityRef]) -> String {
            let props = NoPropertyStats;
            let aggregator =
                NetworkAggregator::new(&self.link_counts, &self.display_names, &props);
            aggregator.summarize(members).unwrap().canonical_name
        }
    }

    #[test]
    fn test_corporate_keyword_detection() {
        assert!(is_corporate_name("GARDEN HILL APTS, LLC"));
        assert!(is_corporate_name("SMITH REALTY GROUP"));
        assert!(is_corporate_name("Sunrise Management"));
        assert!(!is_corporate_name("ZVI HOROWITZ"));
        assert!(!is_corporate_name("JOHN SMITH"));
        // Keyword must match a whole token
        assert!(!is_corporate_name("TRUSTY JOHNSON"));
        assert!(!is_corporate_name("ESTATELLA PEREZ"));
    }

    #[test]
    fn test_two_humans_joined_by_ampersand() {
        let mut fx = Fixture::new();
        let p1 = fx.principal("P1", "ZVI HOROWITZ", 90);
        let p2 = fx.principal("P2", "SAMUEL POLLACK", 80);

        assert_eq!(
            fx.name_of(&[p1, p2]),
            "ZVI HOROWITZ & SAMUEL POLLACK",
            "top two humans by link count, descending"
        );
    }

    #[test]
    fn test_human_preferred_over_higher_count_corporate() {
        let mut fx = Fixture::new();
        let corp = fx.principal("P1", "GARDEN HILL APTS, LLC", 100);
        let human = fx.principal("P2", "ZVI HOROWITZ", 50);

        assert_eq!(fx.name_of(&[corp, human]), "ZVI HOROWITZ");
    }

    #[test]
    fn test_embedded_corporate_keyword_detected_mid_string() {
        let mut fx = Fixture::new();
        let corp = fx.principal("P1", "SMITH REALTY GROUP", 10);
        let human = fx.principal("P2", "JOHN SMITH", 5);

        assert_eq!(fx.name_of(&[corp, human]), "JOHN SMITH");
    }

    #[test]
    fn test_all_corporate_takes_top_corporate() {
        let mut fx = Fixture::new();
        let c1 = fx.principal("P1", "ACME HOLDINGS LLC", 10);
        let c2 = fx.principal("P2", "BRAVO PROPERTIES INC", 40);

        assert_eq!(fx.name_of(&[c1, c2]), "BRAVO PROPERTIES INC");
    }

    #[test]
    fn test_tie_broken_by_identifier_ascending() {
        let mut fx = Fixture::new();
        let p2 = fx.principal("P2", "BETH COHEN", 10);
        let p1 = fx.principal("P1", "ADAM LEVY", 10);

        // Equal link counts: P1 sorts before P2
        assert_eq!(fx.name_of(&[p2, p1]), "ADAM LEVY & BETH COHEN");
    }

    #[test]
    fn test_no_principals_falls_back_to_top_member() {
        let mut fx = Fixture::new();
        let b1 = fx.business("B1", "FIRST AVENUE LLC", 3);
        let b2 = fx.business("B2", "SECOND AVENUE LLC", 7);

        assert_eq!(fx.name_of(&[b1, b2]), "SECOND AVENUE LLC");
    }

    #[test]
    fn test_counts_by_variant() {
        let mut fx = Fixture::new();
        let p1 = fx.principal("P1", "ANNA KAHN", 2);
        let b1 = fx.business("B1", "KAHN REALTY LLC", 1);
        let b2 = fx.business("B2", "KAHN HOLDINGS LLC", 1);

        let props = NoPropertyStats;
        let aggregator = NetworkAggregator::new(&fx.link_counts, &fx.display_names, &props);
        let summary = aggregator.summarize(&[p1, b1, b2]).unwrap();

        assert_eq!(summary.principal_count, 1);
        assert_eq!(summary.business_count, 2);
        assert_eq!(summary.members.len(), 3);
        assert_eq!(summary.canonical_name, "ANNA KAHN");
    }

    #[test]
    fn test_missing_display_name_falls_back_to_id() {
        let fx = Fixture::new();
        let props = NoPropertyStats;
        let aggregator = NetworkAggregator::new(&fx.link_counts, &fx.display_names, &props);
        let summary = aggregator
            .summarize(&[EntityRef::business("B9"), EntityRef::business("B8")])
            .unwrap();

        assert_eq!(summary.members[0].1, "B9");
    }
}
