// ⚙️ Clustering Engine - union-find over the surviving edge set
// Connected components over all entities that appear in at least one
// non-suppressed edge. Suppression decisions come in precomputed (total
// degrees, not incremental), so the partition is independent of edge
// processing order. Suppressed edges are dropped before any union, which
// also keeps every node's effective edge list bounded by its non-hub
// degree.

use std::collections::HashMap;

use crate::edges::Edge;
use crate::entities::EntityRef;
use crate::hubs::HubReport;

// ============================================================================
// DISJOINT SET
// ============================================================================

/// Disjoint-set forest with path compression and union by size.
pub struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        DisjointSet {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        // Iterative two-pass compression: find the root, then repoint the
        // chain. Avoids recursion depth on long pre-compression chains.
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    /// Returns true if the two sets were merged (false if already joined).
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        // Attach the smaller tree under the larger.
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        true
    }

    pub fn component_size(&mut self, x: usize) -> usize {
        let root = self.find(x);
        self.size[root]
    }
}

// ============================================================================
// PARTITION
// ============================================================================

/// The output of a clustering run: disjoint member lists covering exactly
/// the entities with at least one surviving edge. Members within a
/// component and components themselves are sorted, so identical inputs
/// yield an identical partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    components: Vec<Vec<EntityRef>>,
}

impl Partition {
    pub fn components(&self) -> &[Vec<EntityRef>] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Index of the component containing `entity`, if any.
    pub fn component_of(&self, entity: &EntityRef) -> Option<usize> {
        self.components
            .iter()
            .position(|members| members.binary_search(entity).is_ok())
    }

    /// True when both entities landed in the same component.
    pub fn same_component(&self, a: &EntityRef, b: &EntityRef) -> bool {
        match (self.component_of(a), self.component_of(b)) {
            (Some(ca), Some(cb)) => ca == cb,
            _ => false,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ClusteringEngine;

impl ClusteringEngine {
    /// Partition the edge universe under the given hub report. Pure and
    /// in-memory: no I/O failure modes.
    pub fn cluster(edges: &[Edge], report: &HubReport) -> Partition {
        let surviving: Vec<&Edge> = edges.iter().filter(|e| !report.suppresses(e)).collect();

        // Intern every endpoint of a surviving edge into a dense index.
        let mut index: HashMap<&EntityRef, usize> = HashMap::new();
        let mut nodes: Vec<&EntityRef> = Vec::new();
        for edge in &surviving {
            for endpoint in [&edge.a, &edge.b] {
                if !index.contains_key(endpoint) {
                    index.insert(endpoint, nodes.len());
                    nodes.push(endpoint);
                }
            }
        }

        let mut forest = DisjointSet::new(nodes.len());
        for edge in &surviving {
            forest.union(index[&edge.a], index[&edge.b]);
        }

        let mut grouped: HashMap<usize, Vec<EntityRef>> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            grouped
                .entry(forest.find(i))
                .or_default()
                .push((*node).clone());
        }

        let mut components: Vec<Vec<EntityRef>> = grouped.into_values().collect();
        for members in &mut components {
            members.sort();
        }
        components.sort();

        Partition { components }
    }

    /// Count of edges the hub report removed from the universe.
    pub fn suppressed_edge_count(edges: &[Edge], report: &HubReport) -> usize {
        edges.iter().filter(|e| report.suppresses(e)).count()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::EdgeKind;
    use crate::hubs::HubClassifier;
    use crate::policy::ClusteringPolicy;

    fn no_hubs(edges: &[Edge]) -> HubReport {
        HubClassifier::new(&ClusteringPolicy::default()).classify(edges)
    }

    #[test]
    fn test_union_find_basics() {
        let mut forest = DisjointSet::new(5);
        assert!(forest.union(0, 1));
        assert!(forest.union(2, 3));
        assert!(!forest.union(1, 0), "already joined");

        assert_eq!(forest.find(0), forest.find(1));
        assert_ne!(forest.find(0), forest.find(2));

        forest.union(1, 3);
        assert_eq!(forest.find(0), forest.find(2));
        assert_eq!(forest.component_size(4), 1);
        assert_eq!(forest.component_size(0), 4);
    }

    #[test]
    fn test_partition_is_order_independent() {
        let edges = vec![
            Edge::ownership(EntityRef::principal("P1"), EntityRef::business("B1")),
            Edge::ownership(EntityRef::principal("P2"), EntityRef::business("B2")),
            Edge::shared(
                EdgeKind::SharedAddress,
                EntityRef::business("B1"),
                EntityRef::business("B2"),
                "12 MAIN ST",
            ),
        ];
        let report = no_hubs(&edges);

        let forward = ClusteringEngine::cluster(&edges, &report);

        let mut reversed = edges.clone();
        reversed.reverse();
        let backward = ClusteringEngine::cluster(&reversed, &report);

        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward.components()[0].len(), 4);
    }

    #[test]
    fn test_disconnected_owners_stay_apart() {
        let edges = vec![
            Edge::ownership(EntityRef::principal("P1"), EntityRef::business("B1")),
            Edge::ownership(EntityRef::principal("P2"), EntityRef::business("B2")),
        ];
        let report = no_hubs(&edges);
        let partition = ClusteringEngine::cluster(&edges, &report);

        assert_eq!(partition.len(), 2);
        assert!(!partition.same_component(
            &EntityRef::principal("P1"),
            &EntityRef::principal("P2")
        ));
    }

    #[test]
    fn test_hub_does_not_bridge() {
        // A - H - B where H is over threshold; A and B share nothing else.
        let policy = ClusteringPolicy {
            hub_degree_threshold_ownership: 1,
            ..Default::default()
        };
        let edges = vec![
            Edge::ownership(EntityRef::principal("H"), EntityRef::business("A")),
            Edge::ownership(EntityRef::principal("H"), EntityRef::business("B")),
            // Unrelated anchor edges so A and B stay in the universe.
            Edge::ownership(EntityRef::principal("PA"), EntityRef::business("A")),
            Edge::ownership(EntityRef::principal("PB"), EntityRef::business("B")),
        ];
        let report = HubClassifier::new(&policy).classify(&edges);
        assert!(report.is_hub_node(&EntityRef::principal("H")));

        let partition = ClusteringEngine::cluster(&edges, &report);
        assert!(
            !partition.same_component(&EntityRef::business("A"), &EntityRef::business("B")),
            "hub principal must not bridge otherwise-unconnected businesses"
        );
        // The hub itself has no surviving edge, so it is not in the partition.
        assert_eq!(partition.component_of(&EntityRef::principal("H")), None);
    }

    #[test]
    fn test_suppressed_value_edge_dropped() {
        let policy = ClusteringPolicy {
            hub_degree_threshold_shared: 1,
            ..Default::default()
        };
        let edges = vec![
            Edge::shared(
                EdgeKind::SharedAddress,
                EntityRef::business("B1"),
                EntityRef::business("B2"),
                "100 AGENT PLAZA",
            ),
            Edge::shared(
                EdgeKind::SharedAddress,
                EntityRef::business("B2"),
                EntityRef::business("B3"),
                "100 AGENT PLAZA",
            ),
        ];
        let report = HubClassifier::new(&policy).classify(&edges);
        assert_eq!(ClusteringEngine::suppressed_edge_count(&edges, &report), 2);

        let partition = ClusteringEngine::cluster(&edges, &report);
        assert!(partition.is_empty(), "no surviving edges, no components");
    }

    #[test]
    fn test_monotonic_merge_under_threshold_relaxation() {
        // Raising the shared threshold (suppressing less) may only merge
        // components, never split them.
        let edges = vec![
            Edge::ownership(EntityRef::principal("P1"), EntityRef::business("B1")),
            Edge::ownership(EntityRef::principal("P2"), EntityRef::business("B2")),
            Edge::ownership(EntityRef::principal("P3"), EntityRef::business("B3")),
            Edge::shared(
                EdgeKind::SharedAddress,
                EntityRef::business("B1"),
                EntityRef::business("B2"),
                "55 SHARED OFFICE RD",
            ),
            Edge::shared(
                EdgeKind::SharedAddress,
                EntityRef::business("B2"),
                EntityRef::business("B3"),
                "55 SHARED OFFICE RD",
            ),
        ];

        let strict_policy = ClusteringPolicy {
            hub_degree_threshold_shared: 2,
            ..Default::default()
        };
        let loose_policy = ClusteringPolicy {
            hub_degree_threshold_shared: 10,
            ..Default::default()
        };

        let strict = ClusteringEngine::cluster(
            &edges,
            &HubClassifier::new(&strict_policy).classify(&edges),
        );
        let loose = ClusteringEngine::cluster(
            &edges,
            &HubClassifier::new(&loose_policy).classify(&edges),
        );

        // Every strict component must be wholly contained in one loose
        // component: relaxation coarsens the partition.
        for members in strict.components() {
            let targets: Vec<Option<usize>> =
                members.iter().map(|m| loose.component_of(m)).collect();
            assert!(
                targets.windows(2).all(|w| w[0] == w[1]),
                "strict component {members:?} split under the looser policy"
            );
            assert!(targets[0].is_some());
        }

        assert_eq!(strict.len(), 3);
        assert_eq!(loose.len(), 1);
    }
}
