// 🔎 Path Query - how are these two entities connected?
// Diagnostic BFS over the same edge model the clustering engine consumes.
// Answers "why did these end up in one network" (suppressed view) and
// "what would connect them if nothing were suppressed" (raw view) without
// touching the materialized output.

use std::collections::{HashMap, VecDeque};

use crate::edges::{Edge, EdgeKind};
use crate::entities::EntityRef;
use crate::hubs::HubReport;

/// One step of a connection path: the entity reached and the edge that
/// reached it.
#[derive(Debug, Clone, PartialEq)]
pub struct PathHop {
    pub entity: EntityRef,
    pub kind: EdgeKind,
    pub shared_value: Option<String>,
}

pub struct PathQuery {
    adjacency: HashMap<EntityRef, Vec<(EntityRef, EdgeKind, Option<String>)>>,
}

impl PathQuery {
    /// Build from the full edge set. With a hub report, suppressed edges
    /// are left out, matching exactly what the clustering engine saw.
    pub fn new(edges: &[Edge], hub_report: Option<&HubReport>) -> Self {
        let mut adjacency: HashMap<EntityRef, Vec<(EntityRef, EdgeKind, Option<String>)>> =
            HashMap::new();

        for edge in edges {
            if let Some(report) = hub_report {
                if report.suppresses(edge) {
                    continue;
                }
            }
            adjacency.entry(edge.a.clone()).or_default().push((
                edge.b.clone(),
                edge.kind,
                edge.shared_value.clone(),
            ));
            adjacency.entry(edge.b.clone()).or_default().push((
                edge.a.clone(),
                edge.kind,
                edge.shared_value.clone(),
            ));
        }

        // Deterministic neighbor order for reproducible paths
        for neighbors in adjacency.values_mut() {
            neighbors.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        }

        PathQuery { adjacency }
    }

    /// Shortest connection from `from` to `to`, as the hop list after
    /// `from`. None when no path exists in this view of the graph.
    pub fn shortest_path(&self, from: &EntityRef, to: &EntityRef) -> Option<Vec<PathHop>> {
        if from == to {
            return Some(Vec::new());
        }
        if !self.adjacency.contains_key(from) || !self.adjacency.contains_key(to) {
            return None;
        }

        let mut predecessor: HashMap<&EntityRef, PathHop> = HashMap::new();
        let mut queue: VecDeque<&EntityRef> = VecDeque::new();
        queue.push_back(from);

        'search: while let Some(current) = queue.pop_front() {
            for (neighbor, kind, value) in &self.adjacency[current] {
                if neighbor == from || predecessor.contains_key(neighbor) {
                    continue;
                }
                predecessor.insert(
                    neighbor,
                    PathHop {
                        entity: current.clone(),
                        kind: *kind,
                        shared_value: value.clone(),
                    },
                );
                if neighbor == to {
                    break 'search;
                }
                queue.push_back(neighbor);
            }
        }

        predecessor.get(to)?;

        // Walk back from the target, then flip into forward order.
        let mut hops = Vec::new();
        let mut cursor = to.clone();
        while cursor != *from {
            let hop = &predecessor[&cursor];
            hops.push(PathHop {
                entity: cursor.clone(),
                kind: hop.kind,
                shared_value: hop.shared_value.clone(),
            });
            cursor = hop.entity.clone();
        }
        hops.reverse();
        Some(hops)
    }
}

// ============================================================================
// TESTS
// ============================================================================
