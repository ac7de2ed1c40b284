use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::graph::{EntityType, GraphEdge, GraphNode, Snapshot};

/// The active filter configuration. Defaults to everything visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterConfig {
    /// Entity types currently enabled. Cluster nodes anchor the topology and
    /// stay visible regardless of this set.
    pub visible_types: HashSet<EntityType>,
    /// Case-insensitive substring match against node labels. Empty disables
    /// the search step.
    pub search_query: String,
    /// Keep only risky edges and the nodes they touch.
    pub risk_only: bool,
    /// Keep only nodes flagged as external.
    pub external_only: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            visible_types: EntityType::ALL.into_iter().collect(),
            search_query: String::new(),
            risk_only: false,
            external_only: false,
        }
    }
}

/// The visible subset computed by [`filter`]. Node/edge values are clones of
/// the snapshot's; the snapshot itself is never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl FilterOutcome {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All edges sharing the given (source, target) pair, in input order.
    /// Duplicate edges between the same endpoints are kept distinct for
    /// tooltip aggregation.
    pub fn edge_group(&self, source: &str, target: &str) -> Vec<&GraphEdge> {
        self.edges
            .iter()
            .filter(|edge| edge.source == source && edge.target == target)
            .collect()
    }

    pub fn edge(&self, id: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// Computes the visible node/edge subset for a snapshot.
///
/// The steps run in a fixed order because edge pruning depends on it:
/// type visibility, label search, edge-driven risk filtering, node-driven
/// external filtering, and finally an unconditional edge-closure pass that
/// drops any edge missing an endpoint.
pub fn filter(snapshot: &Snapshot, config: &FilterConfig) -> FilterOutcome {
    let mut nodes: Vec<GraphNode> = snapshot
        .nodes
        .iter()
        .filter(|node| {
            node.entity_type == EntityType::Cluster
                || config.visible_types.contains(&node.entity_type)
        })
        .cloned()
        .collect();

    let query = config.search_query.trim().to_lowercase();
    if !query.is_empty() {
        nodes.retain(|node| node.label.to_lowercase().contains(&query));
    }

    let mut edges: Vec<GraphEdge> = snapshot.edges.to_vec();

    if config.risk_only {
        // Risk filtering is edge-driven: risky edges decide which nodes stay.
        edges.retain(|edge| edge.is_risky);
        let touched: HashSet<&str> = edges
            .iter()
            .flat_map(|edge| [edge.source.as_str(), edge.target.as_str()])
            .collect();
        nodes.retain(|node| touched.contains(node.id.as_str()));
    }

    if config.external_only {
        nodes.retain(|node| node.is_external);
    }

    // Closure runs even with no filters active: the output must never
    // contain an edge with a missing endpoint.
    let visible: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
    edges.retain(|edge| {
        visible.contains(edge.source.as_str()) && visible.contains(edge.target.as_str())
    });

    FilterOutcome { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityProperties, GraphEdge, GraphNode};

    fn node(id: &str, entity_type: EntityType) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            entity_type,
            label: id.to_string(),
            is_risky: false,
            is_external: false,
            properties: EntityProperties::Task {
                service: None,
                task_definition: None,
                launch_type: None,
            },
            position: None,
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> GraphEdge {
        GraphEdge {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            is_risky: false,
            label: None,
            full_action: None,
        }
    }

    fn sample() -> Snapshot {
        let mut web = node("t1", EntityType::Task);
        web.label = "web".to_string();
        let mut api = node("e1", EntityType::Endpoint);
        api.label = "api.example.com".to_string();
        api.is_external = true;
        let mut risky = edge("x1", "t1", "e1");
        risky.is_risky = true;

        Snapshot {
            nodes: vec![web, api],
            edges: vec![risky],
        }
    }

    #[test]
    fn cluster_nodes_ignore_type_visibility() {
        let snapshot = Snapshot {
            nodes: vec![node("c1", EntityType::Cluster), node("t1", EntityType::Task)],
            edges: vec![],
        };
        let config = FilterConfig {
            visible_types: HashSet::new(),
            ..FilterConfig::default()
        };

        let outcome = filter(&snapshot, &config);
        assert_eq!(outcome.nodes.len(), 1);
        assert_eq!(outcome.nodes[0].id, "c1");
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let snapshot = sample();
        let config = FilterConfig {
            search_query: "API.EX".to_string(),
            ..FilterConfig::default()
        };

        let outcome = filter(&snapshot, &config);
        assert_eq!(outcome.nodes.len(), 1);
        assert_eq!(outcome.nodes[0].id, "e1");
        assert!(outcome.edges.is_empty(), "edge loses its t1 endpoint");
    }

    #[test]
    fn risk_only_keeps_nodes_touched_by_risky_edges() {
        let snapshot = sample();
        let config = FilterConfig {
            risk_only: true,
            ..FilterConfig::default()
        };

        let outcome = filter(&snapshot, &config);
        let ids: Vec<&str> = outcome.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["t1", "e1"]);
        assert_eq!(outcome.edges.len(), 1);
    }

    #[test]
    fn external_only_prunes_edges_through_closure() {
        let snapshot = sample();
        let config = FilterConfig {
            risk_only: true,
            external_only: true,
            ..FilterConfig::default()
        };

        let outcome = filter(&snapshot, &config);
        let ids: Vec<&str> = outcome.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["e1"], "t1 is not external and must drop");
        assert!(outcome.edges.is_empty(), "closure prunes the orphaned edge");
    }

    #[test]
    fn toggling_risk_only_off_restores_original_sets() {
        let snapshot = sample();
        let on = filter(
            &snapshot,
            &FilterConfig {
                risk_only: true,
                ..FilterConfig::default()
            },
        );
        let off = filter(&snapshot, &FilterConfig::default());

        assert_eq!(off.nodes, snapshot.nodes);
        assert_eq!(off.edges, snapshot.edges);
        assert_ne!(on, off);
    }

    #[test]
    fn identical_configs_yield_identical_outcomes() {
        let snapshot = sample();
        let config = FilterConfig {
            search_query: "e".to_string(),
            risk_only: true,
            ..FilterConfig::default()
        };

        assert_eq!(filter(&snapshot, &config), filter(&snapshot, &config));
    }

    #[test]
    fn no_dangling_edges_for_arbitrary_configs() {
        let snapshot = sample();
        let configs = [
            FilterConfig::default(),
            FilterConfig {
                risk_only: true,
                ..FilterConfig::default()
            },
            FilterConfig {
                external_only: true,
                ..FilterConfig::default()
            },
            FilterConfig {
                visible_types: [EntityType::Task].into_iter().collect(),
                ..FilterConfig::default()
            },
            FilterConfig {
                search_query: "web".to_string(),
                ..FilterConfig::default()
            },
        ];

        for config in configs {
            let outcome = filter(&snapshot, &config);
            let visible: HashSet<&str> =
                outcome.nodes.iter().map(|n| n.id.as_str()).collect();
            for edge in &outcome.edges {
                assert!(visible.contains(edge.source.as_str()));
                assert!(visible.contains(edge.target.as_str()));
            }
        }
    }
}
