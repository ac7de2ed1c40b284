use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A 2D position assigned by the layout engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// The kind of infrastructure entity a node represents. Wire tags use the
/// inventory's PascalCase labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Cluster,
    Service,
    Task,
    IdentityRole,
    Endpoint,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Cluster,
        EntityType::Service,
        EntityType::Task,
        EntityType::IdentityRole,
        EntityType::Endpoint,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Cluster" => Some(EntityType::Cluster),
            "Service" => Some(EntityType::Service),
            "Task" => Some(EntityType::Task),
            "IdentityRole" | "Role" => Some(EntityType::IdentityRole),
            "Endpoint" => Some(EntityType::Endpoint),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Cluster => "Cluster",
            EntityType::Service => "Service",
            EntityType::Task => "Task",
            EntityType::IdentityRole => "IdentityRole",
            EntityType::Endpoint => "Endpoint",
        }
    }

    /// Clicking a node of this kind requests navigation to its detail page.
    pub fn is_navigable(&self) -> bool {
        matches!(self, EntityType::Task)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterOverview {
    pub total_tasks: u32,
    pub services: u32,
    pub cpu_utilization: Option<String>,
    pub memory_utilization: Option<String>,
    pub active_connections: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterService {
    pub name: String,
    pub running_tasks: u32,
    pub launch_type: Option<String>,
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RiskSummary {
    pub unused_permissions: u32,
    pub risky_network_flows: u32,
    pub compliant_tasks: u32,
}

/// Type-dependent node properties. Each variant carries only the fields the
/// inventory emits for that entity kind; everything else lives on
/// [`GraphNode`] itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityProperties {
    #[serde(rename_all = "camelCase")]
    Cluster {
        region: Option<String>,
        overview: Option<ClusterOverview>,
        services: Vec<ClusterService>,
        risks: Option<RiskSummary>,
    },
    #[serde(rename_all = "camelCase")]
    Service {
        launch_type: Option<String>,
        running_tasks: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Task {
        service: Option<String>,
        task_definition: Option<String>,
        launch_type: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    IdentityRole { arn: Option<String> },
    #[serde(rename_all = "camelCase")]
    Endpoint {
        hostname: Option<String>,
        port: Option<u16>,
        protocol: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub entity_type: EntityType,
    pub label: String,
    pub is_risky: bool,
    pub is_external: bool,
    pub properties: EntityProperties,
    pub position: Option<Point>,
}

impl GraphNode {
    /// Whether clicking this node opens an in-place detail panel instead of
    /// navigating away. Only clusters carrying overview stats qualify.
    pub fn has_detail_overview(&self) -> bool {
        matches!(
            &self.properties,
            EntityProperties::Cluster {
                overview: Some(_),
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub is_risky: bool,
    /// Short permission/action name shown on the edge.
    pub label: Option<String>,
    /// Verbose action description used in aggregated tooltips.
    pub full_action: Option<String>,
}

impl GraphEdge {
    /// Text contributed to the hover tooltip: verbose action if present,
    /// short label otherwise.
    pub fn tooltip_text(&self) -> &str {
        self.full_action
            .as_deref()
            .or(self.label.as_deref())
            .unwrap_or("Unknown permission")
    }
}

/// One immutable fetch result from the inventory service. Filtering never
/// mutates a snapshot; a re-fetch replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

// --- raw inventory payload ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGraph {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNode {
    pub id: Option<String>,
    /// Entity-type tag; the inventory reuses the graph store's node label.
    pub label: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEdge {
    pub id: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Non-fatal problems encountered while normalizing a raw graph. The
/// offending node/edge is dropped; the rest of the graph still renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterWarning {
    NodeMissingId { index: usize },
    DuplicateNodeId { id: String },
    UnknownEntityType { id: String, tag: String },
    EdgeMissingId { index: usize },
    DanglingEdge { id: String, endpoint: String },
}

impl fmt::Display for AdapterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterWarning::NodeMissingId { index } => {
                write!(f, "node at index {index} has no id and was dropped")
            }
            AdapterWarning::DuplicateNodeId { id } => {
                write!(f, "duplicate node id '{id}'; keeping the first occurrence")
            }
            AdapterWarning::UnknownEntityType { id, tag } => {
                write!(f, "node '{id}' has unknown entity type '{tag}' and was dropped")
            }
            AdapterWarning::EdgeMissingId { index } => {
                write!(f, "edge at index {index} has no id and was dropped")
            }
            AdapterWarning::DanglingEdge { id, endpoint } => {
                write!(f, "edge '{id}' references unknown node '{endpoint}' and was dropped")
            }
        }
    }
}

impl Snapshot {
    /// Normalizes a raw inventory payload into the internal model.
    ///
    /// Missing optional fields default silently; a node or edge that is
    /// structurally unusable is dropped and reported in the warning list.
    pub fn normalize(raw: RawGraph) -> (Self, Vec<AdapterWarning>) {
        let mut warnings = Vec::new();
        let mut nodes: Vec<GraphNode> = Vec::with_capacity(raw.nodes.len());
        let mut seen: HashSet<String> = HashSet::new();

        for (index, raw_node) in raw.nodes.into_iter().enumerate() {
            let Some(id) = raw_node.id.filter(|id| !id.is_empty()) else {
                warnings.push(AdapterWarning::NodeMissingId { index });
                continue;
            };

            if !seen.insert(id.clone()) {
                warnings.push(AdapterWarning::DuplicateNodeId { id });
                continue;
            }

            let tag = raw_node.label.unwrap_or_default();
            let Some(entity_type) = EntityType::from_tag(&tag) else {
                seen.remove(&id);
                warnings.push(AdapterWarning::UnknownEntityType { id, tag });
                continue;
            };

            let bag = raw_node.properties;
            let label = display_label(&bag, &id);
            let properties = parse_properties(entity_type, &bag);

            nodes.push(GraphNode {
                id,
                entity_type,
                label,
                is_risky: bag_flag(&bag, "isRisky"),
                is_external: bag_flag(&bag, "isExternal"),
                properties,
                position: None,
            });
        }

        let mut edges: Vec<GraphEdge> = Vec::with_capacity(raw.edges.len());
        for (index, raw_edge) in raw.edges.into_iter().enumerate() {
            let Some(id) = raw_edge.id.filter(|id| !id.is_empty()) else {
                warnings.push(AdapterWarning::EdgeMissingId { index });
                continue;
            };

            let source = raw_edge.source.unwrap_or_default();
            let target = raw_edge.target.unwrap_or_default();
            let missing = [&source, &target]
                .into_iter()
                .find(|endpoint| !seen.contains(*endpoint));
            if let Some(endpoint) = missing {
                warnings.push(AdapterWarning::DanglingEdge {
                    id,
                    endpoint: endpoint.clone(),
                });
                continue;
            }

            let bag = raw_edge.properties;
            let label = bag_string(&bag, "label").or_else(|| bag_string(&bag, "action"));
            edges.push(GraphEdge {
                id,
                source,
                target,
                is_risky: bag_flag(&bag, "isRisky"),
                label,
                full_action: bag_string(&bag, "fullAction"),
            });
        }

        for warning in &warnings {
            tracing::warn!(%warning, "graph adapter");
        }

        (Snapshot { nodes, edges }, warnings)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// Display label priority: explicit name, then external id from the property
/// bag, then the internal node id.
fn display_label(bag: &Map<String, Value>, id: &str) -> String {
    bag_string(bag, "name")
        .or_else(|| bag_string(bag, "id"))
        .unwrap_or_else(|| id.to_string())
}

fn bag_flag(bag: &Map<String, Value>, key: &str) -> bool {
    bag.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn bag_string(bag: &Map<String, Value>, key: &str) -> Option<String> {
    bag.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_properties(entity_type: EntityType, bag: &Map<String, Value>) -> EntityProperties {
    // Mismatched property types are treated the same as missing ones.
    fn field<T: serde::de::DeserializeOwned + Default>(bag: &Map<String, Value>, key: &str) -> T {
        bag.get(key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    match entity_type {
        EntityType::Cluster => EntityProperties::Cluster {
            region: bag_string(bag, "region"),
            overview: bag
                .get("overview")
                .cloned()
                .and_then(|value| serde_json::from_value(value).ok()),
            services: field(bag, "services"),
            risks: bag
                .get("risks")
                .cloned()
                .and_then(|value| serde_json::from_value(value).ok()),
        },
        EntityType::Service => EntityProperties::Service {
            launch_type: bag_string(bag, "launchType"),
            running_tasks: field(bag, "runningTasks"),
        },
        EntityType::Task => EntityProperties::Task {
            service: bag_string(bag, "service"),
            task_definition: bag_string(bag, "taskDefinition"),
            launch_type: bag_string(bag, "launchType"),
        },
        EntityType::IdentityRole => EntityProperties::IdentityRole {
            arn: bag_string(bag, "arn"),
        },
        EntityType::Endpoint => EntityProperties::Endpoint {
            hostname: bag_string(bag, "hostname"),
            port: field(bag, "port"),
            protocol: bag_string(bag, "protocol"),
        },
    }
}
