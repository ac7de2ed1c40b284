use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ExplorerError;
use crate::filter::FilterOutcome;
use crate::graph::{EntityType, GraphEdge, GraphNode, Point};

const LAYOUT_MARGIN: f32 = 80.0;
const LAYER_SPACING: f32 = 120.0;
const ROW_SPACING: f32 = 40.0;

/// Width/height hint handed to the layout engine. A fixed lookup by entity
/// type, not computed: low-information kinds get compact boxes, named
/// entities get room for a label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingHint {
    pub width: f32,
    pub height: f32,
}

pub fn sizing_hint(entity_type: EntityType) -> SizingHint {
    match entity_type {
        EntityType::Endpoint | EntityType::IdentityRole => SizingHint {
            width: 80.0,
            height: 40.0,
        },
        EntityType::Cluster | EntityType::Service | EntityType::Task => SizingHint {
            width: 150.0,
            height: 50.0,
        },
    }
}

/// Input tree for the external layout engine: a root with sized children and
/// the edges between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRequest {
    pub id: String,
    pub children: Vec<LayoutChild>,
    pub edges: Vec<LayoutEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutChild {
    pub id: String,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// The engine's answer: the input children with `x`/`y` added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResponse {
    pub children: Vec<PositionedChild>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedChild {
    pub id: String,
    pub width: f32,
    pub height: f32,
    pub x: f32,
    pub y: f32,
}

impl LayoutRequest {
    pub fn from_visible(visible: &FilterOutcome) -> Self {
        let children = visible
            .nodes
            .iter()
            .map(|node| {
                let hint = sizing_hint(node.entity_type);
                LayoutChild {
                    id: node.id.clone(),
                    width: hint.width,
                    height: hint.height,
                }
            })
            .collect();
        let edges = visible
            .edges
            .iter()
            .map(|edge| LayoutEdge {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
            })
            .collect();

        LayoutRequest {
            id: "root".to_string(),
            children,
            edges,
        }
    }
}

pub type LayoutFuture = Pin<Box<dyn Future<Output = Result<LayoutResponse>> + Send + 'static>>;

/// Opaque position-assignment engine. May resolve synchronously or after an
/// arbitrary delay; the coordinator handles out-of-order completions.
pub trait LayoutEngine: Send + Sync {
    fn compute(&self, request: LayoutRequest) -> LayoutFuture;
}

/// Built-in layered engine: breadth-first level assignment from the edge
/// structure, levels become left-to-right columns, rows centered per column.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayeredEngine;

impl LayoutEngine for LayeredEngine {
    fn compute(&self, request: LayoutRequest) -> LayoutFuture {
        Box::pin(async move { layered_layout(&request) })
    }
}

fn layered_layout(request: &LayoutRequest) -> Result<LayoutResponse> {
    if request.children.is_empty() {
        bail!("layout request declares no children");
    }

    let order: Vec<&str> = request.children.iter().map(|c| c.id.as_str()).collect();
    let sizes: HashMap<&str, (f32, f32)> = request
        .children
        .iter()
        .map(|c| (c.id.as_str(), (c.width, c.height)))
        .collect();

    for edge in &request.edges {
        if !sizes.contains_key(edge.source.as_str()) || !sizes.contains_key(edge.target.as_str()) {
            bail!("layout edge '{}' references a node outside the request", edge.id);
        }
    }

    let mut levels: HashMap<&str, usize> = order.iter().map(|id| (*id, 0_usize)).collect();
    let mut indegree: HashMap<&str, usize> = order.iter().map(|id| (*id, 0_usize)).collect();
    for edge in &request.edges {
        *indegree.get_mut(edge.target.as_str()).unwrap() += 1;
    }

    let mut queue: VecDeque<&str> = order
        .iter()
        .copied()
        .filter(|id| indegree[id] == 0)
        .collect();
    let mut visited: HashSet<&str> = HashSet::new();

    while let Some(id) = queue.pop_front() {
        visited.insert(id);
        let level = levels[id];

        for edge in request.edges.iter().filter(|edge| edge.source == id) {
            let target = edge.target.as_str();
            let entry = levels.get_mut(target).unwrap();
            if *entry < level + 1 {
                *entry = level + 1;
            }
            let degree = indegree.get_mut(target).unwrap();
            if *degree > 0 {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    // Nodes on a cycle never reach indegree zero; place them one level past
    // their deepest placed parent.
    if visited.len() != order.len() {
        for id in &order {
            if visited.contains(id) {
                continue;
            }
            let parent_level = request
                .edges
                .iter()
                .filter(|edge| edge.target == *id)
                .map(|edge| levels[edge.source.as_str()] + 1)
                .max()
                .unwrap_or(0);
            levels.insert(*id, parent_level);
        }
    }

    let mut columns: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for id in &order {
        columns.entry(levels[id]).or_default().push(*id);
    }

    let column_height = |ids: &[&str]| -> f32 {
        let heights: f32 = ids.iter().map(|id| sizes[id].1).sum();
        heights + ROW_SPACING * (ids.len().saturating_sub(1)) as f32
    };
    let tallest = columns
        .values()
        .map(|ids| column_height(ids))
        .fold(0.0_f32, f32::max);

    let mut children = Vec::with_capacity(request.children.len());
    let mut x = LAYOUT_MARGIN;
    for ids in columns.values() {
        let column_width = ids
            .iter()
            .map(|id| sizes[id].0)
            .fold(0.0_f32, f32::max);
        let mut y = LAYOUT_MARGIN + (tallest - column_height(ids)) / 2.0;

        for id in ids {
            let (width, height) = sizes[id];
            children.push(PositionedChild {
                id: id.to_string(),
                width,
                height,
                x: x + (column_width - width) / 2.0,
                y,
            });
            y += height + ROW_SPACING;
        }

        x += column_width + LAYER_SPACING;
    }

    // Response order mirrors the request.
    let by_id: HashMap<String, PositionedChild> = children
        .into_iter()
        .map(|child| (child.id.clone(), child))
        .collect();
    let children = order
        .iter()
        .map(|id| by_id[*id].clone())
        .collect();

    Ok(LayoutResponse { children })
}

/// What happened to a finished layout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutOutcome {
    /// The result came from the most recently issued request and is now the
    /// rendered state.
    Applied,
    /// A newer request was issued while this one was in flight; the result
    /// was discarded.
    Stale,
}

/// The positioned scene currently applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionedScene {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Sends filtered graphs to the layout engine and guarantees that only the
/// result of the most recently issued request ever becomes the rendered
/// state. On engine failure the previous positions are retained.
pub struct LayoutCoordinator<E> {
    engine: E,
    generation: AtomicU64,
    applied: RwLock<Option<PositionedScene>>,
}

impl<E: LayoutEngine> LayoutCoordinator<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            generation: AtomicU64::new(0),
            applied: RwLock::new(None),
        }
    }

    /// Requests positions for the visible set and applies them if no newer
    /// request was issued in the meantime.
    pub async fn reposition(
        &self,
        visible: FilterOutcome,
    ) -> Result<LayoutOutcome, ExplorerError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // An empty visible set is a valid display state, not a layout job.
        if visible.is_empty() {
            return Ok(self
                .apply(ticket, PositionedScene::default())
                .await);
        }

        let request = LayoutRequest::from_visible(&visible);
        let response = self
            .engine
            .compute(request)
            .await
            .map_err(|err| ExplorerError::Layout(err.to_string()))?;
        if response.children.is_empty() {
            return Err(ExplorerError::Layout(
                "engine returned an empty result".to_string(),
            ));
        }

        let positions: HashMap<&str, Point> = response
            .children
            .iter()
            .map(|child| {
                (
                    child.id.as_str(),
                    Point {
                        x: child.x,
                        y: child.y,
                    },
                )
            })
            .collect();

        let FilterOutcome { mut nodes, edges } = visible;
        for node in &mut nodes {
            let Some(point) = positions.get(node.id.as_str()) else {
                return Err(ExplorerError::Layout(format!(
                    "engine result is missing node '{}'",
                    node.id
                )));
            };
            node.position = Some(*point);
        }

        Ok(self.apply(ticket, PositionedScene { nodes, edges }).await)
    }

    async fn apply(&self, ticket: u64, scene: PositionedScene) -> LayoutOutcome {
        let mut applied = self.applied.write().await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            tracing::debug!(ticket, "discarding stale layout result");
            return LayoutOutcome::Stale;
        }
        *applied = Some(scene);
        LayoutOutcome::Applied
    }

    /// The currently applied scene, if any request has completed yet.
    pub async fn scene(&self) -> Option<PositionedScene> {
        self.applied.read().await.clone()
    }

    /// Forgets the applied scene; used when the snapshot itself is replaced.
    pub async fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.applied.write().await = None;
    }
}
