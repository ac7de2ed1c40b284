use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filter::FilterOutcome;
use crate::graph::GraphNode;

/// Grace period between leaving an edge and hiding its tooltip, long enough
/// for the pointer to land on the tooltip itself.
pub const TOOLTIP_GRACE: Duration = Duration::from_millis(100);

/// Route pattern for task navigation; the node id is URL-encoded into the
/// query.
const TASK_DETAILS_ROUTE: &str = "/cluster-map/task-details";

/// Handle for one scheduled grace timer. Tokens are monotonic; an expiry
/// carrying a token that is no longer current is ignored, which is how a
/// timer gets cancelled.
pub type TimerToken = u64;

/// Raw pointer events raised by the render surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PointerEvent {
    #[serde(rename_all = "camelCase")]
    EdgeEnter { edge_id: String, x: f32, y: f32 },
    #[serde(rename_all = "camelCase")]
    PointerMove { x: f32, y: f32 },
    EdgeLeave,
    TooltipEnter,
    TooltipLeave,
    #[serde(rename_all = "camelCase")]
    GraceElapsed { token: TimerToken },
    #[serde(rename_all = "camelCase")]
    NodeClick { node_id: String },
}

/// Instructions for the render surface in response to a pointer event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Directive {
    #[serde(rename_all = "camelCase")]
    ShowTooltip { x: f32, y: f32, lines: Vec<String> },
    #[serde(rename_all = "camelCase")]
    MoveTooltip { x: f32, y: f32 },
    HideTooltip,
    #[serde(rename_all = "camelCase")]
    StartGraceTimer { token: TimerToken, delay_ms: u64 },
    #[serde(rename_all = "camelCase")]
    OpenDetailPanel { node_id: String },
    #[serde(rename_all = "camelCase")]
    Navigate { node_id: String, route: String },
}

/// All visible edges sharing one (source, target) pair, hovered as a unit.
#[derive(Debug, Clone, PartialEq)]
struct EdgeGroup {
    source: String,
    target: String,
    lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum HoverState {
    Idle,
    /// Pointer is over an edge of the group; tooltip shown.
    Hovering(EdgeGroup),
    /// Pointer left the edge; a grace timer is running before the hide.
    PendingHide(EdgeGroup, TimerToken),
    /// Pointer landed on the tooltip itself; it stays until the pointer
    /// leaves it.
    TooltipHover(EdgeGroup),
}

/// State machine over hover/click interaction. Sans-IO: timers are scheduled
/// by the host via [`Directive::StartGraceTimer`] and reported back with
/// [`PointerEvent::GraceElapsed`].
#[derive(Debug)]
pub struct InteractionController {
    state: HoverState,
    next_timer: TimerToken,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    pub fn new() -> Self {
        Self {
            state: HoverState::Idle,
            next_timer: 0,
        }
    }

    /// Feeds one pointer event through the machine against the currently
    /// visible set, returning the directives the render surface must apply.
    pub fn handle(&mut self, event: PointerEvent, visible: &FilterOutcome) -> Vec<Directive> {
        match event {
            PointerEvent::EdgeEnter { edge_id, x, y } => self.edge_enter(&edge_id, x, y, visible),
            PointerEvent::PointerMove { x, y } => match &self.state {
                HoverState::Hovering(_) => vec![Directive::MoveTooltip { x, y }],
                _ => Vec::new(),
            },
            PointerEvent::EdgeLeave => self.edge_leave(),
            PointerEvent::TooltipEnter => self.tooltip_enter(),
            PointerEvent::TooltipLeave => self.tooltip_leave(),
            PointerEvent::GraceElapsed { token } => self.grace_elapsed(token),
            PointerEvent::NodeClick { node_id } => self.node_click(&node_id, visible),
        }
    }

    fn edge_enter(
        &mut self,
        edge_id: &str,
        x: f32,
        y: f32,
        visible: &FilterOutcome,
    ) -> Vec<Directive> {
        let Some(edge) = visible.edge(edge_id) else {
            // The surface can race a filter change; a vanished edge is a no-op.
            return Vec::new();
        };

        let group = EdgeGroup {
            source: edge.source.clone(),
            target: edge.target.clone(),
            lines: visible
                .edge_group(&edge.source, &edge.target)
                .iter()
                .map(|sibling| sibling.tooltip_text().to_string())
                .collect(),
        };
        let lines = group.lines.clone();
        self.state = HoverState::Hovering(group);

        vec![Directive::ShowTooltip { x, y, lines }]
    }

    fn edge_leave(&mut self) -> Vec<Directive> {
        match std::mem::replace(&mut self.state, HoverState::Idle) {
            HoverState::Hovering(group) => {
                self.next_timer += 1;
                let token = self.next_timer;
                self.state = HoverState::PendingHide(group, token);
                vec![Directive::StartGraceTimer {
                    token,
                    delay_ms: TOOLTIP_GRACE.as_millis() as u64,
                }]
            }
            other => {
                self.state = other;
                Vec::new()
            }
        }
    }

    fn tooltip_enter(&mut self) -> Vec<Directive> {
        match std::mem::replace(&mut self.state, HoverState::Idle) {
            // Entering the tooltip cancels the pending hide.
            HoverState::PendingHide(group, _) | HoverState::Hovering(group) => {
                self.state = HoverState::TooltipHover(group);
            }
            other => self.state = other,
        }
        Vec::new()
    }

    fn tooltip_leave(&mut self) -> Vec<Directive> {
        match self.state {
            HoverState::TooltipHover(_) => {
                self.state = HoverState::Idle;
                vec![Directive::HideTooltip]
            }
            _ => Vec::new(),
        }
    }

    fn grace_elapsed(&mut self, token: TimerToken) -> Vec<Directive> {
        match &self.state {
            HoverState::PendingHide(_, current) if *current == token => {
                self.state = HoverState::Idle;
                vec![Directive::HideTooltip]
            }
            // Stale timer: hover state changed before it fired.
            _ => Vec::new(),
        }
    }

    fn node_click(&mut self, node_id: &str, visible: &FilterOutcome) -> Vec<Directive> {
        let Some(node) = visible.node(node_id) else {
            return Vec::new();
        };

        if node.has_detail_overview() {
            return vec![Directive::OpenDetailPanel {
                node_id: node.id.clone(),
            }];
        }

        if node.entity_type.is_navigable() {
            return vec![Directive::Navigate {
                node_id: node.id.clone(),
                route: navigation_route(node),
            }];
        }

        Vec::new()
    }
}

fn navigation_route(node: &GraphNode) -> String {
    format!(
        "{TASK_DETAILS_ROUTE}?nodeId={}",
        urlencoding::encode(&node.id)
    )
}
