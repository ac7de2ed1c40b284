//! Interactive explorer for cloud infrastructure topology.
//!
//! The library side covers the full pipeline: fetch a raw graph from the
//! inventory service, normalize it into typed entities, run the filter
//! stack, position the survivors with a layout engine, and drive pointer
//! interaction against the result. The binary wraps this in a CLI and an
//! HTTP server.

pub mod error;
pub mod explorer;
pub mod export;
pub mod filter;
pub mod graph;
pub mod interact;
pub mod inventory;
pub mod layout;
#[cfg(feature = "server")]
pub mod serve;

pub use error::ExplorerError;
pub use explorer::{Explorer, SceneState};
pub use export::render_svg;
pub use filter::{FilterConfig, FilterOutcome, filter};
pub use graph::{
    AdapterWarning, EntityProperties, EntityType, GraphEdge, GraphNode, Point, RawGraph, Snapshot,
};
pub use interact::{Directive, InteractionController, PointerEvent, TimerToken};
pub use inventory::{InventoryClient, NodeDetail};
pub use layout::{
    LayeredEngine, LayoutCoordinator, LayoutEngine, LayoutOutcome, LayoutRequest, LayoutResponse,
    PositionedScene, SizingHint, sizing_hint,
};
