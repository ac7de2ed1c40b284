use tokio::sync::{Mutex, RwLock};

use crate::error::ExplorerError;
use crate::filter::{FilterConfig, FilterOutcome, filter};
use crate::graph::{AdapterWarning, Snapshot};
use crate::interact::{Directive, InteractionController, PointerEvent};
use crate::inventory::{InventoryClient, NodeDetail};
use crate::layout::{LayeredEngine, LayoutCoordinator, LayoutEngine, LayoutOutcome, PositionedScene};

struct LoadedGraph {
    snapshot: Snapshot,
    warnings: Vec<AdapterWarning>,
}

/// What the render surface should currently display.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneState {
    /// No snapshot has been loaded yet.
    NotLoaded,
    /// A valid snapshot filtered down to zero nodes. Distinct from any
    /// error: the surface shows a "no matching nodes" state.
    Empty,
    /// Positioned nodes and edges ready to draw.
    Ready(PositionedScene),
}

/// One view session over the explorer pipeline: fetch, normalize, filter,
/// lay out, interact. A snapshot is immutable once fetched; [`Explorer::reload`]
/// replaces it wholesale and never merges.
pub struct Explorer<E = LayeredEngine> {
    client: InventoryClient,
    coordinator: LayoutCoordinator<E>,
    config: RwLock<FilterConfig>,
    loaded: RwLock<Option<LoadedGraph>>,
    interaction: Mutex<InteractionController>,
}

impl Explorer<LayeredEngine> {
    pub fn new(client: InventoryClient) -> Self {
        Self::with_engine(client, LayeredEngine)
    }
}

impl<E: LayoutEngine> Explorer<E> {
    pub fn with_engine(client: InventoryClient, engine: E) -> Self {
        Self {
            client,
            coordinator: LayoutCoordinator::new(engine),
            config: RwLock::new(FilterConfig::default()),
            loaded: RwLock::new(None),
            interaction: Mutex::new(InteractionController::new()),
        }
    }

    /// Fetches a fresh snapshot from the inventory service and runs the
    /// pipeline on it. On fetch failure the previous snapshot is left in
    /// place; the caller surfaces the blocking error.
    pub async fn reload(&self) -> Result<(), ExplorerError> {
        let raw = self.client.fetch_graph().await?;
        let (snapshot, warnings) = Snapshot::normalize(raw);
        self.install(snapshot, warnings).await
    }

    /// Installs an already-normalized snapshot (used by reload and by
    /// offline rendering from a file).
    pub async fn install(
        &self,
        snapshot: Snapshot,
        warnings: Vec<AdapterWarning>,
    ) -> Result<(), ExplorerError> {
        {
            let mut loaded = self.loaded.write().await;
            *loaded = Some(LoadedGraph { snapshot, warnings });
        }
        self.coordinator.clear().await;
        self.refresh().await.map(|_| ())
    }

    /// Replaces the filter configuration and recomputes the visible set and
    /// its layout. Never triggers a re-fetch; only the result of the latest
    /// configuration is ever applied.
    pub async fn set_filters(&self, config: FilterConfig) -> Result<LayoutOutcome, ExplorerError> {
        *self.config.write().await = config;
        self.refresh().await
    }

    async fn refresh(&self) -> Result<LayoutOutcome, ExplorerError> {
        let Some(visible) = self.visible().await else {
            return Ok(LayoutOutcome::Applied);
        };
        self.coordinator.reposition(visible).await
    }

    /// The visible (pre-layout) subset under the active configuration.
    async fn visible(&self) -> Option<FilterOutcome> {
        let loaded = self.loaded.read().await;
        let loaded = loaded.as_ref()?;
        let config = self.config.read().await;
        Some(filter(&loaded.snapshot, &config))
    }

    pub async fn scene(&self) -> SceneState {
        match self.coordinator.scene().await {
            None => SceneState::NotLoaded,
            Some(scene) if scene.nodes.is_empty() => SceneState::Empty,
            Some(scene) => SceneState::Ready(scene),
        }
    }

    pub async fn config(&self) -> FilterConfig {
        self.config.read().await.clone()
    }

    /// Adapter warnings recorded while normalizing the current snapshot.
    pub async fn warnings(&self) -> Vec<AdapterWarning> {
        self.loaded
            .read()
            .await
            .as_ref()
            .map(|loaded| loaded.warnings.clone())
            .unwrap_or_default()
    }

    /// Routes one raw pointer event through the interaction controller
    /// against the currently visible set.
    pub async fn pointer(&self, event: PointerEvent) -> Vec<Directive> {
        let Some(visible) = self.visible().await else {
            return Vec::new();
        };
        let mut controller = self.interaction.lock().await;
        controller.handle(event, &visible)
    }

    /// Detail fetch for the in-place panel / detail page handoff.
    pub async fn node_details(&self, node_id: &str) -> Result<NodeDetail, ExplorerError> {
        self.client.fetch_node_details(node_id).await
    }
}
