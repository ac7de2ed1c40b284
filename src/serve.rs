use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower::service_fn;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::error::ExplorerError;
use crate::explorer::{Explorer, SceneState};
use crate::export::render_svg;
use crate::filter::FilterConfig;
use crate::graph::{EntityProperties, EntityType, GraphEdge, GraphNode, Point};
use crate::interact::{Directive, PointerEvent};
use crate::inventory::{InventoryClient, NodeDetail};
use crate::layout::{PositionedScene, sizing_hint};

/// Arguments for running the clustermap web server
#[derive(Debug, Clone, Parser)]
#[command(name = "clustermap serve", about = "Start the clustermap API server.")]
pub struct ServeArgs {
    /// Base URL of the inventory service to pull graphs from.
    #[arg(long = "inventory-url", default_value = "http://127.0.0.1:8000")]
    pub inventory_url: String,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5171)]
    pub port: u16,

    /// Directory with a built UI bundle to serve alongside the API.
    #[arg(long = "ui-dir")]
    pub ui_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenePayload {
    state: SceneStateTag,
    nodes: Vec<NodePayload>,
    edges: Vec<EdgePayload>,
    filters: FilterConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
enum SceneStateTag {
    NotLoaded,
    Empty,
    Ready,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodePayload {
    id: String,
    entity_type: EntityType,
    label: String,
    is_risky: bool,
    is_external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<Point>,
    width: f32,
    height: f32,
    properties: EntityProperties,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EdgePayload {
    id: String,
    source: String,
    target: String,
    is_risky: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_action: Option<String>,
}

/// Partial filter update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FilterUpdate {
    visible_types: Option<HashSet<EntityType>>,
    search_query: Option<String>,
    risk_only: Option<bool>,
    external_only: Option<bool>,
}

impl FilterUpdate {
    fn apply(self, mut config: FilterConfig) -> FilterConfig {
        if let Some(visible_types) = self.visible_types {
            config.visible_types = visible_types;
        }
        if let Some(search_query) = self.search_query {
            config.search_query = search_query;
        }
        if let Some(risk_only) = self.risk_only {
            config.risk_only = risk_only;
        }
        if let Some(external_only) = self.external_only {
            config.external_only = external_only;
        }
        config
    }
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let client = InventoryClient::new(&args.inventory_url);
    let explorer = Arc::new(Explorer::new(client));

    if let Err(err) = explorer.reload().await {
        tracing::warn!("initial graph load failed: {err}; serving empty state");
    }

    let mut app = Router::new()
        .route("/api/v1/scene", get(get_scene))
        .route("/api/v1/scene/svg", get(get_svg))
        .route("/api/v1/filters", put(put_filters))
        .route("/api/v1/reload", post(post_reload))
        .route("/api/v1/pointer", post(post_pointer))
        .route("/api/v1/nodes/:id", get(get_node_details))
        .with_state(explorer);

    if let Some(root) = args.ui_dir {
        let static_dir = ServeDir::new(root.clone())
            .append_index_html_on_directories(true)
            .fallback(ServeFile::new(root.join("index.html")));
        let dir_for_service = static_dir.clone();

        let static_service = service_fn(move |req| {
            let svc = dir_for_service.clone();
            async move {
                match svc.oneshot(req).await {
                    Ok(response) => Ok(response.map(axum::body::Body::new)),
                    Err(error) => {
                        let message = format!("Static file error: {error}");
                        Ok((StatusCode::INTERNAL_SERVER_ERROR, message).into_response())
                    }
                }
            }
        });

        app = app.fallback_service(static_service);
    }

    let app = app.layer(CorsLayer::permissive());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    println!("clustermap server listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn get_scene(State(explorer): State<Arc<Explorer>>) -> Json<ScenePayload> {
    Json(scene_payload(&explorer).await)
}

async fn get_svg(
    State(explorer): State<Arc<Explorer>>,
) -> Result<Response, (StatusCode, String)> {
    let scene = match explorer.scene().await {
        SceneState::Ready(scene) => scene,
        SceneState::Empty | SceneState::NotLoaded => PositionedScene::default(),
    };
    let svg = render_svg(&scene).map_err(internal_error)?;

    let mut response = Response::new(svg.into());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("image/svg+xml"),
    );
    Ok(response)
}

async fn put_filters(
    State(explorer): State<Arc<Explorer>>,
    Json(update): Json<FilterUpdate>,
) -> Result<Json<ScenePayload>, (StatusCode, String)> {
    let config = update.apply(explorer.config().await);
    explorer.set_filters(config).await.map_err(explorer_error)?;
    Ok(Json(scene_payload(&explorer).await))
}

async fn post_reload(
    State(explorer): State<Arc<Explorer>>,
) -> Result<Json<ScenePayload>, (StatusCode, String)> {
    explorer.reload().await.map_err(explorer_error)?;
    Ok(Json(scene_payload(&explorer).await))
}

async fn post_pointer(
    State(explorer): State<Arc<Explorer>>,
    Json(event): Json<PointerEvent>,
) -> Json<Vec<Directive>> {
    Json(explorer.pointer(event).await)
}

async fn get_node_details(
    State(explorer): State<Arc<Explorer>>,
    AxumPath(node_id): AxumPath<String>,
) -> Result<Json<NodeDetail>, (StatusCode, String)> {
    let detail = explorer
        .node_details(&node_id)
        .await
        .map_err(explorer_error)?;
    Ok(Json(detail))
}

async fn scene_payload(explorer: &Explorer) -> ScenePayload {
    let filters = explorer.config().await;
    let warnings = explorer
        .warnings()
        .await
        .iter()
        .map(|warning| warning.to_string())
        .collect();

    let (state, scene) = match explorer.scene().await {
        SceneState::NotLoaded => (SceneStateTag::NotLoaded, PositionedScene::default()),
        SceneState::Empty => (SceneStateTag::Empty, PositionedScene::default()),
        SceneState::Ready(scene) => (SceneStateTag::Ready, scene),
    };

    ScenePayload {
        state,
        nodes: scene.nodes.into_iter().map(node_payload).collect(),
        edges: scene.edges.into_iter().map(edge_payload).collect(),
        filters,
        warnings,
    }
}

fn node_payload(node: GraphNode) -> NodePayload {
    let hint = sizing_hint(node.entity_type);
    NodePayload {
        id: node.id,
        entity_type: node.entity_type,
        label: node.label,
        is_risky: node.is_risky,
        is_external: node.is_external,
        position: node.position,
        width: hint.width,
        height: hint.height,
        properties: node.properties,
    }
}

fn edge_payload(edge: GraphEdge) -> EdgePayload {
    EdgePayload {
        id: edge.id,
        source: edge.source,
        target: edge.target,
        is_risky: edge.is_risky,
        label: edge.label,
        full_action: edge.full_action,
    }
}

fn explorer_error(err: ExplorerError) -> (StatusCode, String) {
    let status = match &err {
        ExplorerError::Fetch(_) => StatusCode::BAD_GATEWAY,
        ExplorerError::MalformedGraph(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ExplorerError::Layout(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
