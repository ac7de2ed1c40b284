use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use clustermap::explorer::{Explorer, SceneState};
use clustermap::filter::{FilterConfig, filter};
use clustermap::graph::{AdapterWarning, RawGraph, Snapshot};
use clustermap::interact::{Directive, PointerEvent};
use clustermap::inventory::InventoryClient;
use clustermap::layout::{
    LayoutCoordinator, LayoutEngine, LayoutFuture, LayoutOutcome, LayoutRequest, LayoutResponse,
    PositionedChild,
};

fn load_snapshot() -> Snapshot {
    let raw: RawGraph = serde_json::from_str(include_str!("input/topology.json"))
        .expect("fixture graph should deserialize");
    let (snapshot, warnings) = Snapshot::normalize(raw);
    assert!(warnings.is_empty(), "fixture should normalize cleanly");
    snapshot
}

fn offline_client() -> InventoryClient {
    // Nothing listens here; tests that use it never touch the network.
    InventoryClient::new("http://127.0.0.1:1")
}

#[tokio::test]
async fn pipeline_positions_every_visible_node() {
    let explorer = Explorer::new(offline_client());
    explorer
        .install(load_snapshot(), Vec::new())
        .await
        .expect("install should lay out the fixture");

    let SceneState::Ready(scene) = explorer.scene().await else {
        panic!("expected a ready scene");
    };
    assert_eq!(scene.nodes.len(), 7);
    assert_eq!(scene.edges.len(), 7);
    assert!(scene.nodes.iter().all(|node| node.position.is_some()));
}

#[tokio::test]
async fn filter_change_relayouts_without_refetch() {
    let explorer = Explorer::new(offline_client());
    explorer.install(load_snapshot(), Vec::new()).await.unwrap();

    let outcome = explorer
        .set_filters(FilterConfig {
            external_only: true,
            ..FilterConfig::default()
        })
        .await
        .expect("filter change must not hit the inventory service");
    assert_eq!(outcome, LayoutOutcome::Applied);

    let SceneState::Ready(scene) = explorer.scene().await else {
        panic!("expected a ready scene");
    };
    let mut ids: Vec<&str> = scene.nodes.iter().map(|node| node.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["ep-payments", "ep-s3"]);
    assert!(
        scene.edges.is_empty(),
        "edges to now-hidden internal nodes must be pruned"
    );
}

#[tokio::test]
async fn empty_match_is_a_state_not_an_error() {
    let explorer = Explorer::new(offline_client());
    explorer.install(load_snapshot(), Vec::new()).await.unwrap();

    explorer
        .set_filters(FilterConfig {
            search_query: "no-such-node".to_string(),
            ..FilterConfig::default()
        })
        .await
        .expect("an empty match must not be an error");

    assert_eq!(explorer.scene().await, SceneState::Empty);
}

#[tokio::test]
async fn malformed_entries_are_dropped_with_warnings() {
    let raw: RawGraph = serde_json::from_value(json!({
        "nodes": [
            {"id": "t1", "label": "Task", "properties": {"name": "web"}},
            {"label": "Task", "properties": {}},
            {"id": "x1", "label": "Database", "properties": {}}
        ],
        "edges": [
            {"id": "e1", "source": "t1", "target": "ghost", "properties": {}}
        ]
    }))
    .unwrap();
    let (snapshot, warnings) = Snapshot::normalize(raw);

    assert_eq!(snapshot.nodes.len(), 1);
    assert!(snapshot.edges.is_empty());
    assert!(warnings.contains(&AdapterWarning::NodeMissingId { index: 1 }));
    assert!(warnings.contains(&AdapterWarning::UnknownEntityType {
        id: "x1".to_string(),
        tag: "Database".to_string(),
    }));
    assert!(warnings.contains(&AdapterWarning::DanglingEdge {
        id: "e1".to_string(),
        endpoint: "ghost".to_string(),
    }));

    let explorer = Explorer::new(offline_client());
    explorer
        .install(snapshot, warnings.clone())
        .await
        .expect("partially malformed graph should still install");
    assert_eq!(explorer.warnings().await, warnings);
}

#[tokio::test]
async fn hover_aggregates_parallel_permission_edges() {
    let explorer = Explorer::new(offline_client());
    explorer.install(load_snapshot(), Vec::new()).await.unwrap();

    let directives = explorer
        .pointer(PointerEvent::EdgeEnter {
            edge_id: "edge-s3-read".to_string(),
            x: 10.0,
            y: 20.0,
        })
        .await;

    assert_eq!(
        directives,
        vec![Directive::ShowTooltip {
            x: 10.0,
            y: 20.0,
            lines: vec![
                "s3:GetObject on arn:aws:s3:::app-data/*".to_string(),
                "s3:PutObject on arn:aws:s3:::app-data/*".to_string(),
            ],
        }]
    );
}

#[tokio::test]
async fn clicking_cluster_opens_panel_and_task_navigates() {
    let explorer = Explorer::new(offline_client());
    explorer.install(load_snapshot(), Vec::new()).await.unwrap();

    let on_cluster = explorer
        .pointer(PointerEvent::NodeClick {
            node_id: "cluster-1".to_string(),
        })
        .await;
    assert_eq!(
        on_cluster,
        vec![Directive::OpenDetailPanel {
            node_id: "cluster-1".to_string(),
        }]
    );

    let on_task = explorer
        .pointer(PointerEvent::NodeClick {
            node_id: "task-web-1".to_string(),
        })
        .await;
    assert_eq!(
        on_task,
        vec![Directive::Navigate {
            node_id: "task-web-1".to_string(),
            route: "/cluster-map/task-details?nodeId=task-web-1".to_string(),
        }]
    );
}

/// Engine whose computations block until the test releases them, so
/// completion order can be forced.
struct GatedEngine {
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    started: mpsc::UnboundedSender<()>,
}

impl LayoutEngine for GatedEngine {
    fn compute(&self, request: LayoutRequest) -> LayoutFuture {
        let gate = self
            .gates
            .lock()
            .expect("gate queue poisoned")
            .pop_front();
        let started = self.started.clone();
        Box::pin(async move {
            let _ = started.send(());
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            let children = request
                .children
                .iter()
                .enumerate()
                .map(|(index, child)| PositionedChild {
                    id: child.id.clone(),
                    width: child.width,
                    height: child.height,
                    x: index as f32 * 200.0,
                    y: 0.0,
                })
                .collect();
            Ok(LayoutResponse { children })
        })
    }
}

#[tokio::test]
async fn only_the_latest_layout_result_is_applied() {
    let snapshot = load_snapshot();
    let everything = filter(&snapshot, &FilterConfig::default());
    let web_only = filter(
        &snapshot,
        &FilterConfig {
            search_query: "web-server".to_string(),
            ..FilterConfig::default()
        },
    );

    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let (first_gate_tx, first_gate_rx) = oneshot::channel();
    let (second_gate_tx, second_gate_rx) = oneshot::channel();
    let coordinator = Arc::new(LayoutCoordinator::new(GatedEngine {
        gates: Mutex::new(VecDeque::from([first_gate_rx, second_gate_rx])),
        started: started_tx,
    }));

    let for_first = Arc::clone(&coordinator);
    let first = tokio::spawn(async move { for_first.reposition(everything).await });
    started_rx.recv().await.expect("first request should start");

    let for_second = Arc::clone(&coordinator);
    let second = tokio::spawn(async move { for_second.reposition(web_only).await });
    started_rx.recv().await.expect("second request should start");

    // The newer request finishes first and wins.
    second_gate_tx.send(()).expect("second gate open");
    let second = second.await.unwrap().expect("second layout should apply");
    assert_eq!(second, LayoutOutcome::Applied);

    // The older result arrives late and must be discarded, not applied.
    first_gate_tx.send(()).expect("first gate open");
    let first = first.await.unwrap().expect("stale layout is not an error");
    assert_eq!(first, LayoutOutcome::Stale);

    let scene = coordinator.scene().await.expect("a scene was applied");
    assert_eq!(scene.nodes.len(), 1);
    assert_eq!(scene.nodes[0].id, "task-web-1");
}

/// Engine that always fails; previously applied positions must survive.
struct BrokenEngine;

impl LayoutEngine for BrokenEngine {
    fn compute(&self, _request: LayoutRequest) -> LayoutFuture {
        Box::pin(async { anyhow::bail!("engine unavailable") })
    }
}

#[tokio::test]
async fn layout_failure_retains_previous_scene() {
    let snapshot = load_snapshot();
    let explorer = Explorer::with_engine(offline_client(), BrokenEngine);

    let err = explorer
        .install(snapshot, Vec::new())
        .await
        .expect_err("broken engine should surface a layout error");
    assert!(err.to_string().contains("layout engine failed"));
    assert_eq!(explorer.scene().await, SceneState::NotLoaded);
}
