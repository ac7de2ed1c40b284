use serde::{Deserialize, Serialize};

use crate::error::ExplorerError;
use crate::graph::RawGraph;

/// HTTP client for the backend inventory service.
#[derive(Debug, Clone)]
pub struct InventoryClient {
    http: reqwest::Client,
    base_url: String,
}

/// Detail payload for a single node, consumed by the detail page. The core
/// only proxies it; the shape is the handoff contract for click navigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeDetail {
    pub name: Option<String>,
    pub task_configuration: Option<serde_json::Value>,
    pub network_info: Option<serde_json::Value>,
    pub permissions: Vec<PermissionEntry>,
    pub endpoints: Vec<EndpointEntry>,
    pub risks: Vec<RiskAnnotation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PermissionEntry {
    pub permission: String,
    pub resource: String,
    pub used: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointEntry {
    pub endpoint: String,
    #[serde(rename = "type")]
    pub endpoint_type: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RiskAnnotation {
    pub severity: String,
    pub message: String,
}

impl InventoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the full raw graph. A transport or HTTP failure is blocking
    /// for the view; an undecodable body is reported as a malformed graph.
    pub async fn fetch_graph(&self) -> Result<RawGraph, ExplorerError> {
        let url = format!("{}/api/v1/graph", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|err| ExplorerError::MalformedGraph(err.to_string()))
    }

    /// Fetches detail data for one node.
    pub async fn fetch_node_details(&self, node_id: &str) -> Result<NodeDetail, ExplorerError> {
        let url = format!("{}/api/v1/nodes", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("node_id", node_id)])
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|err| ExplorerError::MalformedGraph(err.to_string()))
    }
}
