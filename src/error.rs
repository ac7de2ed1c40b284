use thiserror::Error;

/// Failures surfaced by the explorer pipeline.
///
/// A graph that filters down to nothing is not an error; see
/// [`crate::explorer::SceneState::Empty`].
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// The inventory service could not be reached or answered with a
    /// non-success status. Blocking; the caller retries by reloading.
    #[error("failed to fetch graph from inventory service: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The inventory payload could not be decoded at all. Individually
    /// malformed nodes/edges never raise this; they are dropped with a
    /// recorded [`crate::graph::AdapterWarning`].
    #[error("inventory service returned a malformed graph: {0}")]
    MalformedGraph(String),

    /// The layout engine failed or returned an unusable result. The
    /// previously applied positions are retained.
    #[error("layout engine failed: {0}")]
    Layout(String),
}
