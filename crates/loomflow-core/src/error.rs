use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // Catalog errors
    #[error("Catalog error: {0}")]
    Catalog(String),

    // Flow document errors
    #[error("Edge '{edge_id}' references unknown node '{node_id}'")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("Node '{0}' not found in flow")]
    NodeNotFound(String),

    #[error("Dependency map contains a cycle involving: {0}")]
    DependencyCycle(String),

    // Node execution errors
    #[error("Node execution failed: {node_id}: {message}")]
    NodeExecution { node_id: String, message: String },

    #[error("Node timeout after {timeout_secs}s: {node_id}")]
    NodeTimeout { node_id: String, timeout_secs: u64 },

    #[error("Rollback failed for node {node_id}: {message}")]
    Rollback { node_id: String, message: String },

    // Execution lifecycle
    #[error("Flow execution cancelled")]
    Cancelled,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
