//! Flow planning — turns a project-requirements object into a versioned
//! flow document: agent selection, node construction, layered dependency
//! graph, and flow-level metadata.

pub mod assembler;
pub mod graph;
pub mod node;
pub mod selector;

pub use assembler::{Flow, FlowMetadata, FlowPlanner};
pub use graph::{build_dependency_graph, DependencyGraph, EdgeCondition, FlowEdge, Layer};
pub use node::{create_nodes, FlowNode, NodeConfig, Position};
pub use selector::select_agents;
