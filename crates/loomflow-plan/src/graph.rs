//! Dependency-graph construction — layered ordering across categories and
//! cross-layer connection rules.
//!
//! Layers follow the fixed category order (setup → execution → testing →
//! integration → review → utility); edges only ever point from an earlier
//! layer to a later one, so the result is a DAG by construction. The
//! "previous layer" used as a connection source carries over empty
//! categories and is never advanced past a review or utility layer, so a
//! populated layer always chains from the last populated working layer
//! (e.g. setup connects straight to testing when execution is empty).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use loomflow_core::types::AgentCategory;

use crate::node::FlowNode;

/// Condition for traversing an edge during execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EdgeCondition {
    /// Traverse when the source node completed successfully.
    #[default]
    Success,
    /// Traverse when the source node failed terminally (recovery path).
    Failure,
    /// Traverse based on a caller-defined expression.
    Custom { expr: String },
}

/// A directed edge between two flow nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    /// `edge-<n>`, 1-indexed in creation order.
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// One layer: the nodes sharing a category, in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub category: AgentCategory,
    pub node_ids: Vec<String>,
}

/// The assembled dependency graph for one flow.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub nodes: HashMap<String, FlowNode>,
    /// Source-keyed adjacency list.
    pub adjacency: HashMap<String, Vec<String>>,
    pub edges: Vec<FlowEdge>,
    /// One entry per category that has at least one node, in category order.
    pub layers: Vec<Layer>,
    /// Per-layer maximum-estimated-time node ids; a coarse duration
    /// heuristic, not a true longest path.
    pub critical_path: Vec<String>,
}

/// First-hyphen-segment pairs that make an execution→testing edge valid.
const STACK_PAIRS: &[(&str, &str)] = &[
    ("react", "jest"),
    ("python", "pytest"),
    ("nodejs", "jest"),
    ("go", "go"),
];

/// Build the layered dependency graph for a set of nodes.
pub fn build_dependency_graph(nodes: &[FlowNode]) -> DependencyGraph {
    let layers = partition_layers(nodes);
    let node_map: HashMap<String, FlowNode> =
        nodes.iter().map(|n| (n.id.clone(), n.clone())).collect();

    let mut edges: Vec<FlowEdge> = Vec::new();
    let mut edge_count = 0usize;
    let mut connect = |source: &str, target: &str, edges: &mut Vec<FlowEdge>| {
        edge_count += 1;
        edges.push(FlowEdge {
            id: format!("edge-{}", edge_count),
            source: source.to_string(),
            target: target.to_string(),
            condition: EdgeCondition::Success,
        });
    };

    // The carried-over source layer: only advanced past working categories,
    // so review and utility never become a chaining source.
    let mut previous: Option<&Layer> = None;
    let mut review_layer: Option<&Layer> = None;

    for layer in &layers {
        if let Some(prev) = previous {
            match layer.category {
                AgentCategory::Setup => {}
                AgentCategory::Testing => {
                    for source in &prev.node_ids {
                        for target in &layer.node_ids {
                            if testing_compatible(&node_map[source], &node_map[target]) {
                                connect(source, target, &mut edges);
                            }
                        }
                    }
                }
                AgentCategory::Utility => {
                    for source in &prev.node_ids {
                        for target in &layer.node_ids {
                            connect(source, target, &mut edges);
                        }
                    }
                    // Review layers are skipped by the carry-over, but
                    // review output still feeds the utility layer.
                    if let Some(review) = review_layer {
                        for source in &review.node_ids {
                            for target in &layer.node_ids {
                                connect(source, target, &mut edges);
                            }
                        }
                    }
                }
                AgentCategory::Execution | AgentCategory::Integration | AgentCategory::Review => {
                    for source in &prev.node_ids {
                        for target in &layer.node_ids {
                            connect(source, target, &mut edges);
                        }
                    }
                }
            }
        }

        if layer.category == AgentCategory::Review {
            review_layer = Some(layer);
        }
        if !matches!(layer.category, AgentCategory::Review | AgentCategory::Utility) {
            previous = Some(layer);
        }
    }

    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for edge in &edges {
        adjacency
            .entry(edge.source.clone())
            .or_default()
            .push(edge.target.clone());
    }

    let critical_path = compute_critical_path(&layers, &node_map);

    debug!(
        nodes = node_map.len(),
        edges = edges.len(),
        layers = layers.len(),
        "Dependency graph built"
    );

    DependencyGraph {
        nodes: node_map,
        adjacency,
        edges,
        layers,
        critical_path,
    }
}

/// Group nodes into layers by category, in fixed category order. Empty
/// categories contribute no layer.
fn partition_layers(nodes: &[FlowNode]) -> Vec<Layer> {
    AgentCategory::ORDER
        .iter()
        .filter_map(|&category| {
            let node_ids: Vec<String> = nodes
                .iter()
                .filter(|n| n.category == category)
                .map(|n| n.id.clone())
                .collect();
            (!node_ids.is_empty()).then_some(Layer { category, node_ids })
        })
        .collect()
}

/// An edge into the testing layer is valid when the source and target
/// stacks pair up, or unconditionally for browser-driver e2e agents.
fn testing_compatible(source: &FlowNode, target: &FlowNode) -> bool {
    if target.agent_id.contains("e2e") || target.agent_id.contains("playwright") {
        return true;
    }
    let src_segment = first_segment(&source.agent_id);
    let tgt_segment = first_segment(&target.agent_id);
    STACK_PAIRS
        .iter()
        .any(|(a, b)| src_segment == *a && tgt_segment == *b)
}

fn first_segment(agent_id: &str) -> &str {
    agent_id.split('-').next().unwrap_or(agent_id)
}

/// Layer-wise greedy heuristic: per layer, the unvisited node with the
/// largest time estimate (ties broken by layer order). Deliberately not a
/// longest-path computation over the actual edges.
fn compute_critical_path(layers: &[Layer], nodes: &HashMap<String, FlowNode>) -> Vec<String> {
    let mut visited: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut path = Vec::new();

    for layer in layers {
        let pick = layer
            .node_ids
            .iter()
            .filter(|id| !visited.contains(id.as_str()))
            .max_by(|a, b| {
                let ta = nodes[*a].estimated_time_mins;
                let tb = nodes[*b].estimated_time_mins;
                // strictly-greater comparison keeps the first node on ties
                if tb > ta {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                }
            });
        if let Some(id) = pick {
            visited.insert(id.as_str());
            path.push(id.clone());
        }
    }

    path
}

impl DependencyGraph {
    /// Sum over layers of the per-layer maximum time estimate. Matches the
    /// critical-path policy, summed rather than selected.
    pub fn estimated_total_time_mins(&self) -> u32 {
        self.layers
            .iter()
            .map(|layer| {
                layer
                    .node_ids
                    .iter()
                    .map(|id| self.nodes[id].estimated_time_mins)
                    .max()
                    .unwrap_or(0)
            })
            .sum()
    }

    /// Referential integrity: every edge endpoint must exist in the node set.
    pub fn validate(&self) -> loomflow_core::Result<()> {
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !self.nodes.contains_key(endpoint) {
                    return Err(loomflow_core::FlowError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Forward reachability check used by tests; the layered construction
    /// cannot produce cycles.
    pub fn is_acyclic(&self) -> bool {
        // Kahn's algorithm: all nodes must drain.
        let mut indegree: HashMap<&str, usize> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        for edge in &self.edges {
            *indegree.entry(edge.target.as_str()).or_default() += 1;
        }
        let mut queue: Vec<&str> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut drained = 0;
        while let Some(id) = queue.pop() {
            drained += 1;
            if let Some(targets) = self.adjacency.get(id) {
                for target in targets {
                    if let Some(d) = indegree.get_mut(target.as_str()) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push(target.as_str());
                        }
                    }
                }
            }
        }
        drained == self.nodes.len()
    }
}
