//! Flow execution — topological dispatch over the dependency graph with
//! bounded parallelism, retries, review gating, and rollback.
//!
//! Node "work" is delegated to a `NodeWorker`; the scheduler itself is a
//! single event loop with concurrent outstanding operations. A node is
//! never dispatched before all its predecessors reached a terminal success
//! state; failure propagates forward without invoking dependents, except
//! along explicit on-failure recovery edges.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use loomflow_core::error::{FlowError, Result};
use loomflow_core::event::EventBus;
use loomflow_core::types::{FlowEvent, NodeStatus, ReviewDecision};
use loomflow_plan::graph::{DependencyGraph, EdgeCondition};
use loomflow_plan::{Flow, FlowNode};

use crate::retry::RetryPolicy;
use crate::review::ReviewBroker;

/// Output of one external node operation.
#[derive(Debug, Clone, Default)]
pub struct WorkOutput {
    pub output: String,
    pub logs: Vec<String>,
}

impl WorkOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            logs: Vec::new(),
        }
    }
}

/// The external long-running operation a node delegates to.
///
/// Implementations spawn code-generation agents, shell tools, or anything
/// else; the scheduler only cares that the call eventually resolves or
/// fails.
pub trait NodeWorker: Send + Sync + 'static {
    fn run(&self, node: FlowNode, instructions: String) -> BoxFuture<'_, Result<WorkOutput>>;

    /// Restore prior state after a critical node's unrecoverable failure.
    fn rollback(&self, _node: FlowNode) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Scheduler-internal run state, one per node per execution. Outcome
/// details live in the node's `NodeReport`; the state only drives dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    RolledBack,
}

impl RunState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::RolledBack
        )
    }

    fn is_completed(&self) -> bool {
        matches!(self, RunState::Completed)
    }

    fn is_failed(&self) -> bool {
        matches!(self, RunState::Failed | RunState::RolledBack)
    }
}

/// Final record for one node in one execution run.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub status: NodeStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub rolled_back: bool,
}

/// Result of executing an entire flow.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// True when every node completed.
    pub success: bool,
    /// True when a critical node failed but was rolled back cleanly.
    pub degraded: bool,
    /// True when the run was cancelled before draining.
    pub cancelled: bool,
    pub total_duration_ms: u64,
    pub nodes: HashMap<String, NodeReport>,
}

/// Executes one flow document against a dependency graph.
///
/// Run state is owned by this call alone; concurrent executions of the
/// same flow document never share mutable node state.
pub struct FlowExecutor {
    bus: Arc<EventBus>,
    reviews: Arc<ReviewBroker>,
    retry: RetryPolicy,
    max_parallel: usize,
    cancel: CancellationToken,
}

impl FlowExecutor {
    pub fn new(bus: Arc<EventBus>, reviews: Arc<ReviewBroker>) -> Self {
        Self {
            bus,
            reviews,
            retry: RetryPolicy::default(),
            max_parallel: 3,
            cancel: CancellationToken::new(),
        }
    }

    /// Bound on concurrently running nodes.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Token that cancels this execution: stops dispatching new nodes and
    /// best-effort aborts in-flight operations.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the flow, respecting dependencies, parallelism limits,
    /// retries, and review checkpoints.
    ///
    /// Ordinary node failures are surfaced through status events and the
    /// report; only programmer errors (dangling edges, cyclic dependency
    /// maps) return `Err`.
    pub async fn execute(
        &self,
        flow: &Flow,
        graph: &DependencyGraph,
        worker: Arc<dyn NodeWorker>,
    ) -> Result<ExecutionReport> {
        let start = Instant::now();

        // Fail fast on malformed documents.
        let known: HashSet<&str> = flow.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &flow.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !known.contains(endpoint.as_str()) {
                    return Err(FlowError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }
        graph.validate()?;

        info!(flow_id = %flow.id, nodes = flow.nodes.len(), "Flow execution started");
        self.bus.publish(FlowEvent::FlowStarted {
            flow_id: flow.id.clone(),
        });

        // Predecessors by target, with the edge condition that gates them.
        let mut preds: HashMap<String, Vec<(String, EdgeCondition)>> = HashMap::new();
        for edge in &graph.edges {
            preds
                .entry(edge.target.clone())
                .or_default()
                .push((edge.source.clone(), edge.condition.clone()));
        }

        let mut states: HashMap<String, RunState> = flow
            .nodes
            .iter()
            .map(|n| (n.id.clone(), RunState::Pending))
            .collect();
        let mut reports: HashMap<String, NodeReport> = HashMap::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, NodeReport)>();
        let mut handles = Vec::new();
        let mut in_flight = 0usize;
        let mut cancelled = false;

        loop {
            // Propagate unsatisfiable dependencies forward, to a fixpoint.
            loop {
                let mut changed = false;
                for node in &flow.nodes {
                    if !matches!(states[&node.id], RunState::Pending) {
                        continue;
                    }
                    let Some(node_preds) = preds.get(&node.id) else {
                        continue;
                    };
                    let all_terminal = node_preds
                        .iter()
                        .all(|(src, _)| states[src].is_terminal());
                    if all_terminal && !Self::deps_satisfied(node_preds, &states) {
                        warn!(node_id = %node.id, "Dependency failed, node will not run");
                        let error = "dependency failed".to_string();
                        self.bus.node_status(
                            &node.id,
                            NodeStatus::Failed,
                            100,
                            None,
                            Some(error.clone()),
                        );
                        states.insert(node.id.clone(), RunState::Failed);
                        reports.insert(
                            node.id.clone(),
                            NodeReport {
                                status: NodeStatus::Failed,
                                output: None,
                                error: Some(error),
                                attempts: 0,
                                elapsed_ms: 0,
                                rolled_back: false,
                            },
                        );
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }

            // Dispatch ready nodes up to the parallelism bound.
            if !cancelled {
                for node in &flow.nodes {
                    if in_flight >= self.max_parallel {
                        break;
                    }
                    if !matches!(states[&node.id], RunState::Pending) {
                        continue;
                    }
                    let ready = preds
                        .get(&node.id)
                        .map(|p| Self::deps_satisfied(p, &states))
                        .unwrap_or(true);
                    if !ready {
                        continue;
                    }

                    debug!(node_id = %node.id, agent_id = %node.agent_id, "Dispatching node");
                    states.insert(node.id.clone(), RunState::Running);
                    in_flight += 1;
                    handles.push(tokio::spawn(run_node(
                        node.clone(),
                        worker.clone(),
                        self.bus.clone(),
                        self.reviews.clone(),
                        self.retry.clone(),
                        self.cancel.clone(),
                        tx.clone(),
                    )));
                }
            }

            if in_flight == 0 {
                let pending_left = states.values().any(|s| matches!(s, RunState::Pending));
                if cancelled || !pending_left {
                    break;
                }
                // Nothing running, nothing ready, nodes still pending: the
                // dependency map is cyclic. The layered builder cannot
                // produce this, so it is a malformed input.
                let stuck: Vec<String> = states
                    .iter()
                    .filter(|(_, s)| matches!(s, RunState::Pending))
                    .map(|(id, _)| id.clone())
                    .collect();
                return Err(FlowError::DependencyCycle(stuck.join(", ")));
            }

            tokio::select! {
                Some((node_id, report)) = rx.recv() => {
                    in_flight -= 1;
                    let state = match report.status {
                        NodeStatus::Completed => RunState::Completed,
                        _ if report.rolled_back => RunState::RolledBack,
                        _ => RunState::Failed,
                    };
                    states.insert(node_id.clone(), state);
                    reports.insert(node_id, report);
                }
                _ = self.cancel.cancelled(), if !cancelled => {
                    warn!(flow_id = %flow.id, "Flow execution cancelled, aborting in-flight nodes");
                    cancelled = true;
                    for handle in &handles {
                        handle.abort();
                    }
                    in_flight = 0;
                }
            }
        }

        // Nodes that never finished (cancelled mid-run or never dispatched)
        // still get a report entry.
        for node in &flow.nodes {
            reports.entry(node.id.clone()).or_insert_with(|| NodeReport {
                status: match states[&node.id] {
                    RunState::Running => NodeStatus::Running,
                    _ => NodeStatus::Pending,
                },
                output: None,
                error: cancelled.then(|| "execution cancelled".to_string()),
                attempts: 0,
                elapsed_ms: 0,
                rolled_back: false,
            });
        }

        let success = !cancelled
            && reports
                .values()
                .all(|r| r.status == NodeStatus::Completed);
        let degraded = reports.values().any(|r| r.rolled_back);
        let total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            flow_id = %flow.id,
            success,
            degraded,
            cancelled,
            total_duration_ms,
            "Flow execution finished"
        );
        self.bus.publish(FlowEvent::FlowCompleted {
            flow_id: flow.id.clone(),
            success,
            duration_ms: total_duration_ms,
        });

        Ok(ExecutionReport {
            success,
            degraded,
            cancelled,
            total_duration_ms,
            nodes: reports,
        })
    }

    /// A node may run when every gating edge is satisfied: success edges
    /// need a completed source, failure edges a terminally failed one.
    fn deps_satisfied(
        node_preds: &[(String, EdgeCondition)],
        states: &HashMap<String, RunState>,
    ) -> bool {
        node_preds.iter().all(|(src, cond)| match cond {
            EdgeCondition::Success | EdgeCondition::Custom { .. } => states[src].is_completed(),
            EdgeCondition::Failure => states[src].is_failed(),
        })
    }
}

/// Drive one node to a terminal state: retries, timeout, review gating,
/// rollback. Reports the outcome over `tx`.
async fn run_node(
    node: FlowNode,
    worker: Arc<dyn NodeWorker>,
    bus: Arc<EventBus>,
    reviews: Arc<ReviewBroker>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<(String, NodeReport)>,
) {
    let start = Instant::now();
    let mut attempts = 0u32;
    let mut progress = 0u8;
    let mut instructions = node.instructions.clone();

    let outcome = loop {
        let result = attempt_with_retries(
            &node,
            worker.as_ref(),
            &bus,
            &retry,
            &cancel,
            &instructions,
            &mut attempts,
            &mut progress,
        )
        .await;

        match result {
            Ok(output) => {
                if !node.config.requires_review {
                    break Ok(output);
                }

                // Review gate: pause the downstream chain until an external
                // decision arrives.
                progress = progress.max(90);
                bus.node_status(
                    &node.id,
                    NodeStatus::Reviewing,
                    progress,
                    Some(output.clone()),
                    None,
                );
                let rx = reviews.request(&node.id).await;
                let decision = tokio::select! {
                    d = rx => d,
                    _ = cancel.cancelled() => break Err("execution cancelled".to_string()),
                };
                match decision {
                    Ok(ReviewDecision::Approve) => break Ok(output),
                    Ok(ReviewDecision::RequestChanges { feedback }) => {
                        info!(node_id = %node.id, "Changes requested, re-running node with feedback");
                        instructions.push_str("\n\nReviewer feedback: ");
                        instructions.push_str(&feedback);
                        continue;
                    }
                    Err(_) => break Err("review channel closed".to_string()),
                }
            }
            Err(e) => break Err(e),
        }
    };

    let report = match outcome {
        Ok(output) => {
            bus.node_status(&node.id, NodeStatus::Completed, 100, Some(output.clone()), None);
            NodeReport {
                status: NodeStatus::Completed,
                output: Some(output),
                error: None,
                attempts,
                elapsed_ms: start.elapsed().as_millis() as u64,
                rolled_back: false,
            }
        }
        Err(err) => {
            let mut rolled_back = false;
            if node.config.critical {
                info!(node_id = %node.id, "Critical node failed, rolling back");
                match worker.rollback(node.clone()).await {
                    Ok(()) => {
                        rolled_back = true;
                        info!(node_id = %node.id, "Rollback complete");
                    }
                    Err(e) => {
                        error!(node_id = %node.id, error = %e, "Rollback failed");
                    }
                }
            }
            bus.node_status(&node.id, NodeStatus::Failed, 100, None, Some(err.clone()));
            NodeReport {
                status: NodeStatus::Failed,
                output: None,
                error: Some(err),
                attempts,
                elapsed_ms: start.elapsed().as_millis() as u64,
                rolled_back,
            }
        }
    };

    // Receiver only goes away when the whole execution is torn down.
    let _ = tx.send((node.id.clone(), report));
}

/// One work cycle: run the external operation under its timeout, retrying
/// with backoff up to the node's budget. Timeouts are failures like any
/// other.
#[allow(clippy::too_many_arguments)]
async fn attempt_with_retries(
    node: &FlowNode,
    worker: &dyn NodeWorker,
    bus: &EventBus,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    instructions: &str,
    attempts: &mut u32,
    progress: &mut u8,
) -> std::result::Result<String, String> {
    let max_retries = if node.config.retry_on_failure {
        node.config.max_retries
    } else {
        0
    };
    let mut cycle_attempt = 0u32;

    loop {
        *progress = (*progress).max((cycle_attempt * 10).min(50) as u8);
        bus.node_status(&node.id, NodeStatus::Running, *progress, None, None);
        *attempts += 1;

        let work = worker.run(node.clone(), instructions.to_string());
        let timeout = Duration::from_secs(node.config.timeout_secs);
        let result = tokio::select! {
            r = tokio::time::timeout(timeout, work) => match r {
                Ok(inner) => inner.map(|out| out.output).map_err(|e| e.to_string()),
                Err(_) => Err(FlowError::NodeTimeout {
                    node_id: node.id.clone(),
                    timeout_secs: node.config.timeout_secs,
                }
                .to_string()),
            },
            _ = cancel.cancelled() => return Err("execution cancelled".to_string()),
        };

        match result {
            Ok(output) => return Ok(output),
            Err(e) => {
                if cycle_attempt < max_retries {
                    let backoff = retry.backoff(cycle_attempt);
                    warn!(
                        node_id = %node.id,
                        attempt = cycle_attempt + 1,
                        max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Node failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err("execution cancelled".to_string()),
                    }
                    cycle_attempt += 1;
                    continue;
                }
                error!(node_id = %node.id, error = %e, "Node failed terminally");
                return Err(e);
            }
        }
    }
}
