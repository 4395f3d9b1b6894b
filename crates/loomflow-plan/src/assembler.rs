//! Flow assembly — packages selection, nodes, and graph into a versioned,
//! JSON-serializable flow document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use loomflow_core::catalog::AgentCatalog;
use loomflow_core::types::{ProjectRequirements, ProjectType};

use crate::graph::{build_dependency_graph, DependencyGraph, FlowEdge};
use crate::node::{create_nodes, FlowNode};
use crate::selector::select_agents;

/// Fixed per-node token estimate used for flow-level budgeting.
const TOKENS_PER_NODE: u64 = 50_000;

/// Flow-level metadata derived from the requirements and the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMetadata {
    pub project_type: ProjectType,
    /// Sum of per-layer maxima, in minutes.
    pub estimated_total_time_mins: u32,
    pub estimated_total_tokens: u64,
    /// Environment variables the generated project will need.
    pub environment: BTreeMap<String, String>,
    /// Names of secrets that must be provisioned, in trigger order.
    pub secrets: Vec<String>,
}

/// The assembled document describing one generated project plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub version: u32,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
    pub metadata: FlowMetadata,
}

/// Plans flows against an explicitly supplied agent catalog.
///
/// One planner per planning session; nothing is shared process-wide.
pub struct FlowPlanner {
    catalog: AgentCatalog,
}

impl FlowPlanner {
    pub fn new(catalog: AgentCatalog) -> Self {
        Self { catalog }
    }

    /// A planner backed by the builtin catalog.
    pub fn builtin() -> Self {
        Self::new(AgentCatalog::builtin())
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    /// Generate a complete flow document: selection → nodes → graph →
    /// metadata. Pure composition; never fails.
    pub fn generate_flow(&self, requirements: &ProjectRequirements) -> Flow {
        let selections = select_agents(requirements);
        let nodes = create_nodes(&selections, requirements, &self.catalog);
        let graph = build_dependency_graph(&nodes);

        let metadata = FlowMetadata {
            project_type: requirements.project_type,
            estimated_total_time_mins: graph.estimated_total_time_mins(),
            estimated_total_tokens: nodes.len() as u64 * TOKENS_PER_NODE,
            environment: derive_environment(requirements),
            secrets: derive_secrets(requirements),
        };

        let now = Utc::now();
        let flow = Flow {
            id: Uuid::new_v4().to_string(),
            version: 1,
            name: derive_name(requirements),
            description: requirements.description.clone(),
            created_at: now,
            modified_at: now,
            nodes,
            edges: graph.edges,
            metadata,
        };

        info!(
            flow_id = %flow.id,
            nodes = flow.nodes.len(),
            edges = flow.edges.len(),
            estimated_mins = flow.metadata.estimated_total_time_mins,
            "Flow generated"
        );
        flow
    }

    /// Rebuild the dependency graph for a flow document. Deterministic with
    /// respect to the flow's node set.
    pub fn graph_for(&self, flow: &Flow) -> DependencyGraph {
        build_dependency_graph(&flow.nodes)
    }
}

/// "{ProjectType} {FirstTech} Application", e.g. "Web React Application".
fn derive_name(req: &ProjectRequirements) -> String {
    let tech = req
        .technology
        .frontend
        .first()
        .or_else(|| req.technology.backend.first());
    let type_name = capitalize(&req.project_type.to_string());
    match tech {
        Some(tech) => format!("{} {} Application", type_name, capitalize(tech)),
        None => format!("{} Application", type_name),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn uses_database(req: &ProjectRequirements) -> bool {
    req.has_feature("database") || !req.technology.database.is_empty()
}

fn derive_environment(req: &ProjectRequirements) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    if req.has_feature("authentication") {
        env.insert("AUTH_SECRET".into(), "generate-a-secure-secret".into());
        env.insert("NEXTAUTH_URL".into(), "http://localhost:3000".into());
    }
    if uses_database(req) {
        env.insert(
            "DATABASE_URL".into(),
            "postgresql://localhost:5432/app".into(),
        );
    }
    env
}

fn derive_secrets(req: &ProjectRequirements) -> Vec<String> {
    let mut secrets: Vec<String> = Vec::new();
    if req.has_feature("authentication") {
        secrets.push("AUTH_SECRET".into());
        secrets.push("JWT_SECRET".into());
    }
    if req.has_feature("payment") {
        secrets.push("STRIPE_SECRET_KEY".into());
        secrets.push("PAYMENT_API_KEY".into());
    }
    if uses_database(req) {
        secrets.push("DATABASE_URL".into());
        secrets.push("DB_PASSWORD".into());
    }
    if req.has_feature("api") {
        secrets.push("API_KEY".into());
        secrets.push("API_SECRET".into());
    }
    secrets
}
