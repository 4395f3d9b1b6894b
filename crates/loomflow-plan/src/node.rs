//! Node construction — turns agent selections into flow nodes.
//!
//! The mapping is deterministic and 1:1, preserving selection order. Node
//! ids are sequential across categories. Time and timeout estimates come
//! from ordered substring tables so the policy is data, not code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use loomflow_core::catalog::AgentCatalog;
use loomflow_core::types::{AgentCategory, NodeStatus, ProjectRequirements, ReviewMode};

/// Ordered (substring, minutes) pairs; first match against the agent id
/// wins, default 15.
const TIME_ESTIMATES: &[(&str, u32)] = &[
    ("setup", 10),
    ("developer", 30),
    ("tester", 15),
    ("runner", 10),
    ("e2e", 20),
    ("performance", 25),
    ("integrator", 15),
    ("merger", 5),
    ("migrator", 10),
    ("builder", 15),
    ("review", 10),
    ("documentation", 10),
    ("deployment", 20),
    ("summarizer", 5),
];

const DEFAULT_TIME_MINS: u32 = 15;

/// Coarser timeout table, seconds; default 300.
const TIMEOUTS: &[(&str, u64)] = &[
    ("setup", 600),
    ("e2e", 900),
    ("performance", 1200),
    ("build", 600),
];

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Layout-only canvas position; irrelevant to scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Per-node execution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub retry_on_failure: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub requires_review: bool,
    /// Critical nodes trigger a rollback action on unrecoverable failure.
    #[serde(default)]
    pub critical: bool,
}

fn default_max_retries() -> u32 {
    3
}

/// One unit of agent work within a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    /// `node-<n>`, 1-indexed in creation order.
    pub id: String,
    pub agent_id: String,
    pub category: AgentCategory,
    /// Title-cased from the agent id ("react-developer" → "React Developer").
    pub label: String,
    pub instructions: String,
    /// Category-dependent inputs for the node's external operation.
    pub inputs: HashMap<String, Value>,
    pub position: Position,
    pub config: NodeConfig,
    pub status: NodeStatus,
    pub estimated_time_mins: u32,
}

/// Build flow nodes from selections, preserving selection order.
///
/// The catalog supplies the category for known agents; unknown agents fall
/// back to a substring heuristic with a warning, never an error.
pub fn create_nodes(
    selections: &[loomflow_core::types::AgentSelection],
    requirements: &ProjectRequirements,
    catalog: &AgentCatalog,
) -> Vec<FlowNode> {
    selections
        .iter()
        .enumerate()
        .map(|(i, selection)| {
            let agent_id = selection.agent_id.as_str();
            let category = catalog
                .get(agent_id)
                .map(|d| d.category)
                .unwrap_or_else(|| {
                    let inferred = infer_category(agent_id);
                    warn!(agent_id, category = %inferred, "Agent not in catalog, inferring category");
                    inferred
                });

            FlowNode {
                id: format!("node-{}", i + 1),
                agent_id: agent_id.to_string(),
                category,
                label: derive_label(agent_id),
                instructions: build_instructions(agent_id, requirements),
                inputs: build_inputs(category, requirements),
                position: Position {
                    x: 100.0 + (i % 4) as f64 * 250.0,
                    y: 100.0 + (i / 4) as f64 * 150.0,
                },
                config: NodeConfig {
                    retry_on_failure: true,
                    max_retries: default_max_retries(),
                    timeout_secs: lookup_timeout(agent_id),
                    requires_review: requires_review(agent_id, requirements),
                    critical: false,
                },
                status: NodeStatus::Pending,
                estimated_time_mins: lookup_time(agent_id),
            }
        })
        .collect()
}

/// Split on "-", capitalize each segment, join with spaces.
pub fn derive_label(agent_id: &str) -> String {
    agent_id
        .split('-')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Base line plus optional context lines: technology, then features, then
/// preferences.
fn build_instructions(agent_id: &str, req: &ProjectRequirements) -> String {
    let mut out = format!("Execute {} for project: {}", agent_id, req.description);

    if !req.technology.is_empty() {
        let mut techs = Vec::new();
        techs.extend(req.technology.frontend.iter().cloned());
        techs.extend(req.technology.backend.iter().cloned());
        techs.extend(req.technology.database.iter().cloned());
        techs.extend(req.technology.testing.iter().cloned());
        out.push_str(&format!("\nTechnology stack: {}", techs.join(", ")));
    }

    if !req.features.is_empty() {
        out.push_str(&format!("\nRequired features: {}", req.features.join(", ")));
    }

    out.push_str(&format!(
        "\nPreferences: testing={:?}, review={:?}, deployment={}",
        req.preferences.testing, req.preferences.review, req.preferences.deployment
    ));

    out
}

fn build_inputs(category: AgentCategory, req: &ProjectRequirements) -> HashMap<String, Value> {
    let mut inputs = HashMap::new();
    match category {
        AgentCategory::Setup => {
            inputs.insert(
                "project_name".into(),
                json!(format!("{}-project", req.project_type)),
            );
            inputs.insert(
                "database".into(),
                json!(req.has_feature("database") || !req.technology.database.is_empty()),
            );
            inputs.insert("authentication".into(), json!(req.has_feature("authentication")));
            inputs.insert("testing".into(), json!(req.preferences.testing));
        }
        AgentCategory::Execution => {
            inputs.insert("technology".into(), json!(req.technology));
            inputs.insert("features".into(), json!(req.features));
        }
        AgentCategory::Testing => {
            inputs.insert("level".into(), json!(req.preferences.testing));
        }
        AgentCategory::Integration => {
            inputs.insert("deployment".into(), json!(req.preferences.deployment));
        }
        AgentCategory::Review => {
            inputs.insert("mode".into(), json!(req.preferences.review));
        }
        AgentCategory::Utility => {}
    }
    inputs
}

fn lookup_time(agent_id: &str) -> u32 {
    TIME_ESTIMATES
        .iter()
        .find(|(substr, _)| agent_id.contains(substr))
        .map(|(_, mins)| *mins)
        .unwrap_or(DEFAULT_TIME_MINS)
}

fn lookup_timeout(agent_id: &str) -> u64 {
    TIMEOUTS
        .iter()
        .find(|(substr, _)| agent_id.contains(substr))
        .map(|(_, secs)| *secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

/// A node needs review when manual review was requested and the agent does
/// development or integration work, or when security-sensitive agents run
/// under a security feature flag.
fn requires_review(agent_id: &str, req: &ProjectRequirements) -> bool {
    if req.preferences.review == ReviewMode::Manual
        && (agent_id.contains("developer") || agent_id.contains("integration"))
    {
        return true;
    }
    req.has_feature("security") && (agent_id.contains("auth") || agent_id.contains("payment"))
}

fn infer_category(agent_id: &str) -> AgentCategory {
    if agent_id.contains("setup") {
        AgentCategory::Setup
    } else if agent_id.contains("developer") {
        AgentCategory::Execution
    } else if agent_id.contains("tester") || agent_id.contains("e2e") || agent_id.contains("performance") {
        AgentCategory::Testing
    } else if agent_id.contains("integrator")
        || agent_id.contains("migrator")
        || agent_id.contains("builder")
    {
        AgentCategory::Integration
    } else if agent_id.contains("review") {
        AgentCategory::Review
    } else {
        AgentCategory::Utility
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomflow_core::types::{AgentSelection, TechnologyStack, TestingLevel};

    fn selections(ids: &[&str]) -> Vec<AgentSelection> {
        ids.iter()
            .map(|id| AgentSelection::new(*id, "test", 1.0))
            .collect()
    }

    #[test]
    fn test_label_derivation() {
        assert_eq!(derive_label("react-developer"), "React Developer");
        assert_eq!(derive_label("cicd-integrator"), "Cicd Integrator");
        assert_eq!(derive_label("setup"), "Setup");
    }

    #[test]
    fn test_time_table_first_match_wins() {
        assert_eq!(lookup_time("react-setup"), 10);
        assert_eq!(lookup_time("react-developer"), 30);
        assert_eq!(lookup_time("playwright-e2e"), 20);
        assert_eq!(lookup_time("performance-analyzer"), 25);
        assert_eq!(lookup_time("project-summarizer"), 5);
        assert_eq!(lookup_time("unknown-agent"), 15);
    }

    #[test]
    fn test_timeout_table() {
        assert_eq!(lookup_timeout("react-setup"), 600);
        assert_eq!(lookup_timeout("playwright-e2e"), 900);
        assert_eq!(lookup_timeout("performance-analyzer"), 1200);
        assert_eq!(lookup_timeout("docker-builder"), 600);
        assert_eq!(lookup_timeout("react-developer"), 300);
    }

    #[test]
    fn test_node_ids_sequential() {
        let nodes = create_nodes(
            &selections(&["react-setup", "react-developer", "project-summarizer"]),
            &ProjectRequirements::default(),
            &AgentCatalog::builtin(),
        );
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["node-1", "node-2", "node-3"]);
        assert!(nodes.iter().all(|n| n.status == NodeStatus::Pending));
    }

    #[test]
    fn test_manual_review_flags_developer_nodes() {
        let mut req = ProjectRequirements::default();
        req.preferences.review = ReviewMode::Manual;
        let nodes = create_nodes(
            &selections(&["react-developer", "git-integrator"]),
            &req,
            &AgentCatalog::builtin(),
        );
        assert!(nodes[0].config.requires_review);
        // "git-integrator" does not contain the "integration" substring.
        assert!(!nodes[1].config.requires_review);
    }

    #[test]
    fn test_security_feature_flags_auth_agents() {
        let req = ProjectRequirements {
            features: vec!["security".into()],
            ..Default::default()
        };
        assert!(requires_review("auth-developer", &req));
        assert!(requires_review("payment-integrator", &req));
        assert!(!requires_review("react-developer", &req));
    }

    #[test]
    fn test_instructions_order() {
        let req = ProjectRequirements {
            description: "a shop".into(),
            technology: TechnologyStack {
                frontend: vec!["react".into()],
                ..Default::default()
            },
            features: vec!["api".into()],
            ..Default::default()
        };
        let text = build_instructions("react-developer", &req);
        let tech_at = text.find("Technology stack").unwrap();
        let features_at = text.find("Required features").unwrap();
        let prefs_at = text.find("Preferences").unwrap();
        assert!(text.starts_with("Execute react-developer for project: a shop"));
        assert!(tech_at < features_at && features_at < prefs_at);
    }

    #[test]
    fn test_setup_inputs() {
        let req = ProjectRequirements {
            features: vec!["authentication".into(), "database".into()],
            ..Default::default()
        };
        let inputs = build_inputs(AgentCategory::Setup, &req);
        assert_eq!(inputs["database"], json!(true));
        assert_eq!(inputs["authentication"], json!(true));
        assert_eq!(inputs["testing"], json!(TestingLevel::Basic));
    }

    #[test]
    fn test_unknown_agent_category_inferred() {
        let nodes = create_nodes(
            &selections(&["elixir-developer"]),
            &ProjectRequirements::default(),
            &AgentCatalog::new(),
        );
        assert_eq!(nodes[0].category, AgentCategory::Execution);
    }
}
