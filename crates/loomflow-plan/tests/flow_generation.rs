//! End-to-end planning tests: requirements in, versioned flow document out.

use std::collections::HashSet;

use loomflow_core::types::{
    AgentCategory, NodeStatus, Preferences, ProjectRequirements, ProjectType, ReviewMode,
    TechnologyStack, TestingLevel,
};
use loomflow_plan::FlowPlanner;

fn full_stack_requirements() -> ProjectRequirements {
    ProjectRequirements {
        description: "Online storefront with user accounts".into(),
        project_type: ProjectType::Web,
        technology: TechnologyStack {
            frontend: vec!["react".into()],
            backend: vec!["nodejs".into()],
            ..Default::default()
        },
        features: vec!["database".into(), "authentication".into(), "api".into()],
        preferences: Preferences {
            testing: TestingLevel::Basic,
            review: ReviewMode::Manual,
            deployment: true,
        },
    }
}

fn agent_ids(flow: &loomflow_plan::Flow) -> Vec<&str> {
    flow.nodes.iter().map(|n| n.agent_id.as_str()).collect()
}

#[test]
fn full_stack_flow_covers_every_category() {
    let planner = FlowPlanner::builtin();
    let flow = planner.generate_flow(&full_stack_requirements());
    let ids = agent_ids(&flow);

    for expected in [
        "react-setup",
        "react-developer",
        "nodejs-developer",
        "database-developer",
        "api-developer",
        "jest-tester",
        "cypress-e2e",
        "git-integrator",
        "api-integrator",
        "database-migrator",
        "docker-builder",
        "cicd-integrator",
        "manual-reviewer",
        "security-reviewer",
        "deployment-manager",
        "project-summarizer",
    ] {
        assert!(ids.contains(&expected), "missing agent {expected}");
    }

    assert_eq!(flow.name, "Web React Application");
    assert_eq!(flow.version, 1);
    assert!(flow.metadata.environment.contains_key("AUTH_SECRET"));
    assert!(flow.metadata.environment.contains_key("DATABASE_URL"));
    assert_eq!(
        flow.metadata.secrets,
        vec![
            "AUTH_SECRET",
            "JWT_SECRET",
            "DATABASE_URL",
            "DB_PASSWORD",
            "API_KEY",
            "API_SECRET"
        ]
    );
}

#[test]
fn node_ids_are_sequential_and_unique() {
    let planner = FlowPlanner::builtin();
    let flow = planner.generate_flow(&full_stack_requirements());

    for (i, node) in flow.nodes.iter().enumerate() {
        assert_eq!(node.id, format!("node-{}", i + 1));
        assert_eq!(node.status, NodeStatus::Pending);
    }
    let unique: HashSet<&str> = flow.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(unique.len(), flow.nodes.len());
}

#[test]
fn edges_reference_existing_nodes_and_form_a_dag() {
    let planner = FlowPlanner::builtin();
    let flow = planner.generate_flow(&full_stack_requirements());
    let graph = planner.graph_for(&flow);

    let known: HashSet<&str> = flow.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &flow.edges {
        assert!(known.contains(edge.source.as_str()), "dangling {}", edge.id);
        assert!(known.contains(edge.target.as_str()), "dangling {}", edge.id);
    }

    graph.validate().unwrap();
    assert!(graph.is_acyclic());
}

#[test]
fn planning_is_deterministic() {
    let planner = FlowPlanner::builtin();
    let req = full_stack_requirements();
    let a = planner.generate_flow(&req);
    let b = planner.generate_flow(&req);

    assert_eq!(agent_ids(&a), agent_ids(&b));
    assert_eq!(a.edges, b.edges);
    assert_eq!(a.metadata, b.metadata);
    // Only the uuid differs.
    assert_ne!(a.id, b.id);
}

#[test]
fn critical_path_takes_one_node_per_layer() {
    let planner = FlowPlanner::builtin();
    let flow = planner.generate_flow(&full_stack_requirements());
    let graph = planner.graph_for(&flow);

    assert_eq!(graph.critical_path.len(), graph.layers.len());
    for (node_id, layer) in graph.critical_path.iter().zip(&graph.layers) {
        assert!(layer.node_ids.contains(node_id));
    }
    assert_eq!(
        flow.metadata.estimated_total_time_mins,
        graph.estimated_total_time_mins()
    );
}

#[test]
fn testing_none_yields_no_testing_layer() {
    let mut req = full_stack_requirements();
    req.preferences.testing = TestingLevel::None;
    let planner = FlowPlanner::builtin();
    let flow = planner.generate_flow(&req);
    let graph = planner.graph_for(&flow);

    assert!(flow
        .nodes
        .iter()
        .all(|n| n.category != AgentCategory::Testing));
    assert!(graph
        .layers
        .iter()
        .all(|l| l.category != AgentCategory::Testing));
}

#[test]
fn empty_requirements_still_produce_a_runnable_flow() {
    // Defaults: fallback setup, no execution agents, basic testing, git
    // integration, a summarizer. Setup must chain straight to testing.
    let planner = FlowPlanner::builtin();
    let flow = planner.generate_flow(&ProjectRequirements::default());
    let graph = planner.graph_for(&flow);

    let ids = agent_ids(&flow);
    assert!(ids.contains(&"react-setup"));
    assert!(ids.contains(&"project-summarizer"));
    assert!(flow
        .nodes
        .iter()
        .all(|n| n.category != AgentCategory::Execution));

    let setup_id = &flow
        .nodes
        .iter()
        .find(|n| n.category == AgentCategory::Setup)
        .unwrap()
        .id;
    let setup_targets: Vec<&str> = flow
        .edges
        .iter()
        .filter(|e| &e.source == setup_id)
        .map(|e| e.target.as_str())
        .collect();
    for tester in flow
        .nodes
        .iter()
        .filter(|n| n.category == AgentCategory::Testing)
    {
        assert!(setup_targets.contains(&tester.id.as_str()));
    }

    // setup 10 + max(jest 15, cypress 20) + git 15 + summarizer 5
    assert_eq!(flow.metadata.estimated_total_time_mins, 50);
    assert!(graph.is_acyclic());
}

#[test]
fn flow_document_round_trips_through_json() {
    let planner = FlowPlanner::builtin();
    let flow = planner.generate_flow(&full_stack_requirements());

    let json = serde_json::to_string_pretty(&flow).unwrap();
    let restored: loomflow_plan::Flow = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.id, flow.id);
    assert_eq!(agent_ids(&restored), agent_ids(&flow));
    assert_eq!(restored.edges, flow.edges);
    assert_eq!(restored.metadata, flow.metadata);

    // Wire casing is lowercase for enums.
    assert!(json.contains("\"status\": \"pending\""));
    assert!(json.contains("\"category\": \"setup\""));
    assert!(json.contains("\"type\": \"success\""));
}

#[test]
fn review_manual_gates_developer_nodes() {
    let flow = FlowPlanner::builtin().generate_flow(&full_stack_requirements());
    let gated: Vec<&str> = flow
        .nodes
        .iter()
        .filter(|n| n.config.requires_review)
        .map(|n| n.agent_id.as_str())
        .collect();

    assert!(gated.contains(&"react-developer"));
    assert!(gated.contains(&"nodejs-developer"));
    // Setup and utility nodes are never review-gated here.
    assert!(!gated.contains(&"react-setup"));
    assert!(!gated.contains(&"project-summarizer"));
}
