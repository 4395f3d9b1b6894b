//! Agent selection — maps normalized project requirements to a set of
//! agent ids with a justification and advisory confidence per choice.
//!
//! Each category runs an independent sub-selector; the sub-selectors are
//! additive and never fail. An unmatched category simply contributes no
//! selection. All matching is table-driven so the rules are data, not code.

use tracing::debug;

use loomflow_core::types::{
    AgentSelection, ProjectRequirements, ProjectType, ReviewMode, TestingLevel,
};

/// Setup keyword priority table: first keyword found in the technology
/// lists or description wins.
const SETUP_KEYWORDS: &[(&str, &str)] = &[
    ("next", "nextjs-setup"),
    ("react", "react-setup"),
    ("vue", "vue-setup"),
    ("python", "python-api-setup"),
    ("node", "nodejs-api-setup"),
    ("go", "go-api-setup"),
    ("mobile", "mobile-setup"),
];

const FRONTEND_DEVELOPERS: &[(&str, &str)] = &[
    ("next", "nextjs-developer"),
    ("react", "react-developer"),
    ("vue", "vue-developer"),
];

const BACKEND_DEVELOPERS: &[(&str, &str)] = &[
    ("python", "python-developer"),
    ("node", "nodejs-developer"),
    ("go", "go-developer"),
];

/// Select every agent the requirements call for, in category order.
///
/// Duplicate agent ids (possible because testing triggers are independent)
/// are collapsed to the first occurrence.
pub fn select_agents(requirements: &ProjectRequirements) -> Vec<AgentSelection> {
    let mut selections = Vec::new();

    selections.extend(select_setup(requirements));
    selections.extend(select_execution(requirements));
    selections.extend(select_testing(requirements));
    selections.extend(select_integration(requirements));
    selections.extend(select_review(requirements));
    selections.extend(select_utility(requirements));

    let mut seen = std::collections::HashSet::new();
    selections.retain(|s| seen.insert(s.agent_id.clone()));

    debug!(count = selections.len(), "Agent selection complete");
    selections
}

/// Everything keyword matching scans: technology lists plus the free-text
/// description, lowercased.
fn keyword_haystack(req: &ProjectRequirements) -> String {
    let mut parts: Vec<&str> = Vec::new();
    parts.extend(req.technology.frontend.iter().map(String::as_str));
    parts.extend(req.technology.backend.iter().map(String::as_str));
    parts.extend(req.technology.database.iter().map(String::as_str));
    parts.extend(req.technology.testing.iter().map(String::as_str));
    parts.push(&req.description);
    parts.join(" ").to_lowercase()
}

fn select_setup(req: &ProjectRequirements) -> Vec<AgentSelection> {
    let haystack = keyword_haystack(req);

    for (keyword, agent_id) in SETUP_KEYWORDS {
        if haystack.contains(keyword) {
            return vec![AgentSelection::new(
                *agent_id,
                format!("Technology keyword '{keyword}' detected"),
                0.9,
            )];
        }
    }

    // No keyword match: fall back on project type.
    let agent_id = match req.project_type {
        ProjectType::Web | ProjectType::Fullstack => "react-setup",
        ProjectType::Api | ProjectType::Microservice => "nodejs-api-setup",
        ProjectType::Mobile => "mobile-setup",
    };
    vec![AgentSelection::new(
        agent_id,
        format!("Default setup for {} projects", req.project_type),
        0.6,
    )]
}

fn select_execution(req: &ProjectRequirements) -> Vec<AgentSelection> {
    let mut out = Vec::new();

    if let Some((keyword, agent_id)) = first_match(&req.technology.frontend, FRONTEND_DEVELOPERS) {
        out.push(AgentSelection::new(
            agent_id,
            format!("Frontend framework '{keyword}' requested"),
            0.9,
        ));
    }

    if let Some((keyword, agent_id)) = first_match(&req.technology.backend, BACKEND_DEVELOPERS) {
        out.push(AgentSelection::new(
            agent_id,
            format!("Backend language '{keyword}' requested"),
            0.9,
        ));
    }

    if req.has_feature("database") {
        out.push(AgentSelection::new(
            "database-developer",
            "Database feature requested",
            0.85,
        ));
    }

    if req.has_feature("api") {
        out.push(AgentSelection::new(
            "api-developer",
            "API feature requested",
            0.85,
        ));
    }

    if req.has_feature("graphql") || req.description.to_lowercase().contains("graphql") {
        out.push(AgentSelection::new(
            "graphql-developer",
            "GraphQL mentioned in requirements",
            0.8,
        ));
    }

    if req.project_type == ProjectType::Mobile {
        out.push(AgentSelection::new(
            "mobile-developer",
            "Mobile project type",
            0.9,
        ));
    }

    out
}

fn select_testing(req: &ProjectRequirements) -> Vec<AgentSelection> {
    if req.preferences.testing == TestingLevel::None {
        return Vec::new();
    }

    let mut out = Vec::new();

    // Unit tester matched to the detected stack, frontend first.
    let unit = if first_match(&req.technology.frontend, FRONTEND_DEVELOPERS).is_some() {
        ("jest-tester", "Unit tests for the frontend stack")
    } else if tech_contains(&req.technology.backend, "python") {
        ("pytest-tester", "Unit tests for the Python backend")
    } else if tech_contains(&req.technology.backend, "go") {
        ("go-tester", "Unit tests for the Go backend")
    } else {
        ("jest-tester", "Default unit test agent")
    };
    out.push(AgentSelection::new(unit.0, unit.1, 0.85));

    // One e2e agent always: comprehensive (or an explicitly named tool)
    // gets the full browser-driver agent, otherwise the lighter one.
    let comprehensive = req.preferences.testing == TestingLevel::Comprehensive
        || tech_contains(&req.technology.testing, "playwright");
    if comprehensive {
        out.push(AgentSelection::new(
            "playwright-e2e",
            "Comprehensive end-to-end coverage requested",
            0.85,
        ));
    } else {
        out.push(AgentSelection::new(
            "cypress-e2e",
            "Basic end-to-end smoke coverage",
            0.7,
        ));
    }

    // Language-specific test agents fire independently of the unit pick.
    if tech_contains(&req.technology.backend, "go") {
        out.push(AgentSelection::new(
            "go-tester",
            "Go backend detected",
            0.8,
        ));
    }
    if tech_contains(&req.technology.backend, "python") {
        out.push(AgentSelection::new(
            "pytest-tester",
            "Python backend detected",
            0.8,
        ));
    }

    if req.has_feature("performance") {
        out.push(AgentSelection::new(
            "performance-analyzer",
            "Performance feature requested",
            0.8,
        ));
    }

    out
}

fn select_integration(req: &ProjectRequirements) -> Vec<AgentSelection> {
    let mut out = vec![AgentSelection::new(
        "git-integrator",
        "Version control integration",
        1.0,
    )];

    if req.has_feature("api") {
        out.push(AgentSelection::new(
            "api-integrator",
            "API endpoints need wiring",
            0.85,
        ));
    }

    if req.has_feature("database") {
        out.push(AgentSelection::new(
            "database-migrator",
            "Database schema migrations",
            0.85,
        ));
    }

    if req.preferences.deployment {
        out.push(AgentSelection::new(
            "docker-builder",
            "Containerization for deployment",
            0.9,
        ));
        out.push(AgentSelection::new(
            "cicd-integrator",
            "CI/CD pipeline for deployment",
            0.9,
        ));
    }

    out
}

fn select_review(req: &ProjectRequirements) -> Vec<AgentSelection> {
    let mut out = Vec::new();

    if matches!(req.preferences.review, ReviewMode::Manual | ReviewMode::Both) {
        out.push(AgentSelection::new(
            "manual-reviewer",
            "Manual review requested",
            0.9,
        ));
    }
    if matches!(req.preferences.review, ReviewMode::Automated | ReviewMode::Both) {
        out.push(AgentSelection::new(
            "automated-reviewer",
            "Automated review requested",
            0.9,
        ));
    }
    if req.has_feature("security") || req.has_feature("authentication") {
        out.push(AgentSelection::new(
            "security-reviewer",
            "Security-sensitive features present",
            0.9,
        ));
    }

    out
}

fn select_utility(req: &ProjectRequirements) -> Vec<AgentSelection> {
    let mut out = Vec::new();

    if req.has_feature("documentation") {
        out.push(AgentSelection::new(
            "documentation-generator",
            "Documentation requested",
            0.8,
        ));
    }
    if req.preferences.deployment {
        out.push(AgentSelection::new(
            "deployment-manager",
            "Deployment requested",
            0.9,
        ));
    }

    // Every flow ends with a summary, unconditionally.
    out.push(AgentSelection::new(
        "project-summarizer",
        "Summarize generated project",
        1.0,
    ));

    out
}

fn first_match<'a>(techs: &[String], table: &'a [(&str, &str)]) -> Option<(&'a str, &'a str)> {
    for (keyword, agent_id) in table {
        if tech_contains(techs, keyword) {
            return Some((keyword, agent_id));
        }
    }
    None
}

fn tech_contains(techs: &[String], keyword: &str) -> bool {
    techs.iter().any(|t| t.to_lowercase().contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomflow_core::types::{Preferences, TechnologyStack};

    fn react_db_requirements() -> ProjectRequirements {
        ProjectRequirements {
            description: "A small web shop".into(),
            project_type: ProjectType::Web,
            technology: TechnologyStack {
                frontend: vec!["react".into()],
                ..Default::default()
            },
            features: vec!["database".into()],
            preferences: Preferences {
                testing: TestingLevel::Basic,
                ..Default::default()
            },
        }
    }

    fn ids(selections: &[AgentSelection]) -> Vec<&str> {
        selections.iter().map(|s| s.agent_id.as_str()).collect()
    }

    #[test]
    fn test_scenario_react_web_with_database() {
        let selections = select_agents(&react_db_requirements());
        let ids = ids(&selections);

        assert!(ids.contains(&"react-setup"));
        assert!(ids.contains(&"react-developer"));
        assert!(ids.contains(&"database-developer"));
        assert!(ids.contains(&"jest-tester"));
        assert!(ids.contains(&"git-integrator"));
        assert!(ids.contains(&"project-summarizer"));
        assert!(!ids.contains(&"security-reviewer"));
    }

    #[test]
    fn test_testing_none_selects_no_testers() {
        let mut req = react_db_requirements();
        req.preferences.testing = TestingLevel::None;
        let selections = select_agents(&req);
        assert!(!ids(&selections)
            .iter()
            .any(|id| id.contains("tester") || id.contains("e2e")));
    }

    #[test]
    fn test_summarizer_is_unconditional() {
        let selections = select_agents(&ProjectRequirements::default());
        assert!(ids(&selections).contains(&"project-summarizer"));
    }

    #[test]
    fn test_setup_fallback_by_project_type() {
        let req = ProjectRequirements {
            project_type: ProjectType::Microservice,
            ..Default::default()
        };
        let selections = select_setup(&req);
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].agent_id, "nodejs-api-setup");
        assert!(selections[0].confidence < 0.9);
    }

    #[test]
    fn test_comprehensive_testing_picks_playwright() {
        let mut req = react_db_requirements();
        req.preferences.testing = TestingLevel::Comprehensive;
        let selections = select_agents(&req);
        let ids = ids(&selections);
        assert!(ids.contains(&"playwright-e2e"));
        assert!(!ids.contains(&"cypress-e2e"));
    }

    #[test]
    fn test_python_backend_dedupes_pytest() {
        let req = ProjectRequirements {
            project_type: ProjectType::Api,
            technology: TechnologyStack {
                backend: vec!["python".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let selections = select_agents(&req);
        let pytest_count = selections
            .iter()
            .filter(|s| s.agent_id == "pytest-tester")
            .count();
        assert_eq!(pytest_count, 1);
    }

    #[test]
    fn test_deployment_adds_containers_and_cicd() {
        let mut req = react_db_requirements();
        req.preferences.deployment = true;
        let selections = select_agents(&req);
        let ids = ids(&selections);
        assert!(ids.contains(&"docker-builder"));
        assert!(ids.contains(&"cicd-integrator"));
        assert!(ids.contains(&"deployment-manager"));
    }

    #[test]
    fn test_review_both_selects_both_reviewers() {
        let mut req = react_db_requirements();
        req.preferences.review = ReviewMode::Both;
        let selections = select_agents(&req);
        let ids = ids(&selections);
        assert!(ids.contains(&"manual-reviewer"));
        assert!(ids.contains(&"automated-reviewer"));
    }

    #[test]
    fn test_authentication_triggers_security_review() {
        let mut req = react_db_requirements();
        req.features.push("authentication".into());
        assert!(ids(&select_agents(&req)).contains(&"security-reviewer"));
    }
}
