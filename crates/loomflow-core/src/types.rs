use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of an agent node. Categories have a fixed total order that
/// drives layering and dependency construction.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentCategory {
    Setup,
    Execution,
    Testing,
    Integration,
    Review,
    Utility,
}

impl AgentCategory {
    /// All categories in layering order.
    pub const ORDER: [AgentCategory; 6] = [
        AgentCategory::Setup,
        AgentCategory::Execution,
        AgentCategory::Testing,
        AgentCategory::Integration,
        AgentCategory::Review,
        AgentCategory::Utility,
    ];
}

impl std::fmt::Display for AgentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Setup => "setup",
            Self::Execution => "execution",
            Self::Testing => "testing",
            Self::Integration => "integration",
            Self::Review => "review",
            Self::Utility => "utility",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle status of a flow node.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Reviewing,
}

/// Kind of project a flow is planned for.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    #[default]
    Web,
    Api,
    Mobile,
    Fullstack,
    Microservice,
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Web => "web",
            Self::Api => "api",
            Self::Mobile => "mobile",
            Self::Fullstack => "fullstack",
            Self::Microservice => "microservice",
        };
        write!(f, "{}", s)
    }
}

/// Technologies named in the planning request, grouped by concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnologyStack {
    #[serde(default)]
    pub frontend: Vec<String>,
    #[serde(default)]
    pub backend: Vec<String>,
    #[serde(default)]
    pub database: Vec<String>,
    #[serde(default)]
    pub testing: Vec<String>,
}

impl TechnologyStack {
    pub fn is_empty(&self) -> bool {
        self.frontend.is_empty()
            && self.backend.is_empty()
            && self.database.is_empty()
            && self.testing.is_empty()
    }
}

/// How much testing the user asked for.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestingLevel {
    None,
    #[default]
    Basic,
    Comprehensive,
}

/// What kind of review gating the user asked for.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMode {
    #[default]
    None,
    Manual,
    Automated,
    Both,
}

/// User preferences that gate whole selector branches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub testing: TestingLevel,
    #[serde(default)]
    pub review: ReviewMode,
    #[serde(default)]
    pub deployment: bool,
}

/// Normalized planning request. All fields default so a sparse request
/// (even `{}`) is still a valid input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectRequirements {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project_type: ProjectType,
    #[serde(default)]
    pub technology: TechnologyStack,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub preferences: Preferences,
}

impl ProjectRequirements {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// One agent chosen by the selector, with a human-readable justification.
/// `confidence` is advisory only — surfaced to users and logs, never gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSelection {
    pub agent_id: String,
    pub reason: String,
    pub confidence: f64,
}

impl AgentSelection {
    pub fn new(agent_id: impl Into<String>, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            reason: reason.into(),
            confidence,
        }
    }
}

/// A single execution status record, suitable for forwarding over any
/// transport to a UI or log collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub node_id: String,
    pub status: NodeStatus,
    /// 0–100, monotonically increasing per node.
    pub progress: u8,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusEvent {
    pub fn new(node_id: impl Into<String>, status: NodeStatus, progress: u8) -> Self {
        Self {
            node_id: node_id.into(),
            status,
            progress,
            timestamp: Utc::now(),
            output: None,
            error: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Decision delivered by an external reviewer for a review-gated node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ReviewDecision {
    Approve,
    RequestChanges { feedback: String },
}

/// Events broadcast to all subscribers during flow execution.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// Flow execution started.
    FlowStarted { flow_id: String },
    /// A node changed status or progress.
    NodeUpdate(StatusEvent),
    /// A review-gated node is waiting for an external decision.
    ReviewRequested { node_id: String },
    /// A review decision was delivered.
    ReviewResolved { node_id: String, approved: bool },
    /// Flow execution finished.
    FlowCompleted {
        flow_id: String,
        success: bool,
        duration_ms: u64,
    },
}
