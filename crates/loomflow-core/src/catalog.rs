use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::AgentCategory;

/// A single entry in the agent catalog.
///
/// Descriptors are immutable once loaded; the planning engine only reads
/// them. Resource estimates are coarse (minutes, tokens) and feed the flow
/// metadata, not scheduling decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique agent identifier (hyphenated, e.g. "react-developer").
    pub id: String,
    /// Ordering category for this agent.
    pub category: AgentCategory,
    /// Rough wall-clock estimate in minutes.
    pub estimated_time_mins: u32,
    /// Rough token budget for one run.
    #[serde(default = "default_tokens")]
    pub estimated_tokens: u64,
    /// Hard per-run timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Whether runs of this agent always need a human in the loop.
    #[serde(default)]
    pub requires_review: bool,
    /// Free-form dependency tags used for compatibility matching.
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_tokens() -> u64 {
    50_000
}

fn default_timeout() -> u64 {
    300
}

/// An explicitly constructed, passed-in agent registry.
///
/// Loaded once at the start of a planning session and discarded at the end;
/// never shared process-wide, so concurrent planning sessions stay isolated.
#[derive(Debug, Clone, Default)]
pub struct AgentCatalog {
    agents: HashMap<String, AgentDescriptor>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: Vec<AgentDescriptor>) -> Self {
        let agents = descriptors.into_iter().map(|d| (d.id.clone(), d)).collect();
        Self { agents }
    }

    /// Load descriptors by scanning a directory for `*.json` files.
    ///
    /// Files that fail to parse are skipped with a warning; a missing or
    /// empty directory yields an empty catalog, never an error.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut agents = HashMap::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Catalog directory unreadable, using empty catalog");
                return Ok(Self::default());
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable catalog entry");
                    continue;
                }
            };
            match serde_json::from_str::<AgentDescriptor>(&contents) {
                Ok(descriptor) => {
                    debug!(id = %descriptor.id, path = %path.display(), "Catalog entry loaded");
                    agents.insert(descriptor.id.clone(), descriptor);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unparseable catalog entry");
                }
            }
        }

        Ok(Self { agents })
    }

    /// The builtin catalog covering every agent the selector can emit.
    pub fn builtin() -> Self {
        let mut descriptors = Vec::new();

        let setup = [
            "react-setup",
            "nextjs-setup",
            "vue-setup",
            "python-api-setup",
            "nodejs-api-setup",
            "go-api-setup",
            "mobile-setup",
        ];
        for id in setup {
            descriptors.push(entry(id, AgentCategory::Setup, 10, 600));
        }

        let execution = [
            "react-developer",
            "vue-developer",
            "nextjs-developer",
            "python-developer",
            "nodejs-developer",
            "go-developer",
            "database-developer",
            "api-developer",
            "graphql-developer",
            "mobile-developer",
        ];
        for id in execution {
            descriptors.push(entry(id, AgentCategory::Execution, 30, 300));
        }

        descriptors.push(entry("jest-tester", AgentCategory::Testing, 15, 300));
        descriptors.push(entry("pytest-tester", AgentCategory::Testing, 15, 300));
        descriptors.push(entry("go-tester", AgentCategory::Testing, 15, 300));
        descriptors.push(entry("playwright-e2e", AgentCategory::Testing, 20, 900));
        descriptors.push(entry("cypress-e2e", AgentCategory::Testing, 20, 900));
        descriptors.push(entry("performance-analyzer", AgentCategory::Testing, 25, 1200));

        descriptors.push(entry("git-integrator", AgentCategory::Integration, 15, 300));
        descriptors.push(entry("api-integrator", AgentCategory::Integration, 15, 300));
        descriptors.push(entry("database-migrator", AgentCategory::Integration, 10, 300));
        descriptors.push(entry("docker-builder", AgentCategory::Integration, 15, 600));
        descriptors.push(entry("cicd-integrator", AgentCategory::Integration, 15, 300));

        descriptors.push(entry("manual-reviewer", AgentCategory::Review, 10, 300));
        descriptors.push(entry("automated-reviewer", AgentCategory::Review, 10, 300));
        descriptors.push(entry("security-reviewer", AgentCategory::Review, 10, 300));

        descriptors.push(entry("documentation-generator", AgentCategory::Utility, 10, 300));
        descriptors.push(entry("deployment-manager", AgentCategory::Utility, 20, 300));
        descriptors.push(entry("project-summarizer", AgentCategory::Utility, 5, 300));

        Self::from_descriptors(descriptors)
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentDescriptor> {
        self.agents.get(agent_id)
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.values()
    }
}

fn entry(id: &str, category: AgentCategory, mins: u32, timeout: u64) -> AgentDescriptor {
    let tags = id
        .split('-')
        .next()
        .map(|s| vec![s.to_string()])
        .unwrap_or_default();
    AgentDescriptor {
        id: id.to_string(),
        category,
        estimated_time_mins: mins,
        estimated_tokens: default_tokens(),
        timeout_secs: timeout,
        requires_review: false,
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_summarizer() {
        let catalog = AgentCatalog::builtin();
        let summarizer = catalog.get("project-summarizer").unwrap();
        assert_eq!(summarizer.category, AgentCategory::Utility);
        assert_eq!(summarizer.estimated_time_mins, 5);
    }

    #[test]
    fn test_builtin_categories() {
        let catalog = AgentCatalog::builtin();
        assert!(catalog.len() > 20);
        for category in AgentCategory::ORDER {
            assert!(
                catalog.iter().any(|d| d.category == category),
                "no builtin agent for {category}"
            );
        }
    }

    #[test]
    fn test_descriptor_parse_defaults() {
        let json = r#"{
            "id": "custom-developer",
            "category": "execution",
            "estimated_time_mins": 45
        }"#;
        let descriptor: AgentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.estimated_tokens, 50_000);
        assert_eq!(descriptor.timeout_secs, 300);
        assert!(!descriptor.requires_review);
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("custom.json"),
            r#"{"id":"custom-tester","category":"testing","estimated_time_mins":12}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = AgentCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("custom-tester"));
    }

    #[test]
    fn test_load_dir_skips_unreadable_entries() {
        let dir = tempfile::tempdir().unwrap();
        // A directory with a .json name fails read_to_string but must not
        // abort the scan.
        std::fs::create_dir(dir.path().join("subdir.json")).unwrap();
        std::fs::write(
            dir.path().join("good.json"),
            r#"{"id":"custom-builder","category":"integration","estimated_time_mins":8}"#,
        )
        .unwrap();

        let catalog = AgentCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("custom-builder"));
    }

    #[test]
    fn test_load_missing_dir() {
        let catalog = AgentCatalog::load_dir(Path::new("/nonexistent/loomflow")).unwrap();
        assert!(catalog.is_empty());
    }
}
