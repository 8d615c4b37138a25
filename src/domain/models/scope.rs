//! Scope domain model.
//!
//! The structured project description extracted from a free-text request.
//! The planner consumes this; the whole record is stored on the swarm as
//! metadata.

use serde::{Deserialize, Serialize};

/// Technology selections for the project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechStack {
    #[serde(default)]
    pub frontend: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub auth: String,
    #[serde(default)]
    pub deployment: String,
}

/// Delivery boundaries and tracking artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeOfWorks {
    #[serde(default)]
    pub in_scope: Vec<String>,
    #[serde(default)]
    pub out_scope: Vec<String>,
    #[serde(default)]
    pub milestones: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub kpis: Vec<String>,
}

/// Size estimates used by the complexity score. The extractor asks the LLM
/// for these; anything missing is derived from the feature count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeEstimates {
    #[serde(default)]
    pub integrations: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub models: u32,
    #[serde(default)]
    pub endpoints: u32,
}

impl ScopeEstimates {
    /// Fill zero fields from the feature count.
    pub fn backfill_from_features(&mut self, feature_count: u32) {
        if self.pages == 0 {
            self.pages = feature_count.max(1);
        }
        if self.models == 0 {
            self.models = (feature_count / 2).max(1);
        }
        if self.endpoints == 0 {
            self.endpoints = self.models * 2;
        }
    }
}

/// Result of nearest-neighbor stack inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackInference {
    pub backend: String,
    pub frontend: String,
    pub database: String,
    /// Confidence in [0, 1]; the matched cosine similarity when a template
    /// was accepted, the LLM's self-report otherwise
    pub confidence: f64,
    /// Title of the matched template, when one was accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_title: Option<String>,
    /// Whether the LLM fallback produced this result
    pub fallback: bool,
}

impl StackInference {
    /// Conservative default used when even embedding fails. The pipeline
    /// never halts on stack inference.
    pub fn conservative_default() -> Self {
        Self {
            backend: "FastAPI".to_string(),
            frontend: "React".to_string(),
            database: "PostgreSQL".to_string(),
            confidence: 0.0,
            template_title: None,
            fallback: true,
        }
    }
}

/// The structured project description driving a swarm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub tech_stack: TechStack,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(default)]
    pub timeline: String,
    #[serde(default)]
    pub scope_of_works: ScopeOfWorks,
    #[serde(default)]
    pub estimates: ScopeEstimates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_inference: Option<StackInference>,
}

impl Scope {
    /// One-paragraph summary handed to agents as execution context.
    pub fn summary(&self) -> String {
        let stack = self
            .stack_inference
            .as_ref()
            .map(|s| format!("{} / {} / {}", s.frontend, s.backend, s.database))
            .unwrap_or_else(|| {
                format!(
                    "{} / {} / {}",
                    self.tech_stack.frontend, self.tech_stack.backend, self.tech_stack.database
                )
            });
        format!(
            "{}: {} (stack: {}; features: {})",
            self.project_name,
            self.goal,
            stack,
            self.features.join(", ")
        )
    }
}
