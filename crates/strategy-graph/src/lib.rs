//! The in-memory strategy DAG: step invariants, undo history, and snapshot
//! serialization (C1), plus the per-conversation session facade that owns a
//! set of graphs (C7).

mod graph;
mod metadata;
mod session;

pub use graph::{StrategyGraph, DEFAULT_HISTORY_CAPACITY};
pub use metadata::StrategyMetadata;
pub use session::StrategySession;

/// Everything needed to call [`StrategyGraph::add_step`] except the id,
/// which the graph assigns. Mirrors "fully-populated StepNode without id"
/// from the operation contract.
#[derive(Debug, Clone, Default)]
pub struct NewStep {
    pub search_name: Option<String>,
    pub parameters: std::collections::BTreeMap<String, String>,
    pub primary_input: Option<strategy_types::StepId>,
    pub secondary_input: Option<strategy_types::StepId>,
    pub operator: Option<strategy_types::Operator>,
    pub colocation_params: Option<strategy_types::ColocationParams>,
    pub display_name: Option<String>,
    pub filters: Vec<strategy_types::Attachment>,
    pub analyses: Vec<strategy_types::Attachment>,
    pub reports: Vec<strategy_types::Attachment>,
}

impl NewStep {
    pub fn leaf(search_name: impl Into<String>) -> Self {
        Self {
            search_name: Some(search_name.into()),
            ..Default::default()
        }
    }

    pub fn transform(search_name: impl Into<String>, primary_input: strategy_types::StepId) -> Self {
        Self {
            search_name: Some(search_name.into()),
            primary_input: Some(primary_input),
            ..Default::default()
        }
    }

    pub fn combine(
        primary_input: strategy_types::StepId,
        secondary_input: strategy_types::StepId,
        operator: strategy_types::Operator,
    ) -> Self {
        Self {
            primary_input: Some(primary_input),
            secondary_input: Some(secondary_input),
            operator: Some(operator),
            ..Default::default()
        }
    }

    pub fn with_parameters(mut self, parameters: std::collections::BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}
