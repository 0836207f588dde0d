use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::StepId;
use crate::model::Operator;

/// A single node of a `DelegationPlan` (§3). `dependsOn` is modeled as a
/// sibling field on both variants since the scheduler (§4.5) needs it
/// regardless of kind; the `kind`-specific fields live inside the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanNode {
    Task {
        id: String,
        #[serde(default)]
        depends_on: Vec<String>,
        task: String,
        #[serde(default)]
        hint: Option<String>,
        #[serde(default)]
        context: Option<Value>,
    },
    Combine {
        id: String,
        #[serde(default)]
        depends_on: Vec<String>,
        /// Ids of other plan nodes (task or combine) to fold together.
        inputs: Vec<String>,
        operator: Operator,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        upstream: Option<i64>,
        #[serde(default)]
        downstream: Option<i64>,
    },
}

impl PlanNode {
    pub fn id(&self) -> &str {
        match self {
            PlanNode::Task { id, .. } => id,
            PlanNode::Combine { id, .. } => id,
        }
    }

    pub fn depends_on(&self) -> &[String] {
        match self {
            PlanNode::Task { depends_on, .. } => depends_on,
            PlanNode::Combine { depends_on, .. } => depends_on,
        }
    }
}

/// Flat list of nodes produced by the planner (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelegationPlan {
    pub nodes: Vec<PlanNode>,
}

/// Outcome classification for a completed `TaskResult` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskNotes {
    Created,
    Timeout,
    NoSteps,
}

/// Output of the Sub-task Runner (§3) or a materialized combine node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: String,
    pub task: String,
    pub kind: PlanNodeKind,
    pub steps: Vec<StepId>,
    pub subtree_root: Option<StepId>,
    pub notes: TaskNotes,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Set when a round created steps but didn't produce exactly one new
    /// subtree root (`orchestrator.py::run_subkani_task`'s "Sub-kani
    /// subtree-root contract violation" warning). Non-fatal: the task still
    /// reports `Created`, this just flags the shape for a caller that cares.
    #[serde(default)]
    pub contract_violation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanNodeKind {
    Task,
    Combine,
}
