//! Core domain types for the strategy orchestration core.
//!
//! This crate holds only data: the step/graph model (§3), the error taxonomy
//! (§7), the delegation plan and task result shapes consumed by the
//! scheduler, the turn event catalog, and parameter normalization. No
//! behavior that mutates a graph lives here — see `strategy-graph`.

mod chat;
mod delegation;
mod error;
mod event;
mod ids;
mod model;
mod param;

pub use chat::{sanitize_for_subagent, ChatMessage, ChatRole};
pub use delegation::{DelegationPlan, PlanNode, TaskNotes, TaskResult};
pub use error::{Error, ErrorCode, Result};
pub use event::{Event, EventType};
pub use ids::{GraphId, StepId};
pub use model::{
    Attachment, ColocationParams, Edge, EdgeKind, Operator, StepKind, StepNode, StepPatch,
    StrategySnapshot,
};
pub use param::normalize_param_value;
