use strategy_types::{GraphId, StepId};

/// Generate a fresh opaque step id.
pub fn new_step_id() -> StepId {
    StepId::new(uuid::Uuid::new_v4().to_string())
}

/// Generate a fresh opaque graph id.
pub fn new_graph_id() -> GraphId {
    GraphId::new(uuid::Uuid::new_v4().to_string())
}
