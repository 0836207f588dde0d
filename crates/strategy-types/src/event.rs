use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The discriminant of a streamed turn event (§3 "Event", event catalog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MessageStart,
    AssistantMessage,
    ToolCallStart,
    ToolCallEnd,
    SubkaniTaskStart,
    SubkaniToolCallStart,
    SubkaniToolCallEnd,
    SubkaniTaskEnd,
    SubkaniTaskRetry,
    StrategyUpdate,
    GraphSnapshot,
    GraphPlan,
    GraphCleared,
    GraphDeleted,
    StrategyLink,
    StrategyMeta,
    PlanningArtifact,
    Citations,
    Reasoning,
    PlanUpdate,
    ExecutorBuildRequest,
    Error,
    MessageEnd,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MessageStart => "message_start",
            EventType::AssistantMessage => "assistant_message",
            EventType::ToolCallStart => "tool_call_start",
            EventType::ToolCallEnd => "tool_call_end",
            EventType::SubkaniTaskStart => "subkani_task_start",
            EventType::SubkaniToolCallStart => "subkani_tool_call_start",
            EventType::SubkaniToolCallEnd => "subkani_tool_call_end",
            EventType::SubkaniTaskEnd => "subkani_task_end",
            EventType::SubkaniTaskRetry => "subkani_task_retry",
            EventType::StrategyUpdate => "strategy_update",
            EventType::GraphSnapshot => "graph_snapshot",
            EventType::GraphPlan => "graph_plan",
            EventType::GraphCleared => "graph_cleared",
            EventType::GraphDeleted => "graph_deleted",
            EventType::StrategyLink => "strategy_link",
            EventType::StrategyMeta => "strategy_meta",
            EventType::PlanningArtifact => "planning_artifact",
            EventType::Citations => "citations",
            EventType::Reasoning => "reasoning",
            EventType::PlanUpdate => "plan_update",
            EventType::ExecutorBuildRequest => "executor_build_request",
            EventType::Error => "error",
            EventType::MessageEnd => "message_end",
        }
    }
}

/// A discriminated turn event: a type tag plus a type-specific JSON payload.
///
/// The payload stays `serde_json::Value` rather than a per-variant struct
/// because the Turn Event Pipeline (C6) is explicitly a pass-through/coalescing
/// layer (§4.6) — it reads a handful of well-known keys out of whatever shape
/// the producing tool call built (mirroring `tool_result_to_events` in the
/// original chatbot service, which works off a loosely-typed dict) rather than
/// owning a closed schema for every tool's result shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: Value,
}

impl Event {
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self { event_type, data }
    }
}
