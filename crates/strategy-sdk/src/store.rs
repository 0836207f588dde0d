use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strategy_types::{GraphId, Result, StrategySnapshot};

/// A single normalized tool call, keyed by its call id (§4.6 `toolCallsById`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub args: Value,
    pub result: Option<Value>,
}

/// One round of sub-kani activity for a named task (§4.6 `subkaniCalls`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubkaniCallRecord {
    pub task: String,
    pub status: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Canonicalized plan metadata for one graph (§4.6 `latestPlans`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub plan: Value,
    pub name: Option<String>,
    pub record_type: Option<String>,
    pub description: Option<String>,
}

/// One persisted assistant turn, with its tool trace attached only to the
/// last message of a turn (§4.6 finalization step 4).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssistantMessageRecord {
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub subkani_activity: Vec<SubkaniCallRecord>,
}

/// The coalesced "thinking" payload persisted at most every 2s (§4.6, P9).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ThinkingPayload {
    pub tool_calls: Vec<ToolCallRecord>,
    pub subkani_calls: Vec<SubkaniCallRecord>,
}

/// Buffered `strategy_link` payload, released at finalization once a
/// `strategySnapshotId` is known (§4.6 finalization step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyLinkPayload {
    pub graph_id: GraphId,
    pub external_strategy_id: Option<i64>,
    pub data: Value,
}

/// Current persisted state for one conversation/strategy (§6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub strategy_id: String,
    pub messages: Vec<AssistantMessageRecord>,
    pub plans: std::collections::BTreeMap<GraphId, PlanRecord>,
    pub snapshots: std::collections::BTreeMap<GraphId, StrategySnapshot>,
    pub thinking: Option<ThinkingPayload>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ConversationRecord {
    fn default() -> Self {
        Self {
            strategy_id: String::new(),
            messages: Vec::new(),
            plans: std::collections::BTreeMap::new(),
            snapshots: std::collections::BTreeMap::new(),
            thinking: None,
            updated_at: Utc::now(),
        }
    }
}

/// Repository the pipeline persists turn state through (§6.4). The storage
/// technology is out of scope; this is only the contract the pipeline
/// depends on.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, strategy_id: &str) -> Result<Option<ConversationRecord>>;
    async fn create(&self, strategy_id: &str) -> Result<ConversationRecord>;
    async fn update(&self, strategy_id: &str, record: ConversationRecord) -> Result<()>;
    async fn append_message(&self, strategy_id: &str, message: AssistantMessageRecord) -> Result<()>;
    async fn update_thinking(&self, strategy_id: &str, payload: ThinkingPayload) -> Result<()>;
    async fn clear_thinking(&self, strategy_id: &str) -> Result<()>;
}
