use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use strategy_types::{Event, EventType, GraphId, StepId};
use tokio::sync::Mutex;

use crate::sse::format_sse_frame;
use crate::store::{
    AssistantMessageRecord, ConversationStore, PlanRecord, StrategyLinkPayload, SubkaniCallRecord,
    ThinkingPayload, ToolCallRecord,
};

/// Minimum interval between `updateThinking` store writes (§4.6 "Thinking
/// coalescing", P9). The final flush at finalization is exempt.
pub const THINKING_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct PipelineState {
    assistant_messages: Vec<String>,
    tool_call_order: Vec<String>,
    tool_calls_by_id: BTreeMap<String, ToolCallRecord>,
    subkani_calls: BTreeMap<String, Vec<SubkaniCallRecord>>,
    subkani_status: BTreeMap<String, String>,
    latest_plans: BTreeMap<GraphId, PlanRecord>,
    latest_graph_snapshots: BTreeMap<GraphId, strategy_types::StrategySnapshot>,
    pending_strategy_link: BTreeMap<GraphId, StrategyLinkPayload>,
    seen_strategy_updates: HashSet<StepId>,
    thinking_dirty: bool,
    last_thinking_flush: Option<Instant>,
}

impl PipelineState {
    fn thinking_snapshot(&self) -> ThinkingPayload {
        ThinkingPayload {
            tool_calls: self
                .tool_call_order
                .iter()
                .filter_map(|id| self.tool_calls_by_id.get(id).cloned())
                .collect(),
            subkani_calls: self.subkani_calls.values().flatten().cloned().collect(),
        }
    }
}

/// Converts one turn's event stream into SSE frames plus persisted
/// conversation state (§4.6 C6). One pipeline instance is owned by exactly
/// one turn (§5 "Shared-resource discipline").
pub struct TurnEventPipeline {
    strategy_id: String,
    auth_token: String,
    store: Arc<dyn ConversationStore>,
    state: Mutex<PipelineState>,
}

impl TurnEventPipeline {
    pub fn new(strategy_id: impl Into<String>, auth_token: impl Into<String>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            auth_token: auth_token.into(),
            store,
            state: Mutex::new(PipelineState::default()),
        }
    }

    /// Process one event, returning the SSE frame(s) it produces (empty for
    /// events that only update internal state, e.g. a deduplicated
    /// `strategy_update`).
    pub async fn on_event(&self, event: Event) -> Vec<String> {
        match event.event_type {
            EventType::MessageStart => self.on_message_start().await,
            EventType::AssistantMessage => self.on_assistant_message(event.data).await,
            EventType::GraphSnapshot => self.on_graph_snapshot(event.data).await,
            EventType::GraphPlan => self.on_graph_plan(event.data).await,
            EventType::GraphCleared => self.on_graph_cleared(event.data).await,
            EventType::GraphDeleted => self.on_graph_deleted(event.data).await,
            EventType::ToolCallStart | EventType::SubkaniToolCallStart => {
                self.on_tool_call_start(event.event_type, event.data).await
            }
            EventType::ToolCallEnd | EventType::SubkaniToolCallEnd => {
                self.on_tool_call_end(event.event_type, event.data).await
            }
            EventType::SubkaniTaskStart | EventType::SubkaniTaskEnd | EventType::SubkaniTaskRetry => {
                self.on_subkani_task_status(event.event_type, event.data).await
            }
            EventType::StrategyUpdate => self.on_strategy_update(event.data).await,
            EventType::StrategyLink => self.on_strategy_link(event.data).await,
            EventType::Error => vec![format_sse_frame(EventType::Error, &event.data)],
            other => vec![format_sse_frame(other, &event.data)],
        }
    }

    async fn on_message_start(&self) -> Vec<String> {
        let payload = json!({
            "strategyId": self.strategy_id,
            "authToken": self.auth_token,
        });
        vec![format_sse_frame(EventType::MessageStart, &payload)]
    }

    async fn on_assistant_message(&self, data: Value) -> Vec<String> {
        let content = data.get("content").and_then(Value::as_str).unwrap_or_default();
        {
            let mut state = self.state.lock().await;
            state.assistant_messages.push(content.to_string());
        }
        vec![format_sse_frame(EventType::AssistantMessage, &data)]
    }

    fn graph_id_of(data: &Value) -> Option<GraphId> {
        data.get("graphId").and_then(Value::as_str).map(GraphId::new)
    }

    async fn on_graph_snapshot(&self, data: Value) -> Vec<String> {
        if let Some(graph_id) = Self::graph_id_of(&data) {
            if let Ok(snapshot) = serde_json::from_value(data.clone()) {
                let mut state = self.state.lock().await;
                state.latest_graph_snapshots.insert(graph_id, snapshot);
            }
        }
        vec![format_sse_frame(EventType::GraphSnapshot, &data)]
    }

    async fn on_graph_plan(&self, data: Value) -> Vec<String> {
        if let Some(graph_id) = Self::graph_id_of(&data) {
            let record = PlanRecord {
                plan: data.get("plan").cloned().unwrap_or(Value::Null),
                name: data.get("name").and_then(Value::as_str).map(str::to_string),
                record_type: data.get("recordType").and_then(Value::as_str).map(str::to_string),
                description: data.get("description").and_then(Value::as_str).map(str::to_string),
            };
            let mut state = self.state.lock().await;
            state.latest_plans.insert(graph_id, record);
        }
        vec![format_sse_frame(EventType::GraphPlan, &data)]
    }

    async fn on_graph_cleared(&self, data: Value) -> Vec<String> {
        if let Some(graph_id) = Self::graph_id_of(&data) {
            let mut state = self.state.lock().await;
            state.latest_plans.remove(&graph_id);
        }
        vec![format_sse_frame(EventType::GraphCleared, &data)]
    }

    async fn on_graph_deleted(&self, data: Value) -> Vec<String> {
        if let Some(graph_id) = Self::graph_id_of(&data) {
            let mut state = self.state.lock().await;
            if let Some(plan) = state.latest_plans.get_mut(&graph_id) {
                plan.plan = Value::Null;
            }
        }
        vec![format_sse_frame(EventType::GraphDeleted, &data)]
    }

    async fn on_tool_call_start(&self, event_type: EventType, data: Value) -> Vec<String> {
        let id = data.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        let name = data.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        let args = data.get("args").cloned().unwrap_or(Value::Null);
        {
            let mut state = self.state.lock().await;
            state.tool_call_order.push(id.clone());
            state.tool_calls_by_id.insert(
                id.clone(),
                ToolCallRecord { id, name, args, result: None },
            );
            state.thinking_dirty = true;
        }
        vec![format_sse_frame(event_type, &data)]
    }

    async fn on_tool_call_end(&self, event_type: EventType, data: Value) -> Vec<String> {
        let id = data.get("id").and_then(Value::as_str).unwrap_or_default();
        let result = data.get("result").cloned();
        let flush = {
            let mut state = self.state.lock().await;
            if let Some(record) = state.tool_calls_by_id.get_mut(id) {
                record.result = result;
            }
            state.thinking_dirty = true;
            self.maybe_flush_thinking(&mut state, false)
        };
        self.persist_thinking(flush).await;
        vec![format_sse_frame(event_type, &data)]
    }

    async fn on_subkani_task_status(&self, event_type: EventType, data: Value) -> Vec<String> {
        let task = data.get("task").and_then(Value::as_str).unwrap_or_default().to_string();
        let status = match event_type {
            EventType::SubkaniTaskStart => "started",
            EventType::SubkaniTaskEnd => "ended",
            EventType::SubkaniTaskRetry => "retrying",
            _ => "unknown",
        };
        let flush = {
            let mut state = self.state.lock().await;
            state.subkani_status.insert(task.clone(), status.to_string());
            state.subkani_calls.entry(task.clone()).or_default().push(SubkaniCallRecord {
                task,
                status: status.to_string(),
                tool_calls: vec![],
            });
            state.thinking_dirty = true;
            self.maybe_flush_thinking(&mut state, false)
        };
        self.persist_thinking(flush).await;
        vec![format_sse_frame(event_type, &data)]
    }

    async fn on_strategy_update(&self, data: Value) -> Vec<String> {
        let Some(step_id) = data.get("stepId").and_then(Value::as_str).map(StepId::new) else {
            return vec![format_sse_frame(EventType::StrategyUpdate, &data)];
        };
        let mut state = self.state.lock().await;
        if !state.seen_strategy_updates.insert(step_id) {
            return vec![];
        }
        vec![format_sse_frame(EventType::StrategyUpdate, &data)]
    }

    async fn on_strategy_link(&self, data: Value) -> Vec<String> {
        if let Some(graph_id) = Self::graph_id_of(&data) {
            let payload = StrategyLinkPayload {
                graph_id: graph_id.clone(),
                external_strategy_id: data.get("externalStrategyId").and_then(Value::as_i64),
                data: data.clone(),
            };
            let mut state = self.state.lock().await;
            state.pending_strategy_link.insert(graph_id, payload);
        }
        vec![]
    }

    /// §4.6 "Thinking coalescing": returns the payload to persist if
    /// `force` is set or ≥2s elapsed since the last flush and something is
    /// dirty; otherwise `None` and the state stays dirty for next time.
    fn maybe_flush_thinking(&self, state: &mut PipelineState, force: bool) -> Option<ThinkingPayload> {
        if !state.thinking_dirty {
            return None;
        }
        let elapsed_enough = state
            .last_thinking_flush
            .map(|last| last.elapsed() >= THINKING_FLUSH_INTERVAL)
            .unwrap_or(true);
        if !force && !elapsed_enough {
            return None;
        }
        state.thinking_dirty = false;
        state.last_thinking_flush = Some(Instant::now());
        Some(state.thinking_snapshot())
    }

    async fn persist_thinking(&self, payload: Option<ThinkingPayload>) {
        if let Some(payload) = payload {
            let _ = self.store.update_thinking(&self.strategy_id, payload).await;
        }
    }

    /// §4.6 "Finalization": force-flush and clear thinking, inject `"Done."`
    /// when activity happened with no assistant text, persist the turn, and
    /// emit `message_end`.
    pub async fn finalize(&self) -> Vec<String> {
        let (final_payload, messages, plans, pending_links) = {
            let mut state = self.state.lock().await;
            let flush = self.maybe_flush_thinking(&mut state, true);

            if state.assistant_messages.is_empty()
                && (!state.tool_calls_by_id.is_empty() || !state.subkani_calls.is_empty())
            {
                state.assistant_messages.push("Done.".to_string());
            }

            let tool_calls: Vec<ToolCallRecord> = state
                .tool_call_order
                .iter()
                .filter_map(|id| state.tool_calls_by_id.get(id).cloned())
                .collect();
            let subkani_activity: Vec<SubkaniCallRecord> =
                state.subkani_calls.values().flatten().cloned().collect();

            let messages: Vec<AssistantMessageRecord> = state
                .assistant_messages
                .iter()
                .enumerate()
                .map(|(idx, content)| {
                    let is_last = idx + 1 == state.assistant_messages.len();
                    AssistantMessageRecord {
                        content: content.clone(),
                        tool_calls: if is_last { tool_calls.clone() } else { vec![] },
                        subkani_activity: if is_last { subkani_activity.clone() } else { vec![] },
                    }
                })
                .collect();

            let plans = state.latest_plans.clone();
            let pending_links: Vec<StrategyLinkPayload> =
                state.pending_strategy_link.values().cloned().collect();
            state.pending_strategy_link.clear();

            (flush, messages, plans, pending_links)
        };

        self.persist_thinking(final_payload).await;
        let _ = self.store.clear_thinking(&self.strategy_id).await;

        for message in &messages {
            let _ = self.store.append_message(&self.strategy_id, message.clone()).await;
        }

        let mut frames = Vec::new();
        for (graph_id, plan) in &plans {
            frames.push(format_sse_frame(
                EventType::StrategyMeta,
                &json!({ "graphId": graph_id.as_str(), "plan": plan.plan }),
            ));
        }
        for link in &pending_links {
            let mut payload = link.data.clone();
            if let Value::Object(ref mut map) = payload {
                map.insert("strategySnapshotId".to_string(), json!(link.graph_id.as_str()));
            }
            frames.push(format_sse_frame(EventType::StrategyLink, &payload));
        }
        frames.push(format_sse_frame(EventType::MessageEnd, &json!({})));
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ConversationRecord;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingStore {
        appended: StdMutex<Vec<AssistantMessageRecord>>,
        thinking_updates: StdMutex<usize>,
    }

    #[async_trait]
    impl ConversationStore for RecordingStore {
        async fn get(&self, _strategy_id: &str) -> strategy_types::Result<Option<ConversationRecord>> {
            Ok(None)
        }
        async fn create(&self, strategy_id: &str) -> strategy_types::Result<ConversationRecord> {
            Ok(ConversationRecord { strategy_id: strategy_id.to_string(), ..Default::default() })
        }
        async fn update(&self, _strategy_id: &str, _record: ConversationRecord) -> strategy_types::Result<()> {
            Ok(())
        }
        async fn append_message(&self, _strategy_id: &str, message: AssistantMessageRecord) -> strategy_types::Result<()> {
            self.appended.lock().unwrap().push(message);
            Ok(())
        }
        async fn update_thinking(&self, _strategy_id: &str, _payload: ThinkingPayload) -> strategy_types::Result<()> {
            *self.thinking_updates.lock().unwrap() += 1;
            Ok(())
        }
        async fn clear_thinking(&self, _strategy_id: &str) -> strategy_types::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn s6_sse_ordering_and_strategy_update_dedup() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = TurnEventPipeline::new("strat-1", "token", store.clone());

        let mut frames = Vec::new();
        frames.extend(pipeline.on_event(Event::new(EventType::MessageStart, json!({}))).await);
        frames.extend(
            pipeline
                .on_event(Event::new(EventType::ToolCallStart, json!({"id": "1", "name": "search"})))
                .await,
        );
        frames.extend(
            pipeline
                .on_event(Event::new(EventType::StrategyUpdate, json!({"graphId": "g1", "stepId": "s1"})))
                .await,
        );
        frames.extend(
            pipeline
                .on_event(Event::new(EventType::StrategyUpdate, json!({"graphId": "g1", "stepId": "s1"})))
                .await,
        );
        frames.extend(
            pipeline
                .on_event(Event::new(EventType::ToolCallEnd, json!({"id": "1", "result": {"ok": true}})))
                .await,
        );
        frames.extend(
            pipeline
                .on_event(Event::new(EventType::AssistantMessage, json!({"content": "ok"})))
                .await,
        );
        frames.extend(pipeline.finalize().await);

        let strategy_update_count = frames.iter().filter(|f| f.starts_with("event: strategy_update")).count();
        assert_eq!(strategy_update_count, 1);

        assert!(frames.first().unwrap().starts_with("event: message_start"));
        assert!(frames.last().unwrap().starts_with("event: message_end"));

        let appended = store.appended.lock().unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].content, "ok");
        assert_eq!(appended[0].tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn injects_done_when_only_tool_activity_happened() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = TurnEventPipeline::new("strat-1", "token", store.clone());

        pipeline
            .on_event(Event::new(EventType::ToolCallStart, json!({"id": "1", "name": "search"})))
            .await;
        pipeline
            .on_event(Event::new(EventType::ToolCallEnd, json!({"id": "1", "result": {}})))
            .await;
        pipeline.finalize().await;

        let appended = store.appended.lock().unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].content, "Done.");
    }
}
