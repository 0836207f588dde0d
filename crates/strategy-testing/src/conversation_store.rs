use std::collections::BTreeMap;

use async_trait::async_trait;
use strategy_sdk::{AssistantMessageRecord, ConversationRecord, ConversationStore, ThinkingPayload};
use strategy_types::Result;
use tokio::sync::Mutex;

/// An in-process [`ConversationStore`] backed by a `BTreeMap`, standing in
/// for whatever durable storage a deployment would wire up (§6.4).
#[derive(Default)]
pub struct InMemoryConversationStore {
    records: Mutex<BTreeMap<String, ConversationRecord>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, strategy_id: &str) -> Result<Option<ConversationRecord>> {
        Ok(self.records.lock().await.get(strategy_id).cloned())
    }

    async fn create(&self, strategy_id: &str) -> Result<ConversationRecord> {
        let record = ConversationRecord {
            strategy_id: strategy_id.to_string(),
            ..ConversationRecord::default()
        };
        self.records
            .lock()
            .await
            .insert(strategy_id.to_string(), record.clone());
        Ok(record)
    }

    async fn update(&self, strategy_id: &str, record: ConversationRecord) -> Result<()> {
        self.records.lock().await.insert(strategy_id.to_string(), record);
        Ok(())
    }

    async fn append_message(&self, strategy_id: &str, message: AssistantMessageRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records.entry(strategy_id.to_string()).or_insert_with(|| ConversationRecord {
            strategy_id: strategy_id.to_string(),
            ..ConversationRecord::default()
        });
        record.messages.push(message);
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_thinking(&self, strategy_id: &str, payload: ThinkingPayload) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records.entry(strategy_id.to_string()).or_insert_with(|| ConversationRecord {
            strategy_id: strategy_id.to_string(),
            ..ConversationRecord::default()
        });
        record.thinking = Some(payload);
        Ok(())
    }

    async fn clear_thinking(&self, strategy_id: &str) -> Result<()> {
        if let Some(record) = self.records.lock().await.get_mut(strategy_id) {
            record.thinking = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryConversationStore::new();
        store.create("s1").await.unwrap();
        let record = store.get("s1").await.unwrap().unwrap();
        assert_eq!(record.strategy_id, "s1");
    }

    #[tokio::test]
    async fn append_message_accumulates_in_order() {
        let store = InMemoryConversationStore::new();
        store.create("s1").await.unwrap();
        store
            .append_message("s1", AssistantMessageRecord { content: "a".into(), ..Default::default() })
            .await
            .unwrap();
        store
            .append_message("s1", AssistantMessageRecord { content: "b".into(), ..Default::default() })
            .await
            .unwrap();
        let record = store.get("s1").await.unwrap().unwrap();
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.messages[0].content, "a");
        assert_eq!(record.messages[1].content, "b");
    }

    #[tokio::test]
    async fn clear_thinking_is_a_noop_for_unknown_strategy() {
        let store = InMemoryConversationStore::new();
        assert!(store.clear_thinking("missing").await.is_ok());
    }
}
