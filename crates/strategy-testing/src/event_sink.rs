use async_trait::async_trait;
use strategy_runtime::EventSink;
use strategy_types::Event;
use tokio::sync::Mutex;

/// An [`EventSink`] that drops every event. For tests that only care about
/// the graph/result side effects of a round.
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn emit(&self, _event: Event) {}
}

/// An [`EventSink`] that records every event in arrival order, so tests can
/// assert on the sequence a turn emitted (§4.6, S6).
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: Event) {
        self.events.lock().await.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strategy_types::EventType;

    #[tokio::test]
    async fn records_events_in_order() {
        let sink = RecordingEventSink::new();
        sink.emit(Event::new(EventType::ToolCallStart, json!({"id": "1"}))).await;
        sink.emit(Event::new(EventType::ToolCallEnd, json!({"id": "1"}))).await;
        let recorded = sink.events().await;
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].event_type, EventType::ToolCallStart);
        assert_eq!(recorded[1].event_type, EventType::ToolCallEnd);
    }
}
