//! Scripted test doubles for the strategy orchestration core: a
//! `SubAgent`, a `PlatformClient`, an `EventSink`, and a `ConversationStore`,
//! so integration tests can drive a whole turn without a live platform or
//! LLM behind it.

mod conversation_store;
mod event_sink;
mod platform;
mod sub_agent;

pub use conversation_store::InMemoryConversationStore;
pub use event_sink::{NullEventSink, RecordingEventSink};
pub use platform::ScriptedPlatformClient;
pub use sub_agent::ScriptedSubAgent;
