//! Turn Event Pipeline (C6) and the public facade over the orchestration
//! core: SSE framing, conversation-store contract, and a thin `Client`
//! wrapping the graph/runtime/platform layers underneath.

mod client;
mod pipeline;
mod sse;
mod store;

pub use client::{Client, TurnHandle};
pub use pipeline::{TurnEventPipeline, THINKING_FLUSH_INTERVAL};
pub use sse::format_sse_frame;
pub use store::{
    AssistantMessageRecord, ConversationRecord, ConversationStore, PlanRecord, StrategyLinkPayload,
    SubkaniCallRecord, ThinkingPayload, ToolCallRecord,
};
