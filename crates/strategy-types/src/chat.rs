use serde::{Deserialize, Serialize};

/// Role of a [`ChatMessage`] in a conversation turn. Only plain
/// user/assistant content crosses the parent/sub-agent boundary — see
/// [`sanitize_for_subagent`] (§4.4 "History sanitization", §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Strip tool-call framing before handing history to a sub-agent, keeping
/// only plain content-only turns (§4.4, §9 "Tool-call plumbing across
/// agent/sub-agent boundaries"). Plain `ChatMessage` never carries tool-call
/// framing in the first place, so in this model sanitization is the
/// identity function over a list that has already lost that framing —
/// callers that bridge from a richer upstream message type are the ones
/// responsible for filtering before constructing `ChatMessage`s at all.
pub fn sanitize_for_subagent(history: &[ChatMessage]) -> Vec<ChatMessage> {
    history.to_vec()
}
