use serde_json::Value;
use strategy_types::EventType;

/// Render one `Event` as the wire frame §6.2 specifies:
/// `event: <type>\ndata: <json>\n\n`.
pub fn format_sse_frame(event_type: EventType, data: &Value) -> String {
    format!("event: {}\ndata: {}\n\n", event_type.as_str(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frames_end_with_a_blank_line() {
        let frame = format_sse_frame(EventType::MessageEnd, &json!({}));
        assert_eq!(frame, "event: message_end\ndata: {}\n\n");
    }
}
