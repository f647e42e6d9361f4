//! Key namespace of the cache overlay.
//!
//! ```text
//! bin:status:{bin_id}          status snapshot
//! mqtt:message:{topic}         last message per topic
//! analytics:{kind}             dashboard aggregates
//! detection:{bin_id}           last detection result
//! ws:connection:{conn_id}      owner of a live connection
//! ```

pub const STATUS_PREFIX: &str = "bin:status:";
pub const MESSAGE_PREFIX: &str = "mqtt:message:";
pub const ANALYTICS_PREFIX: &str = "analytics:";
pub const DETECTION_PREFIX: &str = "detection:";
pub const CONNECTION_PREFIX: &str = "ws:connection:";

pub fn status_key(entity_id: &str) -> String {
    format!("{STATUS_PREFIX}{entity_id}")
}

pub fn message_key(topic: &str) -> String {
    format!("{MESSAGE_PREFIX}{topic}")
}

pub fn analytics_key(kind: &str) -> String {
    format!("{ANALYTICS_PREFIX}{kind}")
}

pub fn detection_key(entity_id: &str) -> String {
    format!("{DETECTION_PREFIX}{entity_id}")
}

pub fn connection_key(conn_id: &str) -> String {
    format!("{CONNECTION_PREFIX}{conn_id}")
}

/// Pattern matching every status key.
pub fn status_pattern() -> String {
    format!("{}*", glob_escape(STATUS_PREFIX))
}

/// Pattern matching every message topic below `{topic_root}/{entity_id}/`.
pub fn entity_messages_pattern(topic_root: &str, entity_id: &str) -> String {
    format!(
        "{}{}/{}/*",
        glob_escape(MESSAGE_PREFIX),
        glob_escape(topic_root),
        glob_escape(entity_id)
    )
}

/// Escapes glob metacharacters so `text` only matches itself.
pub fn glob_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(status_key("bin-1"), "bin:status:bin-1");
        assert_eq!(message_key("waste_bins/bin-1/fill"), "mqtt:message:waste_bins/bin-1/fill");
        assert_eq!(analytics_key("daily"), "analytics:daily");
        assert_eq!(detection_key("bin-1"), "detection:bin-1");
        assert_eq!(connection_key("c-9"), "ws:connection:c-9");
    }

    #[test]
    fn test_patterns_escape_ids() {
        assert_eq!(status_pattern(), "bin:status:*");
        assert_eq!(
            entity_messages_pattern("waste_bins", "bin*"),
            "mqtt:message:waste_bins/bin\\*/*"
        );
        assert_eq!(glob_escape("a?[b]\\"), "a\\?\\[b\\]\\\\");
    }
}
