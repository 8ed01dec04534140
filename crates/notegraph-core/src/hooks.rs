//! Outbound host→UI encoding. Every message to the UI is a call to one of
//! the well-known global hooks with a JSON payload; the payload must survive
//! being embedded inside a `<script>` tag, so closing `</` sequences are
//! escaped to `<\/`.

use crate::Hook;
use serde::Serialize;

/// Escape `</` to `<\/` (a legal JSON string escape) so the encoded value is
/// safe inside a script tag.
pub fn escape_script(json: &str) -> String {
    json.replace("</", "<\\/")
}

/// JSON-encode a payload for a hook call, script-safe.
pub fn hook_payload<T: Serialize>(payload: &T) -> Result<String, serde_json::Error> {
    Ok(escape_script(&serde_json::to_string(payload)?))
}

/// The wrapper the host evaluates on the UI side.
pub fn script_wrapper(hook: Hook, payload_json: &str) -> String {
    format!("{}({});", hook.as_str(), payload_json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_closing_script_sequences() {
        let json = r#"{"label":"<b>x</b>"}"#;
        assert_eq!(escape_script(json), r#"{"label":"<b>x<\/b>"}"#);
    }

    #[test]
    fn escaped_payload_still_parses_as_json() {
        #[derive(Serialize)]
        struct P {
            label: String,
        }
        let payload = hook_payload(&P {
            label: "</script>".to_string(),
        })
        .unwrap();
        assert!(payload.contains("<\\/script>"));
        let v: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(v["label"], "</script>");
    }

    #[test]
    fn wrapper_names_the_hook() {
        let s = script_wrapper(Hook::GraphDelta, "{}");
        assert_eq!(s, "ajpcGraphDelta({});");
    }
}
