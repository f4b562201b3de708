//! Inbound request rewriting.
//!
//! The upstream provider only produces reasoning segments when asked, and
//! truncates them unless enough output budget is requested. Before a
//! request is forwarded: the model name is resolved through the mapping
//! table, `extra_body.chat_template_kwargs` is set to enable extended
//! thinking, and `max_tokens` is raised to a floor. Every other field
//! passes through unexamined, which is why the body is handled as a raw
//! `serde_json::Value` rather than a typed struct.

use serde_json::{json, Value};

use crate::config::ModelMap;

/// Minimum output-token budget forwarded upstream.
pub const MAX_TOKENS_FLOOR: u64 = 4096;

/// Provider option key that carries the thinking switch.
const TEMPLATE_KWARGS_KEY: &str = "chat_template_kwargs";

/// Rewrite the request body in place for the upstream provider.
///
/// Returns the resolved upstream model name, for logging. A body that is
/// not a JSON object (or has no model field) is left alone apart from what
/// can still be applied.
pub fn augment_request(body: &mut Value, models: &ModelMap) -> Option<String> {
    let obj = body.as_object_mut()?;

    // Model resolution: exact match rewritten, unknown names forwarded
    // as-is, absent model stays absent.
    let upstream_model = match obj.get("model").and_then(Value::as_str) {
        Some(requested) => {
            let resolved = models.resolve(requested).to_string();
            obj.insert("model".to_string(), Value::String(resolved.clone()));
            Some(resolved)
        }
        None => None,
    };

    // Shallow merge into any client-supplied extra_body: other keys
    // survive, the chat_template_kwargs sub-key is ours.
    let extra = obj.entry("extra_body").or_insert_with(|| json!({}));
    if !extra.is_object() {
        *extra = json!({});
    }
    if let Some(extra) = extra.as_object_mut() {
        extra.insert(TEMPLATE_KWARGS_KEY.to_string(), json!({ "thinking": true }));
    }

    // Output budget floor: absent, non-numeric, or below the floor all
    // get raised; anything at or above the floor is left untouched.
    let below_floor = obj
        .get("max_tokens")
        .and_then(Value::as_u64)
        .map(|v| v < MAX_TOKENS_FLOOR)
        .unwrap_or(true);
    if below_floor {
        obj.insert("max_tokens".to_string(), json!(MAX_TOKENS_FLOOR));
    }

    upstream_model
}
