//! Flattening and token helpers for option values.

use serde_json::Value;

const TRUTHY: [&str; 4] = ["yes", "true", "on", "1"];
const FALSY: [&str; 4] = ["no", "false", "off", "0"];

/// Flattens `value` into `(dotted key, leaf)` pairs under `parent`.
///
/// Non-mapping values are returned as a single pair keyed by `parent`.
/// Empty mappings produce no pairs. An empty `parent` yields top-level keys
/// without a leading dot.
#[must_use]
pub fn flatten(value: Value, parent: &str) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    flatten_into(value, parent, &mut out);
    out
}

fn flatten_into(value: Value, parent: &str, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let dotted = if parent.is_empty() {
                    key
                } else {
                    format!("{parent}.{key}")
                };
                flatten_into(child, &dotted, out);
            }
        }
        leaf => out.push((parent.to_string(), leaf)),
    }
}

/// Renders an option value the way boolean parsing and string lookups see it.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}

/// Returns true for the case-insensitive tokens `yes`, `true`, `on`, `1`.
#[must_use]
pub fn option_is_true(value: &Value) -> bool {
    let rendered = render_value(value).to_lowercase();
    TRUTHY.contains(&rendered.as_str())
}

/// Returns true for the case-insensitive tokens `no`, `false`, `off`, `0`.
#[must_use]
pub fn option_is_false(value: &Value) -> bool {
    let rendered = render_value(value).to_lowercase();
    FALSY.contains(&rendered.as_str())
}
