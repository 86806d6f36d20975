//! Deterministic cache-key derivation from (method, request).
//!
//! Small flat requests keep a readable query-string form; everything else is
//! reduced to a djb2 hash of canonical (key-sorted) JSON so that two requests
//! with the same content always land on the same key, regardless of key
//! insertion order.

use serde_json::Value;

/// Flat objects up to this many keys keep the readable `k=v&…` form.
const MAX_INLINE_KEYS: usize = 10;

/// Derive the fallback-cache key for a request.
pub fn cache_key(method: &str, request: &Value) -> String {
    match request {
        Value::Null => format!("{}:null", method),
        Value::String(s) => format!("{}:{}", method, s),
        Value::Number(n) => format!("{}:{}", method, n),
        Value::Bool(b) => format!("{}:{}", method, b),
        Value::Object(map)
            if map.len() <= MAX_INLINE_KEYS && map.values().all(is_primitive_or_null) =>
        {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| k.as_str());
            let query = pairs
                .iter()
                .map(|(k, v)| format!("{}={}", k, primitive_text(v)))
                .collect::<Vec<_>>()
                .join("&");
            format!("{}:{}", method, query)
        }
        other => format!("{}:{:x}", method, djb2(&canonical_json(other))),
    }
}

fn is_primitive_or_null(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn primitive_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => unreachable!("guarded by is_primitive_or_null"),
    }
}

/// JSON text with object keys sorted at every nesting level.
///
/// Sorting is done explicitly rather than relying on the map backing, so key
/// determinism survives a downstream `preserve_order` feature unification.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let inner = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{}]", inner)
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let inner = keys
                .iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).expect("string serialization is infallible"),
                        canonical_json(&map[k.as_str()])
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", inner)
        }
        primitive => serde_json::to_string(primitive)
            .expect("primitive JSON serialization is infallible"),
    }
}

/// djb2 over UTF-16 code units, reduced to unsigned 32-bit.
fn djb2(text: &str) -> u32 {
    let mut hash: u32 = 5381;
    for unit in text.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_add(hash) ^ u32::from(unit);
    }
    hash
}
