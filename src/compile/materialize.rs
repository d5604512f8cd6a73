//! Dialect interpretation of a resolved template.
//!
//! Query-string dialect: `&`-delimited `key=value` pairs, repeated keys
//! accumulating into a list, malformed pairs dropped silently.
//! Document dialect: one JSON value, absent on parse failure.

use serde_json::{Map, Value};

use super::SearchEngine;

/// Interpret `resolved` under the engine's dialect. `None` means the
/// template does not parse; callers store that as "no args" on the try
/// rather than failing the operation.
pub fn materialize(engine: SearchEngine, resolved: &str) -> Option<Value> {
    match engine {
        SearchEngine::Solr => Some(parse_query_string(resolved)),
        SearchEngine::Es => serde_json::from_str(resolved).ok(),
    }
}

/// Lenient URL-query-string parse. Each valid `key=value` segment lands in
/// an insertion-ordered object of string arrays; segments without `=` or
/// with broken percent-encoding are skipped, never fatal.
fn parse_query_string(input: &str) -> Value {
    let mut params: Map<String, Value> = Map::new();

    for segment in input.split('&') {
        if segment.is_empty() {
            continue;
        }
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let Ok(key) = urlencoding::decode(key) else {
            continue;
        };
        let value = value.replace('+', " ");
        let Ok(value) = urlencoding::decode(&value) else {
            continue;
        };

        match params
            .entry(key.into_owned())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(values) => values.push(Value::String(value.into_owned())),
            _ => unreachable!(),
        }
    }

    Value::Object(params)
}
