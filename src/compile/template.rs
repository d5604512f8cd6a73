//! Template substitution: the reserved `#$query##` phrase placeholder and
//! `{name}` curator variable placeholders.

use std::collections::BTreeMap;

use super::SearchEngine;

/// Reserved token standing in for the live search phrase.
pub const QUERY_PLACEHOLDER: &str = "#$query##";

/// Resolve all known placeholders in `template`.
///
/// A `{name}` with no matching variable is left in place on purpose: an
/// unresolved placeholder showing up in the compiled args is the visible
/// symptom that points the user at the typo. Never errors; a template the
/// dialect cannot parse is caught by the materializer.
pub fn substitute(
    template: &str,
    phrase: Option<&str>,
    escape_query: bool,
    engine: SearchEngine,
    variables: &BTreeMap<String, String>,
) -> String {
    let mut resolved = match phrase {
        Some(phrase) => {
            let phrase = if escape_query {
                escape_phrase(engine, phrase)
            } else {
                phrase.to_string()
            };
            template.replace(QUERY_PLACEHOLDER, &phrase)
        }
        None => template.to_string(),
    };

    // BTreeMap iteration keeps substitution order deterministic.
    for (name, value) in variables {
        resolved = resolved.replace(&format!("{{{name}}}"), value);
    }

    resolved
}

/// Escape the live phrase for safe inclusion in the target dialect.
fn escape_phrase(engine: SearchEngine, phrase: &str) -> String {
    match engine {
        SearchEngine::Solr => urlencoding::encode(phrase).into_owned(),
        // serde_json always produces a quoted string; strip the quotes so
        // the result drops into the surrounding JSON string literal.
        SearchEngine::Es => {
            let quoted = serde_json::Value::String(phrase.to_string()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
    }
}
