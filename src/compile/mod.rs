//! Try argument compiler.
//!
//! Turns a try's stored query template into the engine-ready argument
//! structure: placeholder substitution first (`template`), then dialect
//! interpretation (`materialize`). Compilation is pure — same inputs,
//! byte-identical output, no I/O.

pub mod materialize;
pub mod template;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of supported search engine dialects. Adding an engine means
/// adding a variant here plus its arm in `materialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    Solr,
    Es,
}

impl SearchEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::Solr => "solr",
            SearchEngine::Es => "es",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "solr" => Some(SearchEngine::Solr),
            "es" => Some(SearchEngine::Es),
            _ => None,
        }
    }

    pub fn defaults(&self) -> EngineDefaults {
        match self {
            SearchEngine::Solr => EngineDefaults {
                query_params: "q=#$query##",
                search_url: "http://localhost:8983/solr/tmdb/select",
                field_spec: "id:id, title:title",
            },
            SearchEngine::Es => EngineDefaults {
                query_params: r##"{"query": {"match": {"_all": "#$query##"}}}"##,
                search_url: "http://localhost:9200/tmdb/_search",
                field_spec: "id:_id, title:title",
            },
        }
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        SearchEngine::Solr
    }
}

/// Per-engine field defaults applied when a try is created without them.
pub struct EngineDefaults {
    pub query_params: &'static str,
    pub search_url: &'static str,
    pub field_spec: &'static str,
}

/// Number of result rows requested when the caller does not say.
pub const DEFAULT_NUMBER_OF_ROWS: i64 = 10;

/// Compile a try's template into its normalized argument structure.
///
/// `phrase` is the live search phrase; `None` leaves the `#$query##`
/// placeholder in place literally, which is what the stored `args` of a try
/// use (the phrase is only known at search time). Returns `None` when the
/// resolved template does not parse under the dialect.
pub fn compile_args(
    engine: SearchEngine,
    query_params: &str,
    escape_query: bool,
    variables: &BTreeMap<String, String>,
    phrase: Option<&str>,
) -> Option<Value> {
    let resolved = template::substitute(query_params, phrase, escape_query, engine, variables);
    materialize::materialize(engine, &resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_args_keep_placeholder() {
        let vars = BTreeMap::new();
        let args = compile_args(SearchEngine::Solr, "q=#$query##", true, &vars, None).unwrap();
        assert_eq!(args, serde_json::json!({"q": [template::QUERY_PLACEHOLDER]}));
    }

    #[test]
    fn live_phrase_lands_in_args() {
        let vars = BTreeMap::new();
        let args =
            compile_args(SearchEngine::Solr, "q=#$query##", false, &vars, Some("hello")).unwrap();
        assert_eq!(args, serde_json::json!({"q": ["hello"]}));
    }

    #[test]
    fn compile_is_deterministic() {
        let mut vars = BTreeMap::new();
        vars.insert("boost".to_string(), "2".to_string());
        let a = compile_args(
            SearchEngine::Solr,
            "q=#$query##&bq=popularity:{boost}",
            false,
            &vars,
            Some("star wars"),
        );
        let b = compile_args(
            SearchEngine::Solr,
            "q=#$query##&bq=popularity:{boost}",
            false,
            &vars,
            Some("star wars"),
        );
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn es_defaults_parse_to_valid_json() {
        let vars = BTreeMap::new();
        let defaults = SearchEngine::Es.defaults();
        let args = compile_args(SearchEngine::Es, defaults.query_params, true, &vars, None);
        assert!(args.is_some());
    }
}
