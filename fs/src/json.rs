use std::path::Path;

use near_diff_core::{CoreResult, Corpus, NeighborError};
use serde_json::Value;
use tracing::info;

/// Load a corpus from a JSON object mapping path to content.
pub fn load_corpus_json(path: &Path) -> CoreResult<Corpus> {
    let raw = std::fs::read_to_string(path)?;
    let corpus = parse_corpus_json(&raw)?;
    info!(
        "load_corpus_json: loaded {} files from {}",
        corpus.len(),
        path.display()
    );
    Ok(corpus)
}

/// Keys are inserted in sorted order.
pub fn parse_corpus_json(raw: &str) -> CoreResult<Corpus> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(map) = value else {
        return Err(NeighborError::InvalidArgument(
            "corpus JSON must be an object of path -> content".to_string(),
        ));
    };

    let mut corpus = Corpus::new();
    for (path, content) in map {
        match content {
            Value::String(text) => corpus.insert(path, text),
            other => {
                return Err(NeighborError::InvalidArgument(format!(
                    "content for {path} must be a string, got {}",
                    json_kind(&other)
                )));
            }
        }
    }
    Ok(corpus)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
