mod json;
mod scanner;

pub use json::{load_corpus_json, parse_corpus_json};
pub use scanner::{STATE_DIR, load_corpus_dir};
