mod engine;
mod html_scan;
mod matcher;
mod pool;
mod processor;
mod text_scan;

pub use engine::FileSearch;
pub use matcher::{resolve_pattern, PatternCache, DEFAULT_PATTERN_CAPACITY};
