pub mod cancel;
pub mod config;
pub mod errors;
pub mod metadata;
mod pipeline;
pub mod request;
pub mod results;
pub mod search;

pub use cancel::CancelToken;
pub use config::{default_thread_count, SearchConfig};
pub use errors::{HandlerError, SearchError};
pub use metadata::MetadataExtractor;
pub use request::{RegexQuery, SearchFilters, SearchQuery, SearchRequest, TextQuery};
pub use results::{Match, Metadata, SearchResult};
pub use search::{resolve_pattern, FileSearch, PatternCache};
