use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Configuration for a [`FileSearch`](crate::FileSearch) instance.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Directory scanned recursively for `.epub` archives.
    pub root: PathBuf,

    /// Fixed size of the worker pool.
    pub thread_count: NonZeroUsize,

    /// Whether archives with matches also get their package manifest
    /// parsed into [`Metadata`](crate::Metadata). Required for the
    /// author/series/title filters to apply.
    pub extract_metadata: bool,
}

impl SearchConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SearchConfig {
            root: root.into(),
            thread_count: default_thread_count(),
            extract_metadata: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Host parallelism, clamped to at least one worker.
pub fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}
