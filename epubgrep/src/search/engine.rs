use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::cancel::CancelToken;
use crate::config::SearchConfig;
use crate::errors::{HandlerError, SearchError};
use crate::metadata::MetadataExtractor;
use crate::pipeline::{walk_epub_files, Coordination, FileCounters};
use crate::request::SearchRequest;
use crate::results::SearchResult;
use crate::search::matcher::{resolve_pattern, PatternCache};
use crate::search::processor::scan_archive;

/// Concurrent full-text search over a directory of epub archives.
///
/// One producer walks the tree while a fixed pool of workers drains a
/// rendezvous channel, so traversal never runs ahead of the scanners.
/// Results stream to the caller's handler in completion order, which
/// varies run to run; the set of results does not.
pub struct FileSearch {
    config: SearchConfig,
    pattern_cache: Arc<PatternCache>,
    extractor: MetadataExtractor,
}

impl FileSearch {
    /// Builds a search over `config.root` backed by the process-wide
    /// pattern cache.
    pub fn new(config: SearchConfig) -> Self {
        Self::with_pattern_cache(config, PatternCache::shared())
    }

    /// Like [`new`](Self::new), with a caller-owned pattern cache.
    pub fn with_pattern_cache(config: SearchConfig, pattern_cache: Arc<PatternCache>) -> Self {
        let extractor = MetadataExtractor::new(config.thread_count);
        FileSearch {
            config,
            pattern_cache,
            extractor,
        }
    }

    /// Runs one search, invoking `handler` once per archive with at
    /// least one match. Handler calls are serialized; a handler error
    /// aborts the run and becomes its result.
    ///
    /// Archives that fail to scan are logged and skipped. A token
    /// already cancelled on entry returns `Ok` without touching the
    /// filesystem; cancellation observed mid-run surfaces as
    /// [`SearchError::Cancelled`] or [`SearchError::DeadlineExceeded`]
    /// once the workers have drained.
    pub fn search<F>(
        &self,
        token: &CancelToken,
        request: &SearchRequest,
        handler: F,
    ) -> Result<(), SearchError>
    where
        F: FnMut(SearchResult) -> Result<(), HandlerError> + Send,
    {
        let pattern = resolve_pattern(&request.query)?;
        let regex = self.pattern_cache.get(&pattern)?;
        debug!(
            "searching for '{}' under '{}'",
            pattern,
            self.config.root.display()
        );

        if token.is_cancelled() {
            return Ok(());
        }
        std::fs::metadata(&self.config.root)
            .map_err(|err| SearchError::io(&self.config.root, err))?;

        let files_in = request
            .filters
            .as_ref()
            .map(|filters| filters.files_in.as_slice())
            .filter(|list| !list.is_empty());

        let (tx, rx) = crossbeam_channel::bounded::<PathBuf>(0);
        let coord = Coordination::new();
        let counters = FileCounters::new();
        let handler = Mutex::new(handler);

        std::thread::scope(|scope| {
            for _ in 0..self.config.thread_count.get() {
                let rx = rx.clone();
                let regex = &regex;
                let coord = &coord;
                let counters = &counters;
                let handler = &handler;
                scope.spawn(move || {
                    for path in rx.iter() {
                        if coord.should_stop(token) {
                            break;
                        }

                        let matches = match scan_archive(token, &path, regex, request.context) {
                            Ok(matches) => matches,
                            Err(err) if err.is_cancellation() => {
                                coord.observe_cancellation();
                                break;
                            }
                            Err(err) => {
                                counters.record_failed();
                                error!(
                                    "error searching '{}' ({} processed, {} failed): {}",
                                    path.display(),
                                    counters.processed(),
                                    counters.failed(),
                                    err
                                );
                                continue;
                            }
                        };
                        counters.record_processed();
                        if matches.is_empty() {
                            continue;
                        }

                        let metadata = if self.config.extract_metadata {
                            match self.extractor.process_file(token, &path) {
                                Ok(metadata) => Some(metadata),
                                Err(err) if err.is_cancellation() => {
                                    coord.observe_cancellation();
                                    break;
                                }
                                Err(err) => {
                                    counters.record_failed();
                                    error!(
                                        "error extracting metadata from '{}' ({} processed, {} failed): {}",
                                        path.display(),
                                        counters.processed(),
                                        counters.failed(),
                                        err
                                    );
                                    continue;
                                }
                            }
                        } else {
                            None
                        };

                        // filters only apply when metadata was extracted
                        if let (Some(filters), Some(metadata)) = (&request.filters, &metadata) {
                            if !filters.matches(metadata) {
                                continue;
                            }
                        }

                        let result = SearchResult {
                            path,
                            metadata,
                            matches,
                        };
                        let mut guard = handler.lock();
                        if let Err(err) = (*guard)(result) {
                            coord.fail(SearchError::handler(err));
                            break;
                        }
                    }
                });
            }
            // workers hold the only receivers now; a producer blocked in
            // send must see disconnect when they bail out early
            drop(rx);

            walk_epub_files(&self.config.root, files_in, tx, &coord, token, &counters);
        });

        if counters.failed() > 0 {
            info!(
                "searched {} of {} archives under '{}' ({} failed)",
                counters.processed(),
                counters.discovered(),
                self.config.root.display(),
                counters.failed()
            );
        } else {
            debug!(
                "searched {} archives under '{}'",
                counters.processed(),
                self.config.root.display()
            );
        }

        coord.finish(token)
    }
}
