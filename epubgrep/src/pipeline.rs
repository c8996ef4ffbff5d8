use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::Sender;
use ignore::WalkBuilder;
use parking_lot::Mutex;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::errors::SearchError;

/// Shared stop state for one pipeline run.
///
/// The first fatal error wins; everything produced after it is
/// discarded. Cancellation observed by any thread is remembered so the
/// run can report it once the workers have drained, unless a fatal
/// error got there first.
pub(crate) struct Coordination {
    abort: AtomicBool,
    observed_cancel: AtomicBool,
    first_error: Mutex<Option<SearchError>>,
}

impl Coordination {
    pub(crate) fn new() -> Self {
        Coordination {
            abort: AtomicBool::new(false),
            observed_cancel: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    /// Records a fatal error and tells every thread to stop pulling
    /// work. Only the first caller stores its error.
    pub(crate) fn fail(&self, err: SearchError) {
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Marks that a thread saw the token trip mid-run.
    pub(crate) fn observe_cancellation(&self) {
        self.observed_cancel.store(true, Ordering::Relaxed);
        self.abort.store(true, Ordering::Relaxed);
    }

    /// True once this thread must stop. Polls the token as well, so
    /// cancellation is noticed between queue pulls.
    pub(crate) fn should_stop(&self, token: &CancelToken) -> bool {
        if self.abort.load(Ordering::Relaxed) {
            return true;
        }
        if token.is_cancelled() {
            self.observe_cancellation();
            return true;
        }
        false
    }

    /// Resolves the run outcome after all threads have joined: the
    /// first fatal error, else the cancellation the token reports, else
    /// success.
    pub(crate) fn finish(self, token: &CancelToken) -> Result<(), SearchError> {
        if let Some(err) = self.first_error.into_inner() {
            return Err(err);
        }
        if self.observed_cancel.load(Ordering::Relaxed) {
            token.check()?;
        }
        Ok(())
    }
}

/// Per-run archive counters, shared across workers.
#[derive(Debug, Default)]
pub(crate) struct FileCounters {
    discovered: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl FileCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn discovered(&self) -> u64 {
        self.discovered.load(Ordering::Relaxed)
    }

    pub(crate) fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Producer half of the pipeline: walks `root`, filters to `.epub`
/// files, and hands each path to the workers over a rendezvous channel.
///
/// With an allow-list only exact path matches are queued. A traversal
/// error is fatal and stops the walk; a send failure means every worker
/// has already gone away, which is only possible after an abort.
pub(crate) fn walk_epub_files(
    root: &Path,
    files_in: Option<&[PathBuf]>,
    tx: Sender<PathBuf>,
    coord: &Coordination,
    token: &CancelToken,
    counters: &FileCounters,
) {
    let allow: Option<HashSet<&Path>> =
        files_in.map(|list| list.iter().map(PathBuf::as_path).collect());

    for entry in WalkBuilder::new(root).standard_filters(false).build() {
        if coord.should_stop(token) {
            return;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let message = err.to_string();
                coord.fail(match err.into_io_error() {
                    Some(io_err) => SearchError::io(root, io_err),
                    None => SearchError::io(
                        root,
                        std::io::Error::new(std::io::ErrorKind::Other, message),
                    ),
                });
                return;
            }
        };

        if entry.file_type().is_some_and(|t| t.is_dir()) {
            continue;
        }
        let path = entry.into_path();
        let is_epub = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.to_lowercase().ends_with(".epub"));
        if !is_epub {
            continue;
        }
        if let Some(allow) = &allow {
            if !allow.contains(path.as_path()) {
                continue;
            }
        }

        debug!("queueing '{}'", path.display());
        counters.record_discovered();
        if tx.send(path).is_err() {
            return;
        }
    }
}
