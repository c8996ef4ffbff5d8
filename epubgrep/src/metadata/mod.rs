//! Package-document metadata extraction.
//!
//! An epub names its package document (`.opf`) in
//! `META-INF/container.xml`; the document's `<metadata>` section carries
//! title, creators, subjects, publication date, series tags and a pile
//! of identifier conventions accumulated over two epub generations.

use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike};
use parking_lot::Mutex;
use tracing::{error, info};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::cancel::CancelToken;
use crate::config::default_thread_count;
use crate::errors::{HandlerError, SearchError};
use crate::pipeline::{walk_epub_files, Coordination, FileCounters};
use crate::results::Metadata;

mod opf;

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Extracts [`Metadata`] from epub archives, one at a time or across a
/// directory tree with a worker pool.
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    thread_count: NonZeroUsize,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(default_thread_count())
    }
}

impl MetadataExtractor {
    pub fn new(thread_count: NonZeroUsize) -> Self {
        MetadataExtractor { thread_count }
    }

    /// Reads the metadata of a single archive.
    ///
    /// The package document is located through the container descriptor;
    /// archives without one fall back to the first `.opf` entry. Neither
    /// present fails with [`SearchError::ManifestNotFound`].
    pub fn process_file(&self, token: &CancelToken, path: &Path) -> Result<Metadata, SearchError> {
        token.check()?;

        let size = std::fs::metadata(path).map(|m| m.len()).ok();

        let file = File::open(path).map_err(|err| SearchError::io(path, err))?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|err| {
            SearchError::format(path, size, format!("failed to read archive: {err}"))
        })?;

        let container_index =
            (0..archive.len()).find(|&i| archive.name_for_index(i) == Some(CONTAINER_PATH));

        let opf_path = match container_index {
            Some(index) => {
                let container = archive.by_index(index).map_err(|err| {
                    SearchError::format(path, size, format!("failed to open container: {err}"))
                })?;
                opf::parse_container(BufReader::new(container))
                    .map_err(|err| {
                        SearchError::format(path, size, format!("failed to parse container: {err}"))
                    })?
                    .ok_or_else(|| SearchError::ManifestNotFound(path.to_path_buf()))?
            }
            None => {
                // non-standard archives sometimes carry a package
                // document without any container descriptor
                let fallback = (0..archive.len()).find_map(|i| {
                    archive
                        .name_for_index(i)
                        .filter(|name| name.to_lowercase().ends_with(".opf"))
                        .map(str::to_string)
                });
                fallback.ok_or_else(|| SearchError::ManifestNotFound(path.to_path_buf()))?
            }
        };

        let opf_file = archive.by_name(&opf_path).map_err(|err| match err {
            ZipError::FileNotFound => SearchError::ManifestNotFound(path.to_path_buf()),
            err => SearchError::format(path, size, format!("failed to open '{opf_path}': {err}")),
        })?;
        let package = opf::parse_package(BufReader::new(opf_file)).map_err(|err| {
            SearchError::format(path, size, format!("failed to parse '{opf_path}': {err}"))
        })?;

        Ok(build_metadata(package))
    }

    /// Walks `root` and extracts metadata from every epub found,
    /// handing each `(path, metadata)` pair to `handler`.
    ///
    /// An archive whose metadata cannot be read is logged and skipped; a
    /// handler error aborts the whole run and becomes its result. A
    /// token already cancelled on entry returns `Ok` without walking.
    pub fn process_directory<F>(
        &self,
        token: &CancelToken,
        root: &Path,
        handler: F,
    ) -> Result<(), SearchError>
    where
        F: FnMut(&Path, Metadata) -> Result<(), HandlerError> + Send,
    {
        if token.is_cancelled() {
            return Ok(());
        }
        std::fs::metadata(root).map_err(|err| SearchError::io(root, err))?;

        let (tx, rx) = crossbeam_channel::bounded::<PathBuf>(0);
        let coord = Coordination::new();
        let counters = FileCounters::new();
        let handler = Mutex::new(handler);

        std::thread::scope(|scope| {
            for _ in 0..self.thread_count.get() {
                let rx = rx.clone();
                let coord = &coord;
                let counters = &counters;
                let handler = &handler;
                scope.spawn(move || {
                    for path in rx.iter() {
                        if coord.should_stop(token) {
                            break;
                        }

                        let metadata = match self.process_file(token, &path) {
                            Ok(metadata) => metadata,
                            Err(err) if err.is_cancellation() => {
                                coord.observe_cancellation();
                                break;
                            }
                            Err(err) => {
                                counters.record_failed();
                                error!(
                                    "failed to extract metadata from '{}' ({} processed, {} failed, {} found): {}",
                                    path.display(),
                                    counters.processed(),
                                    counters.failed(),
                                    counters.discovered(),
                                    err
                                );
                                continue;
                            }
                        };

                        let mut guard = handler.lock();
                        if let Err(err) = (*guard)(path.as_path(), metadata) {
                            coord.fail(SearchError::handler(err));
                            break;
                        }
                        drop(guard);
                        counters.record_processed();
                    }
                });
            }
            // workers hold the only receivers now; a producer blocked in
            // send must see disconnect when they bail out early
            drop(rx);

            walk_epub_files(root, None, tx, &coord, token, &counters);
        });

        if counters.failed() > 0 {
            info!(
                "processed {} of {} archives under '{}' ({} failed)",
                counters.processed(),
                counters.discovered(),
                root.display(),
                counters.failed()
            );
        } else {
            info!(
                "processed {} archives under '{}'",
                counters.processed(),
                root.display()
            );
        }

        coord.finish(token)
    }
}

/// Folds a parsed `<metadata>` section into the public shape, applying
/// the identifier conventions in a fixed order so meta tags overwrite
/// identifier elements on key collisions.
fn build_metadata(package: opf::OpfPackage) -> Metadata {
    let mut metadata = Metadata {
        title: package.title.unwrap_or_default(),
        authors: package.creators,
        genres: package.subjects,
        ..Metadata::default()
    };

    if let Some(date) = package.date.as_deref().filter(|date| !date.is_empty()) {
        if let Some(year) = parse_year(date) {
            metadata.year_released = year;
        }
    }

    for identifier in &package.identifiers {
        if identifier.value.is_empty() {
            continue;
        }
        let normalized = opf::normalize_identifier_scheme(&identifier.scheme);
        let key = if normalized.is_empty() {
            opf::detect_identifier_kind(&identifier.value)
        } else {
            Some(normalized)
        };
        if let Some(key) = key {
            metadata
                .identifiers
                .insert(key, identifier.value.trim().to_string());
        }
    }

    for meta in &package.metas {
        match meta.name.as_str() {
            "calibre:series" => metadata.series = meta.content.clone(),
            "calibre:series_index" => {
                if let Ok(position) = meta.content.parse::<f64>() {
                    metadata.series_position = position;
                }
            }
            _ => {}
        }

        if !meta.name.is_empty() && !meta.content.is_empty() {
            if let Some(key) = opf::identifier_key_from_meta_name(&meta.name) {
                metadata
                    .identifiers
                    .insert(key, meta.content.trim().to_string());
            }
        }

        if !meta.property.is_empty() && !meta.value.is_empty() {
            if let Some(key) = opf::identifier_key_from_property(&meta.property) {
                metadata
                    .identifiers
                    .insert(key.to_string(), meta.value.trim().to_string());
            }
        }
    }

    metadata
}

/// A date can be `2004`, `2004-10-02` or a full RFC 3339 timestamp; the
/// year is taken from a full parse when possible, otherwise from the
/// leading four characters.
fn parse_year(date: &str) -> Option<i32> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(date) {
        return Some(stamp.year());
    }
    date.get(..4)?.parse().ok()
}
