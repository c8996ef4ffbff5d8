use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use regex::Regex;
use tracing::warn;
use zip::ZipArchive;

use crate::cancel::CancelToken;
use crate::errors::SearchError;
use crate::results::Match;
use crate::search::html_scan::scan_html;
use crate::search::text_scan::scan_text;

/// Entries present in every archive that never hold searchable content.
const SKIP_EXACT: [&str; 2] = ["mimetype", "META-INF/container.xml"];

/// Boilerplate leaf names (lowercased) matched against entry basenames.
const SKIP_BASENAMES: [&str; 23] = [
    "cover.xhtml",
    "toc.xhtml",
    "titlepage.xhtml",
    "copyright.xhtml",
    "imprint.xhtml",
    "dedication.xhtml",
    "dedication-1.xhtml",
    "license.xhtml",
    "license-1.xhtml",
    "colophon.xhtml",
    "about.xhtml",
    "about-1.xhtml",
    "acknowledgments.xhtml",
    "appendix.xhtml",
    "afterword.xhtml",
    "notes.xhtml",
    "bibliography.xhtml",
    "index.xhtml",
    "epilogue.xhtml",
    "glossary.xhtml",
    "extra.xhtml",
    "ads.xhtml",
    "trailer.xhtml",
];

/// Substrings of the full lowercased entry name that mark promotional
/// filler.
const SKIP_KEYWORDS: [&str; 4] = ["sample", "advert", "promo", "teaser"];

/// Scanner an entry is routed to, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Text,
    Markup,
}

/// Routes `.txt` to the text scanner and `.html`/`.xhtml`/`.xml` to the
/// markup scanner; everything else is ignored.
pub(crate) fn classify_entry(name: &str) -> Option<EntryKind> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") => Some(EntryKind::Text),
        Some("html") | Some("xhtml") | Some("xml") => Some(EntryKind::Markup),
        _ => None,
    }
}

/// Skip policy for non-content entries: container plumbing by exact name,
/// known boilerplate by basename, promotional filler by keyword.
pub(crate) fn should_skip_entry(name: &str) -> bool {
    if SKIP_EXACT.contains(&name) {
        return true;
    }

    let basename = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase())
        .unwrap_or_default();
    if SKIP_BASENAMES.contains(&basename.as_str()) {
        return true;
    }

    let lower = name.to_lowercase();
    SKIP_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Opens one archive and scans every eligible entry, aggregating matches
/// in entry order.
///
/// Unreadable entries are logged and skipped; only the archive-open
/// failure and cancellation abort the archive as a whole. An archive
/// whose entries all miss yields an empty vector, not an error.
pub(crate) fn scan_archive(
    token: &CancelToken,
    path: &Path,
    pattern: &Regex,
    context_lines: usize,
) -> Result<Vec<Match>, SearchError> {
    let size = std::fs::metadata(path).map(|m| m.len()).ok();

    let file = File::open(path).map_err(|err| SearchError::io(path, err))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|err| SearchError::format(path, size, format!("failed to read archive: {err}")))?;

    let mut matches = Vec::new();
    for index in 0..archive.len() {
        let Some(name) = archive.name_for_index(index).map(str::to_string) else {
            continue;
        };
        if name.ends_with('/') || should_skip_entry(&name) {
            continue;
        }
        let Some(kind) = classify_entry(&name) else {
            continue;
        };

        token.check()?;

        let entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    "failed to open entry '{}' in '{}': {}",
                    name,
                    path.display(),
                    err
                );
                continue;
            }
        };

        let entry_matches = match kind {
            EntryKind::Text => scan_text(BufReader::new(entry), pattern, &name, context_lines),
            EntryKind::Markup => {
                scan_html(token, BufReader::new(entry), pattern, &name, context_lines)
            }
        };
        matches.extend(entry_matches);
    }

    Ok(matches)
}
