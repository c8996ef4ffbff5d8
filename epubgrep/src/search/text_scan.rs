use std::borrow::Cow;
use std::io::{BufRead, Read};

use regex::Regex;
use tracing::error;

use crate::results::Match;
use crate::search::pool::SCANNER_POOL;

/// Upper bound on a single logical line. Longer lines abort the entry's
/// scan rather than truncating silently.
const MAX_LINE_BYTES: usize = 256 * 1024;

/// Scans a plain-text stream line by line.
///
/// Read failures (including an oversized line) are logged and yield an
/// empty result for the entry; partial matches are discarded.
pub(crate) fn scan_text<R: BufRead>(
    mut reader: R,
    pattern: &Regex,
    file_name: &str,
    context_lines: usize,
) -> Vec<Match> {
    let mut guard = SCANNER_POOL.acquire();
    let scratch = &mut *guard;

    // fast path: no context requested, match as lines stream past
    if context_lines == 0 {
        let mut matches = Vec::new();
        loop {
            match next_line(&mut reader, &mut scratch.line_buf) {
                Ok(Some(line)) => {
                    if pattern.is_match(&line) {
                        matches.push(Match {
                            line: line.trim().to_string(),
                            file_name: file_name.to_string(),
                        });
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    error!("error scanning text entry '{}': {}", file_name, err);
                    return Vec::new();
                }
            }
        }
        return matches;
    }

    // context path: buffer every line, then emit one window per match
    loop {
        match next_line(&mut reader, &mut scratch.line_buf) {
            Ok(Some(line)) => scratch.lines.push(line.into_owned()),
            Ok(None) => break,
            Err(err) => {
                error!("error scanning text entry '{}': {}", file_name, err);
                return Vec::new();
            }
        }
    }

    window_matches(&scratch.lines, pattern, file_name, context_lines)
}

/// Emits one [`Match`] per line matching `pattern`, carrying the window
/// `[max(0, i - k), min(n, i + k + 1))` of surrounding lines joined by
/// newlines and trimmed. Nearby matches get independent, possibly
/// overlapping windows.
pub(crate) fn window_matches(
    lines: &[String],
    pattern: &Regex,
    file_name: &str,
    context_lines: usize,
) -> Vec<Match> {
    let mut matches = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if pattern.is_match(line) {
            let start = i.saturating_sub(context_lines);
            let end = i.saturating_add(context_lines).saturating_add(1).min(lines.len());
            let window = lines[start..end].join("\n");
            matches.push(Match {
                line: window.trim().to_string(),
                file_name: file_name.to_string(),
            });
        }
    }
    matches
}

/// Reads one line into `buf`, stripping the LF or CRLF terminator.
/// Returns `None` at end of stream. Bytes that are not valid UTF-8 are
/// replaced rather than rejected.
fn next_line<'a, R: BufRead>(
    reader: &mut R,
    buf: &'a mut Vec<u8>,
) -> std::io::Result<Option<Cow<'a, str>>> {
    buf.clear();
    let read = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(None);
    }
    if buf.len() > MAX_LINE_BYTES && !buf.ends_with(b"\n") {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("line exceeds {MAX_LINE_BYTES} bytes"),
        ));
    }

    if buf.ends_with(b"\n") {
        buf.pop();
        if buf.ends_with(b"\r") {
            buf.pop();
        }
    }

    Ok(Some(String::from_utf8_lossy(buf)))
}
