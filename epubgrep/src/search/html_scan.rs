use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::warn;

use crate::cancel::CancelToken;
use crate::results::Match;
use crate::search::pool::TOKENIZER_POOL;
use crate::search::text_scan::window_matches;

/// Tags treated as line/paragraph boundaries when markup is flattened to
/// a logical-line stream.
const BLOCK_TAGS: [&str; 15] = [
    "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "hr", "pre", "tr",
    "table",
];

/// Parser events between cancellation polls.
const CANCEL_POLL_INTERVAL: usize = 100;

/// Scans an HTML/XHTML/XML stream by flattening it to logical lines and
/// applying the same window matching as the text scanner.
///
/// Tokenization is best-effort: malformed markup stops the tokenizer but
/// whatever text was already extracted is still matched. A cancellation
/// observed mid-parse yields an empty result immediately.
pub(crate) fn scan_html<R: BufRead>(
    token: &CancelToken,
    reader: R,
    pattern: &Regex,
    file_name: &str,
    context_lines: usize,
) -> Vec<Match> {
    let mut guard = TOKENIZER_POOL.acquire();
    let scratch = &mut *guard;

    let mut xml = Reader::from_reader(reader);
    // entry content is frequently sloppy XHTML; unmatched end tags must
    // not abort extraction
    xml.check_end_names(false);

    let mut event_count = 0usize;
    loop {
        if event_count % CANCEL_POLL_INTERVAL == 0 && token.is_cancelled() {
            return Vec::new();
        }
        event_count += 1;

        scratch.event_buf.clear();
        match xml.read_event_into(&mut scratch.event_buf) {
            Ok(Event::Text(text)) => {
                let text = match text.unescape_with(resolve_html_entity) {
                    Ok(text) => text,
                    // unknown entities stay literal instead of killing the scan
                    Err(_) => String::from_utf8_lossy(&text).into_owned().into(),
                };
                // separating space keeps words from adjacent tags apart;
                // normalization collapses any surplus
                scratch.current.push(' ');
                scratch.current.push_str(&text);
            }
            Ok(Event::CData(data)) => {
                scratch.current.push(' ');
                scratch.current.push_str(&String::from_utf8_lossy(&data));
            }
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                if is_block_tag(tag.local_name().as_ref()) {
                    flush_line(&mut scratch.current, &mut scratch.lines);
                }
            }
            Ok(Event::End(tag)) => {
                if is_block_tag(tag.local_name().as_ref()) {
                    flush_line(&mut scratch.current, &mut scratch.lines);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("markup error in '{}': {}", file_name, err);
                break;
            }
        }
    }
    flush_line(&mut scratch.current, &mut scratch.lines);

    window_matches(&scratch.lines, pattern, file_name, context_lines)
}

fn is_block_tag(name: &[u8]) -> bool {
    let Ok(name) = std::str::from_utf8(name) else {
        return false;
    };
    BLOCK_TAGS.iter().any(|tag| name.eq_ignore_ascii_case(tag))
}

/// Normalizes the accumulated text (whitespace runs collapsed, ends
/// trimmed) and appends it as one logical line unless empty.
fn flush_line(current: &mut String, lines: &mut Vec<String>) {
    let line = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !line.is_empty() {
        lines.push(line);
    }
    current.clear();
}

/// Entities that are valid in HTML but undeclared in bare XML. Real-world
/// XHTML content uses these constantly (`&nbsp;` above all), so they are
/// resolved instead of surfacing as tokenizer errors.
fn resolve_html_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some("\u{a0}"),
        "shy" => Some("\u{ad}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "hellip" => Some("\u{2026}"),
        "copy" => Some("\u{a9}"),
        _ => None,
    }
}
