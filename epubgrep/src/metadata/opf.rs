use std::io::BufRead;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;

const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Raw `<metadata>` section of a package document, element order
/// preserved. Only the first title and date are kept; creators,
/// subjects, identifiers and metas are collected in full.
#[derive(Debug, Default)]
pub(crate) struct OpfPackage {
    pub(crate) title: Option<String>,
    pub(crate) date: Option<String>,
    pub(crate) creators: Vec<String>,
    pub(crate) subjects: Vec<String>,
    pub(crate) identifiers: Vec<OpfIdentifier>,
    pub(crate) metas: Vec<OpfMeta>,
}

#[derive(Debug, Default)]
pub(crate) struct OpfIdentifier {
    pub(crate) scheme: String,
    pub(crate) value: String,
}

#[derive(Debug, Default)]
pub(crate) struct OpfMeta {
    pub(crate) name: String,
    pub(crate) content: String,
    pub(crate) property: String,
    pub(crate) value: String,
}

/// Resolves the package document path from `META-INF/container.xml`:
/// the first rootfile declaring the OPF media type wins. `None` means
/// the container names no package document.
pub(crate) fn parse_container<R: BufRead>(reader: R) -> Result<Option<String>, quick_xml::Error> {
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() != b"rootfile" {
                    continue;
                }
                let mut full_path = String::new();
                let mut media_type = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.local_name().as_ref() {
                        b"full-path" => full_path = attr_text(&attr),
                        b"media-type" => media_type = attr_text(&attr),
                        _ => {}
                    }
                }
                if media_type == OPF_MEDIA_TYPE {
                    return Ok(Some(full_path));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Fields captured inside `<metadata>`, keyed by local name so `dc:`
/// and `opf:` prefixes never matter.
enum Capture {
    Title,
    Creator,
    Subject,
    Date,
    Identifier { scheme: String },
    Meta(OpfMeta),
}

/// Reads the `<metadata>` section of a package document.
///
/// Only direct children of `<metadata>` start a capture; character data
/// anywhere inside a captured element is accumulated, so markup nested
/// in a title does not truncate it.
pub(crate) fn parse_package<R: BufRead>(reader: R) -> Result<OpfPackage, quick_xml::Error> {
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();

    let mut package = OpfPackage::default();
    let mut depth = 0usize;
    let mut metadata_depth: Option<usize> = None;
    let mut capture: Option<(usize, Capture, String)> = None;

    loop {
        buf.clear();
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if capture.is_none() {
                    if metadata_depth.is_none()
                        && depth == 1
                        && e.local_name().as_ref() == b"metadata"
                    {
                        metadata_depth = Some(depth + 1);
                    } else if metadata_depth == Some(depth) {
                        if let Some(cap) = begin_capture(&e)? {
                            capture = Some((depth + 1, cap, String::new()));
                        }
                    }
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if capture.is_none() && metadata_depth == Some(depth) {
                    if let Some(cap) = begin_capture(&e)? {
                        commit(&mut package, cap, String::new());
                    }
                }
            }
            Event::Text(text) => {
                if let Some((_, _, chars)) = capture.as_mut() {
                    chars.push_str(&text_of(&text));
                }
            }
            Event::CData(data) => {
                if let Some((_, _, chars)) = capture.as_mut() {
                    chars.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                match capture.take() {
                    Some((at, cap, text)) if at == depth => commit(&mut package, cap, text),
                    other => capture = other,
                }
                if metadata_depth == Some(depth) {
                    metadata_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(package)
}

fn begin_capture(e: &BytesStart) -> Result<Option<Capture>, quick_xml::Error> {
    let capture = match e.local_name().as_ref() {
        b"title" => Capture::Title,
        b"creator" => Capture::Creator,
        b"subject" => Capture::Subject,
        b"date" => Capture::Date,
        b"identifier" => {
            let mut scheme = String::new();
            for attr in e.attributes() {
                let attr = attr?;
                if attr.key.local_name().as_ref() == b"scheme" {
                    scheme = attr_text(&attr);
                }
            }
            Capture::Identifier { scheme }
        }
        b"meta" => {
            let mut meta = OpfMeta::default();
            for attr in e.attributes() {
                let attr = attr?;
                match attr.key.local_name().as_ref() {
                    b"name" => meta.name = attr_text(&attr),
                    b"content" => meta.content = attr_text(&attr),
                    b"property" => meta.property = attr_text(&attr),
                    _ => {}
                }
            }
            Capture::Meta(meta)
        }
        _ => return Ok(None),
    };
    Ok(Some(capture))
}

fn commit(package: &mut OpfPackage, capture: Capture, text: String) {
    match capture {
        Capture::Title => {
            if package.title.is_none() {
                package.title = Some(text);
            }
        }
        Capture::Date => {
            if package.date.is_none() {
                package.date = Some(text);
            }
        }
        Capture::Creator => package.creators.push(text),
        Capture::Subject => package.subjects.push(text),
        Capture::Identifier { scheme } => {
            package.identifiers.push(OpfIdentifier {
                scheme,
                value: text,
            });
        }
        Capture::Meta(mut meta) => {
            meta.value = text;
            package.metas.push(meta);
        }
    }
}

// Sloppy epubs declare charsets they do not actually use; values decode
// leniently instead of failing the whole document.
fn attr_text(attr: &Attribute) -> String {
    match attr.unescape_value() {
        Ok(value) => value.into_owned(),
        Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
    }
}

fn text_of(text: &BytesText) -> String {
    match text.unescape() {
        Ok(value) => value.into_owned(),
        Err(_) => String::from_utf8_lossy(text).into_owned(),
    }
}

/// Folds identifier scheme spellings onto canonical keys. Unknown
/// schemes pass through lowercased.
pub(crate) fn normalize_identifier_scheme(scheme: &str) -> String {
    let scheme = scheme.trim().to_lowercase();
    match scheme.as_str() {
        "isbn" | "isbn-10" | "isbn-13" => "isbn".to_string(),
        "uri" | "url" => "uri".to_string(),
        _ => scheme,
    }
}

/// Maps EPUB2-style `<meta name=...>` entries to identifier keys.
/// `dc:identifier` and `dtb:uid` carry the scheme in their content, not
/// the name, so they yield nothing here.
pub(crate) fn identifier_key_from_meta_name(name: &str) -> Option<String> {
    let name = name.trim().to_lowercase();
    match name.as_str() {
        "dc:identifier" | "dtb:uid" => return None,
        "calibre:isbn" => return Some("isbn".to_string()),
        "calibre:asin" => return Some("asin".to_string()),
        "calibre:doi" => return Some("doi".to_string()),
        "calibre:issn" => return Some("issn".to_string()),
        "calibre:oclc" => return Some("oclc".to_string()),
        "calibre:lccn" => return Some("lccn".to_string()),
        "calibre:google_id" => return Some("google".to_string()),
        "calibre:goodreads_id" => return Some("goodreads".to_string()),
        "calibre:amazon_id" => return Some("amazon".to_string()),
        _ => {}
    }

    // catch-all for other calibre identifier metas, e.g.
    // calibre:librarything_id
    let kind = name.strip_prefix("calibre:")?.strip_suffix("_id")?;
    Some(normalize_identifier_scheme(kind))
}

/// Maps EPUB3-style `property` attributes to identifier keys. Only the
/// standard identifier properties qualify.
pub(crate) fn identifier_key_from_property(property: &str) -> Option<&'static str> {
    match property.trim().to_lowercase().as_str() {
        "isbn" => Some("isbn"),
        "doi" => Some("doi"),
        "issn" => Some("issn"),
        "oclc" => Some("oclc"),
        "lccn" => Some("lccn"),
        _ => None,
    }
}

/// Sniffs an identifier kind from a bare value when no scheme was
/// declared. ISBN shapes are matched on the value with separators
/// stripped; the remaining rules look at the raw value.
pub(crate) fn detect_identifier_kind(value: &str) -> Option<String> {
    let value = value.trim();
    let clean: String = value.chars().filter(|c| *c != '-' && *c != ' ').collect();

    if (clean.len() == 10 || clean.len() == 13)
        && (is_numeric(&clean) || (clean.len() == 10 && is_isbn10(&clean)))
    {
        return Some("isbn".to_string());
    }
    if value.len() == 10 && (value.starts_with('B') || value.starts_with('b')) {
        return Some("asin".to_string());
    }
    if value.starts_with("10.") {
        return Some("doi".to_string());
    }

    let lower = value.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some("uri".to_string());
    }
    if lower.starts_with("urn:") {
        return Some("urn".to_string());
    }
    None
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Nine digits plus a final digit or `X` check character.
fn is_isbn10(s: &str) -> bool {
    if s.len() != 10 {
        return false;
    }
    s.bytes()
        .enumerate()
        .all(|(i, b)| b.is_ascii_digit() || (i == 9 && (b == b'X' || b == b'x')))
}
