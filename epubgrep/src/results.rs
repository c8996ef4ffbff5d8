use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One match inside an archive entry: the matching line (joined with its
/// context window when context was requested) and the entry it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    /// The matching line, or the newline-joined context window around it,
    /// trimmed of leading/trailing whitespace.
    pub line: String,

    /// Name of the entry inside the archive the match was found in.
    pub file_name: String,
}

/// Bibliographic metadata parsed from an archive's package manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Metadata {
    pub title: String,

    pub authors: Vec<String>,

    /// Subject/genre strings, in manifest order.
    pub genres: Vec<String>,

    /// Series name, empty when the manifest declares none.
    pub series: String,

    /// Position within the series, 0 when unknown. Fractional positions
    /// (e.g. 1.5 for interstitial novellas) are common in the wild.
    pub series_position: f64,

    /// Publication year, 0 when unknown.
    pub year_released: i32,

    /// Identifier-scheme name ("isbn", "asin", "doi", ...) to identifier
    /// value. Later sources overwrite earlier ones for the same scheme.
    pub identifiers: BTreeMap<String, String>,
}

/// Everything found in one archive: produced only for archives with at
/// least one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub path: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Matches in archive-entry order, then line order within an entry.
    pub matches: Vec<Match>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_wire_shape() {
        let m = Match {
            line: "the hound".to_string(),
            file_name: "chapter1.txt".to_string(),
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"line": "the hound", "fileName": "chapter1.txt"})
        );
    }

    #[test]
    fn test_metadata_wire_shape() {
        let mut metadata = Metadata {
            title: "T".to_string(),
            series_position: 1.5,
            year_released: 2023,
            ..Metadata::default()
        };
        metadata
            .identifiers
            .insert("isbn".to_string(), "9781234567897".to_string());

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["seriesPosition"], serde_json::json!(1.5));
        assert_eq!(json["yearReleased"], serde_json::json!(2023));
        assert_eq!(json["identifiers"]["isbn"], serde_json::json!("9781234567897"));
    }

    #[test]
    fn test_result_omits_absent_metadata() {
        let result = SearchResult {
            path: PathBuf::from("a.epub"),
            metadata: None,
            matches: Vec::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("metadata").is_none());
    }
}
