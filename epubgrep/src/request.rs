use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::results::Metadata;

/// A single search invocation: what to match, what to keep, how much
/// context to attach.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: SearchQuery,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<SearchFilters>,

    /// Number of context lines joined around each matching line.
    pub context: usize,
}

/// Discriminated query: exactly one of `text` / `regex` must be present,
/// selected by `is_regex`. Carrying the wrong sub-spec (or none) is an
/// `InvalidQuery` error at search time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchQuery {
    pub is_regex: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexQuery>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextQuery>,
}

impl SearchQuery {
    /// Literal-text query; the value is escaped before compilation.
    pub fn text(value: impl Into<String>, ignore_case: bool) -> Self {
        SearchQuery {
            is_regex: false,
            regex: None,
            text: Some(TextQuery {
                value: value.into(),
                ignore_case,
            }),
        }
    }

    /// Regular-expression query, compiled as written.
    pub fn regex(pattern: impl Into<String>) -> Self {
        SearchQuery {
            is_regex: true,
            regex: Some(RegexQuery {
                pattern: pattern.into(),
            }),
            text: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegexQuery {
    pub pattern: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextQuery {
    pub value: String,
    pub ignore_case: bool,
}

/// Result filters. The metadata comparisons are case-insensitive exact
/// matches and only apply when metadata extraction is enabled; `files_in`
/// restricts the walk itself to an explicit allow-list of archive paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_equals: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_equals: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_equals: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_in: Vec<PathBuf>,
}

impl SearchFilters {
    /// True when the extracted metadata satisfies every configured
    /// metadata filter.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        if let Some(author) = &self.author_equals {
            if !metadata.authors.iter().any(|a| eq_ignore_case(a, author)) {
                return false;
            }
        }

        if let Some(series) = &self.series_equals {
            if !eq_ignore_case(&metadata.series, series) {
                return false;
            }
        }

        if let Some(title) = &self.title_equals {
            if !eq_ignore_case(&metadata.title, title) {
                return false;
            }
        }

        true
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
