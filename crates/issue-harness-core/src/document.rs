//! Document building: the text that gets embedded for each issue.
//!
//! [`DocumentBuilder::build`] is a pure function of the record fields it is
//! configured to include. Change detection and embedding reuse rely on that:
//! the same record content must always produce the same document.
//!
//! # Cleaning
//!
//! Every value passes through [`clean_text`], which removes tracker markup
//! noise before embedding:
//!
//! | Pattern | Example | Action |
//! |---------|---------|--------|
//! | `[...]` | `[~alice]`, `[^log.txt]` | removed |
//! | `<...>` | `<br>` | removed |
//! | `http…` | `https://host/x` | removed |
//! | whitespace runs | `"a \n\t b"` | collapsed to one space |

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::Record;

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[.*?\]").unwrap());
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<.*?>").unwrap());
static URLS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"http\S+").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strip bracketed annotations, tags, and URLs, then collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let text = BRACKETED.replace_all(text, "");
    let text = TAGS.replace_all(&text, "");
    let text = URLS.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Collapse missing and whitespace-only values to `""` and trim the rest.
///
/// Used for field comparison so that `None`, `""`, and `"   "` are equal.
pub fn normalize_value(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

/// A record field that can be included in the embedded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentField {
    Key,
    Summary,
    Description,
    Status,
    IssueType,
    Assignee,
    Comments,
}

impl DocumentField {
    fn value<'a>(&self, record: &'a Record) -> &'a str {
        match self {
            DocumentField::Key => &record.key,
            DocumentField::Summary => &record.summary,
            DocumentField::Description => &record.description,
            DocumentField::Status => &record.status,
            DocumentField::IssueType => &record.issue_type,
            DocumentField::Assignee => &record.assignee,
            DocumentField::Comments => &record.comment_text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentField::Key => "key",
            DocumentField::Summary => "summary",
            DocumentField::Description => "description",
            DocumentField::Status => "status",
            DocumentField::IssueType => "issue_type",
            DocumentField::Assignee => "assignee",
            DocumentField::Comments => "comments",
        }
    }
}

impl fmt::Display for DocumentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "key" => Ok(DocumentField::Key),
            "summary" => Ok(DocumentField::Summary),
            "description" => Ok(DocumentField::Description),
            "status" => Ok(DocumentField::Status),
            "issue_type" => Ok(DocumentField::IssueType),
            "assignee" => Ok(DocumentField::Assignee),
            "comments" => Ok(DocumentField::Comments),
            other => Err(format!(
                "unknown document field '{}'. Use key, summary, description, status, issue_type, assignee, or comments",
                other
            )),
        }
    }
}

/// Renders a [`Record`] into its embeddable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentBuilder {
    fields: Vec<DocumentField>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self {
            fields: vec![
                DocumentField::Key,
                DocumentField::Summary,
                DocumentField::Description,
            ],
        }
    }
}

impl DocumentBuilder {
    /// Builder over an explicit field list, rendered in the given order.
    pub fn new(fields: Vec<DocumentField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[DocumentField] {
        &self.fields
    }

    /// Comma-separated field names, stored with each entry so that a change
    /// of field set can be detected.
    pub fn fingerprint(&self) -> String {
        self.fields
            .iter()
            .map(DocumentField::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether an entry stored with `fingerprint` was built by this builder.
    ///
    /// Entries without a recorded fingerprint predate it and were built
    /// with the default fields.
    pub fn built_this_way(&self, fingerprint: &str) -> bool {
        if fingerprint.is_empty() {
            *self == Self::default()
        } else {
            fingerprint == self.fingerprint()
        }
    }

    /// Cleaned, non-empty field values joined by a single space.
    pub fn build(&self, record: &Record) -> String {
        self.fields
            .iter()
            .map(|f| clean_text(f.value(record)))
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(summary: &str, description: &str) -> Record {
        Record {
            key: "SEC-1".into(),
            status: "Open".into(),
            summary: summary.into(),
            description: description.into(),
            created: 1_700_000_000,
            assignee: "alice".into(),
            issue_type: "Bug".into(),
            comment_count: 0,
            comment_text: String::new(),
            url: "https://t/browse/SEC-1".into(),
        }
    }

    #[test]
    fn test_clean_text_strips_markup() {
        let raw = "[~alice] see <b>log</b> at https://host/x?a=1  now\n\tplease";
        assert_eq!(clean_text(raw), "see log at now please");
    }

    #[test]
    fn test_clean_text_empty() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("   \n "), "");
        assert_eq!(clean_text("[only annotation]"), "");
    }

    #[test]
    fn test_normalize_value_collapses_empty() {
        assert_eq!(normalize_value(None), "");
        assert_eq!(normalize_value(Some("")), "");
        assert_eq!(normalize_value(Some("  \t")), "");
        assert_eq!(normalize_value(Some(" x ")), "x");
    }

    #[test]
    fn test_default_document_shape() {
        let doc = DocumentBuilder::default().build(&record("Login fails", "After upgrade"));
        assert_eq!(doc, "SEC-1 Login fails After upgrade");
    }

    #[test]
    fn test_empty_description_omitted() {
        let doc = DocumentBuilder::default().build(&record("Login fails", ""));
        assert_eq!(doc, "SEC-1 Login fails");
    }

    #[test]
    fn test_document_is_deterministic() {
        let b = DocumentBuilder::default();
        let r = record("A  summary", "some\n\ndescription");
        assert_eq!(b.build(&r), b.build(&r.clone()));
    }

    #[test]
    fn test_whitespace_padding_does_not_change_document() {
        let b = DocumentBuilder::default();
        let plain = b.build(&record("Login fails", "After upgrade"));
        let padded = b.build(&record("  Login   fails ", "\nAfter\tupgrade  "));
        assert_eq!(plain, padded);
    }

    #[test]
    fn test_custom_fields_in_order() {
        let b = DocumentBuilder::new(vec![DocumentField::IssueType, DocumentField::Summary]);
        assert_eq!(b.build(&record("Login fails", "x")), "Bug Login fails");
    }

    #[test]
    fn test_field_parse() {
        assert_eq!("issue_type".parse::<DocumentField>(), Ok(DocumentField::IssueType));
        assert!("title".parse::<DocumentField>().is_err());
        assert_eq!(DocumentField::Comments.to_string(), "comments");
    }

    #[test]
    fn test_fingerprint_tracks_field_set() {
        let default = DocumentBuilder::default();
        assert_eq!(default.fingerprint(), "key,summary,description");
        assert!(default.built_this_way("key,summary,description"));
        assert!(default.built_this_way(""));

        let custom = DocumentBuilder::new(vec![DocumentField::Key, DocumentField::Comments]);
        assert_eq!(custom.fingerprint(), "key,comments");
        assert!(custom.built_this_way("key,comments"));
        assert!(!custom.built_this_way(""));
        assert!(!custom.built_this_way("key,summary,description"));
    }
}
