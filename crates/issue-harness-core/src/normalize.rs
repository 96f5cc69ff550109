//! Raw tracker payloads and their normalization into [`Record`]s.
//!
//! [`RawIssue`] mirrors the subset of the Jira REST issue shape the harness
//! requests (`key,summary,status,description,created,issuetype,assignee,comment`).
//! Every field is optional so that any payload deserializes; [`normalize`]
//! then fills documented defaults and never fails.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::normalize_value;
use crate::models::{Record, UNASSIGNED};

/// Fields requested from the tracker for every issue.
pub const ISSUE_FIELDS: &str = "key,summary,status,description,created,issuetype,assignee,comment";

/// An issue as returned by the tracker's REST API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawIssue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: RawFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub status: Option<NamedRef>,
    /// Plain text on REST v2; a rich-text document on v3.
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default, rename = "issuetype")]
    pub issue_type: Option<NamedRef>,
    #[serde(default)]
    pub assignee: Option<UserRef>,
    #[serde(default)]
    pub comment: Option<CommentPage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
}

impl UserRef {
    fn label(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.display_name.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentPage {
    #[serde(default)]
    pub comments: Vec<RawComment>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawComment {
    #[serde(default)]
    pub author: Option<UserRef>,
    #[serde(default)]
    pub body: Option<Value>,
}

/// Convert a raw tracker issue into a canonical [`Record`].
///
/// `browse_base` is the tracker's base URL; the record URL is
/// `{browse_base}/browse/{key}`.
pub fn normalize(raw: &RawIssue, browse_base: &str) -> Record {
    let fields = &raw.fields;

    let assignee = fields
        .assignee
        .as_ref()
        .and_then(UserRef::label)
        .unwrap_or(UNASSIGNED)
        .to_string();

    let (comment_count, comment_text) = match &fields.comment {
        Some(page) => {
            let mut text = String::new();
            for c in &page.comments {
                let author = c.author.as_ref().and_then(UserRef::label).unwrap_or("");
                let body = c.body.as_ref().map(value_to_text).unwrap_or_default();
                text.push_str(&format!("{}: {}, ", author, body));
            }
            let count = page.total.unwrap_or(page.comments.len() as u64);
            (count, text)
        }
        None => (0, String::new()),
    };

    let description = fields
        .description
        .as_ref()
        .map(value_to_text)
        .unwrap_or_default();

    Record {
        key: raw.key.trim().to_string(),
        status: named(&fields.status),
        summary: normalize_value(fields.summary.as_deref()),
        description: normalize_value(Some(&description)),
        created: fields
            .created
            .as_deref()
            .and_then(parse_tracker_time)
            .unwrap_or(0),
        assignee,
        issue_type: named(&fields.issue_type),
        comment_count,
        comment_text,
        url: browse_url(browse_base, raw.key.trim()),
    }
}

/// Deterministic browse URL for an issue key.
pub fn browse_url(browse_base: &str, key: &str) -> String {
    format!("{}/browse/{}", browse_base.trim_end_matches('/'), key)
}

/// Parse a tracker timestamp into epoch seconds.
///
/// Accepts the Jira form (`2024-01-15T10:30:00.000+0800`), RFC 3339, and a
/// bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_tracker_time(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

fn named(r: &Option<NamedRef>) -> String {
    r.as_ref()
        .and_then(|n| n.name.as_deref())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawIssue {
        serde_json::from_value(serde_json::json!({
            "key": "SEC-7",
            "fields": {
                "summary": "Login fails",
                "status": { "name": "Open" },
                "description": "Steps:\n1. open",
                "created": "2024-01-15T10:30:00.000+0800",
                "issuetype": { "name": "Bug" },
                "assignee": { "name": "alice", "displayName": "Alice A." },
                "comment": {
                    "total": 2,
                    "comments": [
                        { "author": { "name": "bob" }, "body": "repro on 5.1" },
                        { "author": { "name": "alice" }, "body": "looking" }
                    ]
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_normalize_full_issue() {
        let r = normalize(&sample(), "https://jira.example.com/");
        assert_eq!(r.key, "SEC-7");
        assert_eq!(r.status, "Open");
        assert_eq!(r.issue_type, "Bug");
        assert_eq!(r.assignee, "alice");
        assert_eq!(r.comment_count, 2);
        assert_eq!(r.comment_text, "bob: repro on 5.1, alice: looking, ");
        assert_eq!(r.url, "https://jira.example.com/browse/SEC-7");
        assert_eq!(r.created, 1_705_285_800);
    }

    #[test]
    fn test_normalize_empty_payload_uses_defaults() {
        let raw: RawIssue = serde_json::from_str(r#"{"key":"X-1"}"#).unwrap();
        let r = normalize(&raw, "https://t");
        assert_eq!(r.assignee, UNASSIGNED);
        assert_eq!(r.description, "");
        assert_eq!(r.summary, "");
        assert_eq!(r.comment_count, 0);
        assert_eq!(r.comment_text, "");
        assert_eq!(r.created, 0);
    }

    #[test]
    fn test_null_and_blank_descriptions_normalize_equal() {
        let mut a = sample();
        a.fields.description = None;
        let mut b = sample();
        b.fields.description = Some(Value::Null);
        let mut c = sample();
        c.fields.description = Some(Value::String("   \n".into()));
        let ra = normalize(&a, "https://t");
        assert_eq!(ra.description, "");
        assert_eq!(ra, normalize(&b, "https://t"));
        assert_eq!(ra, normalize(&c, "https://t"));
    }

    #[test]
    fn test_assignee_falls_back_to_display_name() {
        let mut raw = sample();
        raw.fields.assignee = Some(UserRef {
            name: None,
            display_name: Some("Carol".into()),
        });
        assert_eq!(normalize(&raw, "https://t").assignee, "Carol");
    }

    #[test]
    fn test_rich_text_description_is_rendered() {
        let mut raw = sample();
        raw.fields.description = Some(serde_json::json!({"type": "doc", "content": []}));
        let r = normalize(&raw, "https://t");
        assert!(r.description.contains("\"type\":\"doc\""));
    }

    #[test]
    fn test_comment_count_defaults_to_listed_comments() {
        let mut raw = sample();
        if let Some(page) = raw.fields.comment.as_mut() {
            page.total = None;
        }
        assert_eq!(normalize(&raw, "https://t").comment_count, 2);
    }

    #[test]
    fn test_parse_tracker_time_formats() {
        assert_eq!(parse_tracker_time("2024-01-15T02:30:00Z"), Some(1_705_285_800));
        assert_eq!(
            parse_tracker_time("2024-01-15T10:30:00.000+0800"),
            Some(1_705_285_800)
        );
        assert_eq!(parse_tracker_time("2024-01-15"), Some(1_705_276_800));
        assert_eq!(parse_tracker_time("not a date"), None);
    }
}
