//! Change detection between a stored entry and a freshly fetched record.
//!
//! The comparison is deliberately field-proxy based: comments are compared
//! by count, not content, and only the tracked fields below participate.
//!
//! | Field | Rule |
//! |-------|------|
//! | status, summary, issue_type, description | equal after [`normalize_value`] |
//! | created | stored text ⇒ changed; stored epoch ⇒ exact equality |
//! | assignee | exact equality |
//! | comment_count | exact equality |
//!
//! [`decide_for`] additionally re-indexes entries whose stored document was
//! built from a different field set than the current builder's.

use crate::document::{normalize_value, DocumentBuilder};
use crate::models::{Created, EntryMetadata, Record};

/// Outcome of comparing a record with its stored counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Unchanged,
    NeedsUpsert(ChangeReason),
}

impl Decision {
    pub fn needs_upsert(&self) -> bool {
        matches!(self, Decision::NeedsUpsert(_))
    }
}

/// Why a record needs to be (re)indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    /// No stored entry for the key.
    New,
    /// Stored `created` is a legacy string and must be migrated.
    LegacyCreated,
    /// One or more tracked fields differ.
    Fields(Vec<&'static str>),
    /// The stored document was built from another field set.
    DocumentFields,
}

/// Decide whether `incoming` must be upserted over `existing`.
pub fn decide(existing: Option<&EntryMetadata>, incoming: &Record) -> Decision {
    let Some(stored) = existing else {
        return Decision::NeedsUpsert(ChangeReason::New);
    };

    let stored_created = match &stored.created {
        Created::Text(_) => return Decision::NeedsUpsert(ChangeReason::LegacyCreated),
        Created::Epoch(ts) => *ts,
    };

    let mut changed = Vec::new();

    let text_fields: [(&'static str, &str, &str); 4] = [
        ("status", &stored.status, &incoming.status),
        ("summary", &stored.summary, &incoming.summary),
        ("issue_type", &stored.issue_type, &incoming.issue_type),
        ("description", &stored.description, &incoming.description),
    ];
    for (name, old, new) in text_fields {
        if normalize_value(Some(old)) != normalize_value(Some(new)) {
            changed.push(name);
        }
    }

    if stored_created != incoming.created {
        changed.push("created");
    }
    if stored.assignee != incoming.assignee {
        changed.push("assignee");
    }
    if stored.comment_count != incoming.comment_count {
        changed.push("comment_count");
    }

    if changed.is_empty() {
        Decision::Unchanged
    } else {
        Decision::NeedsUpsert(ChangeReason::Fields(changed))
    }
}

/// [`decide`], then check that the stored document matches `builder`.
pub fn decide_for(
    existing: Option<&EntryMetadata>,
    incoming: &Record,
    builder: &DocumentBuilder,
) -> Decision {
    match (decide(existing, incoming), existing) {
        (Decision::Unchanged, Some(stored)) if !builder.built_this_way(&stored.document_fields) => {
            Decision::NeedsUpsert(ChangeReason::DocumentFields)
        }
        (decision, _) => decision,
    }
}
