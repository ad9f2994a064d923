//! Scopus search entry → flat [`Record`]
//!
//! Known fields get stable column names; multi-valued fields (affiliations,
//! authors) are joined with `;`. Any other scalar top-level field is passed
//! through under its own key.

use bibline_core::Record;
use serde_json::Value;

/// Joiner for multi-valued fields.
pub const MULTI_SEP: &str = ";";

/// Scopus field → column name, in output order.
const SCALAR_FIELDS: &[(&str, &str)] = &[
    ("eid", "eid"),
    ("prism:doi", "doi"),
    ("pii", "pii"),
    ("pubmed-id", "pubmed_id"),
    ("dc:title", "title"),
    ("subtype", "subtype"),
    ("subtypeDescription", "subtypeDescription"),
    ("dc:creator", "creator"),
];

const TRAILING_FIELDS: &[(&str, &str)] = &[
    ("prism:coverDate", "coverDate"),
    ("prism:coverDisplayDate", "coverDisplayDate"),
    ("prism:publicationName", "publicationName"),
    ("prism:issn", "issn"),
    ("prism:eIssn", "eIssn"),
    ("source-id", "source_id"),
    ("prism:aggregationType", "aggregationType"),
    ("prism:volume", "volume"),
    ("prism:issueIdentifier", "issueIdentifier"),
    ("article-number", "article_number"),
    ("prism:pageRange", "pageRange"),
    ("dc:description", "description"),
    ("authkeywords", "authkeywords"),
    ("citedby-count", "citedby_count"),
    ("openaccess", "openaccess"),
    ("fund-acr", "fund_acr"),
    ("fund-no", "fund_no"),
    ("fund-sponsor", "fund_sponsor"),
];

/// Keys consumed by structured handling (never passed through).
const STRUCTURED_FIELDS: &[&str] = &["affiliation", "author", "author-count", "link", "error"];

const EMPTY_SENTINEL: &str = "Result set was empty";

/// Flatten one entry. Returns `None` for the empty-result sentinel.
pub fn flatten_entry(entry: &Value) -> Option<Record> {
    let obj = entry.as_object()?;
    if obj.get("error").and_then(Value::as_str) == Some(EMPTY_SENTINEL) {
        return None;
    }

    let mut record = Record::new();
    for (src, dst) in SCALAR_FIELDS {
        record.insert(*dst, obj.get(*src).and_then(scalar));
    }

    let affiliations = as_list(obj.get("affiliation"));
    for (src, dst) in [
        ("afid", "afid"),
        ("affilname", "affilname"),
        ("affiliation-city", "affiliation_city"),
        ("affiliation-country", "affiliation_country"),
    ] {
        record.insert(dst, join_field(&affiliations, src));
    }

    record.insert("author_count", obj.get("author-count").and_then(author_count));
    let authors = as_list(obj.get("author"));
    record.insert("author_names", join_field(&authors, "authname"));
    record.insert("author_ids", join_field(&authors, "authid"));

    for (src, dst) in TRAILING_FIELDS {
        record.insert(*dst, obj.get(*src).and_then(scalar));
    }

    let known = |key: &str| {
        SCALAR_FIELDS.iter().any(|(s, _)| *s == key)
            || TRAILING_FIELDS.iter().any(|(s, _)| *s == key)
            || STRUCTURED_FIELDS.contains(&key)
    };
    for (key, value) in obj {
        if key.starts_with('@') || known(key) {
            continue;
        }
        if value.is_array() || value.is_object() {
            continue;
        }
        record.insert(key.clone(), scalar(value));
    }

    Some(record)
}

/// String form of a scalar; empty strings and nulls are missing.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        // {"$": "..."} wrappers
        Value::Object(map) => map.get("$").and_then(scalar),
        _ => None,
    }
}

fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::Object(_)) => vec![v],
        _ => Vec::new(),
    }
}

/// Join `field` across items with `;`. Missing values become empty slots
/// so positions stay aligned across joined columns.
fn join_field(items: &[&Value], field: &str) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let parts: Vec<String> = items
        .iter()
        .map(|item| item.get(field).and_then(scalar).unwrap_or_default())
        .collect();
    if parts.iter().all(String::is_empty) {
        return None;
    }
    Some(parts.join(MULTI_SEP))
}

fn author_count(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get("$")
            .or_else(|| map.get("@total"))
            .and_then(scalar),
        other => scalar(other),
    }
}
