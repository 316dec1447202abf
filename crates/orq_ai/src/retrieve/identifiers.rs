use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

// `ORD-` plus exactly four digits, standalone. Case-insensitive so "ord-0003" still resolves.
static RE_ORDER_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bORD-\d{4}\b").ok());

// Same shape the document builder's CUSTOMER_SEARCH_EMAIL line carries.
static RE_EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").ok());

/// Literal order identifiers mentioned in `text`, upper-cased, de-duplicated, in order of
/// first mention.
pub fn extract_order_ids(text: &str) -> Vec<String> {
    let Some(re) = RE_ORDER_ID.as_ref() else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for m in re.find_iter(text) {
        let id = m.as_str().to_ascii_uppercase();
        if seen.insert(id.clone()) {
            out.push(id);
        }
    }
    out
}

/// Email addresses mentioned in `text`, lower-cased, de-duplicated, in order of first mention.
pub fn extract_emails(text: &str) -> Vec<String> {
    let Some(re) = RE_EMAIL.as_ref() else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for m in re.find_iter(text) {
        let email = m.as_str().to_lowercase();
        if seen.insert(email.clone()) {
            out.push(email);
        }
    }
    out
}

pub fn is_order_id(candidate: &str) -> bool {
    let c = candidate.trim();
    RE_ORDER_ID
        .as_ref()
        .and_then(|re| re.find(c))
        .is_some_and(|m| m.start() == 0 && m.end() == c.len())
}
