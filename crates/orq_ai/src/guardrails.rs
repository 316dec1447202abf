use std::collections::BTreeSet;

/// Result of checking an answer's citations against the session's retrieved evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationCheck {
    /// Cited identifiers that were retrieved, in citation order, de-duplicated.
    pub kept: Vec<String>,
    /// Cited identifiers that were never retrieved this session.
    pub stripped: Vec<String>,
}

impl CitationCheck {
    pub fn is_sound(&self) -> bool {
        self.stripped.is_empty()
    }

    pub fn cited_count(&self) -> usize {
        self.kept.len() + self.stripped.len()
    }
}

/// Split `cited` into identifiers backed by `retrieved` and identifiers that are not.
///
/// Identifiers are compared after trimming; literal order ids are compared case-insensitively
/// (they are canonically upper-case). Blank entries are dropped.
pub fn check_citations(cited: &[String], retrieved: &BTreeSet<String>) -> CitationCheck {
    let mut kept = Vec::new();
    let mut stripped = Vec::new();
    let mut seen = BTreeSet::new();

    for raw in cited {
        let id = canonical_id(raw);
        if id.is_empty() || !seen.insert(id.clone()) {
            continue;
        }
        if retrieved.contains(&id) {
            kept.push(id);
        } else {
            stripped.push(id);
        }
    }
    CitationCheck { kept, stripped }
}

fn canonical_id(raw: &str) -> String {
    let t = raw.trim();
    if crate::retrieve::identifiers::is_order_id(t) {
        t.to_ascii_uppercase()
    } else {
        t.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn v(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_retrieved_and_strips_the_rest_in_order() {
        let got = check_citations(
            &v(&["ORD-0002", "ORD-9999", "ord-0001", "ORD-0002", " "]),
            &set(&["ORD-0001", "ORD-0002"]),
        );
        assert_eq!(got.kept, v(&["ORD-0002", "ORD-0001"]));
        assert_eq!(got.stripped, v(&["ORD-9999"]));
        assert!(!got.is_sound());
        assert_eq!(got.cited_count(), 3);
    }

    #[test]
    fn empty_citations_are_sound() {
        let got = check_citations(&[], &set(&[]));
        assert!(got.is_sound());
        assert_eq!(got.cited_count(), 0);
    }
}
