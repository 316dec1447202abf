use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embeddings::Embedder;
use crate::index::IndexSnapshot;

pub mod identifiers;
pub mod similarity;

pub use identifiers::{extract_emails, extract_order_ids};

/// Score assigned to literal identifier hits. Cosine similarity never exceeds it, and exact
/// hits are placed ahead of vector hits regardless of score.
pub const EXACT_MATCH_SCORE: f32 = 1.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    ExactMatch,
    VectorMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceItem {
    pub record_id: String,
    pub mode: MatchMode,
    pub score: f32,
}

/// An evidence item together with the indexed text it points at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedEvidence {
    pub item: EvidenceItem,
    pub text: String,
}

/// Resolve `query_text` into at most `k` ranked, de-duplicated evidence items.
///
/// 1. Literal identifiers in the query that exist in the snapshot become exact-match items,
///    in mention order. Literal customer emails follow, each adding its orders as exact
///    matches in identifier order.
/// 2. A vector search over the whole snapshot supplies the remaining slots, skipping any
///    identifier already taken by step 1.
///
/// Never fails: unknown identifiers are dropped, and a query-embedding failure degrades to
/// exact-only results.
pub fn retrieve(
    snapshot: &IndexSnapshot,
    embedder: &dyn Embedder,
    query_text: &str,
    k: usize,
) -> Vec<EvidenceItem> {
    if k == 0 || snapshot.is_empty() {
        return Vec::new();
    }

    let mut out: Vec<EvidenceItem> = Vec::new();
    let mut taken: BTreeSet<String> = BTreeSet::new();

    for id in extract_order_ids(query_text) {
        if snapshot.lookup_exact(&id).is_some() && taken.insert(id.clone()) {
            out.push(EvidenceItem {
                record_id: id,
                mode: MatchMode::ExactMatch,
                score: EXACT_MATCH_SCORE,
            });
        }
    }
    for email in extract_emails(query_text) {
        for id in snapshot.lookup_email(&email) {
            if taken.insert(id.to_string()) {
                out.push(EvidenceItem {
                    record_id: id.to_string(),
                    mode: MatchMode::ExactMatch,
                    score: EXACT_MATCH_SCORE,
                });
            }
        }
    }
    let exact_hits = out.len();

    // Ask for extra candidates so de-duplication cannot starve the vector slots.
    match snapshot.search_similar(embedder, query_text, k + exact_hits) {
        Ok(hits) => {
            for h in hits {
                if taken.insert(h.record_id.clone()) {
                    out.push(EvidenceItem {
                        record_id: h.record_id,
                        mode: MatchMode::VectorMatch,
                        score: h.score,
                    });
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "vector search failed; returning exact matches only");
        }
    }

    out.truncate(k);
    debug!(
        k,
        exact = exact_hits.min(out.len()),
        returned = out.len(),
        generation = snapshot.generation(),
        "retrieved evidence"
    );
    out
}

/// [`retrieve`], with each item paired with its indexed document text.
pub fn retrieve_documents(
    snapshot: &IndexSnapshot,
    embedder: &dyn Embedder,
    query_text: &str,
    k: usize,
) -> Vec<RetrievedEvidence> {
    retrieve(snapshot, embedder, query_text, k)
        .into_iter()
        .filter_map(|item| {
            let text = snapshot.lookup_exact(&item.record_id)?.document.text.clone();
            Some(RetrievedEvidence { item, text })
        })
        .collect()
}
