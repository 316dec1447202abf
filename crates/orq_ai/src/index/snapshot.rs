use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use orq_core::error::AppError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::embeddings::Embedder;
use crate::retrieve::similarity::{cosine_similarity, l2_norm};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedDocument {
    pub document: Document,
    pub vector: Vec<f32>,
    pub vector_norm: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarHit {
    pub record_id: String,
    pub score: f32,
}

/// Immutable (identifier, document, embedding) collection for one build.
///
/// Entries are sorted by `record_id`; `by_id` gives O(1) exact lookup into them and
/// `by_email` maps a lower-cased customer email to its entries in identifier order.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    model: Option<String>,
    dims: Option<u32>,
    generation: u64,
    built_at: Option<String>,
    entries: Vec<IndexedDocument>,
    by_id: HashMap<String, usize>,
    by_email: HashMap<String, Vec<usize>>,
}

impl IndexSnapshot {
    pub fn empty() -> Self {
        Self {
            model: None,
            dims: None,
            generation: 0,
            built_at: None,
            entries: Vec::new(),
            by_id: HashMap::new(),
            by_email: HashMap::new(),
        }
    }

    /// Assemble a snapshot from already-embedded entries (e.g. loaded from disk).
    ///
    /// Entries are re-sorted by identifier; the first entry wins for a repeated identifier.
    pub fn from_entries(
        model: Option<String>,
        dims: Option<u32>,
        generation: u64,
        built_at: Option<String>,
        mut entries: Vec<IndexedDocument>,
    ) -> Self {
        entries.sort_by(|a, b| a.document.record_id.cmp(&b.document.record_id));
        entries.dedup_by(|b, a| a.document.record_id == b.document.record_id);
        let by_id = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.document.record_id.clone(), i))
            .collect();
        let mut by_email: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, e) in entries.iter().enumerate() {
            if let Some(email) = e.document.metadata.get("customer_email") {
                let key = email.trim().to_lowercase();
                if !key.is_empty() {
                    by_email.entry(key).or_default().push(i);
                }
            }
        }
        Self {
            model,
            dims,
            generation,
            built_at,
            entries,
            by_id,
            by_email,
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn dims(&self) -> Option<u32> {
        self.dims
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> Option<&str> {
        self.built_at.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexedDocument] {
        &self.entries
    }

    pub fn record_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.document.record_id.as_str())
    }

    pub fn lookup_exact(&self, record_id: &str) -> Option<&IndexedDocument> {
        self.by_id.get(record_id).and_then(|&i| self.entries.get(i))
    }

    /// Identifiers of the orders placed with `email` (case-insensitive), in identifier order.
    pub fn lookup_email(&self, email: &str) -> Vec<&str> {
        self.by_email
            .get(&email.trim().to_lowercase())
            .map(|idxs| {
                idxs.iter()
                    .filter_map(|&i| self.entries.get(i))
                    .map(|e| e.document.record_id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rank every stored vector against `query_vector` by cosine similarity.
    ///
    /// Ties are broken by identifier ascending. Zero-norm vectors (query or stored) never
    /// match. An empty index or `k == 0` yields an empty list.
    pub fn search_vector(&self, query_vector: &[f32], k: usize) -> Result<Vec<SimilarHit>, AppError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dims) = self.dims {
            if query_vector.len() as u32 != dims {
                return Err(AppError::new(
                    "AI_RETRIEVAL_FAILED",
                    "Query embedding dims do not match index dims",
                )
                .with_details(format!("index_dims={dims}; query_dims={}", query_vector.len())));
            }
        }
        let qnorm = l2_norm(query_vector);
        if qnorm == 0.0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SimilarHit> = self
            .entries
            .iter()
            .filter(|e| e.vector_norm > 0.0)
            .map(|e| SimilarHit {
                record_id: e.document.record_id.clone(),
                score: cosine_similarity(query_vector, &e.vector, qnorm, e.vector_norm),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Embed `query_text` with the model this snapshot was built with, then rank.
    pub fn search_similar(
        &self,
        embedder: &dyn Embedder,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<SimilarHit>, AppError> {
        let q = query_text.trim();
        if self.entries.is_empty() || k == 0 || q.is_empty() {
            return Ok(Vec::new());
        }
        let Some(model) = self.model.as_deref() else {
            return Ok(Vec::new());
        };
        let qv = embedder.embed(model, q)?;
        self.search_vector(&qv, k)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedDocument {
    pub record_id: String,
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexBuildReport {
    pub model: String,
    pub generation: u64,
    pub dims: Option<u32>,
    pub total: usize,
    pub indexed: usize,
    pub skipped: Vec<SkippedDocument>,
    pub built_at: String,
}

fn now_rfc3339_utc() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Most common vector length; a tie goes to the length seen first in identifier order.
fn majority_dims(usable: &[(Document, Vec<f32>)]) -> Option<u32> {
    let mut counts: HashMap<usize, (usize, usize)> = HashMap::new();
    for (pos, (_, v)) in usable.iter().enumerate() {
        counts.entry(v.len()).or_insert((0, pos)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then_with(|| fb.cmp(fa)))
        .map(|(len, _)| len as u32)
}

/// Embed every document and assemble a snapshot.
///
/// Embeddings run in parallel and independently; the resulting snapshot does not depend on
/// input order. Documents that fail to embed (error, empty or non-finite vector) are skipped
/// and reported, as are vectors whose length differs from the most common one. A build where
/// every document fails is rejected so callers keep serving the previous snapshot.
pub fn build_index(
    documents: Vec<Document>,
    embedder: &dyn Embedder,
    model: &str,
    generation: u64,
) -> Result<(IndexSnapshot, IndexBuildReport), AppError> {
    let total = documents.len();
    let mut skipped: Vec<SkippedDocument> = Vec::new();

    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut unique: Vec<Document> = Vec::with_capacity(total);
    for doc in documents {
        if seen.insert(doc.record_id.clone()) {
            unique.push(doc);
        } else {
            warn!(record_id = %doc.record_id, "duplicate record id; keeping first document");
            skipped.push(SkippedDocument {
                record_id: doc.record_id,
                code: "AI_INDEX_DUPLICATE_ID".to_string(),
                reason: "duplicate record id".to_string(),
            });
        }
    }
    unique.sort_by(|a, b| a.record_id.cmp(&b.record_id));

    let embedded: Vec<(Document, Result<Vec<f32>, AppError>)> = unique
        .into_par_iter()
        .map(|doc| {
            let v = embedder.embed(model, &doc.text);
            (doc, v)
        })
        .collect();

    let mut any_retryable = false;
    let mut usable: Vec<(Document, Vec<f32>)> = Vec::with_capacity(embedded.len());

    for (doc, res) in embedded {
        match res {
            Ok(v) if !v.is_empty() && v.iter().all(|x| x.is_finite()) => usable.push((doc, v)),
            Ok(_) => {
                warn!(record_id = %doc.record_id, "embedding empty or non-finite; skipping");
                skipped.push(SkippedDocument {
                    record_id: doc.record_id,
                    code: "AI_EMBEDDINGS_FAILED".to_string(),
                    reason: "empty or non-finite vector".to_string(),
                });
            }
            Err(e) => {
                any_retryable |= e.retryable;
                warn!(record_id = %doc.record_id, error = %e, "failed to embed document; skipping");
                skipped.push(SkippedDocument {
                    record_id: doc.record_id,
                    code: "AI_EMBEDDINGS_FAILED".to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let dims = majority_dims(&usable);
    let mut entries: Vec<IndexedDocument> = Vec::with_capacity(usable.len());
    for (doc, vector) in usable {
        let this_dims = vector.len() as u32;
        if let Some(d) = dims.filter(|&d| d != this_dims) {
            warn!(record_id = %doc.record_id, expected = d, got = this_dims, "embedding dims mismatch; skipping");
            skipped.push(SkippedDocument {
                record_id: doc.record_id,
                code: "AI_INDEX_DIMS_MISMATCH".to_string(),
                reason: format!("expected={d}; got={this_dims}"),
            });
            continue;
        }
        let vector_norm = l2_norm(&vector);
        entries.push(IndexedDocument {
            document: doc,
            vector,
            vector_norm,
        });
    }

    if entries.len() + skipped.len() != total {
        return Err(AppError::new("AI_INDEX_BUILD_FAILED", "Index build lost documents")
            .with_details(format!(
                "total={total}; indexed={}; skipped={}",
                entries.len(),
                skipped.len()
            )));
    }
    if total > 0 && entries.is_empty() {
        let first = skipped
            .first()
            .map(|s| format!("record_id={}; {}", s.record_id, s.reason))
            .unwrap_or_default();
        return Err(AppError::new(
            "AI_INDEX_BUILD_FAILED",
            "No document could be embedded; keeping previous index",
        )
        .with_details(format!("total={total}; first_failure={first}"))
        .with_retryable(any_retryable));
    }

    let built_at = now_rfc3339_utc();
    let report = IndexBuildReport {
        model: model.to_string(),
        generation,
        dims,
        total,
        indexed: entries.len(),
        skipped,
        built_at: built_at.clone(),
    };
    let snapshot = IndexSnapshot::from_entries(
        Some(model.to_string()),
        dims,
        generation,
        Some(built_at),
        entries,
    );
    debug!(generation, indexed = report.indexed, skipped = report.skipped.len(), "index built");
    Ok((snapshot, report))
}

/// Holder of the currently published snapshot.
///
/// Readers clone the `Arc` and then work lock-free on an immutable snapshot; `publish`
/// swaps the pointer as a whole. A replaced snapshot lives until its last reader drops it.
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<IndexSnapshot>>,
    generations: AtomicU64,
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexHandle {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(IndexSnapshot::empty())),
            generations: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the published snapshot; returns the one it replaced.
    pub fn publish(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        self.generations
            .fetch_max(snapshot.generation(), Ordering::SeqCst);
        let next = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *guard, next);
        info!(
            generation = guard.generation(),
            documents = guard.len(),
            "published index snapshot"
        );
        previous
    }

    /// Reserve the generation number for the next build.
    pub fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }
}
