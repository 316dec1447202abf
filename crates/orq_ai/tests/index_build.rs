mod support;

use std::sync::Arc;

use orq_ai::document::{build_document, build_documents};
use orq_ai::embeddings::Embedder;
use orq_ai::index::{build_index, IndexHandle, IndexSnapshot};
use orq_core::demo::demo_orders;
use orq_core::error::AppError;
use pretty_assertions::assert_eq;

use support::{FlakyEmbedder, KeywordEmbedder};

#[test]
fn builds_one_entry_per_order_in_identifier_order() {
    let embedder = KeywordEmbedder::new();
    let docs = build_documents(&demo_orders());
    let (snap, report) = build_index(docs, &embedder, "mock", 1).expect("build");

    assert_eq!(embedder.call_count(), 12);
    assert_eq!(report.total, 12);
    assert_eq!(report.indexed, 12);
    assert!(report.skipped.is_empty());
    assert_eq!(report.dims, Some(5));
    assert_eq!(snap.len(), 12);
    assert_eq!(snap.model(), Some("mock"));
    assert_eq!(snap.generation(), 1);

    let ids: Vec<&str> = snap.record_ids().collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
    assert!(snap.lookup_exact("ORD-0003").is_some());
    assert!(snap.lookup_exact("ORD-0099").is_none());
}

#[test]
fn snapshot_does_not_depend_on_input_order() {
    let embedder = KeywordEmbedder::new();
    let docs = build_documents(&demo_orders());
    let mut reversed = docs.clone();
    reversed.reverse();

    let (a, _) = build_index(docs, &embedder, "mock", 1).expect("build a");
    let (b, _) = build_index(reversed, &embedder, "mock", 1).expect("build b");
    assert_eq!(a.entries(), b.entries());
}

#[test]
fn failed_embeddings_are_skipped_and_reported() {
    let embedder = FlakyEmbedder {
        inner: KeywordEmbedder::new(),
        poisoned: vec!["ORD-0003".to_string()],
        retryable: false,
    };
    let (snap, report) =
        build_index(build_documents(&demo_orders()), &embedder, "mock", 1).expect("build");

    assert_eq!(report.indexed, 11);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].record_id, "ORD-0003");
    assert_eq!(report.skipped[0].code, "AI_EMBEDDINGS_FAILED");
    assert!(snap.lookup_exact("ORD-0003").is_none());
}

#[test]
fn build_where_every_document_fails_is_rejected() {
    let embedder = FlakyEmbedder {
        inner: KeywordEmbedder::new(),
        poisoned: vec!["Order Details".to_string()],
        retryable: true,
    };
    let err = build_index(build_documents(&demo_orders()), &embedder, "mock", 1)
        .expect_err("should fail");
    assert_eq!(err.code, "AI_INDEX_BUILD_FAILED");
    assert!(err.retryable);
}

#[test]
fn duplicate_identifiers_keep_the_first_document() {
    let orders = demo_orders();
    let mut twin = orders[0].clone();
    twin.customer_email = "twin@masked.invalid".to_string();
    let docs = vec![build_document(&orders[0]), build_document(&twin)];

    let (snap, report) = build_index(docs, &KeywordEmbedder::new(), "mock", 1).expect("build");
    assert_eq!(snap.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].code, "AI_INDEX_DUPLICATE_ID");
    let kept = snap.lookup_exact("ORD-0001").expect("kept");
    assert!(kept.document.text.contains("user01@masked.invalid"));
}

struct RaggedEmbedder;

impl Embedder for RaggedEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        if input.contains("ORD-0012") {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        } else {
            Ok(vec![1.0, 0.5, 0.25])
        }
    }
}

#[test]
fn vectors_with_disagreeing_dims_are_skipped() {
    let (snap, report) =
        build_index(build_documents(&demo_orders()), &RaggedEmbedder, "mock", 1).expect("build");
    assert_eq!(snap.dims(), Some(3));
    assert_eq!(report.indexed, 11);
    assert_eq!(report.skipped[0].record_id, "ORD-0012");
    assert_eq!(report.skipped[0].code, "AI_INDEX_DIMS_MISMATCH");
}

struct OddFirstEmbedder;

impl Embedder for OddFirstEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        if input.contains("ORD-0001") {
            Ok(vec![1.0; 7])
        } else {
            Ok(vec![1.0, 0.5, 0.25])
        }
    }
}

#[test]
fn dims_follow_the_majority_not_the_first_document() {
    let (snap, report) =
        build_index(build_documents(&demo_orders()), &OddFirstEmbedder, "mock", 1).expect("build");
    assert_eq!(snap.dims(), Some(3));
    assert_eq!(report.indexed, 11);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].record_id, "ORD-0001");
    assert_eq!(report.skipped[0].code, "AI_INDEX_DIMS_MISMATCH");
}

#[test]
fn empty_record_set_builds_an_empty_snapshot() {
    let (snap, report) = build_index(Vec::new(), &KeywordEmbedder::new(), "mock", 1).expect("build");
    assert!(snap.is_empty());
    assert_eq!(report.total, 0);
    assert_eq!(report.dims, None);
}

#[test]
fn readers_keep_their_snapshot_across_a_publish() {
    let handle = IndexHandle::new();
    assert!(handle.snapshot().is_empty());

    let g1 = handle.next_generation();
    let (first, _) =
        build_index(build_documents(&demo_orders()[..3]), &KeywordEmbedder::new(), "mock", g1)
            .expect("build first");
    handle.publish(first);
    let held: Arc<IndexSnapshot> = handle.snapshot();

    let g2 = handle.next_generation();
    let (second, _) =
        build_index(build_documents(&demo_orders()), &KeywordEmbedder::new(), "mock", g2)
            .expect("build second");
    let previous = handle.publish(second);

    assert_eq!(held.len(), 3);
    assert_eq!(held.generation(), g1);
    assert!(Arc::ptr_eq(&held, &previous));
    assert_eq!(handle.snapshot().len(), 12);
    assert_eq!(handle.snapshot().generation(), g2);
    assert!(g2 > g1);
}
