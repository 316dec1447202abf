pub mod snapshot;
pub mod store;

pub use snapshot::{
    build_index, IndexBuildReport, IndexHandle, IndexSnapshot, IndexedDocument, SimilarHit,
    SkippedDocument,
};
pub use store::SnapshotStore;
