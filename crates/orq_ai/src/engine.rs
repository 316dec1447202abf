use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};

use orq_core::domain::{OrderRecord, ValidationWarning};
use orq_core::error::AppError;
use orq_core::ingest::ndjson::{load_orders_dir, load_orders_ndjson};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::answer::{synthesize_answer, AnswerResult, SynthesisOptions};
use crate::config::EngineConfig;
use crate::document::build_documents;
use crate::embeddings::{Embedder, OllamaEmbedder};
use crate::index::{build_index, IndexBuildReport, IndexHandle, SnapshotStore};
use crate::llm::{Llm, OllamaLlm};
use crate::ollama::OllamaClient;
use crate::retrieve::{retrieve, retrieve_documents, EvidenceItem, RetrievedEvidence};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    pub query_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    pub used_record_ids: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub uncorroborated: bool,
}

impl From<AnswerResult> for QueryResponse {
    fn from(r: AnswerResult) -> Self {
        Self {
            answer: r.answer,
            used_record_ids: r.used_record_ids,
            confidence: r.confidence,
            uncorroborated: r.uncorroborated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStatus {
    pub ready: bool,
    pub records: usize,
    pub indexed: usize,
    pub generation: u64,
    pub model: Option<String>,
    pub dims: Option<u32>,
    pub built_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped_lines: Vec<usize>,
    #[serde(default)]
    pub skipped_by_file: BTreeMap<String, Vec<usize>>,
    pub warnings: Vec<ValidationWarning>,
    pub source_sha256: String,
}

pub const EMPTY_INDEX_ANSWER: &str =
    "No order records are indexed yet, so there is no evidence to answer from.";

/// Record set, published index, and the model collaborators behind the query interface.
///
/// `query`/`retrieve` take `&self` and run concurrently; each works on the snapshot that was
/// published when it started. `reindex` builds off to the side and swaps the result in.
pub struct AnswerEngine {
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn Llm>,
    records: RwLock<Arc<Vec<OrderRecord>>>,
    index: IndexHandle,
    store: Option<SnapshotStore>,
    ollama: Option<OllamaClient>,
    reindex_lock: Mutex<()>,
}

impl AnswerEngine {
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn Llm>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let store = config.snapshot_dir.clone().map(SnapshotStore::open);
        Ok(Self {
            config,
            embedder,
            llm,
            records: RwLock::new(Arc::new(Vec::new())),
            index: IndexHandle::new(),
            store,
            ollama: None,
            reindex_lock: Mutex::new(()),
        })
    }

    /// Engine backed by the local Ollama server named in `config`.
    pub fn with_ollama(config: EngineConfig) -> Result<Self, AppError> {
        let client =
            OllamaClient::new(&config.ollama_base_url)?.with_timeout(config.request_timeout());
        let embedder = Arc::new(OllamaEmbedder::new(client.clone()));
        let llm = Arc::new(OllamaLlm::new(client.clone()).with_temperature(config.temperature));
        let mut engine = Self::new(config, embedder, llm)?;
        engine.ollama = Some(client);
        Ok(engine)
    }

    /// Probe the Ollama server behind this engine. Engines built from injected collaborators
    /// have nothing to probe and report healthy.
    pub fn check_model_server(&self) -> Result<(), AppError> {
        match &self.ollama {
            Some(client) => client.health_check(),
            None => Ok(()),
        }
    }

    pub fn with_snapshot_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Publish the stored snapshot, if any, when it was built with the configured embedding
    /// model. Returns whether a snapshot was published.
    pub fn warm_start(&self) -> Result<bool, AppError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let Some(snapshot) = store.load()? else {
            return Ok(false);
        };
        if snapshot.model() != Some(self.config.embedding_model.as_str()) {
            warn!(
                stored = snapshot.model().unwrap_or(""),
                configured = %self.config.embedding_model,
                "stored snapshot uses a different embedding model; ignoring"
            );
            return Ok(false);
        }
        self.index.publish(snapshot);
        Ok(true)
    }

    pub fn records(&self) -> Arc<Vec<OrderRecord>> {
        let guard = self.records.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the record set. The index is untouched until the next [`AnswerEngine::reindex`].
    pub fn replace_records(&self, records: Vec<OrderRecord>) {
        let mut guard = self.records.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(records);
    }

    /// Load orders from one `.ndjson` file, or every `.ndjson` file under a directory.
    pub fn load_ndjson(&self, path: &Path) -> Result<LoadSummary, AppError> {
        let summary = if path.is_dir() {
            load_orders_dir(path)?
        } else {
            load_orders_ndjson(path)?
        };
        let loaded = summary.records.len();
        self.replace_records(summary.records);
        Ok(LoadSummary {
            loaded,
            skipped_lines: summary.skipped_lines,
            skipped_by_file: summary.skipped_by_file,
            warnings: summary.warnings,
            source_sha256: summary.source_sha256,
        })
    }

    /// Rebuild documents and embeddings for the current record set and publish the result.
    ///
    /// On failure the previously published snapshot keeps serving.
    pub fn reindex(&self) -> Result<IndexBuildReport, AppError> {
        let _building = self.reindex_lock.lock().unwrap_or_else(|e| e.into_inner());

        let records = self.records();
        let documents = build_documents(&records);
        let generation = self.index.next_generation();
        let (snapshot, report) = build_index(
            documents,
            self.embedder.as_ref(),
            &self.config.embedding_model,
            generation,
        )?;

        self.index.publish(snapshot);
        info!(
            generation,
            indexed = report.indexed,
            skipped = report.skipped.len(),
            "reindex complete"
        );

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.index.snapshot()) {
                warn!(error = %e, "failed to persist index snapshot");
            }
        }
        Ok(report)
    }

    pub fn status(&self) -> EngineStatus {
        let snap = self.index.snapshot();
        EngineStatus {
            ready: !snap.is_empty(),
            records: self.records().len(),
            indexed: snap.len(),
            generation: snap.generation(),
            model: snap.model().map(str::to_string),
            dims: snap.dims(),
            built_at: snap.built_at().map(str::to_string),
        }
    }

    /// Hybrid retrieval against the current snapshot. `k` defaults to the configured `top_k`.
    pub fn retrieve(&self, query_text: &str, k: Option<usize>) -> Vec<EvidenceItem> {
        let snap = self.index.snapshot();
        retrieve(
            &snap,
            self.embedder.as_ref(),
            query_text,
            self.config.clamp_k(k),
        )
    }

    pub fn query(&self, req: &QueryRequest) -> Result<QueryResponse, AppError> {
        self.answer(&req.query_text, None).map(QueryResponse::from)
    }

    pub fn query_with_cancel(
        &self,
        req: &QueryRequest,
        cancel: &AtomicBool,
    ) -> Result<QueryResponse, AppError> {
        self.answer(&req.query_text, Some(cancel))
            .map(QueryResponse::from)
    }

    /// Full cited answer, including stripped identifiers and the session's evidence.
    ///
    /// The whole session reads one snapshot, so a concurrent reindex cannot mix evidence from
    /// two builds into a single answer.
    pub fn answer(
        &self,
        question: &str,
        cancel: Option<&AtomicBool>,
    ) -> Result<AnswerResult, AppError> {
        let snap = self.index.snapshot();
        if snap.is_empty() {
            if question.trim().is_empty() {
                return Err(AppError::new("AI_QUERY_INVALID", "Query must not be empty"));
            }
            info!("query against empty index; answering without evidence");
            return Ok(AnswerResult {
                answer: EMPTY_INDEX_ANSWER.to_string(),
                used_record_ids: Vec::new(),
                confidence: 0.0,
                uncorroborated: false,
                stripped_record_ids: Vec::new(),
                evidence: Vec::new(),
                tool_calls: 0,
            });
        }

        let embedder = self.embedder.as_ref();
        let tool = |q: &str, k: usize| -> Vec<RetrievedEvidence> {
            retrieve_documents(&snap, embedder, q, k)
        };
        let opts = SynthesisOptions::from_config(&self.config);
        synthesize_answer(self.llm.as_ref(), &tool, question, &opts, cancel)
    }
}
