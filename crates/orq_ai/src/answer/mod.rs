use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use orq_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CitationPolicy, EngineConfig};
use crate::guardrails::{check_citations, CitationCheck};
use crate::llm::Llm;
use crate::retrieve::{EvidenceItem, RetrievedEvidence};

pub mod prompts;
pub mod protocol;

use prompts::{
    answer_turn_prompt, citation_correction_note, protocol_correction_note, TranscriptEntry,
};
use protocol::{parse_model_step, ModelStep};

/// Unparseable or out-of-budget replies tolerated (each answered with a corrective note)
/// before the session is given up as a synthesis failure.
const MAX_PROTOCOL_STRIKES: u32 = 1;

/// Citation rejections under [`CitationPolicy::RetryThenFlag`] before stripping.
const MAX_CITATION_REJECTIONS: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResult {
    pub answer: String,
    pub used_record_ids: Vec<String>,
    pub confidence: f64,
    /// Set when cited identifiers had to be stripped because they were never retrieved.
    pub uncorroborated: bool,
    pub stripped_record_ids: Vec<String>,
    /// Every evidence item surfaced during the session, first occurrence per identifier.
    pub evidence: Vec<EvidenceItem>,
    pub tool_calls: u32,
}

#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub model: String,
    pub max_tool_calls: u32,
    pub default_k: usize,
    pub max_k: usize,
    pub retry_backoff: Duration,
    pub citation_policy: CitationPolicy,
}

impl SynthesisOptions {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            model: cfg.chat_model.clone(),
            max_tool_calls: cfg.max_tool_calls,
            default_k: cfg.top_k,
            max_k: cfg.max_top_k,
            retry_backoff: cfg.retry_backoff(),
            citation_policy: cfg.citation_policy,
        }
    }

    /// Hard ceiling on model turns: every tool call, one citation rejection, one protocol
    /// strike, and the final answer.
    pub fn turn_limit(&self) -> u32 {
        self.max_tool_calls
            .saturating_add(MAX_CITATION_REJECTIONS + MAX_PROTOCOL_STRIKES + 1)
    }
}

fn sanitize_confidence(c: f64) -> f64 {
    if c.is_finite() {
        c.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn synthesis_failed(message: &str, cause: &AppError) -> AppError {
    AppError::new("AI_SYNTHESIS_FAILED", message)
        .with_details(cause.to_string())
        .with_retryable(cause.retryable)
}

/// One model call with a single retry after `backoff` for retryable failures.
fn call_model(llm: &dyn Llm, model: &str, prompt: &str, backoff: Duration) -> Result<String, AppError> {
    match llm.generate(model, prompt) {
        Ok(out) => Ok(out),
        Err(e) if e.retryable => {
            warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "model call failed; retrying once");
            std::thread::sleep(backoff);
            llm.generate(model, prompt)
                .map_err(|e2| synthesis_failed("Language model call failed after retry", &e2))
        }
        Err(e) => Err(synthesis_failed("Language model call failed", &e)),
    }
}

enum Finalize {
    Accept(AnswerResult),
    Reject(CitationCheck),
}

/// Per-question state. Lives for one `synthesize_answer` call and is then dropped.
struct Session<'a> {
    question: &'a str,
    opts: &'a SynthesisOptions,
    accumulator: BTreeSet<String>,
    evidence: Vec<EvidenceItem>,
    transcript: Vec<TranscriptEntry>,
    tool_calls: u32,
    citation_rejections: u32,
    protocol_strikes: u32,
}

impl<'a> Session<'a> {
    fn new(question: &'a str, opts: &'a SynthesisOptions) -> Self {
        Self {
            question,
            opts,
            accumulator: BTreeSet::new(),
            evidence: Vec::new(),
            transcript: Vec::new(),
            tool_calls: 0,
            citation_rejections: 0,
            protocol_strikes: 0,
        }
    }

    fn tool_calls_remaining(&self) -> u32 {
        self.opts.max_tool_calls.saturating_sub(self.tool_calls)
    }

    fn run_tool(
        &mut self,
        retrieve: &dyn Fn(&str, usize) -> Vec<RetrievedEvidence>,
        query: &str,
        k: Option<usize>,
    ) {
        let q = match query.trim() {
            "" => self.question,
            q => q,
        };
        let k = k.unwrap_or(self.opts.default_k).clamp(1, self.opts.max_k.max(1));
        let found = retrieve(q, k);
        for ev in found.iter() {
            if self.accumulator.insert(ev.item.record_id.clone()) {
                self.evidence.push(ev.item.clone());
            }
        }
        self.tool_calls += 1;
        debug!(
            tool_calls = self.tool_calls,
            query = q,
            k,
            returned = found.len(),
            "retrieve tool call"
        );
        self.transcript.push(TranscriptEntry::ToolResult {
            query: q.to_string(),
            k,
            evidence: found,
        });
    }

    fn strike(&mut self, reason: &str) -> Result<(), AppError> {
        self.protocol_strikes += 1;
        if self.protocol_strikes > MAX_PROTOCOL_STRIKES {
            return Err(AppError::new(
                "AI_SYNTHESIS_FAILED",
                "Model did not follow the answer protocol",
            )
            .with_details(reason.to_string()));
        }
        warn!(reason, "model protocol violation; re-prompting");
        self.transcript
            .push(TranscriptEntry::Note(protocol_correction_note(reason)));
        Ok(())
    }

    fn finalize(&mut self, answer: String, cited: Vec<String>, confidence: f64) -> Finalize {
        let check = check_citations(&cited, &self.accumulator);
        let mut confidence = sanitize_confidence(confidence);

        if !check.is_sound()
            && self.opts.citation_policy == CitationPolicy::RetryThenFlag
            && self.citation_rejections < MAX_CITATION_REJECTIONS
        {
            self.citation_rejections += 1;
            return Finalize::Reject(check);
        }

        let uncorroborated = !check.is_sound();
        if uncorroborated {
            let kept = check.kept.len() as f64;
            let cited = check.cited_count() as f64;
            confidence *= kept / cited;
            warn!(
                stripped = ?check.stripped,
                kept = check.kept.len(),
                "stripping citations that were never retrieved"
            );
        }
        if self.accumulator.is_empty() {
            confidence = 0.0;
        }

        Finalize::Accept(AnswerResult {
            answer,
            used_record_ids: check.kept,
            confidence,
            uncorroborated,
            stripped_record_ids: check.stripped,
            evidence: std::mem::take(&mut self.evidence),
            tool_calls: self.tool_calls,
        })
    }
}

/// Drive the bounded tool-call loop for one question and return a citation-checked answer.
///
/// `retrieve` is the evidence callback exposed to the model as its only tool. The loop runs
/// at most [`SynthesisOptions::turn_limit`] model turns. Every identifier in the returned
/// `used_record_ids` was surfaced by `retrieve` during this call.
///
/// Errors:
/// - `AI_QUERY_INVALID` for a blank question.
/// - `AI_SYNTHESIS_FAILED` when the model is unavailable after one retry, or keeps breaking
///   the reply protocol.
/// - `AI_SYNTHESIS_CANCELLED` when `cancel` is set between turns.
pub fn synthesize_answer(
    llm: &dyn Llm,
    retrieve: &dyn Fn(&str, usize) -> Vec<RetrievedEvidence>,
    question: &str,
    opts: &SynthesisOptions,
    cancel: Option<&AtomicBool>,
) -> Result<AnswerResult, AppError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::new("AI_QUERY_INVALID", "Query must not be empty"));
    }

    let mut session = Session::new(question, opts);
    let turn_limit = opts.turn_limit();

    for turn in 1..=turn_limit {
        if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
            info!(turn, "answer session cancelled");
            return Err(AppError::new("AI_SYNTHESIS_CANCELLED", "Query was cancelled")
                .with_details(format!("turn={turn}")));
        }

        let prompt = answer_turn_prompt(
            question,
            &session.transcript,
            session.tool_calls_remaining(),
        );
        let raw = call_model(llm, &opts.model, &prompt, opts.retry_backoff)?;
        session
            .transcript
            .push(TranscriptEntry::ModelReply(raw.clone()));

        let step = match parse_model_step(&raw) {
            Ok(step) => step,
            Err(e) => {
                session.strike(e.details.as_deref().unwrap_or(&e.message))?;
                continue;
            }
        };

        match step {
            ModelStep::ToolCall { query, k } => {
                if session.tool_calls_remaining() == 0 {
                    session.strike("tool call budget exhausted")?;
                    continue;
                }
                session.run_tool(retrieve, &query, k);
            }
            ModelStep::FinalAnswer {
                answer,
                used_record_ids,
                confidence,
            } => match session.finalize(answer, used_record_ids, confidence) {
                Finalize::Accept(result) => {
                    info!(
                        turn,
                        tool_calls = result.tool_calls,
                        cited = result.used_record_ids.len(),
                        uncorroborated = result.uncorroborated,
                        confidence = result.confidence,
                        "answer synthesized"
                    );
                    return Ok(result);
                }
                Finalize::Reject(check) => {
                    warn!(stripped = ?check.stripped, "answer cited unretrieved records; asking model to retry");
                    session
                        .transcript
                        .push(TranscriptEntry::Note(citation_correction_note(&check.stripped)));
                }
            },
        }
    }

    Err(AppError::new(
        "AI_SYNTHESIS_FAILED",
        "Model did not produce a final answer within the turn limit",
    )
    .with_details(format!("turn_limit={turn_limit}")))
}
