use std::fmt::Write as _;

use crate::retrieve::{MatchMode, RetrievedEvidence};

/// The three canonical business questions, as `(title, query)`.
pub const BUSINESS_QUESTIONS: [(&str, &str); 3] = [
    (
        "Per-Order Explanation (ORD-0003)",
        "Explain what is special or noteworthy about order ORD-0003 from a data quality or business perspective.",
    ),
    (
        "Coupon and Tag Usage Patterns",
        "Describe patterns of how coupon codes and tags like vip or promo are used across the accepted orders.",
    ),
    (
        "Suspicious/Edge Cases",
        "Based on the accepted orders, identify a few orders that look suspicious or edge-cases from a business rules perspective and explain why.",
    ),
];

/// Entries of the running session transcript that are replayed to the model every turn.
#[derive(Debug, Clone)]
pub enum TranscriptEntry {
    ModelReply(String),
    ToolResult {
        query: String,
        k: usize,
        evidence: Vec<RetrievedEvidence>,
    },
    Note(String),
}

fn mode_label(mode: MatchMode) -> &'static str {
    match mode {
        MatchMode::ExactMatch => "exact",
        MatchMode::VectorMatch => "vector",
    }
}

fn render_transcript(transcript: &[TranscriptEntry]) -> String {
    if transcript.is_empty() {
        return "(no steps yet)".to_string();
    }
    let mut out = String::new();
    for entry in transcript {
        match entry {
            TranscriptEntry::ModelReply(raw) => {
                let _ = writeln!(out, "[you] {}", raw.trim());
            }
            TranscriptEntry::ToolResult { query, k, evidence } => {
                let _ = writeln!(
                    out,
                    "[tool retrieve query={query:?} k={k}] Found {} relevant orders:",
                    evidence.len()
                );
                for ev in evidence {
                    let _ = writeln!(
                        out,
                        "Order ID: {} (match={}, score={:.3})\n{}",
                        ev.item.record_id,
                        mode_label(ev.item.mode),
                        ev.item.score,
                        ev.text.trim_end()
                    );
                }
            }
            TranscriptEntry::Note(note) => {
                let _ = writeln!(out, "[system] {note}");
            }
        }
    }
    out
}

/// Prompt for one model turn of the cited-answer loop.
pub fn answer_turn_prompt(
    question: &str,
    transcript: &[TranscriptEntry],
    tool_calls_remaining: u32,
) -> String {
    let budget = if tool_calls_remaining > 0 {
        format!("You may call the retrieve tool {tool_calls_remaining} more time(s).")
    } else {
        "No tool calls remain. You must reply with a final_answer step now.".to_string()
    };
    let transcript = render_transcript(transcript);

    format!(
        r#"You are an expert logistics data analyst answering questions about customer orders.

Rules (non-negotiable):
1) Use ONLY order documents returned by the retrieve tool in this session as evidence.
2) Do NOT invent order IDs or values that are not present in retrieved documents.
3) used_record_ids MUST list exactly the retrieved order IDs your answer relies on.
4) If multiple similar-looking IDs appear (e.g. ORD-0033 vs ORD-0003), only discuss the one asked about.
5) If the retrieved evidence does not answer the question, say so and use a low confidence.

Consider data quality issues, business rule violations (e.g. refunded orders with high amounts),
coupon and tag usage patterns, and suspicious combinations of fields.

Tool:
retrieve(query: string, k: integer) -> up to k order documents ranked by relevance.
Order IDs written literally in the query (e.g. ORD-0003) are always returned first,
followed by the orders of any customer email written literally.

Reply with exactly one JSON object and nothing else, either:
{{"step":"tool_call","query":"<search text>","k":<integer>}}
or:
{{"step":"final_answer","answer":"<text>","used_record_ids":["ORD-0001"],"confidence":<0.0-1.0>}}

Question:
{question}

Session so far:
{transcript}
{budget}
"#
    )
}

pub fn citation_correction_note(stripped: &[String]) -> String {
    format!(
        "Your final_answer cited order IDs that were never retrieved in this session: {}. \
         Retrieve them first or remove them from used_record_ids.",
        stripped.join(", ")
    )
}

pub fn protocol_correction_note(reason: &str) -> String {
    format!("Your last reply was rejected ({reason}). Reply with one valid JSON step object.")
}
