//! Session Q&A: answering recruiter questions about a finished evaluation.
//!
//! The model only ever sees the context assembled here. Raw CV text is
//! expensive context, so it is included only when the question actually asks
//! for that level of detail, and always truncated.

use std::fmt::Write as _;

use tracing::info;

use crate::errors::AppError;
use crate::llm_client::prompts::SESSION_CHAT_SYSTEM;
use crate::llm_client::LlmClient;
use crate::models::chat::{MessageKind, Sender};
use crate::pipeline::state::SessionState;
use crate::storage::PersistenceGateway;

pub mod handlers;

/// At most this many candidates are summarized in the context.
const TOP_CANDIDATES_IN_CONTEXT: usize = 10;
/// Per-CV cap on raw text quoted into the context.
const CV_EXCERPT_CHARS: usize = 2000;

const DETAIL_KEYWORDS: &[&str] = &[
    "why", "detail", "details", "specific", "specifically", "explain", "experience", "skill",
    "skills", "background", "education", "compare",
];

/// Questions longer than this are assumed to want CV-level depth.
const LONG_QUESTION_CHARS: usize = 100;

/// True when the question asks about CV contents rather than aggregates:
/// a long question, a detail keyword, or naming an uploaded file.
fn wants_cv_detail(question: &str, state: &SessionState) -> bool {
    let lowered = question.to_lowercase();
    question.chars().count() > LONG_QUESTION_CHARS
        || DETAIL_KEYWORDS.iter().any(|k| lowered.contains(k))
        || state
            .final_results
            .as_ref()
            .map(|r| {
                r.all_evaluations
                    .iter()
                    .any(|c| lowered.contains(&c.filename.to_lowercase()))
            })
            .unwrap_or(false)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{cut}...")
    }
}

/// Builds the evaluation context for one question. Degrades gracefully: a
/// session without results still produces a usable (if thin) context.
pub fn build_session_context(state: &SessionState, question: &str) -> String {
    let mut context = String::new();
    let _ = writeln!(context, "POSITION: {}", state.position_title);
    let _ = writeln!(
        context,
        "JOB DESCRIPTION:\n{}\n",
        truncate_chars(&state.job_description, 1500)
    );

    let Some(results) = &state.final_results else {
        context.push_str("No evaluation results are available for this session yet.\n");
        return context;
    };

    let _ = writeln!(
        context,
        "RESULTS: {} CVs evaluated, {} qualified ({}%), average score {:.2}, best {:.1}, worst {:.1}",
        results.total_cvs,
        results.qualified_count,
        results.summary.qualification_rate,
        results.average_score,
        results.summary.best_score,
        results.summary.worst_score,
    );

    context.push_str("\nRANKED CANDIDATES:\n");
    for (rank, candidate) in results
        .all_evaluations
        .iter()
        .take(TOP_CANDIDATES_IN_CONTEXT)
        .enumerate()
    {
        let verdict = if candidate.is_qualified {
            "qualified"
        } else {
            "not qualified"
        };
        let summary = candidate
            .evaluation
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let _ = writeln!(
            context,
            "{}. {} - {:.1}/10 ({verdict}) {}",
            rank + 1,
            candidate.filename,
            candidate.score,
            summary
        );
    }

    if wants_cv_detail(question, state) {
        context.push_str("\nCV EXCERPTS:\n");
        for candidate in results
            .all_evaluations
            .iter()
            .take(TOP_CANDIDATES_IN_CONTEXT)
        {
            if let Some(text) = candidate.extracted_text.as_deref() {
                let _ = writeln!(
                    context,
                    "--- {} ---\n{}\n",
                    candidate.filename,
                    truncate_chars(text, CV_EXCERPT_CHARS)
                );
            }
        }
    }

    context
}

/// Answers a recruiter question about `state`, recording both turns in the
/// session's chat history.
pub async fn answer_question(
    llm: &LlmClient,
    gateway: &dyn PersistenceGateway,
    state: &SessionState,
    question: &str,
) -> Result<String, AppError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question must not be empty".to_string()));
    }

    gateway
        .append_chat_message(
            &state.session_id,
            MessageKind::User,
            question,
            Sender::User,
            None,
        )
        .await?;

    let context = build_session_context(state, question);
    let prompt = format!("{context}\nQUESTION: {question}");

    let answer = llm
        .call_text(&prompt, SESSION_CHAT_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;

    info!(
        "Answered question for session {} ({} chars of context)",
        state.session_id,
        context.len()
    );

    gateway
        .append_chat_message(
            &state.session_id,
            MessageKind::Result,
            &answer,
            Sender::Assistant,
            None,
        )
        .await?;

    Ok(answer)
}
