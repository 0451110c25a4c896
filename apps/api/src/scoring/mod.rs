//! CV scoring against a job description.
//!
//! `CvScorer` produces the raw model output; `parse_evaluation` turns it
//! into a structured [`ParsedEvaluation`], recovering embedded JSON when the
//! model wraps it in prose. A `None` from the parser is a normal outcome the
//! pipeline answers with [`fallback_evaluation`], never an exception.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::llm_client::prompts::{CV_SCORING_PROMPT, CV_SCORING_SYSTEM};
use crate::llm_client::{strip_json_fences, LlmClient, LlmError, MODEL};

/// Candidates scoring at or above this are qualified, regardless of the
/// verdict the model itself emitted.
pub const PASS_THRESHOLD: f64 = 6.5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriteriaScores {
    #[serde(default)]
    pub job_fit: f64,
    #[serde(default)]
    pub experience: f64,
    #[serde(default)]
    pub skills: f64,
    #[serde(default)]
    pub education: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEvaluation {
    #[serde(default)]
    pub overall_score: f64,
    #[serde(default)]
    pub qualified: bool,
    #[serde(default)]
    pub criteria: CriteriaScores,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

#[async_trait]
pub trait CvScorer: Send + Sync {
    /// Scores `cv_text` against `job_description`, returning the raw model
    /// output for parsing and audit.
    async fn score(&self, job_description: &str, cv_text: &str) -> Result<String, LlmError>;

    /// Identifier recorded on each evaluation row.
    fn model_identifier(&self) -> &str;
}

/// Parses raw scorer output into a structured evaluation.
///
/// Tries the whole payload first (minus code fences), then the outermost
/// `{...}` block. The score is clamped to 0-10 and the qualification verdict
/// is re-derived from [`PASS_THRESHOLD`] rather than trusted.
pub fn parse_evaluation(raw: &str) -> Option<ParsedEvaluation> {
    let candidate = strip_json_fences(raw);

    let parsed = serde_json::from_str::<ParsedEvaluation>(candidate)
        .ok()
        .or_else(|| {
            let start = candidate.find('{')?;
            let end = candidate.rfind('}')?;
            if end <= start {
                return None;
            }
            serde_json::from_str::<ParsedEvaluation>(&candidate[start..=end]).ok()
        })?;

    let mut evaluation = parsed;
    evaluation.overall_score = evaluation.overall_score.clamp(0.0, 10.0);
    evaluation.qualified = evaluation.overall_score >= PASS_THRESHOLD;
    Some(evaluation)
}

/// Zero-score, unqualified evaluation used when extraction or scoring could
/// not produce a usable result. Recorded like any other evaluation so the
/// file never silently disappears from the run.
pub fn fallback_evaluation(reason: &str) -> ParsedEvaluation {
    ParsedEvaluation {
        overall_score: 0.0,
        qualified: false,
        criteria: CriteriaScores::default(),
        strengths: vec!["Needs manual review".to_string()],
        weaknesses: vec!["Could not be analyzed automatically".to_string()],
        summary: format!("Automatic evaluation failed: {reason}"),
    }
}

/// Scorer backed by the shared LLM client.
pub struct LlmCvScorer {
    llm: LlmClient,
}

impl LlmCvScorer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CvScorer for LlmCvScorer {
    async fn score(&self, job_description: &str, cv_text: &str) -> Result<String, LlmError> {
        let prompt = CV_SCORING_PROMPT
            .replace("{job_description}", job_description)
            .replace("{cv_text}", cv_text);

        let raw = self.llm.call_text(&prompt, CV_SCORING_SYSTEM).await?;
        info!("Scorer returned {} characters", raw.len());
        Ok(raw)
    }

    fn model_identifier(&self) -> &str {
        MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct_json() {
        let raw = r#"{"overall_score": 7.5, "qualified": true,
            "criteria": {"job_fit": 8.0, "experience": 7.0, "skills": 7.5, "education": 8.0},
            "strengths": ["Rust"], "weaknesses": ["No cloud"], "summary": "Solid."}"#;
        let eval = parse_evaluation(raw).unwrap();
        assert_eq!(eval.overall_score, 7.5);
        assert!(eval.qualified);
        assert_eq!(eval.criteria.job_fit, 8.0);
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let raw = "Here is my assessment:\n{\"overall_score\": 5.0, \"qualified\": true, \"summary\": \"ok\"}\nThanks!";
        let eval = parse_evaluation(raw).unwrap();
        assert_eq!(eval.overall_score, 5.0);
        // Verdict is re-derived from the threshold, not trusted.
        assert!(!eval.qualified);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"overall_score\": 9.0, \"qualified\": false}\n```";
        let eval = parse_evaluation(raw).unwrap();
        assert!(eval.qualified);
    }

    #[test]
    fn test_threshold_boundary() {
        let at = parse_evaluation(r#"{"overall_score": 6.5}"#).unwrap();
        assert!(at.qualified);
        let below = parse_evaluation(r#"{"overall_score": 6.49}"#).unwrap();
        assert!(!below.qualified);
    }

    #[test]
    fn test_score_is_clamped() {
        let eval = parse_evaluation(r#"{"overall_score": 42.0}"#).unwrap();
        assert_eq!(eval.overall_score, 10.0);
        let eval = parse_evaluation(r#"{"overall_score": -3.0}"#).unwrap();
        assert_eq!(eval.overall_score, 0.0);
    }

    #[test]
    fn test_unparseable_returns_none() {
        assert!(parse_evaluation("I cannot evaluate this CV.").is_none());
        assert!(parse_evaluation("").is_none());
        assert!(parse_evaluation("{not json}").is_none());
    }

    #[test]
    fn test_fallback_is_zero_and_unqualified() {
        let eval = fallback_evaluation("scorer timed out");
        assert_eq!(eval.overall_score, 0.0);
        assert!(!eval.qualified);
        assert!(eval.summary.contains("scorer timed out"));
    }
}
