//! Result export in JSON and CSV form.

use chrono::Utc;
use serde_json::{json, Value};

use crate::models::chat::ChatMessageRow;
use crate::pipeline::state::{FinalResults, SessionState};

pub const CSV_HEADER: &str = "Filename,Score,Qualified,Summary";
const CSV_SUMMARY_LIMIT: usize = 100;

/// Full session export: header, results and chat history under one envelope.
pub fn export_json(state: &SessionState, chat_history: &[ChatMessageRow]) -> Value {
    json!({
        "session_id": state.session_id,
        "session_title": state.session_title,
        "export_timestamp": Utc::now(),
        "position_title": state.position_title,
        "job_description": state.job_description,
        "required_candidates": state.required_candidates,
        "status": state.processing_status.as_str(),
        "results": state.final_results,
        "chat_history": chat_history,
    })
}

/// Commas would break the row; newlines would break the line.
fn csv_field(raw: &str) -> String {
    raw.replace(',', ";").replace(['\n', '\r'], " ")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}

/// Spreadsheet-friendly view of the ranked evaluations.
pub fn export_csv(results: &FinalResults) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for candidate in &results.all_evaluations {
        let summary = candidate
            .evaluation
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let qualified = if candidate.is_qualified { "Yes" } else { "No" };
        out.push_str(&format!(
            "{},{:.1},{qualified},{}\n",
            csv_field(&candidate.filename),
            candidate.score,
            csv_field(&truncate_chars(summary, CSV_SUMMARY_LIMIT)),
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::pipeline::state::{build_final_results, CandidateResult};

    fn results() -> FinalResults {
        build_final_results(
            vec![
                CandidateResult {
                    file_id: Uuid::new_v4(),
                    filename: "alice,v2.pdf".to_string(),
                    score: 8.0,
                    is_qualified: true,
                    evaluation: json!({"summary": "Great, with caveats.\nSee notes."}),
                    extracted_text: None,
                },
                CandidateResult {
                    file_id: Uuid::new_v4(),
                    filename: "bob.pdf".to_string(),
                    score: 3.0,
                    is_qualified: false,
                    evaluation: json!({"summary": "s".repeat(200)}),
                    extracted_text: None,
                },
            ],
            1,
        )
    }

    #[test]
    fn test_csv_header_and_rows() {
        let csv = export_csv(&results());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Filename,Score,Qualified,Summary");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("alice;v2.pdf,8.0,Yes,"));
        assert!(lines[2].starts_with("bob.pdf,3.0,No,"));
    }

    #[test]
    fn test_csv_escapes_commas_and_newlines() {
        let csv = export_csv(&results());
        assert!(csv.contains("Great; with caveats. See notes."));
    }

    #[test]
    fn test_csv_truncates_long_summaries() {
        let csv = export_csv(&results());
        let bob_row = csv.lines().find(|l| l.starts_with("bob.pdf")).unwrap();
        let summary = bob_row.rsplit(',').next().unwrap();
        assert_eq!(summary.chars().count(), 100);
    }

    #[test]
    fn test_json_envelope_shape() {
        let state = SessionState::new(
            "s1".to_string(),
            "JD".to_string(),
            "Role".to_string(),
            1,
            Vec::new(),
        );
        let envelope = export_json(&state, &[]);
        assert_eq!(envelope["session_id"], "s1");
        assert!(envelope.get("export_timestamp").is_some());
        assert!(envelope["results"].is_null());
        assert!(envelope["chat_history"].as_array().unwrap().is_empty());
    }
}
