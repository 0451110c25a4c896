//! Human-readable session titles derived from the position or, failing that,
//! the job description text.

use once_cell::sync::Lazy;
use regex::Regex;

const MAX_TITLE_LEN: usize = 100;

static HIRING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:looking for|hiring|seeking|recruiting)\s+(?:an?\s+)?([A-Za-z][A-Za-z+#/ ]{2,40}?)(?:\s+(?:to|with|who|for)\b|[.,\n]|$)",
    )
    .unwrap()
});

static POSITION_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:position|role|job title)\s*[:\-]\s*(\S.*)$").unwrap());

static JOB_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b((?:[A-Z][A-Za-z+#]*\s+){0,3}(?:Engineer|Developer|Programmer|Manager|Analyst|Designer|Scientist|Architect|Consultant|Specialist|Administrator|Accountant|Recruiter|Lead|Intern))\b",
    )
    .unwrap()
});

fn tidy(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut title = collapsed.trim_matches(|c: char| !c.is_alphanumeric()).to_string();
    if title.chars().count() > 60 {
        title = title.chars().take(60).collect::<String>().trim_end().to_string();
    }
    title
}

/// Derives a title for a new session.
///
/// Preference order: the explicit position title, a "position:" line in the
/// job description, a hiring phrase, a recognizable job-title keyword, then
/// a generic fallback carrying a short session-id suffix. When more than one
/// candidate is wanted the opening count is appended.
pub fn generate_session_title(
    position_title: &str,
    job_description: &str,
    required_candidates: usize,
    session_id: &str,
) -> String {
    let base = [position_title]
        .into_iter()
        .map(tidy)
        .find(|t| !t.is_empty())
        .or_else(|| {
            POSITION_LINE_RE
                .captures(job_description)
                .map(|c| tidy(&c[1]))
                .filter(|t| !t.is_empty())
        })
        .or_else(|| {
            HIRING_RE
                .captures(job_description)
                .map(|c| tidy(&c[1]))
                .filter(|t| !t.is_empty())
        })
        .or_else(|| {
            JOB_KEYWORD_RE
                .captures(job_description)
                .map(|c| tidy(&c[1]))
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| {
            let suffix: String = session_id.chars().take(8).collect();
            format!("CV Evaluation {suffix}")
        });

    if required_candidates > 1 {
        format!("{base} ({required_candidates} openings)")
    } else {
        base
    }
}

/// Checks a user-supplied title: non-empty, at most 100 characters, no
/// markup or path characters.
pub fn validate_session_title(title: &str) -> Result<(), &'static str> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("Title must not be empty");
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err("Title must be at most 100 characters");
    }
    if trimmed.chars().any(|c| "<>{}\\/;".contains(c)) {
        return Err("Title contains forbidden characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_title_wins() {
        let title =
            generate_session_title("Senior Rust Engineer", "We are hiring a plumber.", 1, "abc123");
        assert_eq!(title, "Senior Rust Engineer");
    }

    #[test]
    fn test_position_line_in_description() {
        let jd = "Position: Backend Developer\nWe build things.";
        assert_eq!(generate_session_title("", jd, 1, "abc123"), "Backend Developer");
    }

    #[test]
    fn test_hiring_phrase() {
        let jd = "We are looking for a data analyst to join our team.";
        assert_eq!(generate_session_title("", jd, 1, "abc123"), "data analyst");
    }

    #[test]
    fn test_keyword_fallback() {
        let jd = "The ideal candidate is a Machine Learning Engineer with 5 years of experience.";
        assert_eq!(
            generate_session_title("", jd, 1, "abc123"),
            "Machine Learning Engineer"
        );
    }

    #[test]
    fn test_generic_fallback_uses_session_id() {
        let title = generate_session_title("", "no recognizable content here", 1, "d3adbeefcafe");
        assert_eq!(title, "CV Evaluation d3adbeef");
    }

    #[test]
    fn test_openings_suffix() {
        let title = generate_session_title("QA Engineer", "", 3, "abc123");
        assert_eq!(title, "QA Engineer (3 openings)");
    }

    #[test]
    fn test_validate_rejects_bad_titles() {
        assert!(validate_session_title("  ").is_err());
        assert!(validate_session_title(&"x".repeat(101)).is_err());
        assert!(validate_session_title("<script>").is_err());
        assert!(validate_session_title("Rust Engineer 2026").is_ok());
    }
}
