//! Candidate notification emails.
//!
//! Dispatch is fire-and-forget: the pipeline hands over the candidate lists
//! and moves on, and every SMTP failure is logged rather than surfaced.
//! Recipient addresses are pulled out of the CV text itself; candidates whose
//! CVs carry no address are skipped.

use chrono::{Duration, Utc};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, warn};

use crate::config::Config;

/// Interview slots are offered this far out from the evaluation run.
const INTERVIEW_LEAD_DAYS: i64 = 14;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

/// Minimum a notifier needs to know about one candidate.
#[derive(Debug, Clone)]
pub struct NotifyCandidate {
    pub filename: String,
    pub score: f64,
    pub extracted_text: String,
}

/// Fire-and-forget notification seam. Implementations must return
/// immediately; actual delivery happens in the background.
pub trait Notifier: Send + Sync {
    /// Rejection notices, sent right away.
    fn send_rejections(&self, position_title: &str, candidates: Vec<NotifyCandidate>);

    /// Interview invitations with a proposed date two weeks out.
    fn schedule_interviews(&self, position_title: &str, candidates: Vec<NotifyCandidate>);
}

/// First plausible email address found in the CV text.
pub fn extract_email(cv_text: &str) -> Option<String> {
    EMAIL_RE.find(cv_text).map(|m| m.as_str().to_string())
}

/// Best-effort candidate name: the first short line of letters near the top
/// of the CV. Falls back to "Candidate".
pub fn extract_name(cv_text: &str) -> String {
    cv_text
        .lines()
        .take(5)
        .map(str::trim)
        .find(|line| {
            !line.is_empty()
                && line.split_whitespace().count() <= 4
                && line.len() <= 60
                && line
                    .chars()
                    .all(|c| c.is_alphabetic() || c.is_whitespace() || c == '.' || c == '-')
        })
        .map(|line| line.to_string())
        .unwrap_or_else(|| "Candidate".to_string())
}

fn rejection_body(name: &str, position_title: &str, company_name: &str) -> String {
    format!(
        "Dear {name},\n\n\
         Thank you for applying for the {position_title} position at {company_name}.\n\n\
         After careful review of your application, we have decided to move forward \
         with other candidates whose profiles more closely match our current needs. \
         We encourage you to apply for future openings that fit your experience.\n\n\
         We wish you the best in your job search.\n\n\
         Kind regards,\n\
         {company_name} Recruitment Team"
    )
}

fn invitation_body(
    name: &str,
    position_title: &str,
    company_name: &str,
    score: f64,
    interview_date: &str,
) -> String {
    format!(
        "Dear {name},\n\n\
         Thank you for applying for the {position_title} position at {company_name}.\n\n\
         We were impressed by your application (evaluation score: {score:.1}/10) and \
         would like to invite you to an interview.\n\n\
         Proposed date: {interview_date}\n\n\
         Please reply to this email to confirm the date or suggest an alternative.\n\n\
         We look forward to speaking with you.\n\n\
         Kind regards,\n\
         {company_name} Recruitment Team"
    )
}

/// SMTP-backed notifier. Without credentials it degrades to logging what it
/// would have sent, so local runs never hit a mail server.
pub struct SmtpNotifier {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
    company_name: String,
}

impl SmtpNotifier {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = if config.smtp_user.is_empty() {
            info!("SMTP credentials not configured; notification emails will only be logged");
            None
        } else {
            Some(
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                    .port(config.smtp_port)
                    .credentials(Credentials::new(
                        config.smtp_user.clone(),
                        config.smtp_password.clone(),
                    ))
                    .build(),
            )
        };

        Ok(Self {
            transport,
            from: config.company_email.clone(),
            company_name: config.company_name.clone(),
        })
    }

    fn dispatch(&self, recipient: String, subject: String, body: String) {
        let Some(transport) = self.transport.clone() else {
            info!("Email suppressed (SMTP disabled): to={recipient} subject={subject:?}");
            return;
        };

        let from = self.from.clone();
        tokio::spawn(async move {
            let from: Mailbox = match from.parse() {
                Ok(m) => m,
                Err(e) => {
                    error!("Invalid sender address {from:?}: {e}");
                    return;
                }
            };
            let to: Mailbox = match recipient.parse() {
                Ok(m) => m,
                Err(e) => {
                    warn!("Invalid recipient address {recipient:?}: {e}");
                    return;
                }
            };

            let message = Message::builder()
                .from(from)
                .to(to)
                .subject(&subject)
                .body(body);

            match message {
                Ok(message) => match transport.send(message).await {
                    Ok(_) => info!("Sent email to {recipient}: {subject:?}"),
                    Err(e) => error!("Failed to send email to {recipient}: {e}"),
                },
                Err(e) => error!("Failed to build email for {recipient}: {e}"),
            }
        });
    }

    fn send_batch(
        &self,
        position_title: &str,
        candidates: Vec<NotifyCandidate>,
        subject: String,
        build_body: impl Fn(&str, f64) -> String,
    ) {
        for candidate in candidates {
            let Some(recipient) = extract_email(&candidate.extracted_text) else {
                warn!(
                    "No email address found in {}; skipping notification for {position_title}",
                    candidate.filename
                );
                continue;
            };
            let name = extract_name(&candidate.extracted_text);
            self.dispatch(recipient, subject.clone(), build_body(&name, candidate.score));
        }
    }
}

impl Notifier for SmtpNotifier {
    fn send_rejections(&self, position_title: &str, candidates: Vec<NotifyCandidate>) {
        info!(
            "Dispatching {} rejection notices for {position_title}",
            candidates.len()
        );
        let subject = format!("Your application for {position_title}");
        let company = self.company_name.clone();
        let position = position_title.to_string();
        self.send_batch(position_title, candidates, subject, move |name, _| {
            rejection_body(name, &position, &company)
        });
    }

    fn schedule_interviews(&self, position_title: &str, candidates: Vec<NotifyCandidate>) {
        info!(
            "Dispatching {} interview invitations for {position_title}",
            candidates.len()
        );
        let interview_date = (Utc::now() + Duration::days(INTERVIEW_LEAD_DAYS))
            .format("%A, %B %-d, %Y")
            .to_string();
        let subject = format!("Interview invitation: {position_title}");
        let company = self.company_name.clone();
        let position = position_title.to_string();
        self.send_batch(position_title, candidates, subject, move |name, score| {
            invitation_body(name, &position, &company, score, &interview_date)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_email_finds_first_address() {
        let text = "Jane Doe\nSenior Engineer\nContact: jane.doe@example.com / +1 555 0100";
        assert_eq!(extract_email(text).as_deref(), Some("jane.doe@example.com"));
    }

    #[test]
    fn test_extract_email_none_when_absent() {
        assert!(extract_email("No contact details in this CV").is_none());
    }

    #[test]
    fn test_extract_name_takes_top_line() {
        let text = "Jane Doe\njane.doe@example.com\n10 years of experience";
        assert_eq!(extract_name(text), "Jane Doe");
    }

    #[test]
    fn test_extract_name_skips_long_lines() {
        let text = "A very long headline sentence describing everything this person has ever done\nJohn Smith";
        assert_eq!(extract_name(text), "John Smith");
    }

    #[test]
    fn test_extract_name_fallback() {
        assert_eq!(extract_name("user@example.com\n12345"), "Candidate");
    }

    #[test]
    fn test_bodies_mention_position_and_company() {
        let rejection = rejection_body("Jane", "Rust Engineer", "Acme");
        assert!(rejection.contains("Rust Engineer"));
        assert!(rejection.contains("Acme"));

        let invitation = invitation_body("Jane", "Rust Engineer", "Acme", 8.5, "Monday, June 1, 2026");
        assert!(invitation.contains("8.5/10"));
        assert!(invitation.contains("Monday, June 1, 2026"));
    }
}
