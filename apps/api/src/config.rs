use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub openai_api_key: String,
    pub ocr_api_url: String,
    pub ocr_api_key: String,
    pub upload_dir: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub company_name: String,
    pub company_email: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            ocr_api_url: require_env("OCR_API_URL")?,
            ocr_api_key: require_env("OCR_API_KEY")?,
            upload_dir: std::env::var("CV_UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            // SMTP credentials are optional: with an empty user the notifier
            // logs instead of sending, and evaluation runs are unaffected.
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            smtp_port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse::<u16>()
                .context("SMTP_PORT must be a valid port number")?,
            smtp_user: std::env::var("SMTP_USER").unwrap_or_default(),
            smtp_password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            company_name: std::env::var("COMPANY_NAME")
                .unwrap_or_else(|_| "Our Company".to_string()),
            company_email: std::env::var("COMPANY_EMAIL")
                .unwrap_or_else(|_| "hr@company.com".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
