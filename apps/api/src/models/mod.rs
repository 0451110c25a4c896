pub mod analytics;
pub mod chat;
pub mod evaluation;
pub mod file;
pub mod session;
