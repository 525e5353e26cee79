use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("Database error: {reason}")]
    DatabaseError { reason: String },

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Product not found: {article}")]
    ProductNotFound { article: i64 },

    #[error("Feedbacks unavailable for root {root_id}: {reason}")]
    FeedbacksUnavailable { root_id: i64, reason: String },

    #[error("Telegram API error in {method}: {reason}")]
    TelegramError { method: String, reason: String },
}

impl BotError {
    /// Short classification used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::ConfigError { .. } => "config",
            BotError::DatabaseError { .. } => "database",
            BotError::SqlxError(_) => "database",
            BotError::MigrateError(_) => "database",
            BotError::JsonError(_) => "serde",
            BotError::HttpError(_) => "http",
            BotError::ProductNotFound { .. } => "market",
            BotError::FeedbacksUnavailable { .. } => "market",
            BotError::TelegramError { .. } => "telegram",
        }
    }
}
