//! Error types shared across the pagechat crates.

/// Errors raised while assembling the runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum PageChatError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}
