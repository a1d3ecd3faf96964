use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlagError {
    #[error("remote flag evaluation failed: {0}")]
    RemoteEvaluation(String),
    #[error("flag definitions are not loaded")]
    DefinitionsUnavailable,
    #[error("failed to parse flag definitions: {0}")]
    DefinitionsParsing(#[from] serde_json::Error),
    #[error("failed to read flag definitions: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Receives every error the client swallows. Flag entry points never fail, they report here.
pub type ErrorHandler = Arc<dyn Fn(&FlagError) + Send + Sync>;

pub fn log_error_handler() -> ErrorHandler {
    Arc::new(|error: &FlagError| {
        tracing::error!("Flag evaluation error: {}", error);
    })
}
