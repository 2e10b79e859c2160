use thiserror::Error;

/// Engine-level errors.
///
/// Per-dispatch send failures are not represented here; those travel as
/// [`SendError`] and are absorbed into the run report and the delivery
/// ledger without aborting the run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Event source error: {0}")]
    Source(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome classification for a single channel send attempt.
///
/// Transient errors go through the retry policy; permanent errors mark the
/// ledger record exhausted and, for push, revoke the dead endpoint.
#[derive(Error, Debug, Clone)]
pub enum SendError {
    #[error("Transient send failure: {reason}")]
    Transient { reason: String },

    #[error("Permanent send failure: {reason}")]
    Permanent { reason: String },
}

impl SendError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent {
            reason: reason.into(),
        }
    }

    /// True if the failure indicates the destination is permanently invalid.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Transient { reason } | Self::Permanent { reason } => reason.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
