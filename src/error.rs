use thiserror::Error;

use crate::judges::sample::SampleError;

/// Errors surfaced by the resolution engine.
///
/// Everything other than `Database`, `Pool` and `Task` is a precondition
/// failure: it is reported before any row is written.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no judge provider is configured")]
    ProviderNotConfigured,

    #[error("debate {0} does not exist")]
    DebateNotFound(String),

    #[error("debate {debate_id} is in state {status}, expected {expected}")]
    InvalidState {
        debate_id: String,
        status: String,
        expected: &'static str,
    },

    #[error("debate {0} already has a verdict")]
    AlreadyResolved(String),

    #[error("debate {0} has already been appealed")]
    AlreadyAppealed(String),

    #[error("debate {0} has no opponent")]
    MissingOpponent(String),

    #[error("user {0} does not exist")]
    UserNotFound(String),

    #[error(transparent)]
    NoJudgesAvailable(#[from] SampleError),

    #[error("no verdict could be recorded for debate {0}")]
    NoVerdicts(String),

    #[error(
        "every appeal judge failed for debate {0}; the appeal has been denied"
    )]
    AppealExhausted(String),

    #[error("unrecognised {column} value {value:?}")]
    UnknownValue { column: &'static str, value: String },

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
