use thiserror::Error;

/// Unified error type for the entire Mentor workspace.
#[derive(Error, Debug)]
pub enum MentorError {
    // ── Action / registry errors ───────────────────────────────
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("action failed: {action}: {reason}")]
    ActionFailed { action: String, reason: String },

    // ── Oracle errors ──────────────────────────────────────────
    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("oracle call timed out after {secs}s")]
    OracleTimeout { secs: u64 },

    #[error("reasoning loop exceeded {max_steps} steps")]
    LoopBudgetExceeded { max_steps: u32 },

    // ── Extraction errors ──────────────────────────────────────
    #[error("no {expected} observation in transcript for task {task}")]
    ExtractionMismatch { task: String, expected: String },

    // ── Store errors ───────────────────────────────────────────
    #[error("store error: {0}")]
    Store(String),

    // ── Orchestration errors ───────────────────────────────────
    #[error("invalid session state: {0}")]
    InvalidState(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MentorError>;
