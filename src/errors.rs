use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scope of a timeout failure, used to keep the poll-loop timeout and the
/// whole-run timeout distinguishable in the session error ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutScope {
    /// The stock report task poll loop exceeded its deadline.
    StockPoll,
    /// The whole reconciliation run exceeded its deadline.
    Run,
}

impl TimeoutScope {
    pub fn code(&self) -> &'static str {
        match self {
            Self::StockPoll => "poll_timeout",
            Self::Run => "run_timeout",
        }
    }
}

impl std::fmt::Display for TimeoutScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StockPoll => write!(f, "stock report poll"),
            Self::Run => write!(f, "reconciliation run"),
        }
    }
}

/// Error taxonomy for the reconciliation engine.
///
/// Transient errors are retried with backoff by the clients; everything else
/// either aborts the owning fetch (auth, timeout) or is recorded per record
/// and skipped (malformed). Errors reaching the session are converted to
/// [`SyncErrorRecord`] entries rather than thrown out of the engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transient error from {service}: {message}")]
    Transient { service: &'static str, message: String },

    #[error("authentication rejected by {service}: {message}")]
    Auth { service: &'static str, message: String },

    #[error("malformed record from {origin}: {reason}")]
    MalformedRecord { origin: &'static str, reason: String },

    #[error("{scope} timed out after {elapsed_secs}s")]
    Timeout { scope: TimeoutScope, elapsed_secs: u64 },

    #[error("failed to decode response from {service}: {message}")]
    Decode { service: &'static str, message: String },

    #[error("unexpected response from {service}: {message}")]
    UnexpectedResponse { service: &'static str, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("a sync is already running for tenant {0}")]
    AlreadyRunning(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SyncError {
    /// Whether the retry utility may re-attempt the failed operation.
    ///
    /// Network-level transport errors are considered transient; everything
    /// that is not explicitly transient is fatal to the attempt loop.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            _ => false,
        }
    }

    /// Stable machine-readable code for the session error ledger.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient_error",
            Self::Auth { .. } => "auth_failed",
            Self::MalformedRecord { .. } => "malformed_record",
            Self::Timeout { scope, .. } => scope.code(),
            Self::Decode { .. } => "decode_error",
            Self::UnexpectedResponse { .. } => "unexpected_response",
            Self::Config(_) => "config_error",
            Self::AlreadyRunning(_) => "already_running",
            Self::Http(_) => "transport_error",
        }
    }

    /// Convert into a ledger entry, attaching optional caller context
    /// (e.g. which source client the error belongs to).
    pub fn into_record(self, context: Option<String>) -> SyncErrorRecord {
        SyncErrorRecord {
            code: self.code().to_string(),
            message: self.to_string(),
            context,
        }
    }
}

/// One entry in a sync session's error ledger.
///
/// Partial failure must be enumerable, so a session carries an ordered list
/// of these rather than a single error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl SyncErrorRecord {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}
