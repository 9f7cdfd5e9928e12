use thiserror::Error;

/// All errors produced by colloquy-core.
///
/// The first five variants are the pipeline error taxonomy surfaced to
/// observers as `error` notifications; the rest are lifecycle and plumbing
/// errors returned directly to callers.
#[derive(Debug, Error)]
pub enum ColloquyError {
    /// External API unreachable, timed out, or returned a server error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials rejected by an external API. Fatal to that call only;
    /// the stream continues.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Malformed JSON or missing required fields in an LLM response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structurally valid response that violates the contract
    /// (e.g. a verdict outside the enumerated set).
    #[error("policy violation: {0}")]
    Policy(String),

    /// Internal bug — never swallowed, escalated at the task boundary.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ColloquyError>;

impl ColloquyError {
    /// Lowercase taxonomy tag used in `error` notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            ColloquyError::Transport(_) => "transport",
            ColloquyError::Auth(_) => "auth",
            ColloquyError::Parse(_) => "parse",
            ColloquyError::Policy(_) => "policy",
            ColloquyError::Invariant(_) => "invariant",
            ColloquyError::AlreadyRunning | ColloquyError::NotRunning => "lifecycle",
            ColloquyError::ChannelClosed(_) => "channel",
            ColloquyError::Io(_) => "io",
            ColloquyError::Other(_) => "other",
        }
    }
}

/// Escalate an `Invariant` error at a task boundary: loud in release,
/// process-fatal in debug builds. All other variants pass through silently.
pub(crate) fn escalate_invariant(err: &ColloquyError) {
    if let ColloquyError::Invariant(msg) = err {
        tracing::error!(invariant = %msg, "internal invariant violated");
        debug_assert!(false, "invariant violated: {msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_match_taxonomy() {
        assert_eq!(ColloquyError::Transport("x".into()).kind(), "transport");
        assert_eq!(ColloquyError::Auth("x".into()).kind(), "auth");
        assert_eq!(ColloquyError::Parse("x".into()).kind(), "parse");
        assert_eq!(ColloquyError::Policy("x".into()).kind(), "policy");
        assert_eq!(ColloquyError::Invariant("x".into()).kind(), "invariant");
        assert_eq!(ColloquyError::AlreadyRunning.kind(), "lifecycle");
    }
}
