//! Error types for the arena service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific arena scenarios
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// Network/provider failure during match execution or dispatch.
    /// Retried with bounded backoff before the unit is marked failed.
    #[error("Transient execution failure: {message}")]
    TransientExecutionFailure { message: String },

    /// A move response that could not be parsed into a direction.
    /// Recovered locally with a random legal move; never aborts a match.
    #[error("Invalid move response: {response}")]
    InvalidMoveResponse { response: String },

    /// No ranked agents exist to place a new agent against.
    /// Surfaced immediately, not retried.
    #[error("No ranked opponents available for agent {agent_id}")]
    EmptyOpponentPool { agent_id: String },

    /// Replay requested out of chronological order, or a rating was
    /// requested before any match exists. Programming/data error.
    #[error("Inconsistent replay state: {reason}")]
    InconsistentReplayState { reason: String },

    /// An in-progress match that has exceeded the inactivity threshold.
    #[error("Stale match: {match_id}")]
    StaleMatch { match_id: String },

    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("Match not found: {match_id}")]
    MatchNotFound { match_id: String },

    #[error("Invalid match: {reason}")]
    InvalidMatch { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl ArenaError {
    /// Whether the dispatch layer should retry the unit that produced this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, ArenaError::TransientExecutionFailure { .. })
    }
}
