/// Session layer failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Unknown, closed or terminated session id.
    #[error("session '{0}' not found")]
    NotFound(String),

    /// A valid token for a subject other than the one the session is bound to.
    #[error("session '{session_id}' belongs to another subject")]
    Mismatch { session_id: String },

    /// A server-to-client stream is already attached to the session.
    #[error("session '{0}' already has an open stream")]
    StreamConflict(String),

    /// The subject already holds the maximum number of open sessions.
    #[error("too many open sessions for this subject")]
    LimitReached,
}
