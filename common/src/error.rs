// common/src/error.rs
use thiserror::Error;

/// Shown when a rejection carries no structured reason from the backend.
pub const GENERIC_REJECTION: &str = "The server could not process the request.";

/// Classification of a failed REST call. Callers decide whether to
/// re-prompt the user; nothing here schedules a retry.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend could not be reached at all (no network, server down,
    /// timeout). The underlying detail is kept for diagnostics; the
    /// display message stays generic.
    #[error("Could not reach the server. Please check the connection.")]
    Unreachable(String),
    /// The backend answered with a non-2xx status. Carries the server's
    /// own reason when the body had one, `GENERIC_REJECTION` otherwise.
    #[error("{0}")]
    Rejected(String),
    /// The bearer credential was rejected. The session layer reacts by
    /// signing out and returning to the unauthenticated state.
    #[error("Your session is no longer valid. Please sign in again.")]
    AuthExpired,
}

impl ApiError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired)
    }
}
