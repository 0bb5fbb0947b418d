use thiserror::Error;

/// Portal Errors.
#[derive(Debug, Error)]
pub enum PortalError {
    /// The configured API base URL could not be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The session file could not be read or written.
    #[error("Session store error: {0}")]
    SessionStore(String),

    /// Failed to send a request to the portal API, or the request never resolved.
    #[error("Failed to send a request to the portal API.")]
    RequestFailed,

    /// Failed to decode a portal API response.
    #[error("Failed to decode portal API response.")]
    FailedToDecode,

    /// No session is stored. The caller should navigate to the login page.
    #[error("Login required.")]
    NotLoggedIn,

    /// The API returned a 401: Unauthorized status code, or refused the session token.
    /// The stored session has been cleared and the caller should navigate to the login page.
    #[error("Your session is no longer valid. Please log in again.")]
    InvalidSession,

    /// The API refused a checkout because the user already holds that plan.
    #[error("{0}")]
    AlreadySubscribed(String),

    /// The API answered but refused the request. Carries the server's reason.
    #[error("{0}")]
    BackendRejected(String),

    /// Input was rejected locally before any request was made.
    #[error("{0}")]
    ValidationFailure(String),

    /// The hosted checkout or billing portal page could not be opened.
    #[error("Failed to open {0} in the browser.")]
    RedirectFailed(String),
}

impl PortalError {
    /// Whether the caller must send the user back to the login entry point.
    pub fn requires_login(&self) -> bool {
        matches!(self, PortalError::InvalidSession | PortalError::NotLoggedIn)
    }
}
