use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The whole CSRF fallback chain produced no token.
    #[error("unable to obtain an upstream CSRF token")]
    NoCsrfToken,

    #[error("verification secret is not configured")]
    MissingSecret,

    #[error("upstream request failed: {status} {body}")]
    Http { status: u16, body: String },

    #[error("upstream returned no event stream")]
    EmptyBody,

    #[error("upstream transport error: {0}")]
    Transport(String),
}
