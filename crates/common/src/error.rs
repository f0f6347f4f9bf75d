//! Error taxonomy shared across the resolution and fetch layers.

use thiserror::Error;

/// Errors from the identity-resolution chain.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The input could not be resolved to any identity. Definitive miss,
    /// distinct from a transport failure.
    #[error("identity not found: {0}")]
    NotFound(String),

    /// The authoritative document's declared subject differs from the input.
    #[error("identity document subject mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },

    /// The identity document declares no personal data server.
    #[error("no personal data server declared for {0}")]
    NoPds(String),

    /// The identity document could not be parsed.
    #[error("malformed identity document for {did}: {message}")]
    BadDocument { did: String, message: String },

    /// The input is neither a handle nor a recognized identity form.
    #[error("unrecognized identity form: {0}")]
    UnknownForm(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Errors from blob and record retrieval.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The upstream answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Explicit cross-origin denial from the upstream. Not locally
    /// recoverable and never retried.
    #[error("cross-origin request denied: {0}")]
    Cors(String),

    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Whether the retry policy applies: transport failures and 5xx/429.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Cors(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

/// A malformed manifest record, directory node or blob reference.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ParseError(String);

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError(message.into())
    }
}

/// Errors from assembling a site manifest out of repository records.
#[derive(Debug, Error)]
pub enum SiteFetchError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}
