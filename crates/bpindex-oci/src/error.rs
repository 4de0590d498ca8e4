use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum FetchError {
    #[error("Not found: {url}")]
    #[diagnostic(
        code(bpindex_oci::not_found),
        help("Check that the repository and digest exist in the registry")
    )]
    NotFound { url: String },

    #[error("Unauthorized (HTTP {status}): {url}")]
    #[diagnostic(
        code(bpindex_oci::unauthorized),
        help("Configure `registry_token` if the repository is private")
    )]
    Unauthorized { status: u16, url: String },

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(bpindex_oci::http_error))]
    HttpError { status: u16, url: String },

    #[error(transparent)]
    #[diagnostic(
        code(bpindex_oci::network),
        help("Check your internet connection or try again later")
    )]
    Network(#[from] Box<ureq::Error>),

    #[error("Invalid response from {url}: {reason}")]
    #[diagnostic(code(bpindex_oci::invalid_response))]
    MalformedResponse { url: String, reason: String },

    #[error("Digest mismatch for {url}: expected {expected}, found {actual}")]
    #[diagnostic(code(bpindex_oci::digest_mismatch))]
    DigestMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Timed out after {:?}", .after)]
    #[diagnostic(code(bpindex_oci::timeout))]
    Timeout { after: Duration },
}

/// Coarse classification of a [`FetchError`], used for logging and to decide
/// whether a retry is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NotFound,
    Unauthorized,
    Network,
    MalformedResponse,
    Timeout,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotFound => "not-found",
            Self::Unauthorized => "unauthorized",
            Self::Network => "network",
            Self::MalformedResponse => "malformed-response",
            Self::Timeout => "timeout",
        };
        write!(f, "{name}")
    }
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::NotFound { .. } => FetchErrorKind::NotFound,
            Self::Unauthorized { .. } => FetchErrorKind::Unauthorized,
            Self::HttpError { .. } => FetchErrorKind::Network,
            Self::Network(err) if matches!(**err, ureq::Error::Timeout(_)) => {
                FetchErrorKind::Timeout
            }
            Self::Network(_) => FetchErrorKind::Network,
            Self::MalformedResponse { .. } | Self::DigestMismatch { .. } => {
                FetchErrorKind::MalformedResponse
            }
            Self::Timeout { .. } => FetchErrorKind::Timeout,
        }
    }

    /// Network failures and timeouts may succeed on a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            FetchErrorKind::Network | FetchErrorKind::Timeout
        )
    }
}

impl From<ureq::Error> for FetchError {
    fn from(e: ureq::Error) -> Self {
        Self::Network(Box::new(e))
    }
}
