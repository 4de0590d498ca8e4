use bpindex_config::error::ConfigError;
use bpindex_db::DbError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum BpIndexError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DbError),

    #[error("Error while {action}")]
    #[diagnostic(code(bpindex::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid input from {origin}")]
    #[diagnostic(
        code(bpindex::input),
        help("Input must be a JSON array of {{\"ns\", \"name\", \"version\", \"addr\"}} objects")
    )]
    InvalidInput {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid buildpack identity '{0}'")]
    #[diagnostic(
        code(bpindex::identity),
        help("Use the form <namespace>/<name>[@<version>]")
    )]
    InvalidIdentity(String),

    #[error("{0}")]
    #[diagnostic(code(bpindex::error))]
    Custom(String),
}

impl BpIndexError {
    /// Whether the error stems from the caller's input rather than the
    /// environment.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::InvalidIdentity(_))
    }
}

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, BpIndexError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, BpIndexError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            BpIndexError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
