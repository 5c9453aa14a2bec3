//! Error types shared by models, documents and engines.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed caller input, detected before any engine call.
    #[error("{name} must be {expected}")]
    InvalidArgument {
        name: &'static str,
        expected: &'static str,
    },

    /// The engine rejected a write because of required-field or type constraints.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A copy was requested under the id of its source document.
    #[error("Document '{0}' cannot be copied onto its own id")]
    DuplicateId(String),

    /// Opaque engine failure, passed through untouched.
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Document is detached from its model")]
    Detached,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(name: &'static str, expected: &'static str) -> Self {
        Self::InvalidArgument { name, expected }
    }
}

impl From<fjall::Error> for Error {
    fn from(err: fjall::Error) -> Self {
        Self::Engine(err.to_string())
    }
}

// Lets infallible conversions, such as `Schema` into itself, share bounds
// with fallible ones.
impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Engine(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Engine(err.to_string())
    }
}
