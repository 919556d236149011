//! Error types for the ember binary

/// Result type of the assembly and CLI
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by `ember`
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A declaration, rendering or input-loading failure
    #[error(transparent)]
    Declaration(#[from] ember_common::Error),

    /// Writing output failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A command-line argument cannot be used
    #[error("invalid argument {argument}: {message}")]
    InvalidArgument {
        /// The flag, e.g. `--output`
        argument: String,
        /// Description of the problem
        message: String,
    },
}

impl Error {
    /// Create an invalid-argument error
    pub fn invalid_argument(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Underlying declaration error, if this is one
    pub fn declaration(&self) -> Option<&ember_common::Error> {
        match self {
            Error::Declaration(err) => Some(err),
            _ => None,
        }
    }
}
