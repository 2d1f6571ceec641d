#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;

use std::fmt;

/// Result type with custom Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error information
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// Type of error and additional information
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub error_type: ErrorType,

    /// Where this error occurred
    pub location: String,
}

/// Possible error types
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    /// This error was not labeled :(
    LabelMe,

    // ? Sign in related errors
    InvalidCode,
    InvalidRedirect,

    // ? Session related errors
    InvalidSession,
    SessionExpired,
    UnknownUser,

    // ? Upstream provider errors
    ProviderUnavailable,
    ProviderError {
        reason: String,
    },

    // ? General errors
    InternalError,
    InvalidOperation,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorType::LabelMe => write!(f, "Unlabeled error"),
            ErrorType::InvalidCode => write!(f, "Authorization code is invalid or already used"),
            ErrorType::InvalidRedirect => write!(f, "Redirect URL is not allowed"),
            ErrorType::InvalidSession => write!(f, "Session is invalid"),
            ErrorType::SessionExpired => write!(f, "Session has expired"),
            ErrorType::UnknownUser => write!(f, "Unknown user"),
            ErrorType::ProviderUnavailable => write!(f, "Identity provider is unavailable"),
            ErrorType::ProviderError { reason } => write!(f, "Identity provider error: {reason}"),
            ErrorType::InternalError => write!(f, "Internal error"),
            ErrorType::InvalidOperation => write!(f, "Invalid operation"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error_type, self.location)
    }
}

impl std::error::Error for Error {}

#[macro_export]
macro_rules! create_error {
    ( $error: ident $( $tt:tt )? ) => {
        $crate::Error {
            error_type: $crate::ErrorType::$error $( $tt )?,
            location: format!("{}:{}:{}", file!(), line!(), column!()),
        }
    };
}

#[macro_export]
macro_rules! create_provider_error {
    ( $reason: expr ) => {
        $crate::create_error!(ProviderError {
            reason: $reason.to_string()
        })
    };
}
