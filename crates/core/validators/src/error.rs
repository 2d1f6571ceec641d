use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Group check that failed because the provider could not answer
///
/// Tolerated until `grace_period` has passed since `grace_period_start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupValidationError {
    pub grace_period_start: DateTime<Utc>,
    pub grace_period: Duration,
    pub cause: sso_result::Error,
}

impl GroupValidationError {
    pub fn is_within_grace_period(&self) -> bool {
        match self.grace_period_start.checked_add_signed(self.grace_period) {
            Some(end) => Utc::now() < end,
            // ends past the last representable instant
            None => self.grace_period > Duration::zero(),
        }
    }
}

/// Reasons a session fails validation
///
/// The messages are fit for display to the end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Session has no usable email address
    InvalidEmailAddress,
    /// Email address is not on the allow list
    EmailAddressDenied,
    /// Email domain is not on the allow list
    EmailDomainDenied,
    /// User is not in any of the allowed groups
    NotInGroup,
    /// Group membership could not be checked
    Group(GroupValidationError),
}

impl ValidationError {
    /// Whether this error may be ignored for now
    pub fn is_within_grace_period(&self) -> bool {
        match self {
            ValidationError::Group(error) => error.is_within_grace_period(),
            _ => false,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidEmailAddress => {
                write!(f, "Invalid Email Address In Session State")
            }
            ValidationError::EmailAddressDenied => write!(f, "Email Address Not Allowed"),
            ValidationError::EmailDomainDenied => write!(f, "Email Domain Not Allowed"),
            ValidationError::NotInGroup => write!(f, "Not A Member Of An Allowed Group"),
            ValidationError::Group(_) => write!(f, "Error during validation"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use crate::GroupValidationError;

    fn error(grace_period_start: DateTime<Utc>, grace_period: Duration) -> GroupValidationError {
        GroupValidationError {
            grace_period_start,
            grace_period,
            cause: sso_result::create_error!(ProviderUnavailable),
        }
    }

    #[test]
    fn window_is_measured_from_the_start() {
        assert!(error(Utc::now(), Duration::minutes(5)).is_within_grace_period());
        assert!(!error(Utc::now() - Duration::minutes(10), Duration::minutes(5))
            .is_within_grace_period());
    }

    #[test]
    fn overflowing_windows_do_not_panic() {
        assert!(error(DateTime::<Utc>::MAX_UTC, Duration::weeks(1)).is_within_grace_period());
        assert!(!error(DateTime::<Utc>::MIN_UTC, -Duration::weeks(1)).is_within_grace_period());
    }
}
