use sso_providers::SessionState;

use crate::ValidationError;

/// Check performed against a session before letting a request through
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, session: &SessionState) -> Result<(), ValidationError>;
}

/// Run every validator and collect every failure, in validator order.
///
/// An empty list means all validators passed.
pub async fn run_validators(
    validators: &[Box<dyn Validator>],
    session: &SessionState,
) -> Vec<ValidationError> {
    let mut errors = Vec::with_capacity(validators.len());

    for validator in validators {
        if let Err(error) = validator.validate(session).await {
            errors.push(error);
        }
    }

    errors
}

/// Same as [`run_validators`], except group errors still inside their grace
/// period are left out.
pub async fn run_validators_with_grace_period(
    validators: &[Box<dyn Validator>],
    session: &SessionState,
) -> Vec<ValidationError> {
    run_validators(validators, session)
        .await
        .into_iter()
        .filter(|error| {
            if error.is_within_grace_period() {
                info!("Ignoring group validation failure during grace period: {error}");
                false
            } else {
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sso_providers::SessionState;

    use crate::{
        run_validators, run_validators_with_grace_period, GroupValidationError, ValidationError,
        Validator,
    };

    struct Pass;
    struct Fail(ValidationError);

    #[async_trait]
    impl Validator for Pass {
        async fn validate(&self, _session: &SessionState) -> Result<(), ValidationError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Validator for Fail {
        async fn validate(&self, _session: &SessionState) -> Result<(), ValidationError> {
            Err(self.0.clone())
        }
    }

    fn group_error(started_ago: Duration) -> ValidationError {
        ValidationError::Group(GroupValidationError {
            grace_period_start: Utc::now() - started_ago,
            grace_period: Duration::hours(1),
            cause: sso_result::create_error!(ProviderUnavailable),
        })
    }

    #[tokio::test]
    async fn no_failures() {
        let validators: Vec<Box<dyn Validator>> = vec![Box::new(Pass), Box::new(Pass)];
        assert!(run_validators(&validators, &SessionState::default())
            .await
            .is_empty());
        assert!(run_validators(&[], &SessionState::default()).await.is_empty());
    }

    #[tokio::test]
    async fn failures_keep_validator_order() {
        let validators: Vec<Box<dyn Validator>> = vec![
            Box::new(Fail(ValidationError::EmailDomainDenied)),
            Box::new(Pass),
        ];
        assert_eq!(
            run_validators(&validators, &SessionState::default()).await,
            vec![ValidationError::EmailDomainDenied]
        );

        let validators: Vec<Box<dyn Validator>> = vec![
            Box::new(Fail(ValidationError::InvalidEmailAddress)),
            Box::new(Pass),
            Box::new(Fail(ValidationError::NotInGroup)),
        ];
        assert_eq!(
            run_validators(&validators, &SessionState::default()).await,
            vec![
                ValidationError::InvalidEmailAddress,
                ValidationError::NotInGroup
            ]
        );
    }

    #[tokio::test]
    async fn grace_period_suppresses_recent_group_errors() {
        let recent = group_error(Duration::minutes(5));
        let stale = group_error(Duration::hours(2));
        assert!(recent.is_within_grace_period());
        assert!(!stale.is_within_grace_period());

        let validators: Vec<Box<dyn Validator>> = vec![
            Box::new(Fail(recent.clone())),
            Box::new(Fail(stale.clone())),
            Box::new(Fail(ValidationError::EmailAddressDenied)),
        ];

        let session = SessionState::default();
        assert_eq!(
            run_validators_with_grace_period(&validators, &session).await,
            vec![stale.clone(), ValidationError::EmailAddressDenied]
        );
        assert_eq!(
            run_validators(&validators, &session).await,
            vec![recent, stale, ValidationError::EmailAddressDenied]
        );
    }

    #[test]
    fn only_group_errors_have_a_grace_period() {
        assert!(!ValidationError::NotInGroup.is_within_grace_period());
        assert!(!ValidationError::InvalidEmailAddress.is_within_grace_period());
    }
}
