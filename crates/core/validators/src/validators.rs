use std::sync::Arc;

use chrono::{Duration, Utc};
use sso_config::config;
use sso_providers::{Provider, SessionState};

use crate::{GroupValidationError, ValidationError, Validator};

fn normalise(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Only lets through sessions whose email address is on the list
pub struct EmailAddressValidator {
    allowed: Vec<String>,
}

impl EmailAddressValidator {
    /// `*` allows any address
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed: normalise(allowed),
        }
    }
}

#[async_trait]
impl Validator for EmailAddressValidator {
    async fn validate(&self, session: &SessionState) -> Result<(), ValidationError> {
        if session.email.is_empty() {
            return Err(ValidationError::InvalidEmailAddress);
        }

        let email = session.email.to_lowercase();
        if self
            .allowed
            .iter()
            .any(|allowed| allowed == "*" || allowed == &email)
        {
            Ok(())
        } else {
            Err(ValidationError::EmailAddressDenied)
        }
    }
}

/// Only lets through sessions whose email domain is on the list
pub struct EmailDomainValidator {
    domains: Vec<String>,
}

impl EmailDomainValidator {
    /// `*` allows any domain, a leading `@` is optional
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains: normalise(domains)
                .into_iter()
                .map(|domain| domain.trim_start_matches('@').to_string())
                .collect(),
        }
    }
}

#[async_trait]
impl Validator for EmailDomainValidator {
    async fn validate(&self, session: &SessionState) -> Result<(), ValidationError> {
        let domain = match session.email.rsplit_once('@') {
            Some((user, domain)) if !user.is_empty() && !domain.is_empty() => {
                domain.to_lowercase()
            }
            _ => return Err(ValidationError::InvalidEmailAddress),
        };

        if self
            .domains
            .iter()
            .any(|allowed| allowed == "*" || allowed == &domain)
        {
            Ok(())
        } else {
            Err(ValidationError::EmailDomainDenied)
        }
    }
}

/// Only lets through sessions belonging to at least one of the groups
///
/// The provider being unable to answer is reported as a
/// [`GroupValidationError`], measured from the session's grace period start
/// or from now if no outage was recorded yet.
pub struct EmailGroupValidator {
    provider: Arc<dyn Provider>,
    allowed_groups: Vec<String>,
    grace_period: Duration,
}

impl EmailGroupValidator {
    pub fn new(
        provider: Arc<dyn Provider>,
        allowed_groups: Vec<String>,
        grace_period: Duration,
    ) -> Self {
        Self {
            provider,
            allowed_groups,
            grace_period,
        }
    }
}

#[async_trait]
impl Validator for EmailGroupValidator {
    async fn validate(&self, session: &SessionState) -> Result<(), ValidationError> {
        let membership = self
            .provider
            .validate_group_membership(&session.email, &self.allowed_groups, &session.access_token)
            .await;

        match membership {
            Ok((_, true)) => Ok(()),
            Ok((_, false)) => Err(ValidationError::NotInGroup),
            Err(cause) => {
                warn!("Group membership check failed for session: {cause}");

                Err(ValidationError::Group(GroupValidationError {
                    grace_period_start: session.grace_period_start.unwrap_or_else(Utc::now),
                    grace_period: self.grace_period,
                    cause,
                }))
            }
        }
    }
}

const DEFAULT_GRACE_PERIOD_SECS: i64 = 3 * 60 * 60;

fn grace_period(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(|| {
            warn!("Group grace period of {secs}s is out of range, using the default");
            Duration::seconds(DEFAULT_GRACE_PERIOD_SECS)
        })
}

/// Build the validators enabled in the `validators` settings
pub async fn validators_from_config(provider: Arc<dyn Provider>) -> Vec<Box<dyn Validator>> {
    let settings = config().await.validators;
    let mut validators: Vec<Box<dyn Validator>> = Vec::new();

    if !settings.email_addresses.is_empty() {
        validators.push(Box::new(EmailAddressValidator::new(settings.email_addresses)));
    }

    if !settings.email_domains.is_empty() {
        validators.push(Box::new(EmailDomainValidator::new(settings.email_domains)));
    }

    if !settings.allowed_groups.is_empty() {
        let grace_period = grace_period(settings.group_grace_period_secs);
        validators.push(Box::new(EmailGroupValidator::new(
            provider,
            settings.allowed_groups,
            grace_period,
        )));
    }

    validators
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, Utc};
    use sso_coalesced::CoalescionService;
    use sso_providers::{
        NullSink, Provider, ProviderData, ReferenceProvider, SessionState, SingleFlightProvider,
    };
    use sso_result::ErrorType;
    use url::Url;

    use super::grace_period;
    use crate::{
        run_validators, run_validators_with_grace_period, validators_from_config,
        EmailAddressValidator, EmailDomainValidator, EmailGroupValidator, ValidationError,
        Validator,
    };

    fn session(email: &str) -> SessionState {
        SessionState {
            email: email.to_string(),
            access_token: "token".to_string(),
            ..Default::default()
        }
    }

    fn reference() -> Arc<ReferenceProvider> {
        let base = Url::parse("https://idp.example.com/").unwrap();
        let data = ProviderData::from_base("Reference", "reference", "client", &base).unwrap();
        Arc::new(ReferenceProvider::new(data))
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn email_address_allow_list() {
        let validator = EmailAddressValidator::new(strings(&["Alice@Example.com "]));

        assert_eq!(validator.validate(&session("alice@example.com")).await, Ok(()));
        assert_eq!(
            validator.validate(&session("bob@example.com")).await,
            Err(ValidationError::EmailAddressDenied)
        );
        assert_eq!(
            validator.validate(&session("")).await,
            Err(ValidationError::InvalidEmailAddress)
        );

        let anyone = EmailAddressValidator::new(strings(&["*"]));
        assert_eq!(anyone.validate(&session("bob@example.com")).await, Ok(()));
    }

    #[tokio::test]
    async fn email_domain_allow_list() {
        let validator = EmailDomainValidator::new(strings(&["@example.com", "corp.io"]));

        assert_eq!(validator.validate(&session("a@EXAMPLE.com")).await, Ok(()));
        assert_eq!(validator.validate(&session("b@corp.io")).await, Ok(()));
        assert_eq!(
            validator.validate(&session("c@evil.com")).await,
            Err(ValidationError::EmailDomainDenied)
        );
        assert_eq!(
            validator.validate(&session("not-an-email")).await,
            Err(ValidationError::InvalidEmailAddress)
        );

        let anywhere = EmailDomainValidator::new(strings(&["*"]));
        assert_eq!(anywhere.validate(&session("c@evil.com")).await, Ok(()));
    }

    #[tokio::test]
    async fn group_membership() {
        let provider = reference();
        provider.add_user("a@x.com", &["admins"]).await;
        provider.add_user("b@x.com", &["guests"]).await;

        let validator =
            EmailGroupValidator::new(provider.clone(), strings(&["admins"]), Duration::hours(1));

        assert_eq!(validator.validate(&session("a@x.com")).await, Ok(()));
        assert_eq!(
            validator.validate(&session("b@x.com")).await,
            Err(ValidationError::NotInGroup)
        );
    }

    #[tokio::test]
    async fn provider_failures_get_a_grace_period() {
        let provider = reference();
        let validator =
            EmailGroupValidator::new(provider.clone(), strings(&["admins"]), Duration::hours(1));
        let validators: Vec<Box<dyn Validator>> = vec![Box::new(validator)];

        provider.add_user("a@x.com", &["admins"]).await;
        provider.set_outage(Some("timeout")).await;

        let mut fresh = session("a@x.com");
        match run_validators(&validators, &fresh).await.as_slice() {
            [ValidationError::Group(error)] => {
                assert_eq!(
                    error.cause.error_type,
                    ErrorType::ProviderError {
                        reason: "timeout".to_string()
                    }
                );
                assert!(error.is_within_grace_period());
            }
            other => panic!("unexpected errors {other:?}"),
        }
        assert!(run_validators_with_grace_period(&validators, &fresh)
            .await
            .is_empty());

        fresh.grace_period_start = Some(Utc::now() - Duration::hours(2));
        assert_eq!(
            run_validators_with_grace_period(&validators, &fresh)
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn group_checks_go_through_the_middleware() {
        let upstream = (*reference()).clone();
        let upstream = Arc::new(upstream.with_latency(StdDuration::from_millis(30)));
        upstream.add_user("a@x.com", &["admins"]).await;

        let provider: Arc<dyn Provider> = Arc::new(SingleFlightProvider::new(
            upstream.clone(),
            CoalescionService::new(),
            Arc::new(NullSink),
        ));
        let validator =
            EmailGroupValidator::new(provider, strings(&["admins"]), Duration::hours(1));

        let session = session("a@x.com");
        let (a, b) = tokio::join!(validator.validate(&session), validator.validate(&session));

        assert_eq!(a, Ok(()));
        assert_eq!(b, Ok(()));
        assert_eq!(upstream.call_count("ValidateGroup").await, 1);
    }

    #[tokio::test]
    async fn default_config_checks_domains_only() {
        let validators = validators_from_config(reference()).await;
        assert_eq!(validators.len(), 1);

        assert!(run_validators(&validators, &session("a@anywhere.com"))
            .await
            .is_empty());
    }

    #[test]
    fn grace_period_from_settings() {
        assert_eq!(grace_period(10800), Duration::hours(3));
        assert_eq!(grace_period(0), Duration::zero());
        assert_eq!(grace_period(u64::MAX), Duration::hours(3));
        assert_eq!(grace_period(i64::MAX as u64), Duration::hours(3));
    }
}
