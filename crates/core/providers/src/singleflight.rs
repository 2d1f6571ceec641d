use std::{future::Future, sync::Arc};

use sso_coalesced::{CoalescionService, CoalescionServiceConfig};
use sso_config::config;
use sso_result::Result;
use url::Url;

use crate::{keys, CallKey, MetricsSink, Operation, Provider, ProviderData, SessionState};

/// Response of a coalesced provider call, one variant per operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightResponse {
    ValidateGroup {
        in_groups: Vec<String>,
        allowed: bool,
    },
    UserGroups(Vec<String>),
    ValidateSessionToken(bool),
    RefreshSessionToken {
        refreshed: bool,
        session: SessionState,
    },
}

/// Coalescing service shared by every operation of one [`SingleFlightProvider`]
pub type FlightService = CoalescionService<CallKey, Result<FlightResponse>>;

fn unexpected(expected: Operation, response: &FlightResponse) -> sso_result::Error {
    error!("Coalesced {expected} call produced a mismatched response: {response:?}");
    create_error!(InternalError)
}

impl FlightResponse {
    pub fn into_validate_group(self) -> Result<(Vec<String>, bool)> {
        match self {
            FlightResponse::ValidateGroup { in_groups, allowed } => Ok((in_groups, allowed)),
            other => Err(unexpected(Operation::ValidateGroup, &other)),
        }
    }

    pub fn into_user_groups(self) -> Result<Vec<String>> {
        match self {
            FlightResponse::UserGroups(groups) => Ok(groups),
            other => Err(unexpected(Operation::UserGroups, &other)),
        }
    }

    pub fn into_validate_session_token(self) -> Result<bool> {
        match self {
            FlightResponse::ValidateSessionToken(valid) => Ok(valid),
            other => Err(unexpected(Operation::ValidateSessionToken, &other)),
        }
    }

    pub fn into_refresh_session_token(self) -> Result<(bool, SessionState)> {
        match self {
            FlightResponse::RefreshSessionToken { refreshed, session } => Ok((refreshed, session)),
            other => Err(unexpected(Operation::RefreshSessionToken, &other)),
        }
    }
}

/// Provider middleware collapsing concurrent identical calls into a single
/// upstream request, also known as request collapsing.
///
/// Redeeming codes is never shared since every code may only be used once,
/// while metadata and url construction are cheap enough to always pass
/// through.
pub struct SingleFlightProvider<P> {
    provider: P,
    single: FlightService,
    metrics: Arc<dyn MetricsSink>,
    metric: String,
    enabled: bool,
}

impl<P: Provider> SingleFlightProvider<P> {
    pub fn new(provider: P, single: FlightService, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            provider,
            single,
            metrics,
            metric: "provider.singleflight".to_string(),
            enabled: true,
        }
    }

    /// Build the middleware from the `providers.singleflight` settings
    pub async fn from_config(provider: P, metrics: Arc<dyn MetricsSink>) -> Self {
        let settings = config().await.providers.singleflight;

        let single = CoalescionService::from_config(CoalescionServiceConfig {
            max_concurrent: settings.max_concurrent(),
        });

        Self {
            metric: settings.metric,
            enabled: settings.enabled,
            ..Self::new(provider, single, metrics)
        }
    }

    /// Turn coalescing on or off, every call passes through while off
    pub fn enabled(self, enabled: bool) -> Self {
        Self { enabled, ..self }
    }

    /// Wrapped provider
    pub fn inner(&self) -> &P {
        &self.provider
    }

    async fn coalesce<F, Fut>(
        &self,
        operation: Operation,
        key: CallKey,
        func: F,
    ) -> Result<FlightResponse>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<FlightResponse>> + Send,
    {
        let outcome = self.single.execute(key, func).await;

        // Report once per shared execution rather than once per caller
        if outcome.leader && outcome.shared() {
            let followers = outcome.joiners - 1;
            debug!("{followers} caller(s) shared an upstream {operation} call");

            let tags = [format!("endpoint:{operation}")];
            self.metrics.incr(&self.metric, &tags, followers as u64);
        }

        (*outcome.value).clone()
    }
}

#[async_trait]
impl<P: Provider> Provider for SingleFlightProvider<P> {
    fn data(&self) -> &ProviderData {
        self.provider.data()
    }

    async fn redeem(&self, redirect_url: &str, code: &str) -> Result<SessionState> {
        self.provider.redeem(redirect_url, code).await
    }

    async fn validate_group_membership(
        &self,
        email: &str,
        allowed_groups: &[String],
        access_token: &str,
    ) -> Result<(Vec<String>, bool)> {
        let allowed_groups = keys::sorted(allowed_groups);
        if !self.enabled {
            return self
                .provider
                .validate_group_membership(email, &allowed_groups, access_token)
                .await;
        }

        let provider = &self.provider;
        let key = keys::validate_group(email, &allowed_groups);
        self.coalesce(Operation::ValidateGroup, key, move || async move {
            let (in_groups, allowed) = provider
                .validate_group_membership(email, &allowed_groups, access_token)
                .await?;

            Ok(FlightResponse::ValidateGroup { in_groups, allowed })
        })
        .await?
        .into_validate_group()
    }

    async fn user_groups(
        &self,
        email: &str,
        groups: &[String],
        access_token: &str,
    ) -> Result<Vec<String>> {
        // sort the groups so that other requests may be able to share this one
        let groups = keys::sorted(groups);
        if !self.enabled {
            return self.provider.user_groups(email, &groups, access_token).await;
        }

        let provider = &self.provider;
        let key = keys::user_groups(email, &groups);
        self.coalesce(Operation::UserGroups, key, move || async move {
            provider
                .user_groups(email, &groups, access_token)
                .await
                .map(FlightResponse::UserGroups)
        })
        .await?
        .into_user_groups()
    }

    async fn validate_session_token(&self, session: &SessionState) -> bool {
        // an empty token would share one key with every other empty token
        if !self.enabled || session.access_token.is_empty() {
            return self.provider.validate_session_token(session).await;
        }

        let provider = &self.provider;
        let key = keys::validate_session_token(&session.access_token);
        self.coalesce(Operation::ValidateSessionToken, key, move || async move {
            Ok(FlightResponse::ValidateSessionToken(
                provider.validate_session_token(session).await,
            ))
        })
        .await
        .and_then(FlightResponse::into_validate_session_token)
        .unwrap_or(false)
    }

    async fn refresh_session_token(&self, session: &mut SessionState) -> Result<bool> {
        if !self.enabled || session.refresh_token.is_empty() {
            return self.provider.refresh_session_token(session).await;
        }

        let provider = &self.provider;
        let current: &SessionState = session;
        let key = keys::refresh_session_token(&current.refresh_token);
        let (refreshed, latest) = self
            .coalesce(Operation::RefreshSessionToken, key, move || async move {
                let mut session = current.clone();
                let refreshed = provider.refresh_session_token(&mut session).await?;

                Ok(FlightResponse::RefreshSessionToken { refreshed, session })
            })
            .await?
            .into_refresh_session_token()?;

        if refreshed && !session.apply_refresh(&latest) {
            warn!("Shared refresh returned a session for another user, refreshing alone");
            return self.provider.refresh_session_token(session).await;
        }

        Ok(refreshed)
    }

    fn sign_in_url(&self, redirect_uri: &Url, final_redirect: &str) -> Url {
        self.provider.sign_in_url(redirect_uri, final_redirect)
    }

    fn sign_out_url(&self, redirect_uri: &Url) -> Url {
        self.provider.sign_out_url(redirect_uri)
    }
}
