use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};

use chrono::Utc;
use futures::lock::Mutex;
use sso_result::Result;
use ulid::Ulid;
use url::Url;

use crate::{Provider, ProviderData, SessionState};

/// In-memory identity provider
///
/// Knows a fixed set of users and their groups, hands out tokens from
/// memory and counts how often each operation was called.
#[derive(Clone)]
pub struct ReferenceProvider {
    pub data: ProviderData,
    /// Artificial delay applied to every upstream operation
    pub latency: StdDuration,

    pub users: Arc<Mutex<HashMap<String, Vec<String>>>>,
    pub codes: Arc<Mutex<HashMap<String, SessionState>>>,
    pub access_tokens: Arc<Mutex<HashMap<String, String>>>,
    pub refresh_tokens: Arc<Mutex<HashMap<String, String>>>,
    pub calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    /// Reason every upstream operation currently fails with, if any
    pub outage: Arc<Mutex<Option<String>>>,
}

impl ReferenceProvider {
    pub fn new(data: ProviderData) -> ReferenceProvider {
        ReferenceProvider {
            data,
            latency: StdDuration::ZERO,
            users: Default::default(),
            codes: Default::default(),
            access_tokens: Default::default(),
            refresh_tokens: Default::default(),
            calls: Default::default(),
            outage: Default::default(),
        }
    }

    /// Delay every upstream operation by `latency`
    pub fn with_latency(self, latency: StdDuration) -> ReferenceProvider {
        ReferenceProvider { latency, ..self }
    }

    /// Register a user and the groups they belong to
    pub async fn add_user(&self, email: &str, groups: &[&str]) {
        self.users.lock().await.insert(
            email.to_string(),
            groups.iter().map(|group| group.to_string()).collect(),
        );
    }

    /// Create a session with fresh tokens for a known user
    pub async fn issue_session(&self, email: &str) -> SessionState {
        let access_token = Ulid::new().to_string();
        let refresh_token = Ulid::new().to_string();

        self.access_tokens
            .lock()
            .await
            .insert(access_token.clone(), email.to_string());
        self.refresh_tokens
            .lock()
            .await
            .insert(refresh_token.clone(), email.to_string());

        let now = Utc::now();
        SessionState {
            access_token,
            refresh_token,
            lifetime_deadline: Some(now + self.data.session_lifetime_ttl),
            refresh_deadline: Some(now + self.data.session_valid_ttl),
            valid_deadline: Some(now + self.data.session_valid_ttl),
            email: email.to_string(),
            user: email.split('@').next().unwrap_or_default().to_string(),
            ..Default::default()
        }
    }

    /// Create a one-time authorization code for a known user
    pub async fn issue_code(&self, code: &str, email: &str) {
        let session = self.issue_session(email).await;
        self.codes.lock().await.insert(code.to_string(), session);
    }

    /// Revoke an access token
    pub async fn revoke(&self, access_token: &str) {
        self.access_tokens.lock().await.remove(access_token);
    }

    /// Make every upstream operation fail until called again with `None`
    pub async fn set_outage(&self, reason: Option<&str>) {
        *self.outage.lock().await = reason.map(str::to_string);
    }

    /// How many times an operation reached this provider
    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .await
            .get(operation)
            .copied()
            .unwrap_or_default()
    }

    /// Record the call, wait out the configured latency and fail if the
    /// provider is down
    async fn upstream(&self, operation: &'static str) -> Result<()> {
        *self.calls.lock().await.entry(operation).or_default() += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.outage.lock().await.as_deref() {
            Some(reason) => Err(create_provider_error!(reason)),
            None => Ok(()),
        }
    }

    async fn groups_of(&self, email: &str) -> Result<Vec<String>> {
        self.users
            .lock()
            .await
            .get(email)
            .cloned()
            .ok_or_else(|| create_error!(UnknownUser))
    }
}

#[async_trait]
impl Provider for ReferenceProvider {
    fn data(&self) -> &ProviderData {
        &self.data
    }

    async fn redeem(&self, redirect_url: &str, code: &str) -> Result<SessionState> {
        Url::parse(redirect_url).map_err(|_| create_error!(InvalidRedirect))?;
        self.upstream("Redeem").await?;

        self.codes
            .lock()
            .await
            .remove(code)
            .ok_or_else(|| create_error!(InvalidCode))
    }

    async fn validate_group_membership(
        &self,
        email: &str,
        allowed_groups: &[String],
        _access_token: &str,
    ) -> Result<(Vec<String>, bool)> {
        self.upstream("ValidateGroup").await?;

        let groups = self.groups_of(email).await?;
        let in_groups: Vec<String> = allowed_groups
            .iter()
            .filter(|group| groups.contains(group))
            .cloned()
            .collect();

        let allowed = allowed_groups.is_empty() || !in_groups.is_empty();
        Ok((in_groups, allowed))
    }

    async fn user_groups(
        &self,
        email: &str,
        groups: &[String],
        _access_token: &str,
    ) -> Result<Vec<String>> {
        self.upstream("UserGroups").await?;

        let member_of = self.groups_of(email).await?;
        if groups.is_empty() {
            return Ok(member_of);
        }

        Ok(groups
            .iter()
            .filter(|group| member_of.contains(group))
            .cloned()
            .collect())
    }

    async fn validate_session_token(&self, session: &SessionState) -> bool {
        if self.upstream("ValidateSessionToken").await.is_err()
            || session.lifetime_period_expired()
        {
            return false;
        }

        self.access_tokens
            .lock()
            .await
            .get(&session.access_token)
            .is_some_and(|email| email == &session.email)
    }

    async fn refresh_session_token(&self, session: &mut SessionState) -> Result<bool> {
        if session.refresh_token.is_empty() {
            return Ok(false);
        }

        self.upstream("RefreshSessionToken").await?;
        if session.lifetime_period_expired() {
            return Err(create_error!(SessionExpired));
        }

        let email = self
            .refresh_tokens
            .lock()
            .await
            .get(&session.refresh_token)
            .cloned()
            .ok_or_else(|| create_error!(InvalidSession))?;

        let access_token = Ulid::new().to_string();
        self.access_tokens
            .lock()
            .await
            .insert(access_token.clone(), email);

        let now = Utc::now();
        session.access_token = access_token;
        session.refresh_deadline = Some(now + self.data.session_valid_ttl);
        session.valid_deadline = Some(now + self.data.session_valid_ttl);

        Ok(true)
    }

    fn sign_in_url(&self, redirect_uri: &Url, final_redirect: &str) -> Url {
        let mut url = self.data.sign_in_url.clone();
        url.query_pairs_mut()
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.data.client_id)
            .append_pair("scope", &self.data.scope)
            .append_pair("state", final_redirect);
        url
    }

    fn sign_out_url(&self, redirect_uri: &Url) -> Url {
        let mut url = self.data.sign_out_url.clone();
        url.query_pairs_mut()
            .append_pair("redirect_uri", redirect_uri.as_str());
        url
    }
}
