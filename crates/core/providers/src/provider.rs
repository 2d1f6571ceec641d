use std::sync::Arc;

use chrono::Duration;
use sso_result::Result;
use url::Url;

use crate::SessionState;

/// Static information about an identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderData {
    /// Human readable name
    pub provider_name: String,
    /// Short identifier used in routes and metrics
    pub provider_slug: String,
    /// OAuth client id registered with the provider
    pub client_id: String,
    /// Scopes requested on sign in
    pub scope: String,

    pub sign_in_url: Url,
    pub sign_out_url: Url,
    pub redeem_url: Url,
    pub profile_url: Url,
    pub validate_url: Url,

    /// How long a validated access token is trusted before asking again
    pub session_valid_ttl: Duration,
    /// How long until the whole session has to be recreated
    pub session_lifetime_ttl: Duration,
    /// How long a provider outage is tolerated
    pub grace_period_ttl: Duration,
}

impl ProviderData {
    /// Derive all provider endpoints from one base url
    pub fn from_base(name: &str, slug: &str, client_id: &str, base: &Url) -> Result<ProviderData> {
        let endpoint = |path: &str| base.join(path).map_err(|_| create_error!(InvalidOperation));

        Ok(ProviderData {
            provider_name: name.to_string(),
            provider_slug: slug.to_string(),
            client_id: client_id.to_string(),
            scope: "openid email profile".to_string(),
            sign_in_url: endpoint("sign_in")?,
            sign_out_url: endpoint("sign_out")?,
            redeem_url: endpoint("redeem")?,
            profile_url: endpoint("profile")?,
            validate_url: endpoint("validate")?,
            session_valid_ttl: Duration::minutes(1),
            session_lifetime_ttl: Duration::hours(12),
            grace_period_ttl: Duration::hours(3),
        })
    }
}

/// Everything the proxy needs from an identity provider
#[async_trait]
pub trait Provider: Send + Sync {
    /// Static provider information
    fn data(&self) -> &ProviderData;

    /// Exchange a one-time authorization code for a session
    async fn redeem(&self, redirect_url: &str, code: &str) -> Result<SessionState>;

    /// Check which of `allowed_groups` the user belongs to, and whether that
    /// grants access
    async fn validate_group_membership(
        &self,
        email: &str,
        allowed_groups: &[String],
        access_token: &str,
    ) -> Result<(Vec<String>, bool)>;

    /// Fetch the subset of `groups` the user belongs to
    async fn user_groups(
        &self,
        email: &str,
        groups: &[String],
        access_token: &str,
    ) -> Result<Vec<String>>;

    /// Whether the session's access token is still accepted
    async fn validate_session_token(&self, session: &SessionState) -> bool;

    /// Obtain a new access token, returns whether the session was refreshed
    async fn refresh_session_token(&self, session: &mut SessionState) -> Result<bool>;

    /// Where to send the user to sign in
    fn sign_in_url(&self, redirect_uri: &Url, final_redirect: &str) -> Url;

    /// Where to send the user to sign out
    fn sign_out_url(&self, redirect_uri: &Url) -> Url;
}

macro_rules! forward_provider {
    ( $ty: ty ) => {
        #[async_trait]
        impl<T: Provider + ?Sized> Provider for $ty {
            fn data(&self) -> &ProviderData {
                (**self).data()
            }

            async fn redeem(&self, redirect_url: &str, code: &str) -> Result<SessionState> {
                (**self).redeem(redirect_url, code).await
            }

            async fn validate_group_membership(
                &self,
                email: &str,
                allowed_groups: &[String],
                access_token: &str,
            ) -> Result<(Vec<String>, bool)> {
                (**self)
                    .validate_group_membership(email, allowed_groups, access_token)
                    .await
            }

            async fn user_groups(
                &self,
                email: &str,
                groups: &[String],
                access_token: &str,
            ) -> Result<Vec<String>> {
                (**self).user_groups(email, groups, access_token).await
            }

            async fn validate_session_token(&self, session: &SessionState) -> bool {
                (**self).validate_session_token(session).await
            }

            async fn refresh_session_token(&self, session: &mut SessionState) -> Result<bool> {
                (**self).refresh_session_token(session).await
            }

            fn sign_in_url(&self, redirect_uri: &Url, final_redirect: &str) -> Url {
                (**self).sign_in_url(redirect_uri, final_redirect)
            }

            fn sign_out_url(&self, redirect_uri: &Url) -> Url {
                (**self).sign_out_url(redirect_uri)
            }
        }
    };
}

forward_provider!(Arc<T>);
forward_provider!(Box<T>);
