use chrono::{DateTime, Utc};

/// Session information for an authenticated user
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Token used to talk to the provider on the user's behalf
    pub access_token: String,
    /// Token used to obtain a new access token
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub refresh_token: String,

    /// When the session must be thrown away entirely
    pub lifetime_deadline: Option<DateTime<Utc>>,
    /// When the access token must be refreshed
    pub refresh_deadline: Option<DateTime<Utc>>,
    /// When the access token must next be validated against the provider
    pub valid_deadline: Option<DateTime<Utc>>,
    /// When the provider first became unreachable for this session
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub grace_period_start: Option<DateTime<Utc>>,

    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub user: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub groups: Vec<String>,
}

fn expired(deadline: Option<DateTime<Utc>>) -> bool {
    deadline.map_or(true, |deadline| deadline < Utc::now())
}

impl SessionState {
    /// Whether the session has outlived its maximum lifetime
    pub fn lifetime_period_expired(&self) -> bool {
        expired(self.lifetime_deadline)
    }

    /// Copy token fields from a session refreshed on someone else's behalf
    ///
    /// Sessions of a different user are left alone, returns whether anything
    /// was copied.
    pub fn apply_refresh(&mut self, refreshed: &SessionState) -> bool {
        if refreshed.email != self.email {
            return false;
        }

        self.access_token = refreshed.access_token.clone();
        self.refresh_token = refreshed.refresh_token.clone();
        self.refresh_deadline = refreshed.refresh_deadline;
        self.valid_deadline = refreshed.valid_deadline;
        true
    }
}
