//! Keys identifying provider calls that may share one upstream request.
//!
//! Two calls producing the same [`CallKey`] must be interchangeable: same
//! operation, same user, same effective arguments. Unordered arguments are
//! sorted first so that callers listing the same groups in a different
//! order still end up on the same key.

use std::fmt;

/// Provider operations that go through request coalescing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ValidateGroup,
    UserGroups,
    ValidateSessionToken,
    RefreshSessionToken,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ValidateGroup => "ValidateGroup",
            Operation::UserGroups => "UserGroups",
            Operation::ValidateSessionToken => "ValidateSessionToken",
            Operation::RefreshSessionToken => "RefreshSessionToken",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a coalescable provider call, `<operation>/<signature>`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallKey(String);

impl CallKey {
    fn new(operation: Operation, signature: &str) -> CallKey {
        CallKey(format!("{}/{signature}", operation.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sorted copy of an unordered list of groups
pub fn sorted(groups: &[String]) -> Vec<String> {
    let mut groups = groups.to_vec();
    groups.sort();
    groups
}

fn email_and_groups(email: &str, groups: &[String]) -> String {
    format!("{email}:{}", sorted(groups).join(","))
}

pub fn validate_group(email: &str, allowed_groups: &[String]) -> CallKey {
    CallKey::new(
        Operation::ValidateGroup,
        &email_and_groups(email, allowed_groups),
    )
}

pub fn user_groups(email: &str, groups: &[String]) -> CallKey {
    CallKey::new(Operation::UserGroups, &email_and_groups(email, groups))
}

pub fn validate_session_token(access_token: &str) -> CallKey {
    CallKey::new(Operation::ValidateSessionToken, access_token)
}

pub fn refresh_session_token(refresh_token: &str) -> CallKey {
    CallKey::new(Operation::RefreshSessionToken, refresh_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn key_format() {
        assert_eq!(
            user_groups("a@x.com", &groups(&["g2", "g1"])).as_str(),
            "UserGroups/a@x.com:g1,g2"
        );
        assert_eq!(
            validate_session_token("token").to_string(),
            "ValidateSessionToken/token"
        );
        assert_eq!(
            refresh_session_token("refresh").as_str(),
            "RefreshSessionToken/refresh"
        );
    }

    #[test]
    fn permutations_share_a_key() {
        let a = groups(&["engineering", "admins", "ops"]);
        let b = groups(&["ops", "engineering", "admins"]);

        assert_eq!(validate_group("a@x.com", &a), validate_group("a@x.com", &b));
        assert_eq!(user_groups("a@x.com", &a), user_groups("a@x.com", &b));
    }

    #[test]
    fn caller_order_is_left_alone() {
        let mine = groups(&["b", "a"]);
        user_groups("a@x.com", &mine);
        assert_eq!(mine, groups(&["b", "a"]));
    }

    #[test]
    fn distinct_calls_get_distinct_keys() {
        let all = groups(&["g1", "g2"]);

        assert_ne!(
            user_groups("a@x.com", &all),
            user_groups("b@x.com", &all)
        );
        assert_ne!(
            user_groups("a@x.com", &all),
            user_groups("a@x.com", &groups(&["g1"]))
        );
        assert_ne!(
            user_groups("a@x.com", &all),
            user_groups("a@x.com", &groups(&["g1", "g3"]))
        );
        assert_ne!(validate_session_token("t1"), validate_session_token("t2"));
        assert_ne!(refresh_session_token("r1"), refresh_session_token("r2"));
    }

    #[test]
    fn operations_never_share_keys() {
        let all = groups(&["g1"]);

        assert_ne!(validate_group("a@x.com", &all), user_groups("a@x.com", &all));
        assert_ne!(validate_session_token("t"), refresh_session_token("t"));
    }
}
