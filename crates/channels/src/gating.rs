use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Reason an inbound message was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    Blacklisted,
    NotOnPrivateWhitelist,
    GroupNotOnWhitelist,
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blacklisted => write!(f, "user is on the global blacklist"),
            Self::NotOnPrivateWhitelist => write!(f, "user not on private whitelist"),
            Self::GroupNotOnWhitelist => write!(f, "group not on group whitelist"),
        }
    }
}

/// Blacklist/whitelist gate applied to every inbound message.
///
/// The global blacklist always wins. An empty whitelist means unrestricted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccessPolicy {
    pub global_blacklist: HashSet<String>,
    pub group_whitelist: HashSet<String>,
    pub private_whitelist: HashSet<String>,
}

impl AccessPolicy {
    pub fn new(
        global_blacklist: impl IntoIterator<Item = String>,
        group_whitelist: impl IntoIterator<Item = String>,
        private_whitelist: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            global_blacklist: global_blacklist.into_iter().collect(),
            group_whitelist: group_whitelist.into_iter().collect(),
            private_whitelist: private_whitelist.into_iter().collect(),
        }
    }

    /// Determine if a message from `user_id` should be processed.
    ///
    /// Returns `Ok(())` if the message is allowed, or `Err(reason)` if it
    /// should be silently dropped.
    pub fn check(
        &self,
        user_id: &str,
        group_id: Option<&str>,
        private: bool,
    ) -> Result<(), AccessDenied> {
        if self.global_blacklist.contains(user_id) {
            return Err(AccessDenied::Blacklisted);
        }

        if private {
            if !self.private_whitelist.is_empty() && !self.private_whitelist.contains(user_id) {
                return Err(AccessDenied::NotOnPrivateWhitelist);
            }
        } else if let Some(gid) = group_id
            && !self.group_whitelist.is_empty()
            && !self.group_whitelist.contains(gid)
        {
            return Err(AccessDenied::GroupNotOnWhitelist);
        }

        Ok(())
    }

    pub fn allow(&self, user_id: &str, group_id: Option<&str>, private: bool) -> bool {
        self.check(user_id, group_id, private).is_ok()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn empty_policy_allows_everyone() {
        let policy = AccessPolicy::default();
        assert!(policy.allow("anyone", None, true));
        assert!(policy.allow("anyone", Some("grp"), false));
    }

    #[rstest]
    #[case(true, None)]
    #[case(false, Some("g1"))]
    #[case(false, Some("other"))]
    #[case(false, None)]
    fn blacklist_overrides_whitelists(#[case] private: bool, #[case] group: Option<&str>) {
        let policy = AccessPolicy::new(ids(&["666"]), ids(&["g1"]), ids(&["666"]));
        assert_eq!(
            policy.check("666", group, private),
            Err(AccessDenied::Blacklisted)
        );
    }

    #[test]
    fn private_whitelist_membership() {
        let policy = AccessPolicy::new(ids(&[]), ids(&[]), ids(&["alice"]));
        assert!(policy.allow("alice", None, true));
        assert_eq!(
            policy.check("bob", None, true),
            Err(AccessDenied::NotOnPrivateWhitelist)
        );
        // The private whitelist does not gate group traffic.
        assert!(policy.allow("bob", Some("g1"), false));
    }

    #[test]
    fn group_whitelist_membership() {
        let policy = AccessPolicy::new(ids(&[]), ids(&["g1"]), ids(&[]));
        assert!(policy.allow("anyone", Some("g1"), false));
        assert_eq!(
            policy.check("anyone", Some("g2"), false),
            Err(AccessDenied::GroupNotOnWhitelist)
        );
        // Group whitelist does not restrict private chats.
        assert!(policy.allow("anyone", None, true));
    }

    #[test]
    fn group_message_without_group_id_passes_whitelist() {
        let policy = AccessPolicy::new(ids(&[]), ids(&["g1"]), ids(&[]));
        assert!(policy.allow("anyone", None, false));
    }

    #[test]
    fn deserialize_from_lists() {
        let json = r#"{ "global_blacklist": ["1", "2"], "private_whitelist": ["3"] }"#;
        let policy: AccessPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.global_blacklist.len(), 2);
        assert!(policy.group_whitelist.is_empty());
        assert!(policy.private_whitelist.contains("3"));
    }
}
