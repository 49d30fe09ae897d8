use serde::{Deserialize, Serialize};

use crate::store::{UserId, UserRecord};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub username: String,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT)
    }
}

/// Public view of another account.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}

impl From<&UserRecord> for UserSummary {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_limit_defaults_and_caps() {
        let q = |limit| SearchQuery {
            username: String::new(),
            limit,
        };
        assert_eq!(q(None).effective_limit(), 10);
        assert_eq!(q(Some(3)).effective_limit(), 3);
        assert_eq!(q(Some(500)).effective_limit(), 50);
        assert_eq!(q(Some(0)).effective_limit(), 1);
    }

    #[test]
    fn update_request_uses_camel_case() {
        let req: UpdateUserRequest = serde_json::from_str(
            r#"{"currentPassword":"old","newPassword":"new"}"#,
        )
        .unwrap();
        assert_eq!(req.current_password.as_deref(), Some("old"));
        assert_eq!(req.new_password.as_deref(), Some("new"));
        assert!(req.username.is_none());
    }
}
