//! User domain types.
//!
//! [`User`] never carries the password hash; the repository hands the hash
//! out separately only to the login path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nutritracker_core::{Email, UserId, UserRole};

/// An application account.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Unique display name.
    pub username: String,
    /// Unique, normalized email address.
    pub email: Email,
    /// Access level.
    pub role: UserRole,
    /// Inactive accounts cannot log in or use existing tokens.
    pub is_active: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The public projection returned to clients.
    #[must_use]
    pub fn to_safe(&self) -> SafeUser {
        SafeUser {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

/// User fields that are safe to expose over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeUser {
    pub id: UserId,
    pub username: String,
    pub email: Email,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_user_json_shape() {
        let user = User {
            id: UserId::new(7),
            username: "alice".to_owned(),
            email: Email::parse("alice@example.com").unwrap(),
            role: UserRole::Admin,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(user.to_safe()).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["username"], "alice");
        assert_eq!(json["role"], "admin");
        assert_eq!(json["isActive"], true);
        assert!(json.get("createdAt").is_some());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("passwordHash").is_none());
    }
}
