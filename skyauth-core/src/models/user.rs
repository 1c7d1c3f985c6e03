use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Local user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub verified: bool,
    pub disabled: bool,
}

impl User {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            created_at: now,
            updated_at: now,
            last_login_at: None,
            verified: false,
            disabled: false,
        }
    }
}

/// Free-form user profile, keyed by user ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    #[must_use]
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            data: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
