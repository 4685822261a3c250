use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proof that a user completed OAuth verification for a guild.
///
/// Records are append-only: they survive the user leaving the guild and are
/// never rewritten by a later verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationRecord {
    pub guild_id: String,
    pub user_id: String,

    /// Discord username at verification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    pub verified_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn new(guild_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            user_id: user_id.into(),
            username: None,
            verified_at: Utc::now(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Last OAuth access token a user granted us.
///
/// There is no expiry metadata; a stale token only shows up as a failed join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenRecord {
    pub user_id: String,
    pub access_token: String,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            updated_at: Utc::now(),
        }
    }
}
