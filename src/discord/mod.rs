//! Discord REST calls used by verification and backup
//!
//! Both traits exist so the verification flow and the backup engine can run
//! against fakes in tests; production uses [`DiscordApi`] for both.

pub mod client;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::Result;

pub use client::DiscordApi;

/// Result of adding a user to a guild with their OAuth token
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// 201: the user was added
    Joined,
    /// 204: the user was already in the guild
    AlreadyMember,
    /// Anything else. `status` is `None` when the request never got a response.
    Failed {
        status: Option<u16>,
        reason: String,
    },
}

impl JoinOutcome {
    /// Map a `PUT /guilds/{guild}/members/{user}` status code
    pub fn from_status(status: u16) -> Self {
        match status {
            201 => JoinOutcome::Joined,
            204 => JoinOutcome::AlreadyMember,
            other => JoinOutcome::Failed {
                status: Some(other),
                reason: format!("Discord responded with status {}", other),
            },
        }
    }

    /// Whether Discord accepted the join request
    pub fn is_success(&self) -> bool {
        matches!(self, JoinOutcome::Joined | JoinOutcome::AlreadyMember)
    }

    /// Whether the user is probably in the guild already and only needs the role.
    ///
    /// A 204, or any 4xx/5xx rejection, falls back to a role assignment.
    pub fn needs_role_fallback(&self) -> bool {
        match self {
            JoinOutcome::Joined => false,
            JoinOutcome::AlreadyMember => true,
            JoinOutcome::Failed { status, .. } => status.map(|s| s >= 400).unwrap_or(false),
        }
    }
}

/// Guild membership operations performed with the bot token.
///
/// Calls are never retried internally and never return transport errors;
/// failures are folded into the return value.
#[async_trait]
pub trait GuildMembership: Send + Sync {
    /// Whether the user is currently in the guild. Network errors count as "no".
    async fn is_member(&self, guild_id: &str, user_id: &str) -> bool;

    /// Add the user to the guild with `role`, using their OAuth access token
    async fn join_with_role(
        &self,
        guild_id: &str,
        user_id: &str,
        access_token: &str,
        role_id: &str,
    ) -> JoinOutcome;

    /// Give an existing member `role`. Returns `true` on success.
    async fn patch_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> bool;
}

/// Discord OAuth token response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Discord user info from /users/@me
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

/// Authorization-code exchange against the Discord OAuth endpoints
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse>;

    async fn current_user(&self, token: &TokenResponse) -> Result<DiscordUser>;
}

pub type SharedMembership = Arc<dyn GuildMembership>;
pub type SharedOAuth = Arc<dyn OAuthProvider>;
