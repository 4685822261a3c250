//! In-process stand-ins for Discord used by unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use crate::discord::{DiscordUser, GuildMembership, JoinOutcome, OAuthProvider, TokenResponse};
use crate::error::{BotError, Result};
use crate::reconcile::{ProgressReporter, ProgressSnapshot, ReconciliationOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    IsMember(String),
    Join(String),
    PatchRole(String),
    ExchangeCode(String),
}

/// Fake guild: tracks members, which tokens can join, and forced responses
#[derive(Default)]
pub struct FakeDiscord {
    members: Mutex<HashSet<(String, String)>>,
    valid_tokens: HashSet<String>,
    join_status: HashMap<String, u16>,
    failing_patch: HashSet<String>,
    codes: HashMap<String, DiscordUser>,
    calls: Mutex<Vec<Call>>,
}

impl FakeDiscord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(self, guild_id: &str, user_id: &str) -> Self {
        self.members
            .lock()
            .insert((guild_id.to_string(), user_id.to_string()));
        self
    }

    pub fn with_valid_token(mut self, token: &str) -> Self {
        self.valid_tokens.insert(token.to_string());
        self
    }

    /// Force the join response for a user regardless of token
    pub fn with_join_status(mut self, user_id: &str, status: u16) -> Self {
        self.join_status.insert(user_id.to_string(), status);
        self
    }

    pub fn with_failing_patch(mut self, user_id: &str) -> Self {
        self.failing_patch.insert(user_id.to_string());
        self
    }

    /// Accept `code` at the token endpoint, resolving to the given user.
    /// The issued access token is `token-<user_id>`.
    pub fn with_code(mut self, code: &str, user_id: &str, username: &str) -> Self {
        self.codes.insert(
            code.to_string(),
            DiscordUser {
                id: user_id.to_string(),
                username: username.to_string(),
                global_name: None,
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn is_present(&self, guild_id: &str, user_id: &str) -> bool {
        self.members
            .lock()
            .contains(&(guild_id.to_string(), user_id.to_string()))
    }
}

#[async_trait]
impl GuildMembership for FakeDiscord {
    async fn is_member(&self, guild_id: &str, user_id: &str) -> bool {
        self.calls.lock().push(Call::IsMember(user_id.to_string()));
        self.is_present(guild_id, user_id)
    }

    async fn join_with_role(
        &self,
        guild_id: &str,
        user_id: &str,
        access_token: &str,
        _role_id: &str,
    ) -> JoinOutcome {
        self.calls.lock().push(Call::Join(user_id.to_string()));

        if let Some(status) = self.join_status.get(user_id) {
            return JoinOutcome::from_status(*status);
        }
        if self.is_present(guild_id, user_id) {
            return JoinOutcome::AlreadyMember;
        }
        if self.valid_tokens.contains(access_token) {
            self.members
                .lock()
                .insert((guild_id.to_string(), user_id.to_string()));
            return JoinOutcome::Joined;
        }
        JoinOutcome::from_status(403)
    }

    async fn patch_role(&self, guild_id: &str, user_id: &str, _role_id: &str) -> bool {
        self.calls.lock().push(Call::PatchRole(user_id.to_string()));
        !self.failing_patch.contains(user_id) && self.is_present(guild_id, user_id)
    }
}

#[async_trait]
impl OAuthProvider for FakeDiscord {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        self.calls.lock().push(Call::ExchangeCode(code.to_string()));
        match self.codes.get(code) {
            Some(user) => Ok(TokenResponse {
                access_token: format!("token-{}", user.id),
                token_type: "Bearer".to_string(),
            }),
            None => Err(BotError::auth("invalid_grant")),
        }
    }

    async fn current_user(&self, token: &TokenResponse) -> Result<DiscordUser> {
        self.codes
            .values()
            .find(|u| format!("token-{}", u.id) == token.access_token)
            .cloned()
            .ok_or_else(|| BotError::auth("unknown token"))
    }
}

/// Reporter that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub snapshots: Vec<ProgressSnapshot>,
    pub finished: Vec<ReconciliationOutcome>,
}

#[async_trait]
impl ProgressReporter for RecordingReporter {
    async fn progress(&mut self, snapshot: ProgressSnapshot) {
        self.snapshots.push(snapshot);
    }

    async fn finish(&mut self, outcome: &ReconciliationOutcome) {
        self.finished.push(*outcome);
    }
}
