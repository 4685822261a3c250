use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{DiscordUser, GuildMembership, JoinOutcome, OAuthProvider, TokenResponse};
use crate::config::BotConfig;
use crate::error::{BotError, Result};

/// reqwest-backed client for the handful of Discord endpoints the bot needs
#[derive(Clone)]
pub struct DiscordApi {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    check_timeout: Duration,
    write_timeout: Duration,
}

impl DiscordApi {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            bot_token: config.bot_token.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri(),
            check_timeout: config.member_check_timeout,
            write_timeout: config.member_write_timeout,
        }
    }

    fn member_url(&self, guild_id: &str, user_id: &str) -> String {
        format!("{}/guilds/{}/members/{}", self.api_base, guild_id, user_id)
    }

    fn bot_auth(&self) -> String {
        format!("Bot {}", self.bot_token)
    }
}

#[async_trait]
impl GuildMembership for DiscordApi {
    async fn is_member(&self, guild_id: &str, user_id: &str) -> bool {
        let result = self
            .http
            .get(self.member_url(guild_id, user_id))
            .header("Authorization", self.bot_auth())
            .timeout(self.check_timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                debug!(
                    "Member lookup {} in {}: {}",
                    user_id,
                    guild_id,
                    response.status()
                );
                response.status().as_u16() == 200
            }
            Err(e) => {
                warn!(
                    "Member lookup for {} in guild {} failed: {}",
                    user_id, guild_id, e
                );
                false
            }
        }
    }

    async fn join_with_role(
        &self,
        guild_id: &str,
        user_id: &str,
        access_token: &str,
        role_id: &str,
    ) -> JoinOutcome {
        let result = self
            .http
            .put(self.member_url(guild_id, user_id))
            .header("Authorization", self.bot_auth())
            .json(&serde_json::json!({
                "access_token": access_token,
                "roles": [role_id],
            }))
            .timeout(self.write_timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!("PUT member {} in {}: {}", user_id, guild_id, status);
                JoinOutcome::from_status(status)
            }
            Err(e) => {
                error!("Failed to add user {} to guild {}: {}", user_id, guild_id, e);
                JoinOutcome::Failed {
                    status: None,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn patch_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> bool {
        // Adds one role without touching the member's other roles
        let url = format!(
            "{}/roles/{}",
            self.member_url(guild_id, user_id),
            role_id
        );
        let result = self
            .http
            .put(url)
            .header("Authorization", self.bot_auth())
            .timeout(self.write_timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                if matches!(status, 200 | 204) {
                    true
                } else {
                    warn!(
                        "Could not add role {} to user {} in guild {}: {}",
                        role_id, user_id, guild_id, status
                    );
                    false
                }
            }
            Err(e) => {
                error!("Role assignment failed for {}: {}", user_id, e);
                false
            }
        }
    }
}

#[async_trait]
impl OAuthProvider for DiscordApi {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(format!("{}/oauth2/token", self.api_base))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .timeout(self.write_timeout)
            .send()
            .await
            .map_err(|e| BotError::auth(format!("failed to exchange code: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Token exchange failed ({}): {}", status, error_text);
            return Err(BotError::auth(format!(
                "token endpoint responded with {}",
                status
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| BotError::auth(format!("failed to parse token response: {}", e)))
    }

    async fn current_user(&self, token: &TokenResponse) -> Result<DiscordUser> {
        let response = self
            .http
            .get(format!("{}/users/@me", self.api_base))
            .header(
                "Authorization",
                format!("{} {}", token.token_type, token.access_token),
            )
            .timeout(self.write_timeout)
            .send()
            .await
            .map_err(|e| BotError::auth(format!("failed to get user info: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("User info request failed ({}): {}", status, error_text);
            return Err(BotError::auth(format!(
                "user info request responded with {}",
                status
            )));
        }

        response
            .json::<DiscordUser>()
            .await
            .map_err(|e| BotError::auth(format!("failed to parse user info: {}", e)))
    }
}
