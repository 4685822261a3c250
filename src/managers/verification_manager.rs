use std::sync::Arc;
use tracing::{error, info, warn};

use crate::discord::{DiscordUser, SharedOAuth};
use crate::error::{BotError, Result};
use crate::reconcile::{CallbackJoin, Reconciler};
use crate::state::{SharedStore, TokenRecord, VerificationRecord};

/// What happened during a completed OAuth verification
#[derive(Debug, Clone)]
pub struct VerificationSummary {
    pub guild_id: String,
    pub user: DiscordUser,
    pub join: CallbackJoin,
    /// `false` when the user had verified for this guild before
    pub newly_recorded: bool,
}

/// Turns OAuth authorization codes into recorded verifications
pub struct VerificationManager {
    oauth: SharedOAuth,
    reconciler: Arc<Reconciler>,
}

impl VerificationManager {
    pub fn new(oauth: SharedOAuth, reconciler: Arc<Reconciler>) -> Self {
        Self { oauth, reconciler }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    fn store(&self) -> &SharedStore {
        self.reconciler.store()
    }

    /// Check if a user already verified in a guild
    pub async fn is_verified(&self, guild_id: &str, user_id: &str) -> bool {
        match self.store().is_verified(guild_id, user_id).await {
            Ok(verified) => verified,
            Err(e) => {
                error!("Failed to look up verification for {}: {}", user_id, e);
                false
            }
        }
    }

    pub async fn verification_count(&self) -> usize {
        self.store().verification_count().await.unwrap_or_else(|e| {
            error!("Failed to count verifications: {}", e);
            0
        })
    }

    /// Complete the OAuth callback for `code`, targeting the guild in `state`.
    ///
    /// Nothing is written unless the code exchange and identity lookup succeed.
    /// Once the user is known, the verification and token are stored even if
    /// joining the guild or assigning the role failed, so a later backup can retry.
    pub async fn complete_oauth(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<VerificationSummary> {
        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BotError::invalid_request("missing authorization code"))?;
        let guild_id = state
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            .ok_or_else(|| BotError::invalid_request("missing or invalid guild in state"))?;

        let token = self.oauth.exchange_code(code).await?;
        info!("Got access token, fetching user info...");
        let user = self.oauth.current_user(&token).await?;

        info!(
            "User {} ({}) is verifying for guild {}",
            user.username, user.id, guild_id
        );

        let join = self
            .reconciler
            .join_single(guild_id, &user.id, &token.access_token)
            .await;
        if !join.role_granted() {
            warn!(
                "User {} authorized but could not be given the verified role in {}",
                user.id, guild_id
            );
        }

        let newly_recorded = self
            .store()
            .record_verification(
                VerificationRecord::new(guild_id, user.id.clone()).with_username(&user.username),
            )
            .await?;
        self.store()
            .store_token(TokenRecord::new(user.id.clone(), token.access_token))
            .await?;

        info!("User {} verified and saved", user.username);

        Ok(VerificationSummary {
            guild_id: guild_id.to_string(),
            user,
            join,
            newly_recorded,
        })
    }
}

/// Shared verification manager type
pub type SharedVerificationManager = Arc<VerificationManager>;

pub fn create_shared_verification_manager(
    oauth: SharedOAuth,
    reconciler: Arc<Reconciler>,
) -> SharedVerificationManager {
    Arc::new(VerificationManager::new(oauth, reconciler))
}
