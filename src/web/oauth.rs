//! OAuth authorize URL construction

use crate::config::BotConfig;

const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";

/// Scopes needed to identify the user and add them to a guild
pub const SCOPES: &str = "identify guilds.join";

/// OAuth configuration
#[derive(Clone, Debug)]
pub struct OAuthState {
    pub client_id: String,
    pub base_url: String,
}

impl OAuthState {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            base_url: config.base_url.clone(),
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/callback", self.base_url)
    }

    /// Link posted behind the verify button
    pub fn verify_link(&self, guild_id: &str) -> String {
        format!(
            "{}/verify?guild_id={}",
            self.base_url,
            urlencoding::encode(guild_id)
        )
    }

    /// Discord authorize URL carrying the guild id through `state`
    pub fn authorize_url(&self, guild_id: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            AUTHORIZE_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri()),
            urlencoding::encode(SCOPES),
            urlencoding::encode(guild_id)
        )
    }
}
