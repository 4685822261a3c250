//! Web server implementation for OAuth verification

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::oauth::OAuthState;
use super::pages;
use crate::config::{BotConfig, TlsPaths};
use crate::error::BotError;
use crate::logging::SharedLogBuffer;
use crate::managers::SharedVerificationManager;

/// Number of log lines shown on the status page
const STATUS_LOG_LINES: usize = 20;

/// Web server configuration
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    pub port: u16,
    /// Serve HTTPS with these files when set
    pub tls: Option<TlsPaths>,
}

impl WebServerConfig {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            port: config.port,
            tls: config.tls.clone(),
        }
    }
}

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub oauth: OAuthState,
    pub verification_manager: SharedVerificationManager,
    pub log_buffer: SharedLogBuffer,
}

/// Query parameters for `/verify`
#[derive(Deserialize)]
pub struct VerifyParams {
    guild_id: Option<String>,
}

/// Query parameters from Discord OAuth callback
#[derive(Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>, // This contains the guild ID
    error: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(health))
        .route("/verify", get(verify))
        .route("/callback", get(oauth_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server for OAuth verification
pub async fn start_web_server(config: WebServerConfig, state: AppState) -> anyhow::Result<()> {
    let base_url = state.oauth.base_url.clone();
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("=== Discord OAuth Configuration ===");
    info!("Add this Redirect URI in Discord Developer Portal:");
    info!("  {}/callback", base_url);

    match config.tls {
        Some(tls) => {
            if !tls.cert_path.exists() {
                return Err(anyhow::anyhow!(
                    "Certificate file not found: {}",
                    tls.cert_path.display()
                ));
            }
            if !tls.key_path.exists() {
                return Err(anyhow::anyhow!(
                    "Private key file not found: {}",
                    tls.key_path.display()
                ));
            }

            let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to load TLS certificates: {}\n  Certificate: {}\n  Private key: {}",
                        e,
                        tls.cert_path.display(),
                        tls.key_path.display()
                    )
                })?;

            info!("Web server listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Web server listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

/// Liveness probe
async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// GET / - status page
async fn status(State(state): State<AppState>) -> Html<String> {
    let count = state.verification_manager.verification_count().await;
    let logs = state.log_buffer.get_recent(STATUS_LOG_LINES);
    Html(pages::status_page(count, &logs))
}

/// GET /verify?guild_id= - send the user to Discord's authorize screen
async fn verify(State(state): State<AppState>, Query(params): Query<VerifyParams>) -> Response {
    match params.guild_id.filter(|g| !g.is_empty()) {
        Some(guild_id) => {
            info!("Verification started for guild {}", guild_id);
            Redirect::to(&state.oauth.authorize_url(&guild_id)).into_response()
        }
        None => (
            StatusCode::BAD_REQUEST,
            Html(pages::error_page("Missing guild in verification link.")),
        )
            .into_response(),
    }
}

/// GET /callback - OAuth callback handler
async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<String>) {
    if let Some(reason) = params.error.as_deref() {
        warn!("User declined authorization: {}", reason);
        return (
            StatusCode::BAD_REQUEST,
            Html(pages::error_page("Authorization was cancelled.")),
        );
    }

    info!(
        "OAuth callback received for guild {}",
        params.state.as_deref().unwrap_or("<none>")
    );

    if params.code.is_none() || params.state.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Html(pages::error_page("Authorization failed!")),
        );
    }

    match state
        .verification_manager
        .complete_oauth(params.code.as_deref(), params.state.as_deref())
        .await
    {
        Ok(summary) => (
            StatusCode::OK,
            Html(pages::success_page(
                &summary.user.username,
                summary.join.role_granted(),
            )),
        ),
        Err(e) => {
            error!("Verification failed: {}", e);
            let status = match e {
                BotError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Html(pages::error_page(&e.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacingConfig;
    use crate::logging::create_log_buffer;
    use crate::managers::create_shared_verification_manager;
    use crate::reconcile::Reconciler;
    use crate::state::{MemoryStore, VerificationStore};
    use crate::testing::FakeDiscord;
    use std::sync::Arc;
    use std::time::Duration;

    async fn serve(discord: Arc<FakeDiscord>, store: Arc<MemoryStore>) -> String {
        let pacing = PacingConfig {
            backup_delay: Duration::ZERO,
            stats_delay: Duration::ZERO,
            burst: None,
        };
        let reconciler = Arc::new(Reconciler::new(discord.clone(), store, "9", pacing));
        let state = AppState {
            oauth: OAuthState {
                client_id: "42".to_string(),
                base_url: "http://localhost".to_string(),
            },
            verification_manager: create_shared_verification_manager(discord, reconciler),
            log_buffer: create_log_buffer(10),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn no_redirects() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let base = serve(Arc::new(FakeDiscord::new()), Arc::new(MemoryStore::new())).await;

        let health = reqwest::get(format!("{}/health", base)).await.unwrap();
        assert_eq!(health.status(), 200);
        assert_eq!(health.text().await.unwrap(), "OK");

        let status = reqwest::get(format!("{}/", base)).await.unwrap();
        assert_eq!(status.status(), 200);
        assert!(status.text().await.unwrap().contains("ONLINE"));
    }

    #[tokio::test]
    async fn test_verify_redirects_to_discord() {
        let base = serve(Arc::new(FakeDiscord::new()), Arc::new(MemoryStore::new())).await;

        let response = no_redirects()
            .get(format!("{}/verify?guild_id=100", base))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_redirection());
        let location = response.headers()["location"].to_str().unwrap().to_string();
        assert!(location.starts_with("https://discord.com/oauth2/authorize"));
        assert!(location.contains("state=100"));

        let missing = no_redirects()
            .get(format!("{}/verify", base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 400);
    }

    #[tokio::test]
    async fn test_callback_with_rejected_code() {
        let store = Arc::new(MemoryStore::new());
        let base = serve(Arc::new(FakeDiscord::new()), store.clone()).await;

        let response = reqwest::get(format!("{}/callback?code=bogus&state=100", base))
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        assert!(response.text().await.unwrap().contains("Verification Failed"));
        assert_eq!(store.verification_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_callback_with_bad_parameters() {
        let store = Arc::new(MemoryStore::new());
        let base = serve(Arc::new(FakeDiscord::new()), store.clone()).await;

        for query in [
            "state=100",
            "code=good",
            "code=good&state=not-a-guild",
            "error=access_denied&state=100",
        ] {
            let response = reqwest::get(format!("{}/callback?{}", base, query))
                .await
                .unwrap();
            assert_eq!(response.status(), 400, "query: {}", query);
        }
        assert_eq!(store.verification_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_callback_success_page() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_code("good", "1001", "alice")
                .with_valid_token("token-1001"),
        );
        let store = Arc::new(MemoryStore::new());
        let base = serve(discord, store.clone()).await;

        let response = reqwest::get(format!("{}/callback?code=good&state=100", base))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = response.text().await.unwrap();
        assert!(body.contains("Verification Complete!"));
        assert!(body.contains("alice"));
        assert!(store.is_verified("100", "1001").await.unwrap());
    }
}
