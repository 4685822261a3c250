//! Web server for OAuth verification
//!
//! Runs alongside the Discord bot to handle the browser side of verification.

mod oauth;
mod pages;
mod server;

pub use oauth::OAuthState;
pub use server::{start_web_server, AppState, WebServerConfig};
