use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Discord bot that verifies members through OAuth and restores them on demand
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Register slash commands per guild instead of globally (propagates immediately)
    #[arg(long, short = 's')]
    sync_commands: bool,

    /// Specific guild ID to register commands to
    #[arg(long)]
    guild_id: Option<u64>,

    /// Only serve the verification web pages, without connecting to the gateway
    #[arg(long)]
    web_only: bool,

    /// Run a backup for this guild without the gateway, logging progress, then exit
    #[arg(long, value_name = "GUILD_ID")]
    backup: Option<u64>,
}

mod commands;
mod config;
mod discord;
mod error;
mod events;
mod logging;
mod managers;
mod reconcile;
mod state;
#[cfg(test)]
mod testing;
mod web;

use commands::{backup, help, ping, setupverify, verified};
use config::BotConfig;
use discord::DiscordApi;
use managers::{create_shared_verification_manager, SharedVerificationManager};
use reconcile::{LogReporter, Reconciler};
use web::OAuthState;

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared application state
pub struct Data {
    pub config: Arc<BotConfig>,
    pub oauth: OAuthState,
    pub verification_manager: SharedVerificationManager,
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            if let Err(e) = events::handle_ready(data_about_bot, data).await {
                error!("Failed to handle ready: {}", e);
            }
        }
        serenity::FullEvent::InteractionCreate { interaction } => {
            if let serenity::Interaction::Component(component) = interaction {
                if let Err(e) = events::handle_component(ctx, component, data).await {
                    error!("Failed to handle component interaction: {}", e);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Log the application ID embedded in the bot token
fn log_bot_id(token: &str) {
    use base64::Engine;

    let Some(bot_id_b64) = token.split('.').next() else {
        return;
    };
    // Discord tokens use URL-safe base64 without padding
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(bot_id_b64)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(bot_id_b64));
    if let Some(id_str) = decoded.ok().and_then(|d| String::from_utf8(d).ok()) {
        info!(
            "Bot ID: {} (configure redirects at https://discord.com/developers/applications/{}/oauth2)",
            id_str, id_str
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let log_buffer = logging::create_log_buffer(200);
    logging::init_tracing(log_buffer.clone());

    info!("Starting verification bot");

    let config = Arc::new(BotConfig::from_env()?);
    log_bot_id(&config.bot_token);
    info!("Server URL: {}", config.base_url);

    let store = state::open_store(&config.store).await?;
    let api = Arc::new(DiscordApi::new(&config));
    let reconciler = Arc::new(Reconciler::new(
        api.clone(),
        store,
        config.verified_role_id.clone(),
        config.pacing,
    ));

    if let Some(guild_id) = args.backup {
        let guild_id = guild_id.to_string();
        let mut reporter = LogReporter {
            guild_id: guild_id.clone(),
        };
        let outcome = reconciler.run_backup(&guild_id, &mut reporter).await?;
        if outcome.total == 0 {
            warn!("No verified users found for guild {}", guild_id);
        }
        return Ok(());
    }

    let verification_manager = create_shared_verification_manager(api, reconciler);
    let oauth = OAuthState::from_config(&config);

    let web_state = web::AppState {
        oauth: oauth.clone(),
        verification_manager: verification_manager.clone(),
        log_buffer,
    };
    let web_config = web::WebServerConfig::from_config(&config);

    if args.web_only {
        info!("--web-only: serving verification pages without the bot");
        return web::start_web_server(web_config, web_state).await;
    }

    tokio::spawn(async move {
        if let Err(e) = web::start_web_server(web_config, web_state).await {
            error!("Web server error: {}", e);
        }
    });

    let sync_commands = args.sync_commands;
    let target_guild_id = args.guild_id;
    let token = config.bot_token.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![ping(), help(), setupverify(), verified(), backup()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' invoked by {} (ID: {}) in {}",
                        ctx.command().qualified_name,
                        ctx.author().name,
                        ctx.author().id,
                        ctx.guild_id().map(|g| g.to_string()).unwrap_or_else(|| "DM".to_string())
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' completed for {}",
                        ctx.command().qualified_name,
                        ctx.author().name
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Error in command '{}': {}", ctx.command().qualified_name, error);
                            let _ = ctx.say(format!("An error occurred: {}", error)).await;
                        }
                        poise::FrameworkError::GuildOnly { ctx, .. } => {
                            error!("Command '{}' is guild-only, used in DM by {}", ctx.command().qualified_name, ctx.author().name);
                        }
                        other => {
                            error!("Other framework error: {}", other);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);

                if sync_commands || target_guild_id.is_some() {
                    let guilds: Vec<serenity::GuildId> = match target_guild_id {
                        Some(gid) => vec![serenity::GuildId::new(gid)],
                        None => ready.guilds.iter().map(|g| g.id).collect(),
                    };
                    for guild_id in &guilds {
                        if let Err(e) = poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            *guild_id,
                        )
                        .await
                        {
                            error!("Failed to register commands for guild {}: {}", guild_id, e);
                        } else {
                            info!("Registered {} commands for guild {}", framework.options().commands.len(), guild_id);
                        }
                    }
                } else {
                    info!("Registering commands globally...");
                    if let Err(e) =
                        poise::builtins::register_globally(ctx, &framework.options().commands).await
                    {
                        error!("Failed to register commands globally: {}", e);
                    }
                }

                Ok(Data {
                    config,
                    oauth,
                    verification_manager,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    client.start().await?;
    warn!("Bot ended.");

    Ok(())
}
