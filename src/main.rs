use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dgg_chat::config::{AppConfig, CliConfig, FileConfig};
use dgg_chat::Session;

/// Tails a destiny.gg chat room and logs every event.
#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI flags.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Chat server WebSocket address.
    #[clap(long)]
    pub url: Option<String>,

    /// Value of the Origin header sent on connect.
    #[clap(long)]
    pub origin: Option<String>,

    /// Login key. Without one the session is read-only.
    #[clap(long, env = "DGG_LOGIN_KEY", hide_env_values = true)]
    pub login_key: Option<String>,

    /// Do not reconnect when the connection drops.
    #[clap(long)]
    pub no_reconnect: bool,

    /// Send a ping every N seconds (0 disables it). Needs a login key.
    #[clap(long, default_value_t = 0)]
    pub ping_interval_secs: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            url: self.url.clone(),
            origin: self.origin.clone(),
            login_key: self.login_key.clone(),
            no_reconnect: self.no_reconnect,
            ping_interval_secs: self.ping_interval_secs,
        }
    }
}

fn register_handlers(session: &Session) {
    let handlers = session.handlers();

    handlers.on_message(|msg, _| {
        if msg.is_action() {
            info!("* {} {}", msg.sender.nick, msg.message.trim_start_matches("/me "));
        } else {
            info!("<{}> {}", msg.sender.nick, msg.message);
        }
    });
    handlers.on_pin(|pin, _| info!("[pin] <{}> {}", pin.sender.nick, pin.message));
    handlers.on_names(|names, _| {
        info!(
            "{} users in room, {} connections",
            names.users.len(),
            names.connection_count
        )
    });
    handlers.on_join(|join, _| info!("{} joined", join.user.nick));
    handlers.on_quit(|quit, _| info!("{} left", quit.user.nick));
    handlers.on_user_update(|user, _| info!("{} updated: {:?}", user.nick, user.features));
    handlers.on_mute(|mute, _| info!("{} muted {}", mute.sender.nick, mute.target.nick()));
    handlers.on_unmute(|mute, _| info!("{} unmuted {}", mute.sender.nick, mute.target.nick()));
    handlers.on_ban(|ban, _| info!("{} banned {}", ban.sender.nick, ban.target.nick()));
    handlers.on_unban(|ban, _| info!("{} unbanned {}", ban.sender.nick, ban.target.nick()));
    handlers.on_private_message(|pm, _| info!("[whisper] <{}> {}", pm.sender.nick, pm.message));
    handlers.on_broadcast(|b, _| info!("[broadcast] {}", b.message));
    handlers.on_subscription(|sub, _| {
        if sub.is_mass_gift() {
            info!(
                "{} gifted {} {} subs",
                sub.sender.nick, sub.quantity, sub.tier.label
            );
        } else if sub.is_gift() {
            info!(
                "{} gifted a {} sub to {}",
                sub.sender.nick, sub.tier.label, sub.recipient.nick
            );
        } else {
            info!("{} subscribed at {}", sub.sender.nick, sub.tier.label);
        }
    });
    handlers.on_donation(|d, _| info!("{} donated {}: {}", d.sender.nick, d.amount, d.message));
    handlers.on_sub_only(|s, _| info!("{} set sub-only mode {}", s.sender.nick, s.active));
    handlers.on_pong(|pong, _| {
        let rtt = chrono::Utc::now() - pong.timestamp;
        info!("Pong, round trip {} ms", rtt.num_milliseconds());
    });
    handlers.on_error_notice(|notice, _| warn!("Chat error: {:?}", notice.kind()));
    handlers.on_socket_error(|err, _| error!("Socket error: {}", err));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    let session = config
        .session_builder()
        .build()
        .context("Invalid session configuration")?;
    register_handlers(&session);

    info!(
        "Opening {} session",
        if session.is_read_only() {
            "read-only"
        } else {
            "credentialed"
        }
    );
    session
        .open()
        .await
        .with_context(|| format!("Failed to connect to {}", config.url))?;

    let shutdown = CancellationToken::new();
    if let Some(interval) = config.ping_interval {
        let session = session.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = session.send_ping().await {
                            warn!("Ping failed: {}", e);
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    shutdown.cancel();
    session.close().await.context("Failed to close session")?;
    Ok(())
}
