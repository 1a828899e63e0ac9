//! Configuration for the `chat-tail` tool.

mod file_config;

pub use file_config::{FileConfig, ReconnectConfig};

use anyhow::{bail, Result};
use std::time::Duration;

use crate::reconnect::ReconnectPolicy;
use crate::session::{SessionBuilder, DEFAULT_ORIGIN, DEFAULT_URL};

/// CLI arguments that can be overridden by the TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub url: Option<String>,
    pub origin: Option<String>,
    pub login_key: Option<String>,
    pub no_reconnect: bool,
    pub ping_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub url: String,
    pub origin: String,
    pub login_key: Option<String>,
    pub auto_reconnect: bool,
    /// `None` disables the keepalive ping.
    pub ping_interval: Option<Duration>,
    pub reconnect: ReconnectPolicy,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let url = file
            .url
            .or_else(|| cli.url.clone())
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let origin = file
            .origin
            .or_else(|| cli.origin.clone())
            .unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let login_key = file
            .login_key
            .or_else(|| cli.login_key.clone())
            .filter(|key| !key.trim().is_empty());
        let auto_reconnect = file.auto_reconnect.unwrap_or(!cli.no_reconnect);

        let ping_interval_secs = file.ping_interval_secs.unwrap_or(cli.ping_interval_secs);
        let ping_interval = match ping_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        if ping_interval.is_some() && login_key.is_none() {
            bail!("ping_interval_secs requires a login key, read-only sessions cannot send");
        }

        let defaults = ReconnectPolicy::default();
        let reconnect_file = file.reconnect.unwrap_or_default();
        let reconnect = ReconnectPolicy::new(
            reconnect_file
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            reconnect_file
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        );
        if reconnect.initial_delay.is_zero() {
            bail!("reconnect.initial_delay_ms must be greater than zero");
        }
        if reconnect.max_delay < reconnect.initial_delay {
            bail!(
                "reconnect.max_delay_ms ({:?}) is smaller than reconnect.initial_delay_ms ({:?})",
                reconnect.max_delay,
                reconnect.initial_delay
            );
        }

        Ok(Self {
            url,
            origin,
            login_key,
            auto_reconnect,
            ping_interval,
            reconnect,
        })
    }

    /// Session builder carrying every resolved setting.
    pub fn session_builder(&self) -> SessionBuilder {
        let builder = SessionBuilder::new()
            .url(self.url.clone())
            .origin(self.origin.clone())
            .auto_reconnect(self.auto_reconnect)
            .reconnect_policy(self.reconnect.clone());
        match &self.login_key {
            Some(key) => builder.login_key(key.clone()),
            None => builder,
        }
    }
}
