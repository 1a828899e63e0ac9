//! Chat session: connection lifecycle, reconnection and command sending.
//!
//! A [`Session`] owns at most one connection at a time. Every connection
//! gets a generation number; a dispatcher task reads frames for exactly
//! one generation and stops as soon as that generation is superseded.

mod dispatch;

pub use dispatch::FrameOutcome;

use std::sync::Arc;

use chrono::Utc;
use http::HeaderMap;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::Command;
use crate::error::{ChatError, Result};
use crate::events::User;
use crate::handlers::HandlerRegistry;
use crate::membership::Membership;
use crate::reconnect::ReconnectPolicy;
use crate::transport::{handshake_headers, Connection, FrameSink, Transport, WsTransport};

pub const DEFAULT_URL: &str = "wss://chat.destiny.gg/ws";
pub const DEFAULT_ORIGIN: &str = "https://www.destiny.gg";

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Opening,
    Open,
    Reconnecting,
}

/// State guarded by the session lock.
struct Link {
    sink: Option<Box<dyn FrameSink>>,
    state: ConnectionState,
    generation: u64,
    auto_reconnect: bool,
    url: String,
    origin: String,
    cancel: Option<CancellationToken>,
    /// Generation a running reconnect sequence is responsible for.
    reconnect_owner: Option<u64>,
}

impl Link {
    /// Invalidates the current connection and hands back its sink.
    fn retire(&mut self) -> Option<Box<dyn FrameSink>> {
        self.generation += 1;
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.sink.take()
    }

    fn dial_target(&self, login_key: Option<&str>) -> Result<(String, HeaderMap)> {
        Ok((self.url.clone(), handshake_headers(&self.origin, login_key)?))
    }
}

struct Inner {
    login_key: Option<String>,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    link: Mutex<Link>,
    membership: Membership,
    handlers: HandlerRegistry,
    refresh: Notify,
}

/// Handle to a chat session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    login_key: Option<String>,
    url: String,
    origin: String,
    transport: Option<Arc<dyn Transport>>,
    policy: ReconnectPolicy,
    auto_reconnect: bool,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            login_key: None,
            url: DEFAULT_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            transport: None,
            policy: ReconnectPolicy::default(),
            auto_reconnect: true,
        }
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Login key sent as the `authtoken` cookie. Without it the session is
    /// read-only.
    pub fn login_key(mut self, key: impl Into<String>) -> Self {
        self.login_key = Some(key.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn build(self) -> Result<Session> {
        if matches!(self.login_key.as_deref(), Some(key) if key.trim().is_empty()) {
            return Err(ChatError::Construction(
                "login key must not be empty".to_string(),
            ));
        }
        validate_url(&self.url)?;
        handshake_headers(&self.origin, self.login_key.as_deref())?;
        Ok(self.assemble())
    }

    fn assemble(self) -> Session {
        let link = Link {
            sink: None,
            state: ConnectionState::Closed,
            generation: 0,
            auto_reconnect: self.auto_reconnect,
            url: self.url,
            origin: self.origin,
            cancel: None,
            reconnect_owner: None,
        };
        Session {
            inner: Arc::new(Inner {
                login_key: self.login_key,
                transport: self.transport.unwrap_or_else(|| Arc::new(WsTransport)),
                policy: self.policy,
                link: Mutex::new(link),
                membership: Membership::new(),
                handlers: HandlerRegistry::new(),
                refresh: Notify::new(),
            }),
        }
    }
}

fn validate_url(url: &str) -> Result<()> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e| ChatError::Construction(format!("invalid url {:?}: {}", url, e)))?;
    match uri.scheme_str() {
        Some("ws") | Some("wss") if uri.host().is_some() => Ok(()),
        _ => Err(ChatError::Construction(format!(
            "url must be a ws:// or wss:// address, got {:?}",
            url
        ))),
    }
}

enum Installed {
    Yes,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconnectTrigger {
    /// Read failure; honours the auto-reconnect flag.
    ConnectionLost,
    /// Server REFRESH or [`Session::reconnect_now`]; only `close()` stops it.
    Refresh,
}

/// Outcome of asking to reconnect a given generation.
enum Claim {
    Start,
    Running,
    Stale,
}

impl Session {
    /// A receive-only session against the default chat server.
    pub fn read_only() -> Self {
        SessionBuilder::new().assemble()
    }

    /// A credentialed session against the default chat server.
    pub fn new(login_key: impl Into<String>) -> Result<Self> {
        SessionBuilder::new().login_key(login_key).build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.login_key.is_none()
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.handlers
    }

    /// Users currently in the room.
    pub fn users(&self) -> Vec<User> {
        self.inner.membership.snapshot()
    }

    /// Looks up a present user by nick, ignoring case.
    pub fn user(&self, nick: &str) -> Option<User> {
        self.inner.membership.lookup(nick)
    }

    pub fn connection_count(&self) -> u64 {
        self.inner.membership.connection_count()
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.link.lock().await.state
    }

    pub async fn is_open(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    pub async fn url(&self) -> String {
        self.inner.link.lock().await.url.clone()
    }

    /// Changes the server address. Takes effect on the next dial.
    pub async fn set_url(&self, url: impl Into<String>) -> Result<()> {
        let url = url.into();
        validate_url(&url)?;
        self.inner.link.lock().await.url = url;
        Ok(())
    }

    /// Changes the `Origin` header. Takes effect on the next dial.
    pub async fn set_origin(&self, origin: impl Into<String>) -> Result<()> {
        let origin = origin.into();
        handshake_headers(&origin, None)?;
        self.inner.link.lock().await.origin = origin;
        Ok(())
    }

    pub async fn set_auto_reconnect(&self, enabled: bool) {
        self.inner.link.lock().await.auto_reconnect = enabled;
    }

    /// Connects to the server and starts dispatching frames.
    ///
    /// Returns once the handshake completes. A failed dial leaves the
    /// session closed; the initial open is never retried.
    pub async fn open(&self) -> Result<()> {
        let (generation, url, headers) = {
            let mut link = self.inner.link.lock().await;
            if link.state != ConnectionState::Closed {
                return Err(ChatError::AlreadyOpen);
            }
            let (url, headers) = link.dial_target(self.inner.login_key.as_deref())?;
            link.generation += 1;
            link.state = ConnectionState::Opening;
            (link.generation, url, headers)
        };

        info!("Connecting to chat at {}", url);
        match self.inner.transport.dial(&url, &headers).await {
            Ok(connection) => match self.install(generation, connection).await {
                Installed::Yes => {
                    info!("Connected to chat at {}", url);
                    Ok(())
                }
                Installed::Superseded => Err(ChatError::Connection(
                    "session was closed while connecting".to_string(),
                )),
            },
            Err(err) => {
                let mut link = self.inner.link.lock().await;
                if link.generation == generation {
                    link.state = ConnectionState::Closed;
                }
                warn!("Failed to connect to chat at {}: {}", url, err);
                Err(err)
            }
        }
    }

    /// Closes the connection and disables automatic reconnection.
    ///
    /// Safe to call repeatedly or when nothing is open.
    pub async fn close(&self) -> Result<()> {
        let sink = {
            let mut link = self.inner.link.lock().await;
            link.auto_reconnect = false;
            link.state = ConnectionState::Closed;
            link.retire()
        };
        self.inner.refresh.notify_waiters();

        match sink {
            Some(mut sink) => {
                info!("Closing chat connection");
                sink.close().await
            }
            None => Ok(()),
        }
    }

    /// Sends a command. Fails fast when read-only or not connected.
    pub async fn send(&self, command: &Command) -> Result<()> {
        if self.is_read_only() {
            return Err(ChatError::ReadOnly);
        }
        let frame = command.encode()?;

        let mut link = self.inner.link.lock().await;
        let sink = link.sink.as_mut().ok_or(ChatError::NotConnected)?;
        debug!("Sending {} frame", command.tag());
        sink.write_frame(frame).await
    }

    pub async fn send_message(&self, message: impl Into<String>) -> Result<()> {
        self.send(&Command::Message(message.into())).await
    }

    /// Sends a `/me` action.
    pub async fn send_action(&self, message: impl Into<String>) -> Result<()> {
        self.send(&Command::Action(message.into())).await
    }

    pub async fn send_private_message(
        &self,
        nick: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<()> {
        self.send(&Command::PrivateMessage {
            nick: nick.into(),
            message: message.into(),
        })
        .await
    }

    pub async fn send_mute(&self, nick: impl Into<String>, duration: Option<i64>) -> Result<()> {
        self.send(&Command::Mute {
            nick: nick.into(),
            duration,
        })
        .await
    }

    pub async fn send_unmute(&self, nick: impl Into<String>) -> Result<()> {
        self.send(&Command::Unmute { nick: nick.into() }).await
    }

    pub async fn send_ban(
        &self,
        nick: impl Into<String>,
        reason: impl Into<String>,
        duration: Option<i64>,
        ban_ip: bool,
    ) -> Result<()> {
        self.send(&Command::Ban {
            nick: nick.into(),
            reason: reason.into(),
            duration,
            ban_ip,
        })
        .await
    }

    pub async fn send_permanent_ban(
        &self,
        nick: impl Into<String>,
        reason: impl Into<String>,
        ban_ip: bool,
    ) -> Result<()> {
        self.send(&Command::PermanentBan {
            nick: nick.into(),
            reason: reason.into(),
            ban_ip,
        })
        .await
    }

    pub async fn send_unban(&self, nick: impl Into<String>) -> Result<()> {
        self.send(&Command::Unban { nick: nick.into() }).await
    }

    pub async fn send_sub_only(&self, active: bool) -> Result<()> {
        self.send(&Command::SubOnly(active)).await
    }

    pub async fn send_broadcast(&self, message: impl Into<String>) -> Result<()> {
        self.send(&Command::Broadcast(message.into())).await
    }

    /// Sends a ping stamped with the current time. The server echoes the
    /// timestamp back in a PONG.
    pub async fn send_ping(&self) -> Result<()> {
        self.send(&Command::Ping(Utc::now())).await
    }

    /// Makes `connection` the live one if `generation` is still current.
    async fn install(&self, generation: u64, connection: Connection) -> Installed {
        let Connection { mut sink, source } = connection;

        let mut link = self.inner.link.lock().await;
        if link.generation != generation || link.state == ConnectionState::Closed {
            drop(link);
            debug!("Discarding superseded connection {}", generation);
            if let Err(err) = sink.close().await {
                debug!("Closing superseded connection failed: {}", err);
            }
            return Installed::Superseded;
        }

        let cancel = CancellationToken::new();
        if let Some(previous) = link.cancel.replace(cancel.clone()) {
            previous.cancel();
        }
        link.sink = Some(sink);
        link.state = ConnectionState::Open;
        link.reconnect_owner = None;
        drop(link);

        dispatch::spawn(self.clone(), generation, source, cancel);
        Installed::Yes
    }

    async fn is_current(&self, generation: u64) -> bool {
        self.inner.link.lock().await.generation == generation
    }

    /// Handles a read failure on connection `generation`.
    async fn connection_lost(&self, generation: u64, err: ChatError) {
        let (sink, reconnect) = {
            let mut link = self.inner.link.lock().await;
            if link.generation != generation {
                debug!("Ignoring error from superseded connection {}: {}", generation, err);
                return;
            }
            link.cancel = None;
            link.state = if link.auto_reconnect {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Closed
            };
            (link.sink.take(), link.auto_reconnect)
        };
        if let Some(mut sink) = sink {
            if let Err(close_err) = sink.close().await {
                debug!("Closing dead connection failed: {}", close_err);
            }
        }

        warn!("Chat connection lost: {}", err);
        self.inner.handlers.socket_error(&err, self);

        if reconnect {
            self.reconnect(generation, ReconnectTrigger::ConnectionLost)
                .await;
        }
    }

    /// Drops the current connection and dials again right away, the same
    /// way a server REFRESH does. If a reconnect is already waiting out its
    /// backoff, the wait is cut short. Does nothing unless the session is
    /// open or reconnecting.
    ///
    /// The reconnect runs on its own task; this returns immediately.
    pub async fn reconnect_now(&self) {
        let generation = {
            let link = self.inner.link.lock().await;
            if !matches!(
                link.state,
                ConnectionState::Open | ConnectionState::Reconnecting
            ) {
                debug!("Ignoring reconnect request in state {:?}", link.state);
                return;
            }
            link.generation
        };
        let session = self.clone();
        tokio::spawn(async move {
            session
                .reconnect(generation, ReconnectTrigger::Refresh)
                .await;
        });
    }

    async fn claim_reconnect(&self, generation: u64) -> Claim {
        let mut link = self.inner.link.lock().await;
        if link.generation != generation {
            Claim::Stale
        } else if link.reconnect_owner == Some(generation) {
            Claim::Running
        } else {
            // Any other owner belongs to a superseded generation and will
            // stop on its next check.
            link.reconnect_owner = Some(generation);
            Claim::Start
        }
    }

    /// Replaces connection `from_generation` with a fresh one, retrying
    /// with backoff until it succeeds, the session is closed or a newer
    /// generation takes over.
    ///
    /// At most one sequence drives a given generation. A second request
    /// for the generation being reconnected only cuts its backoff short.
    async fn reconnect(&self, from_generation: u64, trigger: ReconnectTrigger) {
        match self.claim_reconnect(from_generation).await {
            Claim::Start => {}
            Claim::Running => {
                debug!("Reconnect already running, skipping its backoff");
                self.inner.refresh.notify_waiters();
                return;
            }
            Claim::Stale => {
                debug!("Ignoring reconnect for superseded connection {}", from_generation);
                return;
            }
        }

        let mut expected = from_generation;
        let mut backoff = self.inner.policy.backoff();
        loop {
            let attempt = {
                let mut link = self.inner.link.lock().await;
                if link.generation != expected || link.reconnect_owner != Some(expected) {
                    if link.reconnect_owner == Some(expected) {
                        link.reconnect_owner = None;
                    }
                    debug!("Connection generation moved on, stopping reconnect");
                    return;
                }
                if trigger == ReconnectTrigger::ConnectionLost && !link.auto_reconnect {
                    if link.state == ConnectionState::Reconnecting {
                        link.state = ConnectionState::Closed;
                    }
                    link.reconnect_owner = None;
                    info!("Automatic reconnect disabled, giving up");
                    return;
                }
                let old_sink = link.retire();
                link.state = ConnectionState::Reconnecting;
                expected = link.generation;
                link.reconnect_owner = Some(expected);
                link.dial_target(self.inner.login_key.as_deref())
                    .map(|(url, headers)| (url, headers, old_sink))
            };

            let result = match attempt {
                Ok((url, headers, old_sink)) => {
                    if let Some(mut sink) = old_sink {
                        if let Err(err) = sink.close().await {
                            debug!("Closing replaced connection failed: {}", err);
                        }
                    }
                    info!("Reconnecting to chat at {} (attempt {})", url, backoff.failures() + 1);
                    self.inner.transport.dial(&url, &headers).await
                }
                Err(err) => Err(err),
            };

            match result {
                Ok(connection) => {
                    if let Installed::Yes = self.install(expected, connection).await {
                        info!("Reconnected to chat");
                    }
                    return;
                }
                Err(err) => {
                    warn!("Reconnect failed: {}", err);
                    self.inner.handlers.socket_error(&err, self);

                    let delay = backoff.next_delay();
                    debug!("Next reconnect attempt in {:?}", delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.inner.refresh.notified() => {
                            debug!("Reconnect backoff interrupted");
                        }
                    }
                }
            }
        }
    }
}
