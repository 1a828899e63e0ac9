//! Typed chat events and the user model.
//!
//! These are the values handed to handlers after a frame has been decoded.
//! Wire-level payload shapes live in [`crate::decode`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Well-known feature tags a user can carry.
pub mod features {
    pub const SUBSCRIBER: &str = "subscriber";
    pub const BOT: &str = "bot";
    pub const PROTECTED: &str = "protected";
    pub const VIP: &str = "vip";
    pub const MODERATOR: &str = "moderator";
    pub const ADMINISTRATOR: &str = "admin";
    pub const TIER_2: &str = "flair1";
    pub const NOTABLE: &str = "flair2";
    pub const TIER_3: &str = "flair3";
    pub const TRUSTED: &str = "flair4";
    pub const CONTRIBUTOR: &str = "flair5";
    pub const COMP_CHALLENGE: &str = "flair6";
    pub const EVE: &str = "flair7";
    pub const TIER_4: &str = "flair8";
    pub const TWITCH: &str = "flair9";
    pub const SC2: &str = "flair10";
    pub const BOT_2: &str = "flair11";
    pub const BROADCASTER: &str = "flair12";
    pub const TIER_1: &str = "flair13";
    pub const BIRTHDAY: &str = "flair15";
}

/// A chat user.
///
/// Only `nick` is guaranteed on the wire; the other fields are filled when
/// the frame carries them (the full NAMES listing does, JOIN/QUIT shorthand
/// may not).
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    pub nick: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub features: Vec<String>,
    #[serde(
        default,
        rename = "createdDate",
        deserialize_with = "lenient_created_date"
    )]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub watching: Option<Watching>,
}

impl User {
    /// A user known only by nick.
    pub fn with_nick(nick: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            ..Self::default()
        }
    }

    /// Returns true if the user has the given feature tag.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// Case-insensitive identity comparison.
    pub fn is_same_nick(&self, nick: &str) -> bool {
        self.nick.eq_ignore_ascii_case(nick) || self.nick.to_lowercase() == nick.to_lowercase()
    }
}

/// What a user is currently watching on the site.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Watching {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub id: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_created_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|v| v.as_str()).and_then(parse_created_date))
}

/// Parses the account creation date. The service has sent both RFC 3339 and
/// `+0000`-style offsets; anything else is treated as unknown.
pub(crate) fn parse_created_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// A regular chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: User,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Message {
    /// Returns true if the message was an action (`/me`).
    pub fn is_action(&self) -> bool {
        self.message.starts_with("/me ")
    }
}

/// A message pinned by a moderator.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub sender: User,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub uuid: String,
}

/// Snapshot of everyone in the room, sent right after connecting.
#[derive(Debug, Clone, PartialEq)]
pub struct Names {
    pub connection_count: u64,
    pub users: Vec<User>,
}

/// The user a moderation action was aimed at.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub user: User,
    /// Whether the target was in the room when targeted.
    pub online: bool,
}

impl Target {
    pub fn nick(&self) -> &str {
        &self.user.nick
    }

    pub fn features(&self) -> &[String] {
        &self.user.features
    }
}

/// A mute or unmute issued by a moderator.
#[derive(Debug, Clone, PartialEq)]
pub struct Mute {
    pub sender: User,
    pub timestamp: DateTime<Utc>,
    pub target: Target,
}

/// A ban or unban issued by a moderator.
#[derive(Debug, Clone, PartialEq)]
pub struct Ban {
    pub sender: User,
    pub timestamp: DateTime<Utc>,
    pub target: Target,
}

/// A user joining or leaving the room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomAction {
    pub user: User,
    pub timestamp: DateTime<Utc>,
}

/// A whisper addressed to the session's account.
#[derive(Debug, Clone, PartialEq)]
pub struct PrivateMessage {
    pub sender: User,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub id: i64,
}

/// A room-wide broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub sender: User,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubTier {
    pub tier: i64,
    pub label: String,
}

/// A regular, gifted or mass-gifted subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub sender: User,
    /// Equal to `sender` for a self-subscription.
    pub recipient: User,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub tier: SubTier,
    pub quantity: i64,
    pub uuid: String,
}

impl Subscription {
    pub fn is_gift(&self) -> bool {
        !self.sender.is_same_nick(&self.recipient.nick)
    }

    pub fn is_mass_gift(&self) -> bool {
        self.quantity > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Donation {
    pub sender: User,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Amount in the smallest currency unit, as sent by the service.
    pub amount: i64,
    pub uuid: String,
}

/// A pong echoed back by the server for one of our pings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub timestamp: DateTime<Utc>,
}

/// Sub-only mode toggled by a moderator.
#[derive(Debug, Clone, PartialEq)]
pub struct SubOnly {
    pub sender: User,
    pub timestamp: DateTime<Utc>,
    pub active: bool,
}

/// Known error codes the chat server reports through ERR frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    TooManyConnections,
    Protocol,
    NeedLogin,
    NoPermission,
    InvalidMessage,
    Muted,
    SubMode,
    Throttled,
    Duplicate,
    NotFound,
    NeedBanReason,
    Other(String),
}

impl ErrorKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "toomanyconnections" => ErrorKind::TooManyConnections,
            "protocolerror" => ErrorKind::Protocol,
            "needlogin" => ErrorKind::NeedLogin,
            "nopermission" => ErrorKind::NoPermission,
            "invalidmsg" => ErrorKind::InvalidMessage,
            "muted" => ErrorKind::Muted,
            "submode" => ErrorKind::SubMode,
            "throttled" => ErrorKind::Throttled,
            "duplicate" => ErrorKind::Duplicate,
            "notfound" => ErrorKind::NotFound,
            "needbanreason" => ErrorKind::NeedBanReason,
            other => ErrorKind::Other(other.to_string()),
        }
    }
}

/// An ERR frame. The code is opaque; use [`ErrorNotice::kind`] to match it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub code: String,
}

impl ErrorNotice {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(&self.code)
    }
}

/// Every event the dispatcher can deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(Message),
    Pin(Pin),
    Names(Names),
    Mute(Mute),
    Unmute(Mute),
    Ban(Ban),
    Unban(Ban),
    Join(RoomAction),
    Quit(RoomAction),
    UserUpdate(User),
    PrivateMessage(PrivateMessage),
    Broadcast(Broadcast),
    Subscription(Subscription),
    Donation(Donation),
    Pong(Ping),
    SubOnly(SubOnly),
    Error(ErrorNotice),
}

/// Discriminant of [`Event`], handy for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Pin,
    Names,
    Mute,
    Unmute,
    Ban,
    Unban,
    Join,
    Quit,
    UserUpdate,
    PrivateMessage,
    Broadcast,
    Subscription,
    Donation,
    Pong,
    SubOnly,
    Error,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Message(_) => EventKind::Message,
            Event::Pin(_) => EventKind::Pin,
            Event::Names(_) => EventKind::Names,
            Event::Mute(_) => EventKind::Mute,
            Event::Unmute(_) => EventKind::Unmute,
            Event::Ban(_) => EventKind::Ban,
            Event::Unban(_) => EventKind::Unban,
            Event::Join(_) => EventKind::Join,
            Event::Quit(_) => EventKind::Quit,
            Event::UserUpdate(_) => EventKind::UserUpdate,
            Event::PrivateMessage(_) => EventKind::PrivateMessage,
            Event::Broadcast(_) => EventKind::Broadcast,
            Event::Subscription(_) => EventKind::Subscription,
            Event::Donation(_) => EventKind::Donation,
            Event::Pong(_) => EventKind::Pong,
            Event::SubOnly(_) => EventKind::SubOnly,
            Event::Error(_) => EventKind::Error,
        }
    }
}
