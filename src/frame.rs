//! Wire framing: `<TAG> <payload>`.

use std::fmt;
use std::str::FromStr;

use crate::error::ChatError;

/// A raw frame split into its type tag and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub tag: &'a str,
    pub payload: &'a str,
}

impl<'a> Frame<'a> {
    /// Splits a frame at the first whitespace character.
    ///
    /// A frame without a separator is a protocol error and gets dropped by
    /// the dispatcher.
    pub fn parse(raw: &'a str) -> Result<Self, ChatError> {
        raw.split_once(char::is_whitespace)
            .map(|(tag, payload)| Frame { tag, payload })
            .ok_or_else(|| ChatError::Protocol(format!("missing tag separator in {:?}", raw)))
    }
}

/// Frame tags the server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundTag {
    Msg,
    Pin,
    Mute,
    Unmute,
    Ban,
    Unban,
    SubOnly,
    Broadcast,
    PrivMsg,
    PrivMsgSent,
    Ping,
    Pong,
    Error,
    Names,
    Join,
    Quit,
    UserUpdate,
    Subscription,
    GiftSub,
    MassGift,
    Donation,
    Refresh,
}

impl FromStr for InboundTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Ok(match s {
            "MSG" => InboundTag::Msg,
            "PIN" => InboundTag::Pin,
            "MUTE" => InboundTag::Mute,
            "UNMUTE" => InboundTag::Unmute,
            "BAN" => InboundTag::Ban,
            "UNBAN" => InboundTag::Unban,
            "SUBONLY" => InboundTag::SubOnly,
            "BROADCAST" => InboundTag::Broadcast,
            "PRIVMSG" => InboundTag::PrivMsg,
            "PRIVMSGSENT" => InboundTag::PrivMsgSent,
            "PING" => InboundTag::Ping,
            "PONG" => InboundTag::Pong,
            "ERR" => InboundTag::Error,
            "NAMES" => InboundTag::Names,
            "JOIN" => InboundTag::Join,
            "QUIT" => InboundTag::Quit,
            "USERUPDATE" => InboundTag::UserUpdate,
            "SUBSCRIPTION" => InboundTag::Subscription,
            "GIFTSUB" => InboundTag::GiftSub,
            "MASSGIFT" => InboundTag::MassGift,
            "DONATION" => InboundTag::Donation,
            "REFRESH" => InboundTag::Refresh,
            _ => return Err(()),
        })
    }
}

/// Frame tags the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundTag {
    Msg,
    Mute,
    Unmute,
    Ban,
    Unban,
    PrivMsg,
    SubOnly,
    Broadcast,
    Ping,
}

impl OutboundTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundTag::Msg => "MSG",
            OutboundTag::Mute => "MUTE",
            OutboundTag::Unmute => "UNMUTE",
            OutboundTag::Ban => "BAN",
            OutboundTag::Unban => "UNBAN",
            OutboundTag::PrivMsg => "PRIVMSG",
            OutboundTag::SubOnly => "SUBONLY",
            OutboundTag::Broadcast => "BROADCAST",
            OutboundTag::Ping => "PING",
        }
    }
}

impl fmt::Display for OutboundTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
