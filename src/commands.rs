//! Outbound commands and their wire encoding.
//!
//! A command is serialized as `<TAG> <json>`. Sending is done through
//! [`crate::Session::send`] or the `send_*` convenience methods.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::frame::OutboundTag;

/// Commands the client can send to the chat server.
///
/// Mute and ban durations are passed through untouched. The service does
/// not document their unit, so callers must pick the value the server they
/// talk to expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Message(String),
    /// A `/me` action; encoded as a message with the prefix added.
    Action(String),
    PrivateMessage {
        nick: String,
        message: String,
    },
    Mute {
        nick: String,
        duration: Option<i64>,
    },
    Unmute {
        nick: String,
    },
    Ban {
        nick: String,
        reason: String,
        duration: Option<i64>,
        ban_ip: bool,
    },
    PermanentBan {
        nick: String,
        reason: String,
        ban_ip: bool,
    },
    Unban {
        nick: String,
    },
    SubOnly(bool),
    Broadcast(String),
    Ping(DateTime<Utc>),
}

#[derive(Serialize)]
struct DataOut<'a> {
    data: &'a str,
}

#[derive(Serialize)]
struct PrivateMessageOut<'a> {
    nick: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct MuteOut<'a> {
    data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<i64>,
}

#[derive(Serialize)]
struct BanOut<'a> {
    nick: &'a str,
    reason: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<i64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    banip: bool,
    ispermanent: bool,
}

#[derive(Serialize)]
struct PingOut {
    timestamp: i64,
}

impl Command {
    pub fn tag(&self) -> OutboundTag {
        match self {
            Command::Message(_) | Command::Action(_) => OutboundTag::Msg,
            Command::PrivateMessage { .. } => OutboundTag::PrivMsg,
            Command::Mute { .. } => OutboundTag::Mute,
            Command::Unmute { .. } => OutboundTag::Unmute,
            Command::Ban { .. } | Command::PermanentBan { .. } => OutboundTag::Ban,
            Command::Unban { .. } => OutboundTag::Unban,
            Command::SubOnly(_) => OutboundTag::SubOnly,
            Command::Broadcast(_) => OutboundTag::Broadcast,
            Command::Ping(_) => OutboundTag::Ping,
        }
    }

    /// Serializes the command payload.
    pub fn payload(&self) -> Result<String> {
        let json = match self {
            Command::Message(text) | Command::Broadcast(text) => {
                serde_json::to_string(&DataOut { data: text })?
            }
            Command::Action(text) => serde_json::to_string(&DataOut {
                data: &format!("/me {}", text),
            })?,
            Command::PrivateMessage { nick, message } => {
                serde_json::to_string(&PrivateMessageOut {
                    nick,
                    data: message,
                })?
            }
            Command::Mute { nick, duration } => serde_json::to_string(&MuteOut {
                data: nick,
                duration: *duration,
            })?,
            Command::Unmute { nick } | Command::Unban { nick } => {
                serde_json::to_string(&DataOut { data: nick })?
            }
            Command::Ban {
                nick,
                reason,
                duration,
                ban_ip,
            } => serde_json::to_string(&BanOut {
                nick,
                reason,
                duration: *duration,
                banip: *ban_ip,
                ispermanent: false,
            })?,
            Command::PermanentBan {
                nick,
                reason,
                ban_ip,
            } => serde_json::to_string(&BanOut {
                nick,
                reason,
                duration: None,
                banip: *ban_ip,
                ispermanent: true,
            })?,
            Command::SubOnly(active) => serde_json::to_string(&DataOut {
                data: if *active { "on" } else { "off" },
            })?,
            Command::Ping(at) => serde_json::to_string(&PingOut {
                timestamp: at.timestamp_millis(),
            })?,
        };
        Ok(json)
    }

    /// Builds the complete frame, `<TAG> <payload>`.
    pub fn encode(&self) -> Result<String> {
        Ok(format!("{} {}", self.tag(), self.payload()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn split(frame: &str) -> (String, Value) {
        let (tag, payload) = frame.split_once(' ').unwrap();
        (tag.to_string(), serde_json::from_str(payload).unwrap())
    }

    #[test]
    fn message_frame() {
        let frame = Command::Message("hello world".to_string()).encode().unwrap();
        assert_eq!(frame, r#"MSG {"data":"hello world"}"#);
    }

    #[test]
    fn action_adds_me_prefix() {
        let (tag, payload) = split(&Command::Action("waves".to_string()).encode().unwrap());
        assert_eq!(tag, "MSG");
        assert_eq!(payload, json!({"data": "/me waves"}));
    }

    #[test]
    fn private_message_frame() {
        let (tag, payload) = split(
            &Command::PrivateMessage {
                nick: "Bob".to_string(),
                message: "hi".to_string(),
            }
            .encode()
            .unwrap(),
        );
        assert_eq!(tag, "PRIVMSG");
        assert_eq!(payload, json!({"nick": "Bob", "data": "hi"}));
    }

    #[test]
    fn mute_duration_is_optional() {
        let (tag, payload) = split(
            &Command::Mute {
                nick: "Bob".to_string(),
                duration: None,
            }
            .encode()
            .unwrap(),
        );
        assert_eq!(tag, "MUTE");
        assert_eq!(payload, json!({"data": "Bob"}));

        let (_, payload) = split(
            &Command::Mute {
                nick: "Bob".to_string(),
                duration: Some(600),
            }
            .encode()
            .unwrap(),
        );
        assert_eq!(payload, json!({"data": "Bob", "duration": 600}));
    }

    #[test]
    fn ban_frame() {
        let (tag, payload) = split(
            &Command::Ban {
                nick: "Troll".to_string(),
                reason: "spam".to_string(),
                duration: Some(3600),
                ban_ip: true,
            }
            .encode()
            .unwrap(),
        );
        assert_eq!(tag, "BAN");
        assert_eq!(
            payload,
            json!({"nick": "Troll", "reason": "spam", "duration": 3600, "banip": true, "ispermanent": false})
        );
    }

    #[test]
    fn permanent_ban_omits_duration() {
        let (tag, payload) = split(
            &Command::PermanentBan {
                nick: "Troll".to_string(),
                reason: "spam".to_string(),
                ban_ip: false,
            }
            .encode()
            .unwrap(),
        );
        assert_eq!(tag, "BAN");
        assert_eq!(
            payload,
            json!({"nick": "Troll", "reason": "spam", "ispermanent": true})
        );
    }

    #[test]
    fn unmute_and_unban_carry_nick_in_data() {
        let unmute = Command::Unmute {
            nick: "Bob".to_string(),
        };
        let unban = Command::Unban {
            nick: "Bob".to_string(),
        };
        assert_eq!(unmute.encode().unwrap(), r#"UNMUTE {"data":"Bob"}"#);
        assert_eq!(unban.encode().unwrap(), r#"UNBAN {"data":"Bob"}"#);
    }

    #[test]
    fn sub_only_on_off() {
        assert_eq!(
            Command::SubOnly(true).encode().unwrap(),
            r#"SUBONLY {"data":"on"}"#
        );
        assert_eq!(
            Command::SubOnly(false).encode().unwrap(),
            r#"SUBONLY {"data":"off"}"#
        );
    }

    #[test]
    fn broadcast_frame() {
        assert_eq!(
            Command::Broadcast("live".to_string()).encode().unwrap(),
            r#"BROADCAST {"data":"live"}"#
        );
    }

    #[test]
    fn ping_keeps_millisecond_precision() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(
            Command::Ping(at).encode().unwrap(),
            r#"PING {"timestamp":1700000000123}"#
        );
    }
}
