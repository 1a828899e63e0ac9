//! Payload decoders.
//!
//! Each decoder turns the payload text of one frame type into a typed
//! event. Decoders are pure: the only state they consult is a read-only
//! [`UserLookup`] for the frame types that enrich users from membership.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::DecodeError;
use crate::events::*;
use crate::frame::InboundTag;
use crate::membership::UserLookup;

/// Converts a server epoch-millisecond timestamp.
pub fn millis_to_time(millis: i64) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::from_timestamp_millis(millis).ok_or(DecodeError::Timestamp(millis))
}

/// The generic payload shared by MSG, PIN, MUTE, BAN, SUBONLY, JOIN and
/// QUIT: the acting user's fields flattened next to the data.
#[derive(Debug, Deserialize)]
struct UserMessage {
    #[serde(flatten)]
    user: User,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    data: String,
    #[serde(default)]
    uuid: String,
}

/// Broadcasts may be sent by the system with no acting user.
#[derive(Debug, Deserialize)]
struct BroadcastPayload {
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    features: Option<Vec<String>>,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct NamesPayload {
    #[serde(default, rename = "connectioncount")]
    connection_count: u64,
    #[serde(default)]
    users: Option<Vec<User>>,
}

#[derive(Debug, Deserialize)]
struct PrivateMessagePayload {
    #[serde(default, rename = "messageid")]
    message_id: i64,
    #[serde(default)]
    timestamp: i64,
    nick: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionPayload {
    user: User,
    #[serde(default)]
    recipient: Option<User>,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    data: String,
    #[serde(default)]
    tier: i64,
    #[serde(default, rename = "tierlabel")]
    tier_label: String,
    #[serde(default)]
    quantity: i64,
    #[serde(default)]
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct DonationPayload {
    user: User,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    data: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct PingPayload {
    timestamp: i64,
}

fn parse_user_message(payload: &str) -> Result<(UserMessage, DateTime<Utc>), DecodeError> {
    let m: UserMessage = serde_json::from_str(payload)?;
    let timestamp = millis_to_time(m.timestamp)?;
    Ok((m, timestamp))
}

/// Resolves the target of a moderation action against membership.
fn resolve_target(nick: &str, lookup: &impl UserLookup) -> Target {
    match lookup.lookup(nick) {
        Some(user) => Target { user, online: true },
        None => Target {
            user: User::with_nick(nick),
            online: false,
        },
    }
}

pub fn decode_message(payload: &str) -> Result<Message, DecodeError> {
    let (m, timestamp) = parse_user_message(payload)?;
    Ok(Message {
        sender: m.user,
        timestamp,
        message: m.data,
    })
}

pub fn decode_pin(payload: &str) -> Result<Pin, DecodeError> {
    let (m, timestamp) = parse_user_message(payload)?;
    Ok(Pin {
        sender: m.user,
        timestamp,
        message: m.data,
        uuid: m.uuid,
    })
}

pub fn decode_broadcast(payload: &str) -> Result<Broadcast, DecodeError> {
    let b: BroadcastPayload = serde_json::from_str(payload)?;
    Ok(Broadcast {
        sender: User {
            features: b.features.unwrap_or_default(),
            ..User::with_nick(b.nick.unwrap_or_default())
        },
        timestamp: millis_to_time(b.timestamp)?,
        message: b.data,
    })
}

/// MUTE and UNMUTE carry the target nick in `data`.
pub fn decode_mute(payload: &str, lookup: &impl UserLookup) -> Result<Mute, DecodeError> {
    let (m, timestamp) = parse_user_message(payload)?;
    Ok(Mute {
        target: resolve_target(&m.data, lookup),
        sender: m.user,
        timestamp,
    })
}

/// BAN and UNBAN carry the target nick in `data`.
pub fn decode_ban(payload: &str, lookup: &impl UserLookup) -> Result<Ban, DecodeError> {
    let (m, timestamp) = parse_user_message(payload)?;
    Ok(Ban {
        target: resolve_target(&m.data, lookup),
        sender: m.user,
        timestamp,
    })
}

pub fn decode_names(payload: &str) -> Result<Names, DecodeError> {
    let n: NamesPayload = serde_json::from_str(payload)?;
    Ok(Names {
        connection_count: n.connection_count,
        users: n.users.unwrap_or_default(),
    })
}

pub fn decode_room_action(payload: &str) -> Result<RoomAction, DecodeError> {
    let (m, timestamp) = parse_user_message(payload)?;
    Ok(RoomAction {
        user: m.user,
        timestamp,
    })
}

pub fn decode_user_update(payload: &str) -> Result<User, DecodeError> {
    Ok(serde_json::from_str(payload)?)
}

/// The sender is taken from membership when present, so handlers see its
/// features.
pub fn decode_private_message(
    payload: &str,
    lookup: &impl UserLookup,
) -> Result<PrivateMessage, DecodeError> {
    let pm: PrivateMessagePayload = serde_json::from_str(payload)?;
    let timestamp = millis_to_time(pm.timestamp)?;
    let sender = lookup
        .lookup(&pm.nick)
        .unwrap_or_else(|| User::with_nick(pm.nick));

    Ok(PrivateMessage {
        sender,
        message: pm.data,
        timestamp,
        id: pm.message_id,
    })
}

pub fn decode_subscription(payload: &str) -> Result<Subscription, DecodeError> {
    let sub: SubscriptionPayload = serde_json::from_str(payload)?;
    let timestamp = millis_to_time(sub.timestamp)?;
    let recipient = match sub.recipient {
        Some(recipient) if !recipient.nick.is_empty() => recipient,
        _ => sub.user.clone(),
    };

    Ok(Subscription {
        sender: sub.user,
        recipient,
        timestamp,
        message: sub.data,
        tier: SubTier {
            tier: sub.tier,
            label: sub.tier_label,
        },
        quantity: sub.quantity,
        uuid: sub.uuid,
    })
}

pub fn decode_donation(payload: &str) -> Result<Donation, DecodeError> {
    let dono: DonationPayload = serde_json::from_str(payload)?;
    Ok(Donation {
        timestamp: millis_to_time(dono.timestamp)?,
        sender: dono.user,
        message: dono.data,
        amount: dono.amount,
        uuid: dono.uuid,
    })
}

/// The backend only ever sends "on" and "off".
pub fn decode_sub_only(payload: &str) -> Result<SubOnly, DecodeError> {
    let (m, timestamp) = parse_user_message(payload)?;
    Ok(SubOnly {
        active: m.data == "on",
        sender: m.user,
        timestamp,
    })
}

/// PONG payloads are a quoted, base64-encoded `{"timestamp": ms}` document.
pub fn decode_pong(payload: &str) -> Result<Ping, DecodeError> {
    let encoded = strip_quotes(payload);
    let decoded = STANDARD.decode(encoded.trim())?;
    let text = std::str::from_utf8(&decoded).map_err(|_| DecodeError::Utf8)?;
    let p: PingPayload = serde_json::from_str(text)?;
    Ok(Ping {
        timestamp: millis_to_time(p.timestamp)?,
    })
}

/// ERR payloads are a bare quoted string.
pub fn decode_error_notice(payload: &str) -> ErrorNotice {
    ErrorNotice {
        code: strip_quotes(payload),
    }
}

fn strip_quotes(payload: &str) -> String {
    payload.replace('"', "")
}

/// Decodes the payload of a recognized tag.
///
/// Returns `Ok(None)` for tags that carry no event (PING, PRIVMSGSENT,
/// REFRESH).
pub fn decode_frame(
    tag: InboundTag,
    payload: &str,
    lookup: &impl UserLookup,
) -> Result<Option<Event>, DecodeError> {
    let event = match tag {
        InboundTag::Msg => Event::Message(decode_message(payload)?),
        InboundTag::Pin => Event::Pin(decode_pin(payload)?),
        InboundTag::Mute => Event::Mute(decode_mute(payload, lookup)?),
        InboundTag::Unmute => Event::Unmute(decode_mute(payload, lookup)?),
        InboundTag::Ban => Event::Ban(decode_ban(payload, lookup)?),
        InboundTag::Unban => Event::Unban(decode_ban(payload, lookup)?),
        InboundTag::SubOnly => Event::SubOnly(decode_sub_only(payload)?),
        InboundTag::Broadcast => Event::Broadcast(decode_broadcast(payload)?),
        InboundTag::PrivMsg => Event::PrivateMessage(decode_private_message(payload, lookup)?),
        InboundTag::Pong => Event::Pong(decode_pong(payload)?),
        InboundTag::Error => Event::Error(decode_error_notice(payload)),
        InboundTag::Names => Event::Names(decode_names(payload)?),
        InboundTag::Join => Event::Join(decode_room_action(payload)?),
        InboundTag::Quit => Event::Quit(decode_room_action(payload)?),
        InboundTag::UserUpdate => Event::UserUpdate(decode_user_update(payload)?),
        InboundTag::Subscription | InboundTag::GiftSub | InboundTag::MassGift => {
            Event::Subscription(decode_subscription(payload)?)
        }
        InboundTag::Donation => Event::Donation(decode_donation(payload)?),
        // PRIVMSGSENT only confirms delivery; failures arrive as ERR.
        InboundTag::PrivMsgSent | InboundTag::Ping | InboundTag::Refresh => return Ok(None),
    };
    Ok(Some(event))
}
