//! Server frames used across tests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

pub const TS: i64 = 1_700_000_000_000;

fn user_frame(tag: &str, nick: &str, features: &[&str], extra: serde_json::Value) -> String {
    let mut payload = json!({
        "nick": nick,
        "features": features,
        "timestamp": TS,
    });
    if let (Some(map), Some(extra)) = (payload.as_object_mut(), extra.as_object()) {
        map.extend(extra.clone());
    }
    format!("{} {}", tag, payload)
}

/// A user entry as it appears in a NAMES listing.
pub fn user(nick: &str, features: &[&str]) -> serde_json::Value {
    json!({ "nick": nick, "features": features })
}

pub fn names(users: &[serde_json::Value], connection_count: u64) -> String {
    format!(
        "NAMES {}",
        json!({"connectioncount": connection_count, "users": users})
    )
}

pub fn join(nick: &str) -> String {
    user_frame("JOIN", nick, &[], json!({}))
}

pub fn quit(nick: &str) -> String {
    user_frame("QUIT", nick, &[], json!({}))
}

pub fn msg(nick: &str, text: &str) -> String {
    user_frame("MSG", nick, &[], json!({ "data": text }))
}

pub fn private_message(nick: &str, text: &str, id: i64) -> String {
    user_frame("PRIVMSG", nick, &[], json!({ "data": text, "messageid": id }))
}

pub fn mute(moderator: &str, target: &str) -> String {
    user_frame("MUTE", moderator, &["moderator"], json!({ "data": target }))
}

/// A PONG echoing `millis`, encoded the way the server does it.
pub fn pong(millis: i64) -> String {
    let body = json!({ "timestamp": millis }).to_string();
    format!("PONG \"{}\"", STANDARD.encode(body))
}
