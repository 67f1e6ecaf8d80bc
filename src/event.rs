//! Typed room events.
//!
//! Incoming events are classified into a tagged variant with an explicit
//! `Unknown` arm instead of duck-typed field access, so new protocol event
//! shapes degrade into diagnostics rather than crashes. Classification never
//! fails: a malformed element becomes `Unknown` carrying the raw JSON.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// One event delivered to the router, in server order.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub room_id: String,
    pub sender: Option<String>,
    pub event_id: Option<String>,
    pub origin_ts: Option<DateTime<Utc>>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// `m.room.message` with `msgtype: m.text`.
    Message { body: String },
    /// `m.room.member` transitions.
    Membership {
        change: MembershipChange,
        displayname: Option<String>,
    },
    /// Room state and ephemeral signals (typing, read receipts, name, topic).
    State { payload: StatePayload },
    /// Anything the client does not understand, kept verbatim for the
    /// diagnostics sink.
    Unknown { raw: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MembershipChange {
    Join,
    Leave,
    Invite { invited: String },
    /// join -> join with a previous join membership is a profile change,
    /// not a new member.
    ProfileChange { new_displayname: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatePayload {
    Typing { user_ids: Vec<String> },
    Receipt,
    Name { name: String },
    Topic { topic: String },
    Other { event_type: String },
}

/// Classify one raw room event (timeline, state or ephemeral).
pub fn classify(room_id: &str, raw: Value) -> Event {
    let sender = string_field(&raw, "sender");
    let event_id = string_field(&raw, "event_id");
    let origin_ts = raw
        .get("origin_server_ts")
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

    let kind = classify_kind(&raw);

    Event {
        room_id: room_id.to_owned(),
        sender,
        event_id,
        origin_ts,
        kind,
    }
}

fn classify_kind(raw: &Value) -> EventKind {
    // Redactions strip the content; nothing sensible to display.
    if raw.get("redacted_because").is_some()
        || raw
            .get("unsigned")
            .and_then(|u| u.get("redacted_because"))
            .is_some()
    {
        return unknown(raw);
    }

    let Some(event_type) = raw.get("type").and_then(Value::as_str) else {
        return unknown(raw);
    };

    match event_type {
        "m.room.message" => classify_message(raw),
        "m.room.member" => classify_membership(raw),
        "m.typing" => EventKind::State {
            payload: StatePayload::Typing {
                user_ids: raw
                    .get("content")
                    .and_then(|c| c.get("user_ids"))
                    .and_then(Value::as_array)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_owned)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        },
        "m.receipt" => EventKind::State {
            payload: StatePayload::Receipt,
        },
        "m.room.name" => match raw
            .get("content")
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
        {
            Some(name) => EventKind::State {
                payload: StatePayload::Name {
                    name: name.to_owned(),
                },
            },
            None => unknown(raw),
        },
        "m.room.topic" => match raw
            .get("content")
            .and_then(|c| c.get("topic"))
            .and_then(Value::as_str)
        {
            Some(topic) => EventKind::State {
                payload: StatePayload::Topic {
                    topic: topic.to_owned(),
                },
            },
            None => unknown(raw),
        },
        // State events carry a state_key; everything else is unknown.
        other if raw.get("state_key").is_some() => EventKind::State {
            payload: StatePayload::Other {
                event_type: other.to_owned(),
            },
        },
        _ => unknown(raw),
    }
}

fn classify_message(raw: &Value) -> EventKind {
    let content = raw.get("content");
    let msgtype = content
        .and_then(|c| c.get("msgtype"))
        .and_then(Value::as_str);
    let body = content.and_then(|c| c.get("body")).and_then(Value::as_str);

    match (msgtype, body) {
        (Some("m.text"), Some(body)) => EventKind::Message {
            body: body.to_owned(),
        },
        // Images, notices, emotes and friends are out of scope.
        _ => unknown(raw),
    }
}

fn classify_membership(raw: &Value) -> EventKind {
    let content = raw.get("content");
    let membership = content
        .and_then(|c| c.get("membership"))
        .and_then(Value::as_str);
    let displayname = content
        .and_then(|c| c.get("displayname"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    let change = match membership {
        Some("join") => {
            if previous_membership(raw) == Some("join") {
                MembershipChange::ProfileChange {
                    new_displayname: displayname.clone(),
                }
            } else {
                MembershipChange::Join
            }
        }
        Some("leave") | Some("ban") => MembershipChange::Leave,
        Some("invite") => MembershipChange::Invite {
            invited: string_field(raw, "state_key").unwrap_or_default(),
        },
        _ => return unknown(raw),
    };

    EventKind::Membership {
        change,
        displayname,
    }
}

fn previous_membership(raw: &Value) -> Option<&str> {
    raw.get("unsigned")
        .and_then(|u| u.get("prev_content"))
        .and_then(|p| p.get("membership"))
        .and_then(Value::as_str)
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn unknown(raw: &Value) -> EventKind {
    EventKind::Unknown { raw: raw.clone() }
}
