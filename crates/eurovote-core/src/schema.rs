//! Row types of the hosted Postgres schema, as delivered by REST and realtime.
//!
//! Only `messages` is consumed by the unread tracker; the rest describe the
//! data contract the other views read.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{GroupId, MessageEvent, UserId};

pub const PUBLIC_SCHEMA: &str = "public";

pub mod tables {
    pub const COUNTRIES: &str = "countries";
    pub const GROUPS: &str = "groups";
    pub const MESSAGES: &str = "messages";
    pub const NOTES: &str = "notes";
    pub const USERS: &str = "users";
    pub const VOTES: &str = "votes";
}

/// Postgres functions exposed over RPC.
pub mod rpc {
    pub const GENERATE_INVITE_CODE: &str = "generate_invite_code";
    pub const GET_USER_GROUP_ID: &str = "get_user_group_id";
    pub const JOIN_GROUP_WITH_INVITE_CODE: &str = "join_group_with_invite_code";
    pub const SAME_GROUP_AS_AUTH_USER: &str = "same_group_as_auth_user";
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_image: Option<bool>,
    #[serde(default)]
    pub sender_id: Option<String>,
}

impl MessageRow {
    /// Project to the fields the tracker inspects. Rows without a group or
    /// sender cannot belong to anyone's chat and yield `None`.
    pub fn to_event(&self) -> Option<MessageEvent> {
        MessageRecord {
            group_id: self.group_id.clone(),
            sender_id: self.sender_id.clone(),
            created_at: self.created_at.clone(),
        }
        .to_event()
    }
}

/// The subset of a `messages` record the tracker reads. Every other column is
/// ignored, so records with oversized columns left out still decode.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl MessageRecord {
    pub fn to_event(&self) -> Option<MessageEvent> {
        Some(MessageEvent {
            group_id: GroupId(self.group_id.clone()?),
            sender_id: UserId(self.sender_id.clone()?),
            inserted_at: self.created_at.as_deref().and_then(parse_timestamp),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: String,
    pub invite_code: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountryRow {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    #[serde(rename = "final")]
    pub is_final: Option<bool>,
    #[serde(default)]
    pub final_running_order: Option<i32>,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub semi_final: Option<i32>,
    #[serde(default)]
    pub semi_running_order: Option<i32>,
    #[serde(default)]
    pub song_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteRow {
    pub country_id: i64,
    pub group_id: String,
    pub user_id: String,
    pub is_final: bool,
    #[serde(default)]
    pub performance: Option<i32>,
    #[serde(default)]
    pub song: Option<i32>,
    #[serde(default)]
    pub vocals: Option<i32>,
    #[serde(default)]
    pub total_score: Option<i32>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteRow {
    pub country_id: i64,
    pub group_id: String,
    pub user_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Accepts both `timestamptz` (RFC 3339) and bare `timestamp` text, the latter
/// taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Postgres renders `+00` offsets without minutes.
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
