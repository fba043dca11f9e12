//! Change-feed vocabulary shared by the tracker and the realtime adapter.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{domain::MessageEvent, schema};

/// Row-level change kinds understood by the realtime service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    Any,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
            ChangeKind::Any => "*",
        }
    }

    /// Whether a change of kind `other` is covered by this filter kind.
    pub fn accepts(self, other: ChangeKind) -> bool {
        self == ChangeKind::Any || self == other
    }
}

/// What to subscribe to: one channel, one table, one kind of change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeFilter {
    pub channel: String,
    pub event: ChangeKind,
    pub schema: String,
    pub table: String,
}

impl ChangeFilter {
    /// Inserts into `public.messages`, the only feed the unread tracker needs.
    pub fn message_inserts(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            event: ChangeKind::Insert,
            schema: schema::PUBLIC_SCHEMA.to_string(),
            table: schema::tables::MESSAGES.to_string(),
        }
    }
}

/// Identifies a live subscription inside a feed implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Callback invoked once per delivered message insert, in delivery order.
///
/// Must not block: feeds call it inline from their read loop.
pub type MessageHandler = Arc<dyn Fn(MessageEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_accepts_every_kind() {
        assert!(ChangeKind::Any.accepts(ChangeKind::Delete));
        assert!(ChangeKind::Insert.accepts(ChangeKind::Insert));
        assert!(!ChangeKind::Insert.accepts(ChangeKind::Update));
    }

    #[test]
    fn kinds_use_wire_names() {
        assert_eq!(
            serde_json::to_value(ChangeKind::Insert).unwrap(),
            serde_json::json!("INSERT")
        );
        let any: ChangeKind = serde_json::from_str("\"*\"").unwrap();
        assert_eq!(any, ChangeKind::Any);
        assert_eq!(any.as_str(), "*");
    }
}
