use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of change produced an event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new message landed in a conversation the recipient belongs to.
    Message,
    /// The recipient was made a member of a new group.
    GroupAdded,
    /// A group the recipient was in no longer exists.
    GroupRemoved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::GroupAdded => "group_added",
            Self::GroupRemoved => "group_removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event kind '{0}'")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "group_added" => Ok(Self::GroupAdded),
            "group_removed" => Ok(Self::GroupRemoved),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

/// One entry of a user's notification log, as delivered by `wait_events`.
///
/// Clients keep the highest `id` they have seen as their watermark and pass
/// it back on the next poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub conversation_id: Option<i64>,
    pub message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
