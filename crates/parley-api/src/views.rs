//! Row -> wire model conversion.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use parley_db::models::{ConversationRow, EventRow, MessageRow, UserRow};
use parley_db::queries::SQLITE_TIME_FORMAT;
use parley_types::events::{Event, EventKind};
use parley_types::models::{ConversationSummary, MessageView, UserSummary};

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC and convert.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, SQLITE_TIME_FORMAT).map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub(crate) fn user_summary(row: UserRow) -> UserSummary {
    UserSummary {
        id: row.id,
        name: row.name,
        email: row.email,
    }
}

pub(crate) fn conversation_summary(row: ConversationRow) -> ConversationSummary {
    ConversationSummary {
        id: row.id,
        kind: row.kind,
        title: row.title,
        message_count: row.message_count,
    }
}

pub(crate) fn message_view(row: MessageRow) -> MessageView {
    MessageView {
        id: row.id,
        sender_id: row.sender_id,
        sender_name: row.sender_name,
        content: row.content,
        created_at: parse_timestamp(&row.created_at),
    }
}

/// `None` for rows whose kind this build does not know.
pub(crate) fn event(row: EventRow) -> Option<Event> {
    let kind = match row.kind.parse::<EventKind>() {
        Ok(kind) => kind,
        Err(e) => {
            warn!("Skipping event {} for user {}: {}", row.id, row.user_id, e);
            return None;
        }
    };

    Some(Event {
        id: row.id,
        kind,
        conversation_id: row.conversation_id,
        message_id: row.message_id,
        created_at: parse_timestamp(&row.created_at),
    })
}
