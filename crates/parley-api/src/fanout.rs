//! Event fan-out. Runs inside the write transaction that caused the change;
//! callers wake the returned recipients only after commit.

use anyhow::Result;
use rusqlite::Connection;

use parley_db::queries;
use parley_types::events::EventKind;

/// Queue a `message` event for every active member except the sender.
pub(crate) fn message_event(
    conn: &Connection,
    conversation_id: i64,
    sender_id: i64,
    message_id: i64,
) -> Result<Vec<i64>> {
    let recipients: Vec<i64> = queries::active_members(conn, conversation_id)?
        .into_iter()
        .filter(|&uid| uid != sender_id)
        .collect();

    for &uid in &recipients {
        queries::insert_event(
            conn,
            uid,
            EventKind::Message,
            Some(conversation_id),
            Some(message_id),
        )?;
    }
    Ok(recipients)
}

/// Queue one membership event (`group_added` / `group_removed`) per distinct user.
pub(crate) fn group_event(
    conn: &Connection,
    conversation_id: i64,
    user_ids: &[i64],
    kind: EventKind,
) -> Result<Vec<i64>> {
    let mut recipients = user_ids.to_vec();
    recipients.sort_unstable();
    recipients.dedup();

    for &uid in &recipients {
        queries::insert_event(conn, uid, kind, Some(conversation_id), None)?;
    }
    Ok(recipients)
}
