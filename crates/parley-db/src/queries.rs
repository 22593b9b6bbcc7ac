//! Statements against the chat schema.
//!
//! Everything here takes a plain `&Connection` so the same function can run on
//! a pooled reader or inside a writer transaction (`Database::with_tx`).

use crate::Database;
use crate::models::{ConversationRow, EventRow, MessageRow, UserRow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use parley_types::events::EventKind;
use parley_types::models::GROUP_KIND;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

/// Text layout SQLite uses for `datetime('now')`.
pub const SQLITE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl Database {
    pub fn session_user(&self, token: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| session_user(conn, token))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(list_users)
    }

    pub fn events_after(&self, user_id: i64, after_event_id: i64) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| events_after(conn, user_id, after_event_id))
    }
}

// -- Users --

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        pass_hash: row.get(3)?,
    })
}

/// Insert a user. Returns `None` when the email is already taken.
pub fn insert_user(
    conn: &Connection,
    email: &str,
    name: &str,
    pass_hash: &str,
    salt: &str,
) -> Result<Option<i64>> {
    let inserted = conn.execute(
        "INSERT INTO users (email, name, pass_hash, salt) VALUES (?1, ?2, ?3, ?4)",
        params![email, name, pass_hash, salt],
    );

    match inserted {
        Ok(_) => Ok(Some(conn.last_insert_rowid())),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Look up a user by email, creating it when missing. Returns the user id.
pub fn get_or_create_user(
    conn: &Connection,
    email: &str,
    name: &str,
    pass_hash: &str,
    salt: &str,
) -> Result<i64> {
    if let Some(user) = user_by_email(conn, email)? {
        return Ok(user.id);
    }
    conn.execute(
        "INSERT INTO users (email, name, pass_hash, salt) VALUES (?1, ?2, ?3, ?4)",
        params![email, name, pass_hash, salt],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, email, name, pass_hash FROM users WHERE email = ?1",
    )?;
    Ok(stmt.query_row([email], user_from_row).optional()?)
}

pub fn user_name(conn: &Connection, user_id: i64) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT name FROM users WHERE id = ?1", [user_id], |row| row.get(0))
        .optional()?)
}

/// Ids from `user_ids` with no matching user row, in input order.
pub fn missing_users(conn: &Connection, user_ids: &[i64]) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM users WHERE id = ?1")?;
    let mut missing = Vec::new();
    for &id in user_ids {
        if !stmt.exists([id])? {
            missing.push(id);
        }
    }
    Ok(missing)
}

pub fn list_users(conn: &Connection) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, name, pass_hash FROM users ORDER BY name, id",
    )?;
    let rows = stmt
        .query_map([], user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// -- Sessions --

pub fn insert_session(
    conn: &Connection,
    token: &str,
    user_id: i64,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![token, user_id, expires_at.format(SQLITE_TIME_FORMAT).to_string()],
    )?;
    Ok(())
}

/// Owner of `token`, if the session exists and has not expired.
pub fn session_user(conn: &Connection, token: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > datetime('now')",
            [token],
            |row| row.get(0),
        )
        .optional()?)
}

// -- Conversations & membership --

pub fn insert_group(conn: &Connection, title: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO conversations (type, title) VALUES (?1, ?2)",
        params![GROUP_KIND, title],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn add_members(conn: &Connection, conversation_id: i64, user_ids: &[i64]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO conversation_members (conversation_id, user_id, active) VALUES (?1, ?2, 1)",
    )?;
    for &uid in user_ids {
        stmt.execute([conversation_id, uid])?;
    }
    Ok(())
}

/// Active members of a conversation, ascending by user id.
pub fn active_members(conn: &Connection, conversation_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id FROM conversation_members
         WHERE conversation_id = ?1 AND active = 1
         ORDER BY user_id",
    )?;
    let ids = stmt
        .query_map([conversation_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

pub fn is_active_member(conn: &Connection, conversation_id: i64, user_id: i64) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM conversation_members
         WHERE conversation_id = ?1 AND user_id = ?2 AND active = 1",
    )?;
    Ok(stmt.exists([conversation_id, user_id])?)
}

/// Mark a membership inactive. Returns whether an active row was changed.
pub fn deactivate_member(conn: &Connection, conversation_id: i64, user_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE conversation_members SET active = 0
         WHERE conversation_id = ?1 AND user_id = ?2 AND active = 1",
        [conversation_id, user_id],
    )?;
    Ok(changed > 0)
}

/// Delete a conversation; memberships and messages go with it.
pub fn delete_conversation(conn: &Connection, conversation_id: i64) -> Result<()> {
    conn.execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
    Ok(())
}

/// A group whose active members are exactly `{a, b}`.
pub fn find_pair_group(conn: &Connection, a: i64, b: i64) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT c.id
             FROM conversations c
             JOIN conversation_members m1
               ON m1.conversation_id = c.id AND m1.user_id = ?1 AND m1.active = 1
             JOIN conversation_members m2
               ON m2.conversation_id = c.id AND m2.user_id = ?2 AND m2.active = 1
             WHERE c.type = ?3
               AND (SELECT COUNT(*) FROM conversation_members cm
                    WHERE cm.conversation_id = c.id AND cm.active = 1) = 2
             ORDER BY c.id
             LIMIT 1",
            params![a, b, GROUP_KIND],
            |row| row.get(0),
        )
        .optional()?)
}

/// Groups `user_id` is an active member of, newest first.
pub fn conversations_for_user(conn: &Connection, user_id: i64) -> Result<Vec<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.type, c.title,
                (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id)
         FROM conversations c
         JOIN conversation_members cm
           ON cm.conversation_id = c.id AND cm.user_id = ?1 AND cm.active = 1
         WHERE c.type = ?2
         ORDER BY c.id DESC",
    )?;
    let rows = stmt
        .query_map(params![user_id, GROUP_KIND], |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                title: row.get(2)?,
                message_count: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// -- Messages --

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_name: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "unknown".to_string()),
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn insert_message(
    conn: &Connection,
    conversation_id: i64,
    sender_id: i64,
    content: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (conversation_id, sender_id, content) VALUES (?1, ?2, ?3)",
        params![conversation_id, sender_id, content],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The newest `limit` messages after skipping `offset` from the newest end,
/// returned oldest first.
pub fn recent_messages(
    conn: &Connection,
    conversation_id: i64,
    limit: u32,
    offset: u32,
) -> Result<Vec<MessageRow>> {
    // JOIN users to fetch sender_name in a single query
    let mut stmt = conn.prepare(
        "SELECT m.id, m.sender_id, u.name, m.content, m.created_at
         FROM messages m
         LEFT JOIN users u ON m.sender_id = u.id
         WHERE m.conversation_id = ?1
         ORDER BY m.id DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let mut rows = stmt
        .query_map(params![conversation_id, limit, offset], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.reverse();
    Ok(rows)
}

pub fn messages_since(
    conn: &Connection,
    conversation_id: i64,
    after_id: i64,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.sender_id, u.name, m.content, m.created_at
         FROM messages m
         LEFT JOIN users u ON m.sender_id = u.id
         WHERE m.conversation_id = ?1 AND m.id > ?2
         ORDER BY m.id ASC",
    )?;
    let rows = stmt
        .query_map(params![conversation_id, after_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// -- Events --

pub fn insert_event(
    conn: &Connection,
    user_id: i64,
    kind: EventKind,
    conversation_id: Option<i64>,
    message_id: Option<i64>,
) -> Result<i64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO events (user_id, type, conversation_id, message_id) VALUES (?1, ?2, ?3, ?4)",
    )?;
    stmt.execute(params![user_id, kind.as_str(), conversation_id, message_id])?;
    Ok(conn.last_insert_rowid())
}

/// Events for `user_id` above the watermark, ascending.
pub fn events_after(conn: &Connection, user_id: i64, after_event_id: i64) -> Result<Vec<EventRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, user_id, type, conversation_id, message_id, created_at
         FROM events
         WHERE user_id = ?1 AND id > ?2
         ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([user_id, after_event_id], |row| {
            Ok(EventRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                kind: row.get(2)?,
                conversation_id: row.get(3)?,
                message_id: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn user(db: &Database, email: &str, name: &str) -> i64 {
        db.with_tx(|conn| insert_user(conn, email, name, "hash", "salt"))
            .unwrap()
            .unwrap()
    }

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) })
            .unwrap()
    }

    #[test]
    fn test_duplicate_email_is_reported_not_raised() {
        let (_dir, db) = open();
        user(&db, "a@x", "A");

        let second = db
            .with_tx(|conn| insert_user(conn, "a@x", "Other", "h", "s"))
            .unwrap();
        assert!(second.is_none());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users WHERE email = 'a@x'"), 1);
    }

    #[test]
    fn test_get_or_create_user_is_idempotent() {
        let (_dir, db) = open();
        let first = db
            .with_tx(|conn| get_or_create_user(conn, "bot@local", "Bot", "!", ""))
            .unwrap();
        let second = db
            .with_tx(|conn| get_or_create_user(conn, "bot@local", "Bot", "!", ""))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users"), 1);
    }

    #[test]
    fn test_expired_session_does_not_authenticate() {
        let (_dir, db) = open();
        let uid = user(&db, "a@x", "A");
        let now = Utc::now();
        db.with_tx(|conn| {
            insert_session(conn, "live", uid, now + chrono::Duration::hours(24))?;
            insert_session(conn, "stale", uid, now - chrono::Duration::minutes(1))
        })
        .unwrap();

        assert_eq!(db.session_user("live").unwrap(), Some(uid));
        assert_eq!(db.session_user("stale").unwrap(), None);
        assert_eq!(db.session_user("missing").unwrap(), None);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let (_dir, db) = open();
        let uid = user(&db, "a@x", "A");

        let result: Result<()> = db.with_tx(|conn| {
            let cid = insert_group(conn, Some("doomed"))?;
            add_members(conn, cid, &[uid])?;
            anyhow::bail!("boom")
        });
        assert!(result.is_err());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversations"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversation_members"), 0);
    }

    #[test]
    fn test_pair_group_requires_exactly_two_active_members() {
        let (_dir, db) = open();
        let a = user(&db, "a@x", "A");
        let b = user(&db, "b@x", "B");
        let c = user(&db, "c@x", "C");

        let trio = db
            .with_tx(|conn| {
                let cid = insert_group(conn, Some("trio"))?;
                add_members(conn, cid, &[a, b, c])?;
                Ok::<_, anyhow::Error>(cid)
            })
            .unwrap();
        assert_eq!(db.with_conn(|conn| find_pair_group(conn, a, b)).unwrap(), None);

        // Once C leaves, the trio is effectively the A/B pair.
        db.with_tx(|conn| deactivate_member(conn, trio, c)).unwrap();
        assert_eq!(db.with_conn(|conn| find_pair_group(conn, b, a)).unwrap(), Some(trio));
    }

    #[test]
    fn test_deactivate_only_touches_active_rows() {
        let (_dir, db) = open();
        let a = user(&db, "a@x", "A");
        let cid = db
            .with_tx(|conn| {
                let cid = insert_group(conn, None)?;
                add_members(conn, cid, &[a])?;
                Ok::<_, anyhow::Error>(cid)
            })
            .unwrap();

        assert!(db.with_tx(|conn| deactivate_member(conn, cid, a)).unwrap());
        assert!(!db.with_tx(|conn| deactivate_member(conn, cid, a)).unwrap());
        assert!(!db.with_conn(|conn| is_active_member(conn, cid, a)).unwrap());
    }

    #[test]
    fn test_delete_conversation_cascades() {
        let (_dir, db) = open();
        let a = user(&db, "a@x", "A");
        db.with_tx(|conn| {
            let cid = insert_group(conn, Some("g"))?;
            add_members(conn, cid, &[a])?;
            insert_message(conn, cid, a, "hi")?;
            delete_conversation(conn, cid)
        })
        .unwrap();

        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversations"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversation_members"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM messages"), 0);
    }

    #[test]
    fn test_recent_messages_pages_from_newest_end() {
        let (_dir, db) = open();
        let a = user(&db, "a@x", "Alice");
        let (cid, ids) = db
            .with_tx(|conn| {
                let cid = insert_group(conn, None)?;
                add_members(conn, cid, &[a])?;
                let mut ids = Vec::new();
                for i in 0..5 {
                    ids.push(insert_message(conn, cid, a, &format!("m{i}"))?);
                }
                Ok::<_, anyhow::Error>((cid, ids))
            })
            .unwrap();

        let page = db.with_conn(|conn| recent_messages(conn, cid, 2, 1)).unwrap();
        let got: Vec<i64> = page.iter().map(|m| m.id).collect();
        assert_eq!(got, vec![ids[2], ids[3]]);
        assert_eq!(page[0].sender_name, "Alice");

        let since = db.with_conn(|conn| messages_since(conn, cid, ids[1])).unwrap();
        let got: Vec<i64> = since.iter().map(|m| m.id).collect();
        assert_eq!(got, ids[2..].to_vec());
    }

    #[test]
    fn test_events_respect_watermark_and_recipient() {
        let (_dir, db) = open();
        let a = user(&db, "a@x", "A");
        let b = user(&db, "b@x", "B");
        let (e1, e2) = db
            .with_tx(|conn| {
                let e1 = insert_event(conn, a, EventKind::GroupAdded, Some(1), None)?;
                insert_event(conn, b, EventKind::GroupAdded, Some(1), None)?;
                let e2 = insert_event(conn, a, EventKind::Message, Some(1), Some(9))?;
                Ok::<_, anyhow::Error>((e1, e2))
            })
            .unwrap();

        let all = db.events_after(a, 0).unwrap();
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![e1, e2]);
        assert_eq!(all[1].kind, "message");
        assert_eq!(all[1].message_id, Some(9));

        let newer = db.events_after(a, e1).unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].id, e2);
        assert!(db.events_after(a, e2).unwrap().is_empty());
    }

    #[test]
    fn test_conversations_listed_newest_first_with_counts() {
        let (_dir, db) = open();
        let a = user(&db, "a@x", "A");
        let (older, newer) = db
            .with_tx(|conn| {
                let older = insert_group(conn, Some("older"))?;
                add_members(conn, older, &[a])?;
                insert_message(conn, older, a, "1")?;
                insert_message(conn, older, a, "2")?;
                let newer = insert_group(conn, Some("newer"))?;
                add_members(conn, newer, &[a])?;
                Ok::<_, anyhow::Error>((older, newer))
            })
            .unwrap();

        let rows = db.with_conn(|conn| conversations_for_user(conn, a)).unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![newer, older]);
        assert_eq!(rows[0].message_count, 0);
        assert_eq!(rows[1].message_count, 2);
        assert_eq!(rows[1].kind, "group");
    }
}
