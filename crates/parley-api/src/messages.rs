use tracing::{debug, info};

use parley_db::queries;
use parley_types::models::MessageView;

use crate::auth::new_salt;
use crate::bridge::{self, BOT_EMAIL, BOT_NAME};
use crate::error::ServiceError;
use crate::fanout;
use crate::state::AppStateInner;
use crate::views;

/// Outcome of `send_group_message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: i64,
    /// Set when the message was a trigger command and the bot answered.
    pub bot_message_id: Option<i64>,
}

impl AppStateInner {
    /// Store a message and notify every other active member.
    ///
    /// A trigger command additionally gets a bot reply. The bridge is asked
    /// first, with no lock held; the user's message and the bot's reply (or
    /// the fallback text) are then written in one transaction, user first.
    /// Either both messages and both fan-outs commit or nothing does.
    pub async fn send_group_message(
        &self,
        me: i64,
        conversation_id: i64,
        content: String,
    ) -> Result<SentMessage, ServiceError> {
        let reply = match bridge::trigger_prompt(&content) {
            Some(prompt) => {
                // Outsiders never reach the bridge.
                self.require_member(me, conversation_id).await?;
                Some(self.bot_reply(&prompt).await)
            }
            None => None,
        };

        let (sent, mut recipients) = self
            .run_blocking(move |db| {
                db.with_tx(|conn| {
                    if !queries::is_active_member(conn, conversation_id, me)? {
                        return Err(ServiceError::NotAMember);
                    }
                    let mid = queries::insert_message(conn, conversation_id, me, &content)?;
                    let mut recipients = fanout::message_event(conn, conversation_id, me, mid)?;

                    let bot_message_id = match reply {
                        Some(text) => {
                            // Unusable hash: the bot can never log in.
                            let salt = new_salt();
                            let bot = queries::get_or_create_user(
                                conn,
                                BOT_EMAIL,
                                BOT_NAME,
                                "!",
                                salt.as_str(),
                            )?;
                            let bid = queries::insert_message(conn, conversation_id, bot, &text)?;
                            let bot_recipients =
                                fanout::message_event(conn, conversation_id, bot, bid)?;
                            recipients.extend(bot_recipients);
                            Some(bid)
                        }
                        None => None,
                    };

                    let sent = SentMessage {
                        message_id: mid,
                        bot_message_id,
                    };
                    Ok((sent, recipients))
                })
            })
            .await?;

        recipients.sort_unstable();
        recipients.dedup();
        self.broker.wake_all(&recipients);

        match sent.bot_message_id {
            Some(bid) => info!(
                "Message {} and bot reply {} in conversation {} reached {} members",
                sent.message_id,
                bid,
                conversation_id,
                recipients.len()
            ),
            None => debug!(
                "Message {} in conversation {} fanned out to {} members",
                sent.message_id,
                conversation_id,
                recipients.len()
            ),
        }
        Ok(sent)
    }

    async fn require_member(&self, me: i64, conversation_id: i64) -> Result<(), ServiceError> {
        self.run_blocking(move |db| {
            db.with_conn(|conn| {
                if queries::is_active_member(conn, conversation_id, me)? {
                    Ok(())
                } else {
                    Err(ServiceError::NotAMember)
                }
            })
        })
        .await
    }

    /// Most recent `limit` messages, skipping `offset` from the newest end,
    /// oldest first.
    pub async fn get_messages(
        &self,
        me: i64,
        conversation_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageView>, ServiceError> {
        let limit = limit.min(self.config.max_page_size);
        let rows = self
            .run_blocking(move |db| {
                db.with_conn(|conn| {
                    if !queries::is_active_member(conn, conversation_id, me)? {
                        return Err(ServiceError::NotAMember);
                    }
                    Ok(queries::recent_messages(conn, conversation_id, limit, offset)?)
                })
            })
            .await?;
        Ok(rows.into_iter().map(views::message_view).collect())
    }

    /// Every message with id above `after_id`, ascending.
    pub async fn get_messages_since(
        &self,
        me: i64,
        conversation_id: i64,
        after_id: i64,
    ) -> Result<Vec<MessageView>, ServiceError> {
        let rows = self
            .run_blocking(move |db| {
                db.with_conn(|conn| {
                    if !queries::is_active_member(conn, conversation_id, me)? {
                        return Err(ServiceError::NotAMember);
                    }
                    Ok(queries::messages_since(conn, conversation_id, after_id)?)
                })
            })
            .await?;
        Ok(rows.into_iter().map(views::message_view).collect())
    }
}
