use tracing::info;

use parley_db::queries;
use parley_types::events::EventKind;
use parley_types::models::ConversationSummary;

use crate::error::ServiceError;
use crate::fanout;
use crate::state::AppStateInner;
use crate::views;

/// Outcome of `ensure_pair_group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairGroup {
    pub conversation_id: i64,
    pub created: bool,
}

impl AppStateInner {
    /// Create a group of `creator` plus `member_ids` and tell every member.
    pub async fn create_group(
        &self,
        creator: i64,
        title: Option<String>,
        member_ids: Vec<i64>,
    ) -> Result<i64, ServiceError> {
        let mut members = member_ids;
        members.push(creator);
        members.sort_unstable();
        members.dedup();

        let (conversation_id, recipients) = self
            .run_blocking(move |db| {
                db.with_tx(|conn| {
                    if let Some(&missing) = queries::missing_users(conn, &members)?.first() {
                        return Err(ServiceError::UnknownUser(missing));
                    }

                    let cid = queries::insert_group(conn, title.as_deref())?;
                    queries::add_members(conn, cid, &members)?;
                    let recipients =
                        fanout::group_event(conn, cid, &members, EventKind::GroupAdded)?;
                    Ok((cid, recipients))
                })
            })
            .await?;

        self.broker.wake_all(&recipients);
        info!(
            "User {} created group {} with {} members",
            creator,
            conversation_id,
            recipients.len()
        );
        Ok(conversation_id)
    }

    /// Find or create the two-party group between `me` and `other`.
    ///
    /// Search and creation share one write transaction, so two concurrent
    /// calls for the same pair always agree on a single group.
    pub async fn ensure_pair_group(&self, me: i64, other: i64) -> Result<PairGroup, ServiceError> {
        if me == other {
            return Err(ServiceError::InvalidRequest(
                "cannot open a pair group with yourself".into(),
            ));
        }

        let (pair, recipients) = self
            .run_blocking(move |db| {
                db.with_tx(|conn| {
                    if let Some(cid) = queries::find_pair_group(conn, me, other)? {
                        let pair = PairGroup {
                            conversation_id: cid,
                            created: false,
                        };
                        return Ok((pair, Vec::new()));
                    }

                    let my_name =
                        queries::user_name(conn, me)?.ok_or(ServiceError::UnknownUser(me))?;
                    let other_name =
                        queries::user_name(conn, other)?.ok_or(ServiceError::UnknownUser(other))?;
                    let title = format!("Chat: {} & {}", my_name, other_name);

                    let cid = queries::insert_group(conn, Some(&title))?;
                    queries::add_members(conn, cid, &[me, other])?;
                    let recipients =
                        fanout::group_event(conn, cid, &[me, other], EventKind::GroupAdded)?;
                    let pair = PairGroup {
                        conversation_id: cid,
                        created: true,
                    };
                    Ok((pair, recipients))
                })
            })
            .await?;

        if pair.created {
            self.broker.wake_all(&recipients);
            info!("Created pair group {} for users {} and {}", pair.conversation_id, me, other);
        }
        Ok(pair)
    }

    /// Leave a group; the last one out deletes it.
    pub async fn leave_group(&self, me: i64, conversation_id: i64) -> Result<(), ServiceError> {
        let removed = self
            .run_blocking(move |db| {
                db.with_tx(|conn| {
                    // Captured before anything changes: the delete below cascades.
                    let members_before = queries::active_members(conn, conversation_id)?;

                    if !queries::deactivate_member(conn, conversation_id, me)? {
                        return Err(ServiceError::NotAMember);
                    }

                    if !queries::active_members(conn, conversation_id)?.is_empty() {
                        return Ok(None);
                    }

                    queries::delete_conversation(conn, conversation_id)?;
                    let recipients = fanout::group_event(
                        conn,
                        conversation_id,
                        &members_before,
                        EventKind::GroupRemoved,
                    )?;
                    Ok(Some(recipients))
                })
            })
            .await?;

        match removed {
            Some(recipients) => {
                self.broker.wake_all(&recipients);
                info!("User {} left group {}; group deleted", me, conversation_id);
            }
            None => info!("User {} left group {}", me, conversation_id),
        }
        Ok(())
    }

    /// Groups `me` is active in, newest first, with message counts.
    pub async fn list_my_conversations(
        &self,
        me: i64,
    ) -> Result<Vec<ConversationSummary>, ServiceError> {
        let rows = self
            .run_blocking(move |db| {
                db.with_conn(|conn| Ok(queries::conversations_for_user(conn, me)?))
            })
            .await?;
        Ok(rows.into_iter().map(views::conversation_summary).collect())
    }
}
