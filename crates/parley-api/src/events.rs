use std::time::Duration;

use tracing::debug;

use parley_gateway::longpoll;
use parley_types::events::Event;

use crate::error::ServiceError;
use crate::state::AppStateInner;
use crate::views;

impl AppStateInner {
    /// Events for `me` above the watermark, ascending. Does not wait.
    pub async fn events_since(
        &self,
        me: i64,
        after_event_id: i64,
    ) -> Result<Vec<Event>, ServiceError> {
        let rows = self
            .run_blocking(move |db| Ok(db.events_after(me, after_event_id)?))
            .await?;
        Ok(rows.into_iter().filter_map(views::event).collect())
    }

    /// Long-poll for events above `after_event_id`.
    ///
    /// Returns as soon as any exist, or an empty list once `timeout`
    /// (default and cap from [`crate::state::ServiceConfig`]) has passed.
    /// Holds no lock while parked; dropping the future abandons the wait.
    pub async fn wait_events(
        &self,
        me: i64,
        after_event_id: i64,
        timeout: Option<Duration>,
    ) -> Result<Vec<Event>, ServiceError> {
        let timeout = timeout
            .unwrap_or(self.config.default_wait)
            .min(self.config.max_wait);

        let events = longpoll::poll_until(&self.broker, me, timeout, self.config.poll_slice, || {
            self.events_since(me, after_event_id)
        })
        .await?;

        debug!(
            "wait_events for user {} after {} returned {} events",
            me,
            after_event_id,
            events.len()
        );
        Ok(events)
    }
}
