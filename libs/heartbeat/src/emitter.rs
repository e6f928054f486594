use chrono::{DateTime, TimeDelta, Utc};

use relay_api::{ChannelPublisher, RelayError};

use crate::codec::{encode, HeartbeatRecord};

/// When a producer is allowed to emit a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatPolicy {
    /// No heartbeats at all.
    Disabled,
    /// Every send opportunity emits one.
    Always,
    /// At most one per interval.
    Every(TimeDelta),
}

impl HeartbeatPolicy {
    /// `None` disables heartbeats, a negative value means "always send".
    pub fn from_interval_secs(interval: Option<i64>) -> Self {
        match interval {
            None => HeartbeatPolicy::Disabled,
            Some(s) if s < 0 => HeartbeatPolicy::Always,
            Some(s) => HeartbeatPolicy::Every(TimeDelta::try_seconds(s).unwrap_or(TimeDelta::MAX)),
        }
    }
}

/// Producer-side throttle: decides on each send opportunity whether a
/// heartbeat goes out for the target topic.
#[derive(Debug)]
pub struct HeartbeatEmitter {
    client_id: String,
    policy: HeartbeatPolicy,
    last_sent: DateTime<Utc>,
}

impl HeartbeatEmitter {
    pub fn new(client_id: impl Into<String>, policy: HeartbeatPolicy) -> Self {
        Self::with_clock(client_id, policy, relay_api::now())
    }

    /// Same as `new`, with the throttle anchored at `now`.
    pub fn with_clock(client_id: impl Into<String>, policy: HeartbeatPolicy, now: DateTime<Utc>) -> Self {
        Self {
            client_id: client_id.into(),
            policy,
            last_sent: now,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn policy(&self) -> HeartbeatPolicy {
        self.policy
    }

    pub fn last_sent(&self) -> DateTime<Utc> {
        self.last_sent
    }

    pub fn due_at(&self, now: DateTime<Utc>) -> bool {
        match self.policy {
            HeartbeatPolicy::Disabled => false,
            HeartbeatPolicy::Always => true,
            HeartbeatPolicy::Every(interval) => now - self.last_sent >= interval,
        }
    }

    pub async fn maybe_emit(&mut self, topic: &str, publisher: &dyn ChannelPublisher) -> Result<bool, RelayError> {
        self.maybe_emit_at(topic, publisher, relay_api::now()).await
    }

    /// Emit a heartbeat on `topic` if the throttle allows it.
    ///
    /// `Ok(true)` means published, `Ok(false)` means not due. The throttle
    /// resets on every attempt, so a failing publish is reported once and
    /// not retried until the next interval.
    pub async fn maybe_emit_at(
        &mut self,
        topic: &str,
        publisher: &dyn ChannelPublisher,
        now: DateTime<Utc>,
    ) -> Result<bool, RelayError> {
        if !self.due_at(now) {
            return Ok(false);
        }
        self.last_sent = now;

        let record = HeartbeatRecord::new(now, topic, self.client_id.as_str());
        if !record.is_valid() {
            return Err(RelayError::validation(record.errors().join(" ")));
        }

        publisher.publish(topic, encode(&record)).await?;
        tracing::debug!(topic = %topic, client_id = %self.client_id, "heartbeat sent");
        Ok(true)
    }
}
