use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};

use crate::codec::{decode, HeartbeatRecord};

// ════════════════════════════════════════════════════════════════
//  Liveness
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Healthy,
    /// No heartbeat for longer than the configured interval.
    Stale { silent_for: TimeDelta },
}

impl Liveness {
    /// Pure transition. The outcome depends only on `elapsed` against
    /// `interval`: recovery to `Healthy` is implied by a fresh timestamp,
    /// never by an explicit flag. No interval disables checking.
    pub fn next(self, elapsed: TimeDelta, interval: Option<TimeDelta>) -> Liveness {
        match interval {
            Some(interval) if elapsed > interval => Liveness::Stale { silent_for: elapsed },
            _ => Liveness::Healthy,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Liveness::Stale { .. })
    }
}

// ════════════════════════════════════════════════════════════════
//  Filtered
// ════════════════════════════════════════════════════════════════

/// What the monitor decided about one inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filtered<'a> {
    /// Not a heartbeat: forward to the application stream.
    Application(&'a [u8]),
    /// Valid heartbeat for a subscribed topic; liveness was refreshed.
    Heartbeat(HeartbeatRecord),
    /// Valid heartbeat for a topic this consumer does not subscribe to.
    Foreign(HeartbeatRecord),
    /// Tagged as a heartbeat but failed validation.
    Invalid {
        record: HeartbeatRecord,
        errors: Vec<&'static str>,
    },
}

impl<'a> Filtered<'a> {
    /// The application message, if this payload should be forwarded.
    pub fn into_application(self) -> Option<&'a [u8]> {
        match self {
            Filtered::Application(payload) => Some(payload),
            _ => None,
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  HeartbeatMonitor
// ════════════════════════════════════════════════════════════════

/// Consumer-side liveness tracking.
///
/// One `last_heartbeat_seen` is shared by every subscribed topic: a
/// heartbeat on any of them keeps the whole consumer healthy.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    topics: HashSet<String>,
    interval: Option<TimeDelta>,
    last_heartbeat_seen: DateTime<Utc>,
    state: Liveness,
}

impl HeartbeatMonitor {
    pub fn new<I, S>(topics: I, interval_secs: Option<u64>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_clock(topics, interval_secs, relay_api::now())
    }

    pub fn with_clock<I, S>(topics: I, interval_secs: Option<u64>, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            interval: interval_secs.map(seconds_saturating),
            last_heartbeat_seen: now,
            state: Liveness::Healthy,
        }
    }

    pub fn interval(&self) -> Option<TimeDelta> {
        self.interval
    }

    pub fn last_heartbeat_seen(&self) -> DateTime<Utc> {
        self.last_heartbeat_seen
    }

    pub fn state(&self) -> Liveness {
        self.state
    }

    pub fn filter<'a>(&mut self, payload: &'a [u8]) -> Filtered<'a> {
        self.filter_at(payload, relay_api::now())
    }

    /// Strip heartbeats from the stream. Only a valid heartbeat for a
    /// subscribed topic refreshes liveness.
    pub fn filter_at<'a>(&mut self, payload: &'a [u8], now: DateTime<Utc>) -> Filtered<'a> {
        let Some(record) = decode(payload) else {
            return Filtered::Application(payload);
        };

        let errors = record.errors();
        if !errors.is_empty() {
            return Filtered::Invalid { record, errors };
        }

        let subscribed = record
            .topic
            .as_deref()
            .is_some_and(|t| self.topics.contains(t));
        if !subscribed {
            return Filtered::Foreign(record);
        }

        self.last_heartbeat_seen = now;
        if self.state.is_stale() {
            tracing::info!(
                topic = record.topic.as_deref().unwrap_or_default(),
                client_id = record.client_id.as_deref().unwrap_or_default(),
                "heartbeats resumed"
            );
            self.state = Liveness::Healthy;
        }
        Filtered::Heartbeat(record)
    }

    pub fn check_liveness(&mut self) -> Liveness {
        self.check_liveness_at(relay_api::now())
    }

    /// Compare the silence since the last heartbeat against the interval.
    ///
    /// A stale result resets the timestamp to `now`, so a channel that
    /// stays silent produces one alert per interval window, not one per
    /// poll cycle.
    pub fn check_liveness_at(&mut self, now: DateTime<Utc>) -> Liveness {
        let elapsed = now - self.last_heartbeat_seen;
        let next = self.state.next(elapsed, self.interval);
        if next.is_stale() {
            self.last_heartbeat_seen = now;
        }
        self.state = next;
        next
    }
}

/// Out-of-range intervals saturate to `TimeDelta::MAX` (effectively never stale).
fn seconds_saturating(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn secs(n: i64) -> TimeDelta {
        TimeDelta::seconds(n)
    }

    fn hb(topic: &str) -> Vec<u8> {
        encode(&HeartbeatRecord::new(t0(), topic, "c1"))
    }

    #[test]
    fn transition_function() {
        let h = Liveness::Healthy;
        assert_eq!(h.next(secs(100), None), Liveness::Healthy);
        assert_eq!(h.next(secs(10), Some(secs(10))), Liveness::Healthy);
        assert_eq!(h.next(secs(11), Some(secs(10))), Liveness::Stale { silent_for: secs(11) });
        let s = Liveness::Stale { silent_for: secs(11) };
        assert_eq!(s.next(secs(0), Some(secs(10))), Liveness::Healthy);
    }

    #[test]
    fn application_messages_pass_through() {
        let mut m = HeartbeatMonitor::with_clock(["quakes"], Some(10), t0());
        let payload = br#"{"Type":"Event","id":"us1000"}"#;
        assert_eq!(m.filter_at(payload, t0()), Filtered::Application(&payload[..]));
        assert_eq!(m.filter_at(b"plain text", t0()).into_application(), Some(&b"plain text"[..]));
    }

    #[test]
    fn subscribed_heartbeat_refreshes_liveness() {
        let mut m = HeartbeatMonitor::with_clock(["quakes"], Some(10), t0());
        let at = t0() + secs(8);
        let payload = hb("quakes");
        let out = m.filter_at(&payload, at);
        assert!(matches!(out, Filtered::Heartbeat(_)));
        assert_eq!(out.into_application(), None);
        assert_eq!(m.last_heartbeat_seen(), at);
        assert_eq!(m.check_liveness_at(t0() + secs(15)), Liveness::Healthy);
    }

    #[test]
    fn foreign_heartbeat_is_dropped_without_refresh() {
        let mut m = HeartbeatMonitor::with_clock(["quakes"], Some(10), t0());
        let payload = hb("picks");
        assert!(matches!(m.filter_at(&payload, t0() + secs(5)), Filtered::Foreign(_)));
        assert_eq!(m.last_heartbeat_seen(), t0());
    }

    #[test]
    fn invalid_heartbeat_is_dropped_without_refresh() {
        let mut m = HeartbeatMonitor::with_clock(["quakes"], Some(10), t0());
        let payload = br#"{"Type":"Heartbeat","Topic":"quakes"}"#;
        match m.filter_at(payload, t0() + secs(5)) {
            Filtered::Invalid { errors, .. } => assert_eq!(errors.len(), 2),
            other => panic!("expected Invalid, got {other:?}"),
        }
        assert_eq!(m.last_heartbeat_seen(), t0());
    }

    #[test]
    fn silence_alerts_once_per_interval() {
        let mut m = HeartbeatMonitor::with_clock(["quakes"], Some(10), t0());

        // poll every second for 35 seconds of silence
        let alerts: Vec<i64> = (1..=35)
            .filter(|s| m.check_liveness_at(t0() + secs(*s)).is_stale())
            .collect();

        assert_eq!(alerts, vec![11, 22, 33]);
    }

    #[test]
    fn heartbeat_after_stale_recovers() {
        let mut m = HeartbeatMonitor::with_clock(["quakes"], Some(10), t0());
        assert!(m.check_liveness_at(t0() + secs(11)).is_stale());
        assert!(m.state().is_stale());

        let payload = hb("quakes");
        m.filter_at(&payload, t0() + secs(12));
        assert_eq!(m.state(), Liveness::Healthy);
        assert_eq!(m.check_liveness_at(t0() + secs(20)), Liveness::Healthy);
    }

    #[test]
    fn without_interval_liveness_is_never_checked() {
        let mut m = HeartbeatMonitor::with_clock(["quakes"], None, t0());
        assert_eq!(m.check_liveness_at(t0() + TimeDelta::days(30)), Liveness::Healthy);
        let payload = hb("quakes");
        assert!(matches!(m.filter_at(&payload, t0()), Filtered::Heartbeat(_)));
    }

    #[test]
    fn huge_interval_saturates_instead_of_wrapping() {
        let mut m = HeartbeatMonitor::with_clock(["quakes"], Some(u64::MAX), t0());
        assert_eq!(m.interval(), Some(TimeDelta::MAX));
        assert_eq!(m.check_liveness_at(t0() + secs(1)), Liveness::Healthy);

        let mut m = HeartbeatMonitor::with_clock(["quakes"], Some(10_000_000_000_000_000), t0());
        assert_eq!(m.interval(), Some(TimeDelta::MAX));
        assert_eq!(m.check_liveness_at(t0() + TimeDelta::days(365)), Liveness::Healthy);
    }

    #[test]
    fn one_heartbeat_keeps_all_topics_alive() {
        let mut m = HeartbeatMonitor::with_clock(["quakes", "picks"], Some(10), t0());
        let payload = hb("picks");
        m.filter_at(&payload, t0() + secs(9));
        assert_eq!(m.check_liveness_at(t0() + secs(18)), Liveness::Healthy);
    }
}
