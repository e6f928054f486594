use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};

use relay_api::RelayError;

use crate::sink::FileSink;

// ════════════════════════════════════════════════════════════════
//  FlushPolicy
// ════════════════════════════════════════════════════════════════

/// Когда очередь сбрасывается на диск.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Count trigger. Values below 1 are treated as 1.
    pub max_messages_per_file: u64,
    /// Time trigger in seconds; `None` disables it.
    pub max_seconds_per_file: Option<u64>,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_messages_per_file: 1,
            max_seconds_per_file: None,
        }
    }
}

impl FlushPolicy {
    pub fn new(max_messages_per_file: u64, max_seconds_per_file: Option<u64>) -> Self {
        Self {
            max_messages_per_file: max_messages_per_file.max(1),
            max_seconds_per_file,
        }
    }

    fn batch_limit(&self) -> usize {
        usize::try_from(self.max_messages_per_file.max(1)).unwrap_or(usize::MAX)
    }
}

// ════════════════════════════════════════════════════════════════
//  FlushReport
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Count,
    Time,
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushTrigger::Count => f.write_str("count"),
            FlushTrigger::Time => f.write_str("time"),
        }
    }
}

/// Outcome of one flush attempt. The messages are gone from the queue
/// whatever `result` says.
#[derive(Debug)]
pub struct FlushReport {
    pub trigger: FlushTrigger,
    pub messages: usize,
    pub result: Result<PathBuf, RelayError>,
}

// ════════════════════════════════════════════════════════════════
//  BatchFlushController
// ════════════════════════════════════════════════════════════════

/// Очередь сообщений + два независимых триггера сброса (количество и время).
///
/// Синхронный, принадлежит одному poll loop'у. Сообщения покидают
/// очередь только через flush, всегда самыми старыми первыми.
pub struct BatchFlushController<S> {
    policy: FlushPolicy,
    queue: VecDeque<String>,
    last_flush: DateTime<Utc>,
    sink: S,
}

impl<S: FileSink> BatchFlushController<S> {
    pub fn new(policy: FlushPolicy, sink: S) -> Self {
        Self::with_clock(policy, sink, relay_api::now())
    }

    pub fn with_clock(policy: FlushPolicy, sink: S, now: DateTime<Utc>) -> Self {
        Self {
            policy,
            queue: VecDeque::new(),
            last_flush: now,
            sink,
        }
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn last_flush(&self) -> DateTime<Utc> {
        self.last_flush
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Append to the tail. Empty messages are dropped.
    pub fn enqueue(&mut self, message: impl Into<String>) {
        let message = message.into();
        if message.is_empty() {
            return;
        }
        self.queue.push_back(message);
    }

    pub fn tick(&mut self) -> Option<FlushReport> {
        self.tick_at(relay_api::now())
    }

    /// Evaluate both triggers once; called every poll cycle.
    ///
    /// Count wins over time: a full batch flushes exactly
    /// `max_messages_per_file` messages, otherwise an expired timer
    /// flushes everything queued. `None` means nothing was attempted.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Option<FlushReport> {
        if self.queue.is_empty() {
            return None;
        }

        let limit = self.policy.batch_limit();
        let (trigger, take) = if self.queue.len() >= limit {
            (FlushTrigger::Count, limit)
        } else if self.timer_expired(now) {
            (FlushTrigger::Time, self.queue.len())
        } else {
            return None;
        };

        let batch: Vec<String> = self.queue.drain(..take).collect();
        let result = self.sink.write_batch(&batch, now);
        self.last_flush = now;

        Some(FlushReport {
            trigger,
            messages: batch.len(),
            result,
        })
    }

    fn timer_expired(&self, now: DateTime<Utc>) -> bool {
        match self.policy.max_seconds_per_file {
            Some(secs) => {
                let limit = i64::try_from(secs)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .unwrap_or(TimeDelta::MAX);
                now - self.last_flush > limit
            }
            None => false,
        }
    }
}
