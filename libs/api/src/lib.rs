use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

mod error;
mod util;

pub use error::{ErrorKind, RelayError};
pub use util::{date_string, format_iso8601, now, parse_iso8601, utc_day};

// ════════════════════════════════════════════════════════════════
//  Overflow Policy
// ════════════════════════════════════════════════════════════════

/// Стратегия поведения при переполнении bounded канала подписки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// try_send(): если канал полон, дропнуть сообщение, залогировать.
    Drop,
    /// .send().await: ждать пока появится место (back-pressure).
    #[serde(alias = "backpressure")]
    BackPressure,
}

// ════════════════════════════════════════════════════════════════
//  Channel types
// ════════════════════════════════════════════════════════════════

/// Одно сообщение, полученное из канала: имя topic'а + непрозрачный payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }
}

// ════════════════════════════════════════════════════════════════
//  Channel Traits
// ════════════════════════════════════════════════════════════════

/// Публикация payload'ов в именованный topic.
///
/// Ошибка транспорта возвращается с `ErrorKind::Transport`; вызывающий
/// цикл логирует её и продолжает работу.
pub trait ChannelPublisher: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>)
        -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>>;
}

/// Подписка на один или несколько topic'ов.
pub trait ChannelSubscriber: Send + Sync {
    /// Подписаться на набор topic'ов. Все доставки приходят в одну
    /// подписку в порядке поступления.
    ///
    /// - `buffer`: размер буфера канала
    /// - `overflow`: стратегия при переполнении (Drop или BackPressure)
    #[allow(clippy::type_complexity)]
    fn subscribe(
        &self,
        topics: &[String],
        buffer: usize,
        overflow: OverflowPolicy,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ChannelSubscription>, RelayError>> + Send + '_>>;
}

/// Активная подписка: bounded poll за доступными сообщениями.
pub trait ChannelSubscription: Send {
    /// Ждать первое сообщение не дольше `timeout_ms`, затем забрать всё,
    /// что уже доступно. Пустой вектор = таймаут. Отрицательный таймаут =
    /// ждать бесконечно.
    fn poll(&mut self, timeout_ms: i64)
        -> Pin<Box<dyn Future<Output = Result<Vec<Delivery>, RelayError>> + Send + '_>>;
}
