pub mod error;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};

use relay_api::{
    ChannelPublisher, ChannelSubscriber, ChannelSubscription, Delivery,
    OverflowPolicy, RelayError,
};

pub use error::TopicError;

/// Максимум сообщений, забираемых одним poll() после первого.
const MAX_POLL_BATCH: usize = 1024;

// ═══════════════════════════════════════════════════════════════
//  Subscriber
// ═══════════════════════════════════════════════════════════════

struct Subscriber {
    tx: mpsc::Sender<Delivery>,
    overflow: OverflowPolicy,
}

// ═══════════════════════════════════════════════════════════════
//  MpscSubscription: ChannelSubscription impl
// ═══════════════════════════════════════════════════════════════

/// Подписка на один или несколько topic'ов. Все topic'и пишут в один
/// mpsc, поэтому порядок доставки = порядок публикации.
pub struct MpscSubscription {
    rx: mpsc::Receiver<Delivery>,
}

impl MpscSubscription {
    async fn poll_inner(&mut self, timeout_ms: i64) -> Result<Vec<Delivery>, RelayError> {
        let first = if timeout_ms < 0 {
            self.rx.recv().await
        } else {
            match tokio::time::timeout(Duration::from_millis(timeout_ms as u64), self.rx.recv()).await {
                Ok(first) => first,
                Err(_) => return Ok(Vec::new()),
            }
        };

        let Some(first) = first else {
            return Err(RelayError::transport("subscription closed"));
        };

        let mut batch = vec![first];
        while batch.len() < MAX_POLL_BATCH {
            match self.rx.try_recv() {
                Ok(delivery) => batch.push(delivery),
                Err(_) => break,
            }
        }
        Ok(batch)
    }
}

impl ChannelSubscription for MpscSubscription {
    fn poll(&mut self, timeout_ms: i64)
        -> Pin<Box<dyn Future<Output = Result<Vec<Delivery>, RelayError>> + Send + '_>>
    {
        Box::pin(self.poll_inner(timeout_ms))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Topic
// ═══════════════════════════════════════════════════════════════

/// Именованный канал данных без хранения: publish рассылает payload
/// всем текущим подписчикам согласно их overflow policy.
pub struct Topic {
    pub name: String,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    async fn attach(&self, tx: mpsc::Sender<Delivery>, overflow: OverflowPolicy) {
        let mut subs = self.subscribers.write().await;
        subs.push(Subscriber { tx, overflow });
    }

    /// Опубликовать payload: notify all subscribers.
    ///
    /// Публикация без подписчиков не ошибка, payload просто никому
    /// не доставляется.
    pub async fn publish(&self, payload: Vec<u8>) {
        let targets: Vec<(mpsc::Sender<Delivery>, OverflowPolicy)> = {
            let subs = self.subscribers.read().await;
            subs.iter().map(|s| (s.tx.clone(), s.overflow)).collect()
        };

        let mut saw_closed = false;
        for (tx, overflow) in targets {
            let delivery = Delivery::new(self.name.clone(), payload.clone());
            match overflow {
                OverflowPolicy::Drop => match tx.try_send(delivery) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(topic = %self.name, "subscriber channel full, dropping");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => saw_closed = true,
                },
                OverflowPolicy::BackPressure => {
                    if tx.send(delivery).await.is_err() {
                        saw_closed = true;
                    }
                }
            }
        }

        if saw_closed {
            let mut subs = self.subscribers.write().await;
            subs.retain(|s| !s.tx.is_closed());
            tracing::debug!(topic = %self.name, remaining = subs.len(), "pruned closed subscribers");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

// ═══════════════════════════════════════════════════════════════
//  TopicRegistry
// ═══════════════════════════════════════════════════════════════

/// Реестр всех topic'ов. Реализует ChannelPublisher и ChannelSubscriber.
pub struct TopicRegistry {
    topics: HashMap<String, Arc<Topic>>,
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self {
            topics: HashMap::new(),
        }
    }

    pub fn register(&mut self, topic: Topic) {
        let name = topic.name.clone();
        self.topics.insert(name, Arc::new(topic));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.get(name).cloned()
    }

    /// Список всех зарегистрированных topic'ов (отсортирован).
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.keys().cloned().collect();
        names.sort();
        names
    }

    fn resolve(&self, names: &[String]) -> Result<Vec<Arc<Topic>>, TopicError> {
        if names.is_empty() {
            return Err(TopicError::EmptySubscription);
        }
        // повтор имени не должен подключать тот же sender дважды
        let mut resolved: Vec<Arc<Topic>> = Vec::with_capacity(names.len());
        for n in names {
            let topic = self.get(n).ok_or_else(|| TopicError::NotFound(n.clone()))?;
            if !resolved.iter().any(|t| Arc::ptr_eq(t, &topic)) {
                resolved.push(topic);
            }
        }
        Ok(resolved)
    }
}

impl ChannelPublisher for TopicRegistry {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>> {
        let topic_arc = self.get(topic);
        let topic_name = topic.to_string();
        Box::pin(async move {
            match topic_arc {
                Some(t) => {
                    t.publish(payload).await;
                    Ok(())
                }
                None => Err(TopicError::NotFound(topic_name).into_relay_error()),
            }
        })
    }
}

impl ChannelSubscriber for TopicRegistry {
    fn subscribe(
        &self,
        topics: &[String],
        buffer: usize,
        overflow: OverflowPolicy,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ChannelSubscription>, RelayError>> + Send + '_>> {
        let resolved = self.resolve(topics);
        Box::pin(async move {
            let resolved = resolved.map_err(TopicError::into_relay_error)?;
            let (tx, rx) = mpsc::channel(buffer.max(1));
            for t in &resolved {
                t.attach(tx.clone(), overflow).await;
            }
            Ok(Box::new(MpscSubscription { rx }) as Box<dyn ChannelSubscription>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_api::ErrorKind;

    fn registry(names: &[&str]) -> TopicRegistry {
        let mut r = TopicRegistry::new();
        for n in names {
            r.register(Topic::new(*n));
        }
        r
    }

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn poll_times_out_with_empty_batch() {
        let r = registry(&["quakes"]);
        let mut sub = r.subscribe(&topics(&["quakes"]), 16, OverflowPolicy::BackPressure).await.unwrap();
        let batch = sub.poll(20).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn poll_drains_in_publish_order_across_topics() {
        let r = registry(&["quakes", "picks"]);
        let mut sub = r
            .subscribe(&topics(&["quakes", "picks"]), 16, OverflowPolicy::BackPressure)
            .await
            .unwrap();

        r.publish("quakes", b"a".to_vec()).await.unwrap();
        r.publish("picks", b"b".to_vec()).await.unwrap();
        r.publish("quakes", b"c".to_vec()).await.unwrap();

        let batch = sub.poll(100).await.unwrap();
        let got: Vec<(&str, &[u8])> = batch.iter().map(|d| (d.topic.as_str(), d.payload.as_slice())).collect();
        assert_eq!(got, vec![("quakes", &b"a"[..]), ("picks", &b"b"[..]), ("quakes", &b"c"[..])]);
    }

    #[tokio::test]
    async fn publish_to_unknown_topic_is_transport_error() {
        let r = registry(&["quakes"]);
        let err = r.publish("nope", b"x".to_vec()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.message().contains("nope"));
    }

    #[tokio::test]
    async fn subscribe_to_unknown_topic_fails() {
        let r = registry(&["quakes"]);
        let err = r
            .subscribe(&topics(&["quakes", "missing"]), 16, OverflowPolicy::Drop)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn drop_policy_discards_when_full() {
        let r = registry(&["quakes"]);
        let mut sub = r.subscribe(&topics(&["quakes"]), 2, OverflowPolicy::Drop).await.unwrap();
        for i in 0..5u8 {
            r.publish("quakes", vec![i]).await.unwrap();
        }
        let batch = sub.poll(50).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].payload, vec![0]);
        assert_eq!(batch[1].payload, vec![1]);
    }

    #[tokio::test]
    async fn repeated_topic_name_delivers_once() {
        let r = registry(&["quakes"]);
        let mut sub = r
            .subscribe(&topics(&["quakes", "quakes"]), 16, OverflowPolicy::BackPressure)
            .await
            .unwrap();
        assert_eq!(r.get("quakes").unwrap().subscriber_count().await, 1);

        r.publish("quakes", b"x".to_vec()).await.unwrap();
        let batch = sub.poll(50).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned() {
        let r = registry(&["quakes"]);
        let sub = r.subscribe(&topics(&["quakes"]), 4, OverflowPolicy::BackPressure).await.unwrap();
        let topic = r.get("quakes").unwrap();
        assert_eq!(topic.subscriber_count().await, 1);

        drop(sub);
        r.publish("quakes", b"x".to_vec()).await.unwrap();
        assert_eq!(topic.subscriber_count().await, 0);
    }
}
