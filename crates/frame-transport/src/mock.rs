use crate::{Publisher, Result, Subscriber, TopicInfo, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared counters so tests can observe a subscriber after it is boxed away.
#[derive(Debug, Default)]
pub struct SubscriberStats {
    pub subscribes: AtomicUsize,
    pub unsubscribes: AtomicUsize,
}

impl SubscriberStats {
    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

/// In-process subscriber that only records what it was asked to do.
pub struct MockSubscriber {
    current: Option<TopicInfo>,
    transports: Vec<String>,
    stats: Arc<SubscriberStats>,
}

impl MockSubscriber {
    pub fn new() -> Self {
        Self {
            current: None,
            transports: vec!["raw".to_string(), "compressed".to_string()],
            stats: Arc::new(SubscriberStats::default()),
        }
    }

    /// Restrict the transports this subscriber accepts.
    pub fn with_transports(mut self, transports: &[&str]) -> Self {
        self.transports = transports.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn stats(&self) -> Arc<SubscriberStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for MockSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscriber for MockSubscriber {
    fn subscribe(&mut self, topic: &str, transport: &str) -> Result<()> {
        if !self.transports.iter().any(|t| t == transport) {
            return Err(TransportError::UnsupportedTransport(transport.to_string()));
        }
        self.current = Some(TopicInfo {
            name: topic.to_string(),
            transport: transport.to_string(),
        });
        self.stats.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if self.current.take().is_some() {
            self.stats.unsubscribes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn topic(&self) -> Option<&TopicInfo> {
        self.current.as_ref()
    }
}

/// In-process publisher keeping every message it is handed.
pub struct MockPublisher<M> {
    topic: String,
    consumers: AtomicUsize,
    published: Mutex<Vec<M>>,
}

impl<M> MockPublisher<M> {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            consumers: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn set_subscription_count(&self, count: usize) {
        self.consumers.store(count, Ordering::SeqCst);
    }

    /// Drain everything published so far.
    pub fn take(&self) -> Vec<M> {
        match self.published.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.published.lock().map(|g| g.len()).unwrap_or(0)
    }
}

impl<M: Send> Publisher<M> for MockPublisher<M> {
    fn publish(&self, msg: M) -> Result<()> {
        let mut guard = self.published.lock().map_err(|_| TransportError::Closed)?;
        guard.push(msg);
        Ok(())
    }

    fn subscription_count(&self) -> usize {
        self.consumers.load(Ordering::SeqCst)
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_counts_transitions() {
        let mut sub = MockSubscriber::new();
        let stats = sub.stats();
        sub.subscribe("/depth", "raw").unwrap();
        assert!(sub.is_subscribed());
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(stats.subscribes(), 1);
        assert_eq!(stats.unsubscribes(), 1);
    }

    #[test]
    fn subscriber_rejects_unknown_transport() {
        let mut sub = MockSubscriber::new().with_transports(&["raw"]);
        assert!(sub.subscribe("/depth", "compressedDepth").is_err());
        assert!(!sub.is_subscribed());
    }

    #[test]
    fn publisher_keeps_messages() -> anyhow::Result<()> {
        let publisher = MockPublisher::<u32>::new("/points");
        publisher.publish(1)?;
        publisher.publish(2)?;
        assert_eq!(publisher.count(), 2);
        assert_eq!(publisher.take(), vec![1, 2]);
        assert_eq!(publisher.count(), 0);
        Ok(())
    }
}
