//! External event fan-out: notifies the rest of the server that a round
//! committed. A later commit supersedes an undelivered earlier one
//! rather than queuing behind it, the semantics `watch` gives for free.

use std::sync::Arc;

use exchange_core::exchange::{ClusterKey, NodeId};
use parking_lot::RwLock;
use tokio::sync::watch;

/// One committed round, as delivered to registered listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterChangedEvent {
    pub cluster_key: ClusterKey,
    pub cluster_size: u32,
    pub succession: Vec<NodeId>,
}

/// A registered callback. Listeners run synchronously and in registration
/// order on the publisher's worker task, so they must not block.
pub type ClusterChangedListener = Arc<dyn Fn(&ClusterChangedEvent) + Send + Sync>;

/// Hard cap on registered listeners; registration past this returns an
/// error rather than growing unbounded.
pub const MAX_LISTENERS: usize = 7;

#[derive(Debug, thiserror::Error)]
#[error("cluster-changed listener registry is full (max {MAX_LISTENERS})")]
pub struct TooManyListeners;

/// Single-slot, overwrite-on-enqueue publisher: a burst of commits between
/// worker wakeups only delivers the latest one, matching the watch
/// channel's own semantics rather than queueing every event.
pub struct ExternalEventPublisher {
    tx: watch::Sender<Option<ClusterChangedEvent>>,
    listeners: Arc<RwLock<Vec<ClusterChangedListener>>>,
}

impl ExternalEventPublisher {
    /// Builds a publisher and spawns its worker task.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        let listeners: Arc<RwLock<Vec<ClusterChangedListener>>> = Arc::new(RwLock::new(Vec::new()));
        tokio::spawn(Self::worker(rx, listeners.clone()));
        Self { tx, listeners }
    }

    /// Registers a listener, rejecting once [`MAX_LISTENERS`] is reached.
    pub fn register(&self, listener: ClusterChangedListener) -> Result<(), TooManyListeners> {
        let mut guard = self.listeners.write();
        if guard.len() >= MAX_LISTENERS {
            return Err(TooManyListeners);
        }
        guard.push(listener);
        Ok(())
    }

    /// Publishes `event`, overwriting any not-yet-delivered prior event.
    pub fn enqueue(&self, event: ClusterChangedEvent) {
        let _ = self.tx.send(Some(event));
    }

    async fn worker(
        mut rx: watch::Receiver<Option<ClusterChangedEvent>>,
        listeners: Arc<RwLock<Vec<ClusterChangedListener>>>,
    ) {
        while rx.changed().await.is_ok() {
            let Some(event) = rx.borrow_and_update().clone() else {
                continue;
            };
            let callbacks: Vec<_> = listeners.read().clone();
            for callback in callbacks {
                callback(&event);
            }
        }
        // Sender dropped: the actor has shut down, nothing left to publish.
    }
}

impl Default for ExternalEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn sample_event() -> ClusterChangedEvent {
        ClusterChangedEvent {
            cluster_key: ClusterKey(1),
            cluster_size: 2,
            succession: vec![NodeId(1), NodeId(2)],
        }
    }

    #[tokio::test]
    async fn delivers_enqueued_event_to_listener() {
        let publisher = ExternalEventPublisher::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        publisher
            .register(Arc::new(move |_event: &ClusterChangedEvent| {
                seen2.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        publisher.enqueue(sample_event());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registration_order_is_preserved() {
        let publisher = ExternalEventPublisher::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            publisher
                .register(Arc::new(move |_: &ClusterChangedEvent| {
                    order.lock().push(i);
                }))
                .unwrap();
        }

        publisher.enqueue(sample_event());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn registration_rejects_past_max_listeners() {
        let publisher = ExternalEventPublisher::new();
        for _ in 0..MAX_LISTENERS {
            publisher.register(Arc::new(|_: &ClusterChangedEvent| {})).unwrap();
        }
        assert!(publisher.register(Arc::new(|_: &ClusterChangedEvent| {})).is_err());
    }
}
