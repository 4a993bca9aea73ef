//! Partition balancer contract: the migration-control hooks the exchange
//! actor drives around a round. Implemented by an external membership and
//! migration component this protocol only consumes.

use async_trait::async_trait;

use super::CommittedView;

/// Migration control driven by the exchange actor at specific points in a
/// round. All methods are async since real implementations coordinate with
/// the storage layer and may need to wait on in-flight migrations.
#[async_trait]
pub trait PartitionBalancer: Send + Sync {
    /// Freezes new partition migrations before a round's payload is built.
    async fn disallow_migrations(&self);

    /// Waits for in-flight migrations to settle before a round proceeds.
    async fn synchronize_migrations(&self);

    /// Applies `view` once a round has committed: recomputes ownership and
    /// resumes migrations as appropriate.
    async fn balance(&self, view: &CommittedView);

    /// Invoked once, when an orphan period exceeds its block threshold:
    /// signals client transactions should be rejected until rejoining.
    async fn revert_to_orphan(&self);

    /// Invoked once at actor startup, before any round has happened.
    async fn init(&self);
}

/// A balancer that counts calls and otherwise does nothing, for tests.
#[cfg(test)]
pub mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{async_trait, CommittedView, PartitionBalancer};

    #[derive(Debug, Default)]
    pub struct NoopBalancer {
        pub disallow_calls: AtomicUsize,
        pub synchronize_calls: AtomicUsize,
        pub balance_calls: AtomicUsize,
        pub revert_calls: AtomicUsize,
        pub init_calls: AtomicUsize,
    }

    impl NoopBalancer {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn revert_count(&self) -> usize {
            self.revert_calls.load(Ordering::SeqCst)
        }

        #[must_use]
        pub fn balance_count(&self) -> usize {
            self.balance_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PartitionBalancer for NoopBalancer {
        async fn disallow_migrations(&self) {
            self.disallow_calls.fetch_add(1, Ordering::SeqCst);
        }

        async fn synchronize_migrations(&self) {
            self.synchronize_calls.fetch_add(1, Ordering::SeqCst);
        }

        async fn balance(&self, _view: &CommittedView) {
            self.balance_calls.fetch_add(1, Ordering::SeqCst);
        }

        async fn revert_to_orphan(&self) {
            self.revert_calls.fetch_add(1, Ordering::SeqCst);
        }

        async fn init(&self) {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}
