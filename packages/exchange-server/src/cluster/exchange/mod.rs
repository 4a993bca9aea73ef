//! The cluster data exchange protocol: after every membership change, every
//! node disseminates its per-namespace partition versions to the rest of
//! the succession and the group converges on a single committed view.
//!
//! Concurrency: all mutable round state is owned by one [`fsm::ExchangeActor`]
//! task that drains a single `mpsc::Receiver<ExchangeEvent>` sequentially.
//! The alternative considered was a coarse `Mutex<ExchangeState>` guarding
//! the same fields from multiple call sites; the actor was chosen because
//! the protocol is inherently a sequential conversation (one state, three
//! event sources, never two events truly concurrent against the same
//! state) and an actor makes that sequencing the type system's job rather
//! than a locking discipline call sites have to uphold by convention, the
//! same tradeoff `ClusterChannels` makes for membership dispatch.

pub mod backoff;
pub mod balancer;
pub mod commit;
pub mod fsm;
pub mod messages;
pub mod node_state;
pub mod publisher;
pub mod timer;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use exchange_core::exchange::{ClusterKey, NamespaceStore, NodeId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use balancer::PartitionBalancer;
pub use commit::CommittedView;
pub use fsm::{ExchangeActor, ExchangeEvent, ExchangeState};
pub use messages::{sanity_check, ExchangeMessage, ExchangeTransport, TransportError};
pub use node_state::NodeStateTable;
pub use publisher::{ClusterChangedEvent, ClusterChangedListener, ExternalEventPublisher, TooManyListeners};

/// Default inbox capacity before a handle's `send` starts to exert
/// backpressure on the caller.
const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Tunables for one node's exchange actor.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Cluster heartbeat interval; drives the `DATA` retransmit backoff and
    /// the fixed `READY_TO_COMMIT` retransmit cadence.
    pub heartbeat_interval: Duration,
    /// Membership-detector quantum; `orphan_block_timeout` is derived from
    /// this times [`exchange_core::exchange::ORPHAN_BLOCK_INTERVALS`],
    /// rounded up to the next 5 second boundary.
    pub quantum_interval: Duration,
    /// Event inbox capacity.
    pub inbox_capacity: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(1000),
            quantum_interval: Duration::from_millis(1000),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

impl ExchangeConfig {
    /// How long an orphaned node tolerates missing a cluster before it
    /// blocks client transactions, rounded up to the next 5 second mark.
    #[must_use]
    pub fn orphan_block_timeout(&self) -> Duration {
        let raw_ms = self.quantum_interval.as_millis() as u64
            * u64::from(exchange_core::exchange::ORPHAN_BLOCK_INTERVALS);
        const ROUND_MS: u64 = 5_000;
        let rounded = raw_ms.div_ceil(ROUND_MS) * ROUND_MS;
        Duration::from_millis(rounded)
    }
}

/// Ordered succession list, newtype'd for a stable `Display` used in logs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SuccessionList(pub Vec<NodeId>);

impl fmt::Display for SuccessionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, node) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{node}")?;
        }
        write!(f, "]")
    }
}

/// The cluster-membership input this subsystem reacts to; produced by the
/// membership/failure-detection layer, outside this module's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// A new succession with a fresh cluster key took effect.
    Changed {
        succession: Vec<NodeId>,
        cluster_key: ClusterKey,
    },
    /// This node is no longer a member of any cluster.
    Orphaned,
}

/// A cheaply cloneable front door onto a running exchange actor: read
/// access to the last committed view, plus event submission.
#[derive(Clone)]
pub struct ExchangeHandle {
    committed: Arc<ArcSwap<CommittedView>>,
    events_tx: mpsc::Sender<ExchangeEvent>,
}

impl ExchangeHandle {
    /// The cluster key of the last committed round.
    #[must_use]
    pub fn committed_cluster_key(&self) -> ClusterKey {
        self.committed.load().cluster_key
    }

    /// The cluster size of the last committed round.
    #[must_use]
    pub fn committed_cluster_size(&self) -> u32 {
        self.committed.load().cluster_size
    }

    /// The principal of the last committed round, if any.
    #[must_use]
    pub fn committed_principal(&self) -> Option<NodeId> {
        self.committed.load().principal
    }

    /// The succession of the last committed round.
    #[must_use]
    pub fn committed_succession(&self) -> SuccessionList {
        SuccessionList(self.committed.load().succession.clone())
    }

    /// Submits a membership event to the actor.
    pub async fn on_membership_event(&self, event: MembershipEvent) {
        let mapped = match event {
            MembershipEvent::Changed { succession, cluster_key } => {
                ExchangeEvent::ClusterChanged { succession, cluster_key }
            }
            MembershipEvent::Orphaned => ExchangeEvent::Orphaned,
        };
        let _ = self.events_tx.send(mapped).await;
    }

    /// Submits an inbound protocol message from `from`.
    pub async fn deliver(&self, from: NodeId, message: ExchangeMessage) {
        let _ = self.events_tx.send(ExchangeEvent::Msg { from, message }).await;
    }
}

/// The background tasks backing an [`ExchangeHandle`]: the actor loop and
/// the timer driver. `abort` is a hard stop, matching the terminate path
/// other services in this crate expose alongside a graceful drain.
pub struct ExchangeWorkers {
    actor: JoinHandle<()>,
    timer: JoinHandle<()>,
}

impl ExchangeWorkers {
    /// Aborts both background tasks immediately.
    pub fn abort(&self) {
        self.actor.abort();
        self.timer.abort();
    }

    /// Waits for the actor task to finish after its inbox has been
    /// allowed to close (every [`ExchangeHandle`] clone dropped).
    pub async fn join_actor(self) {
        self.timer.abort();
        let _ = self.actor.await;
    }
}

/// Builds and spawns one node's exchange actor and timer driver.
pub fn spawn(
    self_id: NodeId,
    config: ExchangeConfig,
    namespace_store: Arc<dyn NamespaceStore>,
    balancer: Arc<dyn PartitionBalancer>,
    transport: Arc<dyn ExchangeTransport>,
    publisher: Arc<ExternalEventPublisher>,
) -> (ExchangeHandle, ExchangeWorkers) {
    let committed = Arc::new(ArcSwap::from_pointee(CommittedView::none()));
    let (tx, rx) = mpsc::channel(config.inbox_capacity);

    let actor = ExchangeActor::new(
        self_id,
        config.heartbeat_interval,
        config.orphan_block_timeout(),
        transport,
        namespace_store,
        balancer,
        publisher,
        committed.clone(),
    );
    let actor_handle = tokio::spawn(actor.run(rx));
    let timer_handle = timer::spawn(tx.clone());

    (
        ExchangeHandle {
            committed,
            events_tx: tx,
        },
        ExchangeWorkers {
            actor: actor_handle,
            timer: timer_handle,
        },
    )
}
