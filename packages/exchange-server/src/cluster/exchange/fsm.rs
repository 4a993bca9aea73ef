//! The exchange state machine, run as a single actor task. All mutable
//! round state lives in [`ExchangeActor`] and is touched exclusively from
//! inside [`ExchangeActor::run`], which drains events one at a time from
//! its own `mpsc::Receiver` -- the actor model resolution for this
//! subsystem's concurrency (see module docs on the parent `exchange`
//! module for the alternative considered).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use exchange_core::exchange::{payload, ClusterKey, NamespaceStore, NodeId};
use tracing::debug;

use super::backoff;
use super::balancer::PartitionBalancer;
use super::commit::{self, CommittedView};
use super::messages::{sanity_check, ExchangeMessage, ExchangeTransport};
use super::node_state::NodeStateTable;
use super::publisher::{ClusterChangedEvent, ExternalEventPublisher};

/// The four protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Rest,
    Exchanging,
    ReadyToCommit,
    Orphaned,
}

/// The three event sources feeding the actor's inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// A new succession took effect; `cluster_key` is non-`NONE`.
    ClusterChanged {
        succession: Vec<NodeId>,
        cluster_key: ClusterKey,
    },
    /// This node has fallen out of any cluster.
    Orphaned,
    /// One fixed-interval tick.
    Timer,
    /// An inbound protocol message from a peer.
    Msg { from: NodeId, message: ExchangeMessage },
}

/// Owns all mutable exchange-round state for one node.
pub struct ExchangeActor {
    self_id: NodeId,
    hb: Duration,
    t_block: Duration,

    transport: Arc<dyn ExchangeTransport>,
    namespace_store: Arc<dyn NamespaceStore>,
    balancer: Arc<dyn PartitionBalancer>,
    publisher: Arc<ExternalEventPublisher>,
    committed: Arc<ArcSwap<CommittedView>>,

    state: ExchangeState,
    node_states: NodeStateTable,
    succession: Vec<NodeId>,
    cluster_key: ClusterKey,
    /// This node's own payload for the in-progress round, built once at
    /// `ClusterChanged` and reused for every retransmit and for the commit
    /// step (never rebuilt mid-round, so a round sees a single frozen
    /// snapshot of local partition state).
    own_payload: Vec<u8>,

    last_send: Instant,
    rtc_send_ts: Instant,
    orphan_start: Instant,
    orphan_blocked_signaled: bool,
}

impl ExchangeActor {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_id: NodeId,
        hb: Duration,
        t_block: Duration,
        transport: Arc<dyn ExchangeTransport>,
        namespace_store: Arc<dyn NamespaceStore>,
        balancer: Arc<dyn PartitionBalancer>,
        publisher: Arc<ExternalEventPublisher>,
        committed: Arc<ArcSwap<CommittedView>>,
    ) -> Self {
        let now = Instant::now();
        Self {
            self_id,
            hb,
            t_block,
            transport,
            namespace_store,
            balancer,
            publisher,
            committed,
            state: ExchangeState::Orphaned,
            node_states: NodeStateTable::new(),
            succession: Vec::new(),
            cluster_key: ClusterKey::NONE,
            own_payload: Vec::new(),
            last_send: now,
            rtc_send_ts: now,
            orphan_start: now,
            // Initial state is orphaned with transactions already blocked: there
            // is no prior allowed-migrations state to revert from, so the
            // one-time `revert_to_orphan()` signal starts pre-armed rather than
            // firing `t_block` after a cold start. A later `on_orphaned()` from
            // a real cluster membership loss re-arms it for that orphan period.
            orphan_blocked_signaled: true,
        }
    }

    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Drains `rx` until every sender clone is dropped.
    pub async fn run(mut self, mut rx: tokio::sync::mpsc::Receiver<ExchangeEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
    }

    async fn handle_event(&mut self, event: ExchangeEvent) {
        match event {
            ExchangeEvent::ClusterChanged { succession, cluster_key } => {
                self.on_cluster_changed(succession, cluster_key).await;
            }
            ExchangeEvent::Orphaned => self.on_orphaned().await,
            ExchangeEvent::Timer => self.on_timer().await,
            ExchangeEvent::Msg { from, message } => self.on_msg(from, message).await,
        }
    }

    fn is_principal(&self) -> bool {
        self.succession.first() == Some(&self.self_id)
    }

    async fn on_cluster_changed(&mut self, succession: Vec<NodeId>, cluster_key: ClusterKey) {
        let others: Vec<NodeId> = succession
            .iter()
            .copied()
            .filter(|&n| n != self.self_id)
            .collect();

        self.node_states.reset_for_succession(&others);
        self.succession = succession;
        self.cluster_key = cluster_key;
        self.orphan_blocked_signaled = false;

        self.balancer.disallow_migrations().await;

        let built = payload::build(self.namespace_store.as_ref());
        self.own_payload = payload::encode(&built);

        self.last_send = Instant::now();
        self.state = ExchangeState::Exchanging;

        if !others.is_empty() {
            let msg = ExchangeMessage::data(cluster_key, self.own_payload.clone());
            self.transport.send_list(&others, msg).await;
        }

        self.check_completion().await;
    }

    async fn on_orphaned(&mut self) {
        self.succession.clear();
        self.cluster_key = ClusterKey::NONE;
        self.node_states.reset_for_succession(&[]);

        self.balancer.disallow_migrations().await;
        self.balancer.synchronize_migrations().await;

        self.orphan_start = Instant::now();
        self.orphan_blocked_signaled = false;
        self.state = ExchangeState::Orphaned;
    }

    async fn on_timer(&mut self) {
        match self.state {
            ExchangeState::Rest => {}
            ExchangeState::Orphaned => self.on_timer_orphaned().await,
            ExchangeState::Exchanging => self.on_timer_exchanging().await,
            ExchangeState::ReadyToCommit => self.on_timer_ready_to_commit().await,
        }
    }

    async fn on_timer_orphaned(&mut self) {
        if self.orphan_blocked_signaled {
            return;
        }
        if self.orphan_start.elapsed() >= self.t_block {
            self.balancer.revert_to_orphan().await;
            self.orphan_blocked_signaled = true;
        }
    }

    async fn on_timer_exchanging(&mut self) {
        let age = self.last_send.elapsed();
        if age < backoff::timeout(age, self.hb) {
            return;
        }
        let unacked = self.node_states.find_not(|s| s.send_acked);
        if !unacked.is_empty() {
            let msg = ExchangeMessage::data(self.cluster_key, self.own_payload.clone());
            self.transport.send_list(&unacked, msg).await;
        }
        self.last_send = Instant::now();
    }

    async fn on_timer_ready_to_commit(&mut self) {
        if self.is_principal() {
            return;
        }
        let age = self.rtc_send_ts.elapsed();
        if age < backoff::min_to(self.hb) {
            return;
        }
        let Some(&principal) = self.succession.first() else {
            return;
        };
        let msg = ExchangeMessage::ready_to_commit(self.cluster_key);
        let _ = self.transport.send(principal, msg).await;
        self.rtc_send_ts = Instant::now();
    }

    async fn on_msg(&mut self, from: NodeId, message: ExchangeMessage) {
        if !sanity_check(&message, from, self.cluster_key, &self.succession) {
            return;
        }
        match self.state {
            ExchangeState::Orphaned => {
                debug!(from = %from, "exchange: dropping message while orphaned");
            }
            ExchangeState::Exchanging => self.on_msg_exchanging(from, message).await,
            ExchangeState::ReadyToCommit => self.on_msg_ready_to_commit(from, message).await,
            ExchangeState::Rest => self.on_msg_rest(from, message).await,
        }
    }

    async fn on_msg_exchanging(&mut self, from: NodeId, message: ExchangeMessage) {
        match message {
            ExchangeMessage::Data { namespaces_payload, .. } => {
                match payload::decode(&namespaces_payload) {
                    Ok(_) => {
                        let Some(state) = self.node_states.get_mut(from) else {
                            debug!(from = %from, "exchange: DATA from a peer outside the node-state table");
                            return;
                        };
                        if !state.received {
                            state.data.set(&namespaces_payload);
                            state.received = true;
                        }
                        let ack = ExchangeMessage::data_ack(self.cluster_key);
                        let _ = self.transport.send(from, ack).await;
                        self.check_completion().await;
                    }
                    Err(err) => {
                        debug!(from = %from, %err, "exchange: rejecting invalid DATA payload");
                    }
                }
            }
            ExchangeMessage::DataAck { .. } => {
                if let Some(state) = self.node_states.get_mut(from) {
                    state.send_acked = true;
                }
                self.check_completion().await;
            }
            other => {
                debug!(from = %from, message = ?other, "exchange: ignoring message while exchanging");
            }
        }
    }

    async fn on_msg_ready_to_commit(&mut self, from: NodeId, message: ExchangeMessage) {
        match message {
            ExchangeMessage::Data { .. } => {
                // Our earlier DATA_ACK to this peer must have been lost.
                let ack = ExchangeMessage::data_ack(self.cluster_key);
                let _ = self.transport.send(from, ack).await;
            }
            ExchangeMessage::ReadyToCommit { .. } => {
                if !self.is_principal() {
                    debug!(from = %from, "exchange: non-principal ignoring READY_TO_COMMIT");
                    return;
                }
                if let Some(state) = self.node_states.get_mut(from) {
                    state.is_ready_to_commit = true;
                }
                self.maybe_commit().await;
            }
            ExchangeMessage::Commit { .. } => {
                if self.succession.first() == Some(&from) {
                    self.do_commit().await;
                } else {
                    debug!(from = %from, "exchange: ignoring COMMIT from a non-principal");
                }
            }
            other => {
                debug!(from = %from, message = ?other, "exchange: ignoring message while ready to commit");
            }
        }
    }

    async fn on_msg_rest(&mut self, from: NodeId, message: ExchangeMessage) {
        if let ExchangeMessage::ReadyToCommit { .. } = message {
            if self.is_principal() {
                let msg = ExchangeMessage::commit(self.cluster_key);
                let _ = self.transport.send(from, msg).await;
            }
        }
    }

    async fn check_completion(&mut self) {
        if self.state != ExchangeState::Exchanging {
            return;
        }
        if !self.node_states.find_not(|s| s.send_acked).is_empty() {
            return;
        }
        if !self.node_states.find_not(|s| s.received).is_empty() {
            return;
        }

        self.state = ExchangeState::ReadyToCommit;
        self.rtc_send_ts = Instant::now();

        if self.is_principal() {
            self.maybe_commit().await;
        } else if let Some(&principal) = self.succession.first() {
            let msg = ExchangeMessage::ready_to_commit(self.cluster_key);
            let _ = self.transport.send(principal, msg).await;
        }
    }

    async fn maybe_commit(&mut self) {
        if !self.is_principal() {
            return;
        }
        if !self.node_states.find_not(|s| s.is_ready_to_commit).is_empty() {
            return;
        }

        let others: Vec<NodeId> = self
            .succession
            .iter()
            .copied()
            .filter(|&n| n != self.self_id)
            .collect();
        if !others.is_empty() {
            let msg = ExchangeMessage::commit(self.cluster_key);
            self.transport.send_list(&others, msg).await;
        }
        self.do_commit().await;
    }

    async fn do_commit(&mut self) {
        let mut payloads: HashMap<NodeId, Vec<u8>> = HashMap::with_capacity(self.succession.len());
        payloads.insert(self.self_id, self.own_payload.clone());
        for node in self.node_states.nodes() {
            if let Some(state) = self.node_states.get(node) {
                payloads.insert(node, state.data.as_slice().to_vec());
            }
        }

        let view = commit::run(
            self.namespace_store.as_ref(),
            &self.succession,
            self.cluster_key,
            &payloads,
            self.balancer.as_ref(),
        )
        .await;

        self.committed.store(Arc::new(view.clone()));
        self.publisher.enqueue(ClusterChangedEvent {
            cluster_key: view.cluster_key,
            cluster_size: view.cluster_size,
            succession: view.succession,
        });
        self.state = ExchangeState::Rest;
    }
}
