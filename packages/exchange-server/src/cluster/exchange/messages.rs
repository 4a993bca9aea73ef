//! Exchange protocol message kinds, sanity checking, and the transport
//! contract messages are sent over.

use async_trait::async_trait;
use exchange_core::exchange::{ClusterKey, NodeId, PROTOCOL_IDENTIFIER};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The five protocol message kinds, `#[serde(tag = "type")]`-tagged for
/// wire transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeMessage {
    /// Carries this sender's encoded namespaces payload (see
    /// `exchange_core::exchange::payload`).
    Data {
        protocol_id: u32,
        cluster_key: ClusterKey,
        namespaces_payload: Vec<u8>,
    },
    /// Acknowledges a previously received `Data`.
    DataAck {
        protocol_id: u32,
        cluster_key: ClusterKey,
    },
    /// Reserved, never constructed by this implementation.
    DataNack {
        protocol_id: u32,
        cluster_key: ClusterKey,
    },
    /// Sent by a non-principal once its round is complete.
    ReadyToCommit {
        protocol_id: u32,
        cluster_key: ClusterKey,
    },
    /// Broadcast by the principal once every peer is ready.
    Commit {
        protocol_id: u32,
        cluster_key: ClusterKey,
    },
}

impl ExchangeMessage {
    /// The message's declared protocol identifier.
    #[must_use]
    pub fn protocol_id(&self) -> u32 {
        match self {
            Self::Data { protocol_id, .. }
            | Self::DataAck { protocol_id, .. }
            | Self::DataNack { protocol_id, .. }
            | Self::ReadyToCommit { protocol_id, .. }
            | Self::Commit { protocol_id, .. } => *protocol_id,
        }
    }

    /// The sender's current cluster key as carried on the message.
    #[must_use]
    pub fn cluster_key(&self) -> ClusterKey {
        match self {
            Self::Data { cluster_key, .. }
            | Self::DataAck { cluster_key, .. }
            | Self::DataNack { cluster_key, .. }
            | Self::ReadyToCommit { cluster_key, .. }
            | Self::Commit { cluster_key, .. } => *cluster_key,
        }
    }

    /// Builds a `Data` message carrying this node's current cluster key and
    /// an already-encoded namespaces payload.
    #[must_use]
    pub fn data(cluster_key: ClusterKey, namespaces_payload: Vec<u8>) -> Self {
        Self::Data {
            protocol_id: PROTOCOL_IDENTIFIER,
            cluster_key,
            namespaces_payload,
        }
    }

    /// Builds a `DataAck` message.
    #[must_use]
    pub fn data_ack(cluster_key: ClusterKey) -> Self {
        Self::DataAck {
            protocol_id: PROTOCOL_IDENTIFIER,
            cluster_key,
        }
    }

    /// Builds a `ReadyToCommit` message.
    #[must_use]
    pub fn ready_to_commit(cluster_key: ClusterKey) -> Self {
        Self::ReadyToCommit {
            protocol_id: PROTOCOL_IDENTIFIER,
            cluster_key,
        }
    }

    /// Builds a `Commit` message.
    #[must_use]
    pub fn commit(cluster_key: ClusterKey) -> Self {
        Self::Commit {
            protocol_id: PROTOCOL_IDENTIFIER,
            cluster_key,
        }
    }
}

/// Validates an inbound message against the four sanity checks in one pass.
/// Any failure means "drop silently" -- callers only log and discard.
pub fn sanity_check(
    msg: &ExchangeMessage,
    from: NodeId,
    current_cluster_key: ClusterKey,
    succession: &[NodeId],
) -> bool {
    if msg.protocol_id() != PROTOCOL_IDENTIFIER {
        debug!(from = %from, protocol_id = msg.protocol_id(), "exchange message: protocol mismatch");
        return false;
    }
    if !succession.contains(&from) {
        debug!(from = %from, "exchange message: sender not in current succession");
        return false;
    }
    if current_cluster_key.is_none() || current_cluster_key != msg.cluster_key() {
        debug!(
            from = %from,
            current = %current_cluster_key,
            message = %msg.cluster_key(),
            "exchange message: cluster key mismatch"
        );
        return false;
    }
    true
}

/// Errors returned by [`ExchangeTransport`] sends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport queue full")]
    QueueFull,
}

/// The external message transport (§6 of the protocol's design). Sends are
/// fire-and-forget: a queueing failure is reported once and never retried at
/// this layer -- retransmission is the state machine's job.
#[async_trait]
pub trait ExchangeTransport: Send + Sync {
    /// Sends `msg` to a single destination.
    async fn send(&self, dest: NodeId, msg: ExchangeMessage) -> Result<(), TransportError>;

    /// Sends `msg` to every destination in `dests`, returning a per-destination result.
    async fn send_list(
        &self,
        dests: &[NodeId],
        msg: ExchangeMessage,
    ) -> Vec<(NodeId, Result<(), TransportError>)> {
        let mut results = Vec::with_capacity(dests.len());
        for &dest in dests {
            results.push((dest, self.send(dest, msg.clone()).await));
        }
        results
    }
}
