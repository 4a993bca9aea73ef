//! Cluster data exchange protocol: data model, wire codec, and namespace
//! inventory shared by the runtime-layer implementation in
//! `exchange-server::cluster::exchange`.
//!
//! This crate only holds the pure, runtime-independent pieces (types, codec,
//! namespace store); the state machine, message layer, and commit engine
//! live in `exchange-server` alongside the rest of the cluster subsystem,
//! since they depend on `tokio`.

pub mod namespace;
pub mod payload;
pub mod types;

pub use namespace::{InMemoryNamespace, InMemoryNamespaceStore, NamespaceHandle, NamespaceStore};
pub use payload::{build, decode, encode, NamespaceData, NamespacesPayload, PayloadError, VInfoGroup};
pub use types::{
    ClusterKey, NodeId, PartitionId, PayloadBuffer, PerPeerState, VInfo,
    AS_EXCHANGE_CLUSTER_MAX_SIZE_SOFT, AS_EXCHANGE_UNIQUE_VINFO_MAX_SIZE_SOFT, AS_ID_NAMESPACE_SZ,
    AS_NAMESPACE_SZ, AS_PARTITIONS, DATA_TIMEOUT_MAX_MS, DATA_TIMEOUT_MIN_MS,
    ORPHAN_BLOCK_INTERVALS, PROTOCOL_IDENTIFIER, TIMER_TICK_MS, VINFO_SIZE,
};
