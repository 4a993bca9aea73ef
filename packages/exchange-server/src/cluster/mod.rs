//! Cluster protocol module.
//!
//! Holds the data exchange subsystem: the state machine, message layer, and
//! commit engine that disseminate per-namespace partition-version info after
//! a membership change. Membership election, partition assignment, and
//! migration themselves are external collaborators this subsystem consumes
//! through the `PartitionBalancer` boundary, not reimplemented here.

pub mod exchange;

// ---------------------------------------------------------------------------
// Re-exports — flat public API
// ---------------------------------------------------------------------------

pub use exchange::{
    spawn as spawn_exchange, ClusterChangedEvent, CommittedView as ExchangeCommittedView,
    ExchangeConfig, ExchangeHandle, ExchangeMessage, ExchangeTransport, ExchangeWorkers,
    ExternalEventPublisher, MembershipEvent as ExchangeMembershipEvent, PartitionBalancer,
    SuccessionList,
};
