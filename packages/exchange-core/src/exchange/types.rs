//! Shared data model for the cluster data exchange protocol.
//!
//! Core identifiers (`NodeId`, `ClusterKey`, `PartitionId`, `VInfo`) and the
//! per-peer protocol state carried in the node-state table.

/// Soft cap on cluster size; a sizing hint only, never enforced as a hard limit.
pub const AS_EXCHANGE_CLUSTER_MAX_SIZE_SOFT: usize = 200;

/// Soft cap on unique vinfos per namespace per round; a sizing hint only.
pub const AS_EXCHANGE_UNIQUE_VINFO_MAX_SIZE_SOFT: usize = 200;

/// Number of partitions per namespace.
pub const AS_PARTITIONS: u16 = 4096;

/// Fixed width, NUL-terminated namespace identifier field.
pub const AS_ID_NAMESPACE_SZ: usize = 32;

/// Maximum number of configured namespaces.
pub const AS_NAMESPACE_SZ: usize = 32;

/// Byte width of an opaque partition version value.
pub const VINFO_SIZE: usize = 16;

/// Wire protocol identifier; messages carrying any other value are rejected.
pub const PROTOCOL_IDENTIFIER: u32 = 1;

/// Timer tick interval, in milliseconds.
pub const TIMER_TICK_MS: u64 = 75;

/// Floor on the `DATA` retransmit timeout.
pub const DATA_TIMEOUT_MIN_MS: u64 = 75;

/// Ceiling on the `DATA` retransmit timeout.
pub const DATA_TIMEOUT_MAX_MS: u64 = 30_000;

/// Number of membership quanta an orphaned node tolerates before blocking
/// client transactions.
pub const ORPHAN_BLOCK_INTERVALS: u32 = 5;

/// Opaque 64-bit cluster epoch identifier. Value `0` means "no cluster".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ClusterKey(pub u64);

impl ClusterKey {
    /// The sentinel value meaning "not a member of any cluster".
    pub const NONE: ClusterKey = ClusterKey(0);

    /// Returns `true` for the "no cluster" sentinel.
    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl std::fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// 64-bit cluster member identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Partition index within a namespace, valid in `[0, AS_PARTITIONS)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(u16);

impl PartitionId {
    /// Builds a `PartitionId`, rejecting values outside `[0, AS_PARTITIONS)`.
    #[must_use]
    pub fn new(raw: u16) -> Option<Self> {
        if raw < AS_PARTITIONS {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// The underlying partition index.
    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }
}

/// Opaque partition version value. All-zero means "null" and is never
/// transmitted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VInfo(pub [u8; VINFO_SIZE]);

impl VInfo {
    /// The distinguished "no version" value.
    pub const NULL: VInfo = VInfo([0u8; VINFO_SIZE]);

    /// Returns `true` for the all-zero sentinel.
    #[must_use]
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl Default for VInfo {
    fn default() -> Self {
        Self::NULL
    }
}

/// A growable payload buffer whose capacity is rounded up to 1 KiB
/// multiples and retained across rounds, avoiding reallocation churn during
/// a storm of cluster changes.
#[derive(Debug, Clone, Default)]
pub struct PayloadBuffer {
    buf: Vec<u8>,
    size: usize,
}

const CAPACITY_ROUND: usize = 1024;

impl PayloadBuffer {
    /// An empty buffer with no backing allocation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently considered valid (`0..size`); the rest of `buf`'s
    /// capacity is retained, not logically part of the content.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.size]
    }

    /// Number of valid bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Replaces the contents with `data`, growing the backing buffer by
    /// rounding up to the next 1 KiB multiple if needed. Never shrinks
    /// capacity.
    pub fn set(&mut self, data: &[u8]) {
        if self.buf.len() < data.len() {
            let rounded = data.len().div_ceil(CAPACITY_ROUND) * CAPACITY_ROUND;
            self.buf.resize(rounded, 0);
        }
        self.buf[..data.len()].copy_from_slice(data);
        self.size = data.len();
    }

    /// Resets `size` to zero without releasing the backing allocation.
    pub fn clear(&mut self) {
        self.size = 0;
    }
}

/// Per-peer protocol progress, one entry per member of the current
/// succession.
#[derive(Debug, Clone, Default)]
pub struct PerPeerState {
    /// This node's `DATA` send to the peer has been acked.
    pub send_acked: bool,
    /// A validated `DATA` payload has been received from the peer this round.
    pub received: bool,
    /// Meaningful only at the principal: the peer has signalled
    /// `READY_TO_COMMIT`.
    pub is_ready_to_commit: bool,
    /// The peer's most recently received, validated payload.
    pub data: PayloadBuffer,
}

impl PerPeerState {
    /// Resets protocol flags and payload size for a new round, retaining the
    /// backing buffer's capacity.
    pub fn reset(&mut self) {
        self.send_acked = false;
        self.received = false;
        self.is_ready_to_commit = false;
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_key_none_is_zero() {
        assert!(ClusterKey::NONE.is_none());
        assert!(!ClusterKey(1).is_none());
    }

    #[test]
    fn partition_id_bounds() {
        assert!(PartitionId::new(0).is_some());
        assert!(PartitionId::new(AS_PARTITIONS - 1).is_some());
        assert!(PartitionId::new(AS_PARTITIONS).is_none());
    }

    #[test]
    fn vinfo_null_is_all_zero() {
        assert!(VInfo::NULL.is_null());
        assert!(VInfo::default().is_null());
        let mut nonzero = VInfo::NULL;
        nonzero.0[0] = 1;
        assert!(!nonzero.is_null());
    }

    #[test]
    fn payload_buffer_rounds_capacity_and_retains_it() {
        let mut buf = PayloadBuffer::new();
        buf.set(&[1, 2, 3]);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        assert_eq!(buf.size(), 3);

        buf.clear();
        assert_eq!(buf.size(), 0);
        assert_eq!(buf.as_slice(), &[] as &[u8]);

        // Re-set with a smaller payload; backing capacity must not shrink.
        buf.set(&[9]);
        assert_eq!(buf.as_slice(), &[9]);
    }

    #[test]
    fn per_peer_state_reset_clears_flags_keeps_capacity() {
        let mut state = PerPeerState::default();
        state.send_acked = true;
        state.received = true;
        state.is_ready_to_commit = true;
        state.data.set(&[1, 2, 3, 4]);

        state.reset();
        assert!(!state.send_acked);
        assert!(!state.received);
        assert!(!state.is_ready_to_commit);
        assert_eq!(state.data.size(), 0);
    }
}
