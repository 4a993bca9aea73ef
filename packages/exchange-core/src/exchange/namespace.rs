//! Namespace store: the local inventory of per-partition versions, queried
//! to build outgoing payloads, and mutated by the commit engine to record
//! the agreed per-namespace succession and per-(slot, partition) versions.

use std::sync::Arc;

use parking_lot::RwLock;

use super::types::{NodeId, PartitionId, VInfo, AS_PARTITIONS};

/// A single configured namespace's partition inventory and committed
/// succession/version tables.
pub trait NamespaceHandle: Send + Sync {
    /// The namespace's configured name.
    fn name(&self) -> &str;

    /// This node's local version of partition `pid` in this namespace.
    fn partition_version(&self, pid: PartitionId) -> VInfo;

    /// Records that `node` holds committed slot `slot` in this namespace's
    /// succession.
    fn set_succession_slot(&self, slot: usize, node: NodeId);

    /// Records the committed version of `pid` for succession slot `slot`.
    fn set_cluster_version(&self, slot: usize, pid: PartitionId, vinfo: VInfo);

    /// Sets the number of members represented in this namespace's succession.
    fn set_cluster_size(&self, n: u32);

    /// The number of members represented in this namespace's succession.
    fn cluster_size(&self) -> u32;
}

/// Read-only access to the set of locally configured namespaces.
pub trait NamespaceStore: Send + Sync {
    /// All namespaces configured on this node.
    fn namespaces(&self) -> Vec<Arc<dyn NamespaceHandle>>;
}

struct InMemoryNamespaceInner {
    succession: Vec<NodeId>,
    cluster_versions: Vec<Vec<VInfo>>,
    cluster_size: u32,
}

/// A namespace backed by plain in-process vectors, the default and
/// test-facing `NamespaceStore` implementation.
pub struct InMemoryNamespace {
    name: String,
    partitions: RwLock<Vec<VInfo>>,
    committed: RwLock<InMemoryNamespaceInner>,
}

impl InMemoryNamespace {
    /// Creates a namespace with every partition at the null version.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: RwLock::new(vec![VInfo::NULL; AS_PARTITIONS as usize]),
            committed: RwLock::new(InMemoryNamespaceInner {
                succession: Vec::new(),
                cluster_versions: Vec::new(),
                cluster_size: 0,
            }),
        }
    }

    /// Test/setup helper: assigns this node's local version for `pid`.
    pub fn set_local_version(&self, pid: PartitionId, vinfo: VInfo) {
        self.partitions.write()[pid.get() as usize] = vinfo;
    }

    /// The committed succession as of the last commit.
    #[must_use]
    pub fn committed_succession(&self) -> Vec<NodeId> {
        self.committed.read().succession.clone()
    }

    /// The committed version of `pid` for succession slot `slot`.
    #[must_use]
    pub fn committed_version(&self, slot: usize, pid: PartitionId) -> VInfo {
        self.committed.read().cluster_versions[slot][pid.get() as usize]
    }
}

impl NamespaceHandle for InMemoryNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    fn partition_version(&self, pid: PartitionId) -> VInfo {
        self.partitions.read()[pid.get() as usize]
    }

    fn set_succession_slot(&self, slot: usize, node: NodeId) {
        let mut inner = self.committed.write();
        if inner.succession.len() <= slot {
            inner.succession.resize(slot + 1, NodeId(0));
        }
        inner.succession[slot] = node;
        if inner.cluster_versions.len() <= slot {
            inner
                .cluster_versions
                .resize_with(slot + 1, || vec![VInfo::NULL; AS_PARTITIONS as usize]);
        }
    }

    fn set_cluster_version(&self, slot: usize, pid: PartitionId, vinfo: VInfo) {
        let mut inner = self.committed.write();
        if inner.cluster_versions.len() <= slot {
            inner
                .cluster_versions
                .resize_with(slot + 1, || vec![VInfo::NULL; AS_PARTITIONS as usize]);
        }
        inner.cluster_versions[slot][pid.get() as usize] = vinfo;
    }

    fn set_cluster_size(&self, n: u32) {
        self.committed.write().cluster_size = n;
    }

    fn cluster_size(&self) -> u32 {
        self.committed.read().cluster_size
    }
}

/// `NamespaceStore` over a fixed, statically configured set of in-memory
/// namespaces.
pub struct InMemoryNamespaceStore {
    namespaces: RwLock<Vec<Arc<InMemoryNamespace>>>,
}

impl InMemoryNamespaceStore {
    /// An empty store; namespaces are added via [`Self::add_namespace`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(Vec::new()),
        }
    }

    /// Registers a locally configured namespace.
    pub fn add_namespace(&self, namespace: Arc<InMemoryNamespace>) {
        self.namespaces.write().push(namespace);
    }
}

impl Default for InMemoryNamespaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceStore for InMemoryNamespaceStore {
    fn namespaces(&self) -> Vec<Arc<dyn NamespaceHandle>> {
        self.namespaces
            .read()
            .iter()
            .cloned()
            .map(|ns| ns as Arc<dyn NamespaceHandle>)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_grows_succession_and_versions_lazily() {
        let ns = InMemoryNamespace::new("ns1");
        let pid = PartitionId::new(3).unwrap();

        ns.set_succession_slot(0, NodeId(0x1));
        ns.set_cluster_version(0, pid, VInfo([7u8; 16]));
        ns.set_cluster_size(1);

        assert_eq!(ns.committed_succession(), vec![NodeId(0x1)]);
        assert_eq!(ns.committed_version(0, pid), VInfo([7u8; 16]));
        assert_eq!(ns.cluster_size(), 1);
    }

    #[test]
    fn store_returns_registered_namespaces() {
        let store = InMemoryNamespaceStore::new();
        store.add_namespace(Arc::new(InMemoryNamespace::new("ns1")));
        store.add_namespace(Arc::new(InMemoryNamespace::new("ns2")));

        let names: Vec<_> = store.namespaces().iter().map(|n| n.name().to_string()).collect();
        assert_eq!(names, vec!["ns1".to_string(), "ns2".to_string()]);
    }
}
