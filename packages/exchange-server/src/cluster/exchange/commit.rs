//! Commit engine: applies a round's accepted payloads to the namespace
//! store and produces the new committed view. Kept free of `ExchangeActor`
//! so it can be exercised directly in tests.

use std::collections::HashMap;

use exchange_core::exchange::{payload, ClusterKey, NamespaceStore, NodeId, PartitionId};

use super::balancer::PartitionBalancer;

/// The cluster-wide view published once a round commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedView {
    pub cluster_key: ClusterKey,
    pub cluster_size: u32,
    pub principal: Option<NodeId>,
    pub succession: Vec<NodeId>,
}

impl CommittedView {
    /// The view before any cluster has ever been joined.
    #[must_use]
    pub fn none() -> Self {
        Self {
            cluster_key: ClusterKey::NONE,
            cluster_size: 0,
            principal: None,
            succession: Vec::new(),
        }
    }
}

impl Default for CommittedView {
    fn default() -> Self {
        Self::none()
    }
}

/// Applies every succession member's accepted payload (including this
/// node's own) to `namespace_store` in succession order, then asks
/// `balancer` to rebalance against the result.
///
/// `payloads` must contain an entry for every member of `succession`;
/// a missing entry means a round was committed without every member's
/// `DATA` having been accepted, which the completion check is supposed to
/// make impossible.
pub async fn run(
    namespace_store: &dyn NamespaceStore,
    succession: &[NodeId],
    cluster_key: ClusterKey,
    payloads: &HashMap<NodeId, Vec<u8>>,
    balancer: &dyn PartitionBalancer,
) -> CommittedView {
    let namespaces = namespace_store.namespaces();

    for ns in &namespaces {
        ns.set_cluster_size(0);
    }

    let mut slots: HashMap<String, u32> = HashMap::new();

    for &node in succession {
        let bytes = payloads
            .get(&node)
            .unwrap_or_else(|| panic!("commit: missing accepted payload for succession member {node}"));
        let decoded = payload::decode(bytes)
            .unwrap_or_else(|err| panic!("commit: payload for {node} failed to decode: {err}"));

        for block in &decoded.namespaces {
            let Some(ns) = namespaces.iter().find(|n| n.name() == block.name) else {
                tracing::warn!(namespace = %block.name, node = %node, "commit: dropping block for unconfigured namespace");
                continue;
            };

            let slot = *slots.get(block.name.as_str()).unwrap_or(&0);
            ns.set_succession_slot(slot as usize, node);
            for group in &block.vinfo_groups {
                for &raw_pid in &group.pids {
                    let pid = PartitionId::new(raw_pid)
                        .unwrap_or_else(|| panic!("commit: pid {raw_pid} out of range after decode validation"));
                    ns.set_cluster_version(slot as usize, pid, group.vinfo);
                }
            }
            ns.set_cluster_size(slot + 1);
            slots.insert(block.name.clone(), slot + 1);
        }
    }

    let view = CommittedView {
        cluster_key,
        cluster_size: succession.len() as u32,
        principal: succession.first().copied(),
        succession: succession.to_vec(),
    };

    balancer.balance(&view).await;

    view
}
