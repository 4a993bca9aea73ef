//! Binary wire codec for the `DATA` message's namespaces payload.
//!
//! ```text
//! namespaces_payload := u32 num_namespaces, namespace_payload × num_namespaces
//! namespace_payload  := char[AS_ID_NAMESPACE_SZ] name (NUL-terminated),
//!                       u32 num_vinfos,
//!                       vinfo_payload × num_vinfos
//! vinfo_payload      := opaque vinfo[VINFO_SIZE],
//!                       u32 num_pids,
//!                       u16 pid × num_pids
//! ```
//!
//! All integers little-endian, structs packed, no padding. This is a
//! hand-packed binary format rather than MsgPack because receivers must
//! validate every offset against the declared buffer length as they parse,
//! and the layout must match byte-for-byte across protocol versions.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::namespace::NamespaceStore;
use super::types::{PartitionId, VInfo, AS_ID_NAMESPACE_SZ, AS_NAMESPACE_SZ, AS_PARTITIONS};

/// One `vinfo_payload` block: a partition version shared by the listed pids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VInfoGroup {
    pub vinfo: VInfo,
    pub pids: Vec<u16>,
}

/// One `namespace_payload` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceData {
    pub name: String,
    pub vinfo_groups: Vec<VInfoGroup>,
}

/// A fully parsed/prepared `namespaces_payload`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespacesPayload {
    pub namespaces: Vec<NamespaceData>,
}

/// Errors produced while validating an inbound payload. Any failure drops
/// the message and mutates no state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload truncated")]
    Truncated,
    #[error("too many namespaces")]
    TooManyNamespaces,
    #[error("namespace name not NUL-terminated within its field")]
    NamespaceNameNotTerminated,
    #[error("too many vinfos in namespace block")]
    TooManyVinfos,
    #[error("too many pids in vinfo block")]
    TooManyPids,
    #[error("pid {pid} out of range")]
    PidOutOfRange { pid: u16 },
    #[error("trailing bytes after last namespace block")]
    TrailingBytes,
}

/// Builds the outgoing payload for the local namespace inventory: for each
/// configured namespace, buckets its partitions by non-null `vinfo`. Bucket
/// iteration order is unspecified by the protocol; this implementation
/// orders by `vinfo` bytes for reproducible tests.
#[must_use]
pub fn build(store: &dyn NamespaceStore) -> NamespacesPayload {
    let mut namespaces = Vec::new();
    for ns in store.namespaces() {
        let mut buckets: BTreeMap<[u8; 16], Vec<u16>> = BTreeMap::new();
        for raw in 0..AS_PARTITIONS {
            let pid = PartitionId::new(raw).expect("raw < AS_PARTITIONS by loop bound");
            let vinfo = ns.partition_version(pid);
            if vinfo.is_null() {
                continue;
            }
            buckets.entry(vinfo.0).or_default().push(raw);
        }
        let vinfo_groups = buckets
            .into_iter()
            .map(|(vinfo, pids)| VInfoGroup {
                vinfo: VInfo(vinfo),
                pids,
            })
            .collect();
        namespaces.push(NamespaceData {
            name: ns.name().to_string(),
            vinfo_groups,
        });
    }
    NamespacesPayload { namespaces }
}

/// Serializes a payload to its wire representation.
#[must_use]
pub fn encode(payload: &NamespacesPayload) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(payload.namespaces.len() as u32)
        .expect("writing to Vec never fails");

    for ns in &payload.namespaces {
        let mut name_field = [0u8; AS_ID_NAMESPACE_SZ];
        let name_bytes = ns.name.as_bytes();
        let copy_len = name_bytes.len().min(AS_ID_NAMESPACE_SZ - 1);
        name_field[..copy_len].copy_from_slice(&name_bytes[..copy_len]);
        out.extend_from_slice(&name_field);

        out.write_u32::<LittleEndian>(ns.vinfo_groups.len() as u32)
            .expect("writing to Vec never fails");

        for group in &ns.vinfo_groups {
            out.extend_from_slice(&group.vinfo.0);
            out.write_u32::<LittleEndian>(group.pids.len() as u32)
                .expect("writing to Vec never fails");
            for &pid in &group.pids {
                out.write_u16::<LittleEndian>(pid)
                    .expect("writing to Vec never fails");
            }
        }
    }

    out
}

/// Parses and validates an inbound payload in one pass: every offset read
/// is bounds-checked against the declared buffer, and the total consumed
/// length must equal `bytes.len()` exactly.
pub fn decode(bytes: &[u8]) -> Result<NamespacesPayload, PayloadError> {
    let mut cursor = Cursor::new(bytes);

    let num_namespaces = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| PayloadError::Truncated)?;
    if num_namespaces as usize > AS_NAMESPACE_SZ {
        return Err(PayloadError::TooManyNamespaces);
    }

    let mut namespaces = Vec::with_capacity(num_namespaces as usize);
    for _ in 0..num_namespaces {
        namespaces.push(decode_namespace(&mut cursor)?);
    }

    if (cursor.position() as usize) != bytes.len() {
        return Err(PayloadError::TrailingBytes);
    }

    Ok(NamespacesPayload { namespaces })
}

fn decode_namespace(cursor: &mut Cursor<&[u8]>) -> Result<NamespaceData, PayloadError> {
    let mut name_field = [0u8; AS_ID_NAMESPACE_SZ];
    cursor
        .read_exact(&mut name_field)
        .map_err(|_| PayloadError::Truncated)?;
    let nul_at = name_field
        .iter()
        .position(|&b| b == 0)
        .ok_or(PayloadError::NamespaceNameNotTerminated)?;
    let name = String::from_utf8_lossy(&name_field[..nul_at]).into_owned();

    let num_vinfos = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| PayloadError::Truncated)?;
    if num_vinfos as usize > AS_PARTITIONS as usize {
        return Err(PayloadError::TooManyVinfos);
    }

    let mut vinfo_groups = Vec::with_capacity(num_vinfos as usize);
    for _ in 0..num_vinfos {
        vinfo_groups.push(decode_vinfo_group(cursor)?);
    }

    Ok(NamespaceData { name, vinfo_groups })
}

fn decode_vinfo_group(cursor: &mut Cursor<&[u8]>) -> Result<VInfoGroup, PayloadError> {
    let mut vinfo = [0u8; 16];
    cursor
        .read_exact(&mut vinfo)
        .map_err(|_| PayloadError::Truncated)?;

    let num_pids = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| PayloadError::Truncated)?;
    if num_pids as usize > AS_PARTITIONS as usize {
        return Err(PayloadError::TooManyPids);
    }

    let mut pids = Vec::with_capacity(num_pids as usize);
    for _ in 0..num_pids {
        let pid = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| PayloadError::Truncated)?;
        if pid >= AS_PARTITIONS {
            return Err(PayloadError::PidOutOfRange { pid });
        }
        pids.push(pid);
    }

    Ok(VInfoGroup {
        vinfo: VInfo(vinfo),
        pids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::namespace::{InMemoryNamespace, InMemoryNamespaceStore};
    use proptest::prelude::*;

    fn sample_payload() -> NamespacesPayload {
        NamespacesPayload {
            namespaces: vec![
                NamespaceData {
                    name: "ns1".to_string(),
                    vinfo_groups: vec![
                        VInfoGroup {
                            vinfo: VInfo([1u8; 16]),
                            pids: vec![0, 1, 2],
                        },
                        VInfoGroup {
                            vinfo: VInfo([2u8; 16]),
                            pids: vec![3],
                        },
                    ],
                },
                NamespaceData {
                    name: "ns2".to_string(),
                    vinfo_groups: vec![],
                },
            ],
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let payload = sample_payload();
        let bytes = encode(&payload);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let payload = sample_payload();
        let mut bytes = encode(&payload);
        bytes.push(0xAA);
        assert_eq!(decode(&bytes), Err(PayloadError::TrailingBytes));
    }

    #[test]
    fn decode_rejects_truncation() {
        let payload = sample_payload();
        let bytes = encode(&payload);
        for len in 0..bytes.len() {
            assert!(decode(&bytes[..len]).is_err(), "len={len} should fail");
        }
    }

    #[test]
    fn decode_rejects_unterminated_name() {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(&[b'x'; AS_ID_NAMESPACE_SZ]); // no NUL
        bytes.write_u32::<LittleEndian>(0).unwrap();
        assert_eq!(
            decode(&bytes),
            Err(PayloadError::NamespaceNameNotTerminated)
        );
    }

    #[test]
    fn decode_rejects_too_many_namespaces() {
        let mut bytes = Vec::new();
        bytes
            .write_u32::<LittleEndian>(AS_NAMESPACE_SZ as u32 + 1)
            .unwrap();
        assert_eq!(decode(&bytes), Err(PayloadError::TooManyNamespaces));
    }

    #[test]
    fn decode_rejects_pid_out_of_range() {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        let mut name_field = [0u8; AS_ID_NAMESPACE_SZ];
        name_field[0] = b'n';
        bytes.extend_from_slice(&name_field);
        bytes.write_u32::<LittleEndian>(1).unwrap(); // num_vinfos
        bytes.extend_from_slice(&[0u8; 16]); // vinfo
        bytes.write_u32::<LittleEndian>(1).unwrap(); // num_pids
        bytes.write_u16::<LittleEndian>(AS_PARTITIONS).unwrap(); // out of range
        assert_eq!(
            decode(&bytes),
            Err(PayloadError::PidOutOfRange { pid: AS_PARTITIONS })
        );
    }

    #[test]
    fn build_omits_null_vinfos() {
        let store = InMemoryNamespaceStore::new();
        let ns = Arc::new(InMemoryNamespace::new("ns1"));
        ns.set_local_version(PartitionId::new(5).unwrap(), VInfo([9u8; 16]));
        store.add_namespace(ns);

        let payload = build(&store);
        assert_eq!(payload.namespaces.len(), 1);
        assert_eq!(payload.namespaces[0].vinfo_groups.len(), 1);
        assert_eq!(payload.namespaces[0].vinfo_groups[0].pids, vec![5]);

        // Building then decoding the encoded form must validate successfully.
        let bytes = encode(&payload);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    fn arb_vinfo() -> impl Strategy<Value = VInfo> {
        prop::array::uniform16(any::<u8>())
            .prop_filter("non-null", |b| b.iter().any(|&x| x != 0))
            .prop_map(VInfo)
    }

    fn arb_namespace() -> impl Strategy<Value = NamespaceData> {
        ("[a-z]{1,8}", prop::collection::vec(arb_vinfo(), 0..4)).prop_map(|(name, vinfos)| {
            let mut next_pid = 0u16;
            let vinfo_groups = vinfos
                .into_iter()
                .map(|vinfo| {
                    let pids = vec![next_pid];
                    next_pid += 1;
                    VInfoGroup { vinfo, pids }
                })
                .collect();
            NamespaceData { name, vinfo_groups }
        })
    }

    proptest! {
        #[test]
        fn roundtrip_prop(namespaces in prop::collection::vec(arb_namespace(), 0..4)) {
            let payload = NamespacesPayload { namespaces };
            let bytes = encode(&payload);
            let decoded = decode(&bytes).unwrap();
            prop_assert_eq!(decoded, payload);
        }

        #[test]
        fn truncation_prop(namespaces in prop::collection::vec(arb_namespace(), 1..4)) {
            let payload = NamespacesPayload { namespaces };
            let bytes = encode(&payload);
            prop_assume!(!bytes.is_empty());
            let cut = bytes.len() - 1;
            prop_assert!(decode(&bytes[..cut]).is_err());
        }

        #[test]
        fn extension_prop(namespaces in prop::collection::vec(arb_namespace(), 0..4), extra in any::<u8>()) {
            let payload = NamespacesPayload { namespaces };
            let mut bytes = encode(&payload);
            bytes.push(extra);
            prop_assert_eq!(decode(&bytes), Err(PayloadError::TrailingBytes));
        }
    }
}
