use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ShardisError, ShardisResult};

/// Opaque, non-empty identifier for a physical shard.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    /// Creates a `ShardId` from any string-like value.
    ///
    /// # Errors
    ///
    /// Returns [`ShardisError::PlanInvalid`] if `value` is empty.
    pub fn new(value: impl Into<String>) -> ShardisResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(ShardisError::plan_invalid("shard id must not be empty"));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ShardId> for String {
    fn from(value: ShardId) -> Self {
        value.0
    }
}

/// A logical key owned by exactly one shard at any instant.
///
/// `K` must be a value that can be canonically hashed: strings, integers
/// and UUIDs are the expected instantiations.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardKey<K>(K);

impl<K> ShardKey<K> {
    /// Wraps a value as a shard key.
    pub fn new(value: K) -> Self {
        Self(value)
    }

    /// Returns a reference to the wrapped value.
    pub fn value(&self) -> &K {
        &self.0
    }

    /// Consumes the key, returning the wrapped value.
    pub fn into_value(self) -> K {
        self.0
    }
}

/// An assignment of a [`ShardKey`] to the [`ShardId`] that currently owns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMap<K> {
    /// The assigned key.
    pub key: ShardKey<K>,
    /// The shard that owns `key`.
    pub shard_id: ShardId,
}

impl<K> ShardMap<K> {
    /// Builds a new assignment pair.
    pub fn new(key: ShardKey<K>, shard_id: ShardId) -> Self {
        Self { key, shard_id }
    }
}

/// An authoritative, point-in-time view of every key-to-shard assignment.
///
/// Built either from [`crate::traits::AssignmentStore::enumerate`] or
/// computed algorithmically by a caller planning a rebalance.
#[derive(Clone, Debug, Default)]
pub struct TopologySnapshot<K>
where
    K: Ord + Clone,
{
    assignments: BTreeMap<ShardKey<K>, ShardId>,
}

impl<K> TopologySnapshot<K>
where
    K: Ord + Clone,
{
    /// Builds an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            assignments: BTreeMap::new(),
        }
    }

    /// Builds a snapshot from an iterator of assignments.
    pub fn from_assignments(iter: impl IntoIterator<Item = ShardMap<K>>) -> Self {
        let mut assignments = BTreeMap::new();
        for map in iter {
            assignments.insert(map.key, map.shard_id);
        }
        Self { assignments }
    }

    /// Inserts or replaces an assignment.
    pub fn insert(&mut self, key: ShardKey<K>, shard_id: ShardId) {
        self.assignments.insert(key, shard_id);
    }

    /// Returns the shard owning `key`, if any.
    pub fn get(&self, key: &ShardKey<K>) -> Option<&ShardId> {
        self.assignments.get(key)
    }

    /// Iterates over every assignment in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ShardKey<K>, &ShardId)> {
        self.assignments.iter()
    }

    /// Number of assignments held by the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// True when the snapshot holds no assignments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Converts a value into a canonical, stable byte representation for hashing.
///
/// Implementors must be pure: no randomness, wall-clock reads, or
/// locale-sensitive formatting, so the same logical value always produces
/// the same bytes across processes and releases.
pub trait Canonicalize {
    /// Returns the canonical UTF-8 (or raw binary) byte representation.
    fn to_canonical_bytes(&self) -> Vec<u8>;
}

impl Canonicalize for String {
    fn to_canonical_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Canonicalize for &str {
    fn to_canonical_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Canonicalize for i64 {
    fn to_canonical_bytes(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}

impl Canonicalize for u64 {
    fn to_canonical_bytes(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}

impl Canonicalize for uuid::Uuid {
    fn to_canonical_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// A stable 32-bit hash used to place entries on the [`HashRing`].
///
/// The default implementation, [`Sha256RingHasher`], truncates a SHA-256
/// digest; [`Fnv1aRingHasher`] is provided as a lighter-weight alternative
/// for hot paths that do not need cryptographic hashing.
pub trait RingHasher: Send + Sync {
    /// Hashes `bytes` to a 32-bit ring position.
    fn hash32(&self, bytes: &[u8]) -> u32;
}

/// Default ring hasher: first four bytes of a SHA-256 digest, big-endian.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256RingHasher;

impl RingHasher for Sha256RingHasher {
    fn hash32(&self, bytes: &[u8]) -> u32 {
        let digest = Sha256::digest(bytes);
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

/// FNV-1a ring hasher, cheaper than SHA-256 for high-throughput routing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fnv1aRingHasher;

impl RingHasher for Fnv1aRingHasher {
    fn hash32(&self, bytes: &[u8]) -> u32 {
        const FNV_OFFSET: u32 = 0x811c_9dc5;
        const FNV_PRIME: u32 = 0x0100_0193;
        let mut hash = FNV_OFFSET;
        for byte in bytes {
            hash ^= u32::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
}

/// A stable 64-bit hasher used by the migration executor's checksum
/// verification strategy. Distinct from [`RingHasher`] because verification
/// hashes canonicalized entity projections, not keys.
pub trait StableHasher: Send + Sync {
    /// Hashes `bytes` to a stable 64-bit digest.
    fn hash64(&self, bytes: &[u8]) -> u64;
}

/// FNV-1a 64-bit variant, the default [`StableHasher`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Fnv1a64Hasher;

impl StableHasher for Fnv1a64Hasher {
    fn hash64(&self, bytes: &[u8]) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = FNV_OFFSET;
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
}

/// An immutable consistent-hash ring over a fixed set of shards.
///
/// Constructed once per [`crate::traits::Router`] instance from the set of
/// known shard ids, a replication factor, and a [`RingHasher`]. Lookup is
/// `O(log n)` in the number of ring entries (`shards.len() * replication`).
#[derive(Debug)]
pub struct HashRing {
    /// Ring entries sorted ascending by hash; ties are broken by shard id
    /// so that `successor` is a total function.
    entries: Vec<(u32, ShardId)>,
}

impl HashRing {
    /// Builds a ring from `shard_ids`, replicating each id `replication`
    /// times via `hasher(shard_id + "#" + replica_index)`.
    ///
    /// # Errors
    ///
    /// Returns [`ShardisError::PlanInvalid`] if `shard_ids` is empty or
    /// `replication` is zero.
    pub fn build(
        shard_ids: &[ShardId],
        replication: u32,
        hasher: &dyn RingHasher,
    ) -> ShardisResult<Self> {
        if shard_ids.is_empty() {
            return Err(ShardisError::plan_invalid("hash ring requires at least one shard"));
        }
        if replication == 0 {
            return Err(ShardisError::plan_invalid("replication factor must be at least 1"));
        }

        let mut entries = Vec::with_capacity(shard_ids.len() * replication as usize);
        for shard_id in shard_ids {
            for replica in 0..replication {
                let label = format!("{shard_id}#{replica}");
                let hash = hasher.hash32(label.as_bytes());
                entries.push((hash, shard_id.clone()));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(Self { entries })
    }

    /// Returns the shard owning `key_hash`, wrapping around the ring.
    ///
    /// # Panics
    ///
    /// Never panics: a successfully built ring always has at least one
    /// entry.
    #[must_use]
    pub fn successor(&self, key_hash: u32) -> &ShardId {
        match self.entries.partition_point(|(hash, _)| *hash < key_hash) {
            idx if idx < self.entries.len() => &self.entries[idx].1,
            _ => &self.entries[0].1,
        }
    }

    /// Number of virtual-node entries on the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the ring holds no entries (never true for a ring built via
    /// [`HashRing::build`]).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_lookup_is_stable_for_unchanged_topology() {
        let shards = vec![
            ShardId::new("s1").unwrap(),
            ShardId::new("s2").unwrap(),
            ShardId::new("s3").unwrap(),
        ];
        let ring = HashRing::build(&shards, 100, &Sha256RingHasher).unwrap();
        let hasher = Sha256RingHasher;
        let key_hash = hasher.hash32(b"alpha");
        let first = ring.successor(key_hash).clone();
        for _ in 0..50 {
            assert_eq!(ring.successor(key_hash), &first);
        }
    }

    #[test]
    fn ring_rejects_empty_shard_list() {
        let shards: Vec<ShardId> = vec![];
        let err = HashRing::build(&shards, 100, &Sha256RingHasher).unwrap_err();
        assert!(matches!(err, ShardisError::PlanInvalid { .. }));
    }

    #[test]
    fn fnv1a_ring_hasher_is_deterministic() {
        let hasher = Fnv1aRingHasher;
        assert_eq!(hasher.hash32(b"alpha"), hasher.hash32(b"alpha"));
    }

    #[test]
    fn topology_snapshot_tracks_latest_assignment() {
        let mut snapshot: TopologySnapshot<String> = TopologySnapshot::new();
        let key = ShardKey::new("k1".to_string());
        snapshot.insert(key.clone(), ShardId::new("s1").unwrap());
        snapshot.insert(key.clone(), ShardId::new("s2").unwrap());
        assert_eq!(snapshot.get(&key).unwrap().as_str(), "s2");
        assert_eq!(snapshot.len(), 1);
    }
}
