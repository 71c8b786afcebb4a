use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use shardis_core::{
    Canonicalizer, DataMover, Fnv1a64Hasher, JsonCanonicalizer, KeyMove, ShardId, ShardKey,
    ShardisResult, StableHasher, VerificationStrategy,
};
use tokio_util::sync::CancellationToken;

/// An in-memory `shard -> key -> value` table standing in for a real
/// per-shard backing store, used by [`InMemoryDataMover`] and
/// [`ChecksumVerifier`] to exercise the migration core end to end.
pub struct InMemoryShardStore<K, V> {
    shards: DashMap<ShardId, DashMap<ShardKey<K>, V>>,
}

impl<K, V> Default for InMemoryShardStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self { shards: DashMap::new() }
    }
}

impl<K, V> InMemoryShardStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `value` for `key` on `shard_id`, creating the shard's table
    /// if this is its first write.
    pub fn put(&self, shard_id: ShardId, key: ShardKey<K>, value: V) {
        self.shards.entry(shard_id).or_default().insert(key, value);
    }

    /// Reads `key`'s value on `shard_id`, if present.
    #[must_use]
    pub fn get(&self, shard_id: &ShardId, key: &ShardKey<K>) -> Option<V> {
        self.shards.get(shard_id)?.get(key).map(|entry| entry.value().clone())
    }

    /// Number of entries held on `shard_id`.
    #[must_use]
    pub fn shard_len(&self, shard_id: &ShardId) -> usize {
        self.shards.get(shard_id).map(|table| table.len()).unwrap_or(0)
    }
}

#[async_trait]
impl<K, V> DataMover<K> for InMemoryShardStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn copy(&self, mv: &KeyMove<K>, _token: &CancellationToken) -> ShardisResult<()> {
        if let Some(value) = self.get(&mv.source, &mv.key) {
            self.put(mv.target.clone(), mv.key.clone(), value);
        }
        Ok(())
    }
}

/// Checksum-based [`VerificationStrategy`] comparing a [`Canonicalizer`]
/// projection of the source and target copies via a [`StableHasher`].
///
/// The canonicalization pass is what makes the digest meaningful across
/// independently-serialized copies: it fixes object key order and number
/// formatting before the bytes ever reach the hasher, rather than trusting
/// the projection's own `Serialize` impl to be stable.
pub struct ChecksumVerifier<K, V> {
    store: Arc<InMemoryShardStore<K, V>>,
    canonicalizer: JsonCanonicalizer,
    hasher: Fnv1a64Hasher,
}

impl<K, V> ChecksumVerifier<K, V> {
    /// Builds a verifier over `store` using the default JSON canonicalizer
    /// and FNV-1a 64 hasher.
    #[must_use]
    pub fn new(store: Arc<InMemoryShardStore<K, V>>) -> Self {
        Self { store, canonicalizer: JsonCanonicalizer, hasher: Fnv1a64Hasher }
    }

    fn hash_of(&self, value: &V) -> ShardisResult<u64>
    where
        V: Serialize,
    {
        let bytes = self.canonicalizer.to_canonical_utf8(value)?;
        Ok(self.hasher.hash64(&bytes))
    }
}

#[async_trait]
impl<K, V> VerificationStrategy<K> for ChecksumVerifier<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync + Serialize,
{
    async fn verify(&self, mv: &KeyMove<K>, _token: &CancellationToken) -> ShardisResult<bool> {
        let source = self.store.get(&mv.source, &mv.key);
        let target = self.store.get(&mv.target, &mv.key);
        match (source, target) {
            (None, None) => Ok(true),
            (Some(s), Some(t)) => Ok(self.hash_of(&s)? == self.hash_of(&t)?),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: &str) -> ShardKey<String> {
        ShardKey::new(v.to_string())
    }

    fn shard(v: &str) -> ShardId {
        ShardId::new(v).unwrap()
    }

    #[tokio::test]
    async fn copy_is_noop_when_source_entity_is_absent() {
        let store: InMemoryShardStore<String, String> = InMemoryShardStore::new();
        let mv = KeyMove::new(key("missing"), shard("s1"), shard("s2")).unwrap();
        store.copy(&mv, &CancellationToken::new()).await.unwrap();
        assert_eq!(store.shard_len(&shard("s2")), 0);
    }

    #[tokio::test]
    async fn checksum_verify_detects_mismatch_after_concurrent_target_write() {
        let store = Arc::new(InMemoryShardStore::<String, String>::new());
        store.put(shard("s1"), key("k1"), "value-a".to_string());
        store.put(shard("s2"), key("k1"), "value-b".to_string());

        let verifier = ChecksumVerifier::new(store);
        let mv = KeyMove::new(key("k1"), shard("s1"), shard("s2")).unwrap();
        assert!(!verifier.verify(&mv, &CancellationToken::new()).await.unwrap());
    }

    #[tokio::test]
    async fn checksum_verify_succeeds_after_copy() {
        let store = Arc::new(InMemoryShardStore::<String, String>::new());
        store.put(shard("s1"), key("k1"), "value-a".to_string());
        store.copy(
            &KeyMove::new(key("k1"), shard("s1"), shard("s2")).unwrap(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let verifier = ChecksumVerifier::new(store);
        let mv = KeyMove::new(key("k1"), shard("s1"), shard("s2")).unwrap();
        assert!(verifier.verify(&mv, &CancellationToken::new()).await.unwrap());
    }
}
