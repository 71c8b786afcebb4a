use std::sync::Arc;

use shardis_core::ShardId;

/// A single boolean predicate over an entity of type `T`.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// An immutable, composable description of a fan-out query.
///
/// Predicates are ANDed together. An empty `target_shards` list means "all
/// shards"; the executor resolves the concrete shard set at call time.
#[derive(Clone)]
pub struct QueryModel<T> {
    predicates: Vec<Predicate<T>>,
    target_shards: Vec<ShardId>,
}

impl<T> Default for QueryModel<T> {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
            target_shards: Vec::new(),
        }
    }
}

impl<T> QueryModel<T> {
    /// Builds an empty model matching every item on every shard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate, returning the updated model.
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// Restricts the query to an explicit shard set.
    #[must_use]
    pub fn with_target_shards(mut self, shards: Vec<ShardId>) -> Self {
        self.target_shards = shards;
        self
    }

    /// The explicit target shard set, empty meaning "all shards".
    #[must_use]
    pub fn target_shards(&self) -> &[ShardId] {
        &self.target_shards
    }

    /// True if `item` satisfies every predicate.
    #[must_use]
    pub fn matches(&self, item: &T) -> bool {
        self.predicates.iter().all(|p| p(item))
    }

    /// Number of predicates composed into this model.
    #[must_use]
    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_ands_every_predicate() {
        let model = QueryModel::<i32>::new()
            .with_predicate(|x| *x > 0)
            .with_predicate(|x| *x % 2 == 0);

        assert!(model.matches(&4));
        assert!(!model.matches(&3));
        assert!(!model.matches(&-4));
    }

    #[test]
    fn empty_model_matches_everything() {
        let model = QueryModel::<i32>::new();
        assert!(model.matches(&42));
    }
}
