use shardis_core::{KeyMove, MigrationPlan, ShardisResult, TopologySnapshot};

/// Tuning for [`MigrationPlanner::plan_segmented`].
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Number of enumerated assignments diffed per independently-planned
    /// segment before the partial plans are merged.
    pub segment_size: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { segment_size: 10_000 }
    }
}

/// Diffs two [`TopologySnapshot`]s into a deterministic [`MigrationPlan`].
pub struct MigrationPlanner;

impl MigrationPlanner {
    /// Emits one [`KeyMove`] for every key present in `to` whose assigned
    /// shard differs from `from`.
    ///
    /// Keys present in `to` but absent from `from` have no source shard to
    /// move data from, so fresh placement is out of scope for a relocation
    /// plan; they are skipped rather than failing the whole diff.
    pub fn plan<K>(from: &TopologySnapshot<K>, to: &TopologySnapshot<K>) -> ShardisResult<MigrationPlan<K>>
    where
        K: Ord + Clone,
    {
        let mut moves = Vec::new();
        for (key, target) in to.iter() {
            let Some(source) = from.get(key) else {
                tracing::debug!("skipping fresh-placement key with no prior assignment");
                continue;
            };
            if source != target {
                moves.push(KeyMove::new(key.clone(), source.clone(), target.clone())?);
            }
        }
        MigrationPlan::new(moves)
    }

    /// Diffs `from` against `to` in independently-planned segments of
    /// `config.segment_size` assignments, merging the partial move lists
    /// before the final, globally ordered and deduplicated plan is built.
    ///
    /// Segmenting bounds the working set diffed at once when `from` is
    /// built from a very large enumeration; [`MigrationPlan::new`] still
    /// performs the final ordering and duplicate-key validation over the
    /// merged result.
    pub fn plan_segmented<K>(
        from: &TopologySnapshot<K>,
        to: &TopologySnapshot<K>,
        config: PlannerConfig,
    ) -> ShardisResult<MigrationPlan<K>>
    where
        K: Ord + Clone,
    {
        let mut moves = Vec::new();
        let mut segment = TopologySnapshot::new();
        let mut segment_len = 0usize;

        for (key, target) in to.iter() {
            segment.insert(key.clone(), target.clone());
            segment_len += 1;
            if segment_len >= config.segment_size {
                moves.extend(Self::plan(from, &segment)?.moves().iter().cloned());
                segment = TopologySnapshot::new();
                segment_len = 0;
            }
        }
        if segment_len > 0 {
            moves.extend(Self::plan(from, &segment)?.moves().iter().cloned());
        }

        MigrationPlan::new(moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardis_core::{ShardId, ShardKey};

    fn shard(v: &str) -> ShardId {
        ShardId::new(v).unwrap()
    }

    fn key(v: &str) -> ShardKey<String> {
        ShardKey::new(v.to_string())
    }

    #[test]
    fn plan_emits_move_only_for_relocated_keys() {
        let mut from = TopologySnapshot::new();
        from.insert(key("a"), shard("s1"));
        from.insert(key("b"), shard("s1"));

        let mut to = TopologySnapshot::new();
        to.insert(key("a"), shard("s2"));
        to.insert(key("b"), shard("s1"));

        let plan = MigrationPlanner::plan(&from, &to).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.moves()[0].key, key("a"));
        assert_eq!(plan.moves()[0].target, shard("s2"));
    }

    #[test]
    fn plan_skips_keys_with_no_prior_assignment() {
        let from = TopologySnapshot::new();
        let mut to = TopologySnapshot::new();
        to.insert(key("new"), shard("s1"));

        let plan = MigrationPlanner::plan(&from, &to).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn segmented_plan_matches_unsegmented_plan() {
        let mut from = TopologySnapshot::new();
        let mut to = TopologySnapshot::new();
        for i in 0..25 {
            let k = key(&format!("k{i}"));
            from.insert(k.clone(), shard("s1"));
            to.insert(k, shard(if i % 2 == 0 { "s2" } else { "s1" }));
        }

        let direct = MigrationPlanner::plan(&from, &to).unwrap();
        let segmented =
            MigrationPlanner::plan_segmented(&from, &to, PlannerConfig { segment_size: 7 }).unwrap();

        let mut direct_keys: Vec<_> = direct.moves().iter().map(|m| m.key.clone()).collect();
        let mut segmented_keys: Vec<_> = segmented.moves().iter().map(|m| m.key.clone()).collect();
        direct_keys.sort();
        segmented_keys.sort();
        assert_eq!(direct_keys, segmented_keys);
    }
}
