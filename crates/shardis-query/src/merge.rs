use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::pin::Pin;

use futures::future::join_all;
use futures::{Stream, StreamExt};
use shardis_core::{FailureStrategy, ShardisError, ShardisResult};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tokio_util::sync::CancellationToken;

use crate::source::ItemStream;

/// Either end of a bounded-or-unbounded channel, chosen once per merge call
/// based on the configured `channel_capacity`.
enum MergeSender<T> {
    Bounded(mpsc::Sender<ShardisResult<T>>),
    Unbounded(mpsc::UnboundedSender<ShardisResult<T>>),
}

impl<T> MergeSender<T> {
    async fn send(&self, item: ShardisResult<T>) -> bool {
        match self {
            Self::Bounded(tx) => tx.send(item).await.is_ok(),
            Self::Unbounded(tx) => tx.send(item).is_ok(),
        }
    }
}

fn make_channel<T: Send + 'static>(
    channel_capacity: Option<usize>,
) -> (MergeSender<T>, ItemStream<T>) {
    match channel_capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (MergeSender::Bounded(tx), Box::pin(ReceiverStream::new(rx)))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                MergeSender::Unbounded(tx),
                Box::pin(UnboundedReceiverStream::new(rx)),
            )
        }
    }
}

fn aggregate_error(errors: &[String]) -> ShardisError {
    ShardisError::storage(format!(
        "every targeted shard failed: {}",
        errors.join("; ")
    ))
}

/// Merges `streams` in arrival order onto a single output stream.
///
/// A single reader drains a channel fed by one writer task per shard.
/// Bounded channels (`channel_capacity = Some(n)`) provide backpressure;
/// `None` is unbounded. Under [`FailureStrategy::FailFast`] the first shard
/// error is forwarded immediately. Under [`FailureStrategy::BestEffort`]
/// per-shard errors are swallowed and enumeration continues on the
/// remaining shards; only if every shard fails without producing a single
/// item is an aggregate error raised.
pub fn merge_unordered<T>(
    streams: Vec<ItemStream<T>>,
    channel_capacity: Option<usize>,
    failure_strategy: FailureStrategy,
    token: CancellationToken,
) -> ItemStream<T>
where
    T: Send + 'static,
{
    let (tx, output) = make_channel(channel_capacity);
    let tx = std::sync::Arc::new(tx);

    tokio::spawn(async move {
        let shard_count = streams.len();
        let produced = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let errors = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::with_capacity(shard_count);
        for (idx, mut stream) in streams.into_iter().enumerate() {
            let tx = tx.clone();
            let produced = produced.clone();
            let errors = errors.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    if token.is_cancelled() {
                        return;
                    }
                    match stream.next().await {
                        Some(Ok(item)) => {
                            produced.store(true, std::sync::atomic::Ordering::SeqCst);
                            if !tx.send(Ok(item)).await {
                                return;
                            }
                        }
                        Some(Err(e)) => match failure_strategy {
                            FailureStrategy::FailFast => {
                                let _ = tx.send(Err(e)).await;
                                token.cancel();
                                return;
                            }
                            FailureStrategy::BestEffort => {
                                errors.lock().await.push(format!("shard[{idx}]: {e}"));
                                return;
                            }
                        },
                        None => return,
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        if failure_strategy == FailureStrategy::BestEffort
            && !produced.load(std::sync::atomic::Ordering::SeqCst)
        {
            let errors = errors.lock().await;
            if !errors.is_empty() {
                let _ = tx.send(Err(aggregate_error(&errors))).await;
            }
        }
    });

    output
}

/// A heap entry pairing a merge key with the shard it came from.
///
/// `descending` is denormalized onto every entry in a single merge call so
/// `Ord` can flip the primary comparison while always tie-breaking by
/// ascending shard index, independent of sort direction.
struct HeapEntry<K, T> {
    key: K,
    shard_index: usize,
    descending: bool,
    payload: T,
}

impl<K: Ord, T> PartialEq for HeapEntry<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord, T> Eq for HeapEntry<K, T> {}

impl<K: Ord, T> PartialOrd for HeapEntry<K, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, T> Ord for HeapEntry<K, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        let key_order = if self.descending {
            self.key.cmp(&other.key)
        } else {
            other.key.cmp(&self.key)
        };
        key_order.then_with(|| other.shard_index.cmp(&self.shard_index))
    }
}

/// Merges `streams`, each already locally ordered by `key_fn`, into a
/// single globally ordered output stream via a streaming k-way merge.
///
/// The first element of every source is prefetched concurrently so the
/// merge's first emission does not wait on the slowest source's full
/// per-item latency more than once. Ties are broken by ascending shard
/// index for a stable cross-shard order.
pub fn merge_ordered<T, K, F>(
    streams: Vec<ItemStream<T>>,
    key_fn: F,
    descending: bool,
    channel_capacity: Option<usize>,
    failure_strategy: FailureStrategy,
    token: CancellationToken,
) -> ItemStream<T>
where
    T: Send + 'static,
    K: Ord + Send + 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    let (tx, output) = make_channel(channel_capacity);

    tokio::spawn(async move {
        let mut streams = streams;
        let mut produced_any = false;
        let mut errors: Vec<String> = Vec::new();

        let firsts = join_all(streams.iter_mut().map(StreamExt::next)).await;
        let mut heap: BinaryHeap<HeapEntry<K, T>> = BinaryHeap::new();

        for (idx, first) in firsts.into_iter().enumerate() {
            match first {
                Some(Ok(value)) => {
                    let key = key_fn(&value);
                    heap.push(HeapEntry {
                        key,
                        shard_index: idx,
                        descending,
                        payload: value,
                    });
                }
                Some(Err(e)) => match failure_strategy {
                    FailureStrategy::FailFast => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                    FailureStrategy::BestEffort => errors.push(format!("shard[{idx}]: {e}")),
                },
                None => {}
            }
        }

        loop {
            if token.is_cancelled() {
                break;
            }
            let Some(top) = heap.pop() else { break };
            let idx = top.shard_index;
            produced_any = true;
            if !tx.send(Ok(top.payload)).await {
                return;
            }

            match streams[idx].next().await {
                Some(Ok(value)) => {
                    let key = key_fn(&value);
                    heap.push(HeapEntry {
                        key,
                        shard_index: idx,
                        descending,
                        payload: value,
                    });
                }
                Some(Err(e)) => match failure_strategy {
                    FailureStrategy::FailFast => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                    FailureStrategy::BestEffort => errors.push(format!("shard[{idx}]: {e}")),
                },
                None => {}
            }
        }

        if failure_strategy == FailureStrategy::BestEffort && !produced_any && !errors.is_empty() {
            let _ = tx.send(Err(aggregate_error(&errors))).await;
        }
    });

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ok_stream<T: Send + 'static>(items: Vec<T>) -> ItemStream<T> {
        Box::pin(futures::stream::iter(items.into_iter().map(Ok)))
    }

    fn delayed_stream<T: Send + 'static>(items: Vec<(T, u64)>) -> ItemStream<T>
    where
        T: Clone,
    {
        Box::pin(async_stream_from(items))
    }

    fn async_stream_from<T: Send + 'static>(
        items: Vec<(T, u64)>,
    ) -> impl Stream<Item = ShardisResult<T>> + Send {
        futures::stream::unfold(items.into_iter(), |mut iter| async move {
            let (value, delay_ms) = iter.next()?;
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Some((Ok(value), iter))
        })
    }

    #[tokio::test]
    async fn unordered_merge_yields_union_multiset() {
        let a = ok_stream(vec![1, 2]);
        let b = ok_stream(vec![3, 4, 5]);
        let merged = merge_unordered(
            vec![a, b],
            None,
            FailureStrategy::FailFast,
            CancellationToken::new(),
        );

        let mut items: Vec<i32> = merged
            .filter_map(|r| async move { r.ok() })
            .collect()
            .await;
        items.sort_unstable();
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn ordered_merge_interleaves_by_key() {
        let s1 = delayed_stream(vec![(1, 10), (4, 10), (7, 10)]);
        let s2 = delayed_stream(vec![(2, 10), (3, 10), (5, 10), (6, 10)]);

        let merged = merge_ordered(
            vec![s1, s2],
            |v: &i32| *v,
            false,
            None,
            FailureStrategy::FailFast,
            CancellationToken::new(),
        );

        let items: Vec<i32> = merged.filter_map(|r| async move { r.ok() }).collect().await;
        assert_eq!(items, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn ordered_merge_prefetches_heads_concurrently() {
        let slow_first = delayed_stream(vec![(2, 200), (3, 10)]);
        let fast_first = delayed_stream(vec![(1, 10), (4, 10)]);

        let start = std::time::Instant::now();
        let merged = merge_ordered(
            vec![slow_first, fast_first],
            |v: &i32| *v,
            false,
            None,
            FailureStrategy::FailFast,
            CancellationToken::new(),
        );

        let mut stream = merged;
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, 1);
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn best_effort_swallows_errors_unless_all_shards_fail() {
        let good = ok_stream(vec![1, 2]);
        let bad: ItemStream<i32> =
            Box::pin(futures::stream::iter(vec![Err(ShardisError::storage("boom"))]));

        let merged = merge_unordered(
            vec![good, bad],
            None,
            FailureStrategy::BestEffort,
            CancellationToken::new(),
        );
        let items: Vec<i32> = merged.filter_map(|r| async move { r.ok() }).collect().await;
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn best_effort_raises_aggregate_when_every_shard_fails() {
        let bad1: ItemStream<i32> =
            Box::pin(futures::stream::iter(vec![Err(ShardisError::storage("one"))]));
        let bad2: ItemStream<i32> =
            Box::pin(futures::stream::iter(vec![Err(ShardisError::storage("two"))]));

        let mut merged = merge_unordered(
            vec![bad1, bad2],
            None,
            FailureStrategy::BestEffort,
            CancellationToken::new(),
        );
        let result = merged.next().await.unwrap();
        assert!(result.is_err());
    }
}
