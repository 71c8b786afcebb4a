use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Direction an [`AdaptivePager`] moved its page size on the most recent
/// batch, used to feed the [`OscillationDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageSizeDecision {
    Grow,
    Shrink,
    Hold,
}

/// Configuration for an [`AdaptivePager`].
#[derive(Debug, Clone)]
pub struct PagingConfig {
    /// Smallest page size the pager will request.
    pub min_page_size: usize,
    /// Largest page size the pager will request.
    pub max_page_size: usize,
    /// Target wall-clock time per batch.
    pub target_batch: Duration,
    /// Multiplicative growth applied when a batch finishes under target.
    pub grow_factor: f64,
    /// Multiplicative shrink applied when a batch finishes over target.
    pub shrink_factor: f64,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            min_page_size: 64,
            max_page_size: 4096,
            target_batch: Duration::from_millis(50),
            grow_factor: 2.0,
            shrink_factor: 0.5,
        }
    }
}

/// Drives page size for backends that expose paged reads rather than a
/// native streaming cursor, adjusting after every batch toward a target
/// per-batch wall-clock time.
pub struct AdaptivePager {
    config: PagingConfig,
    current_page_size: usize,
    oscillation: OscillationDetector,
}

impl AdaptivePager {
    /// Builds a pager starting at `config.min_page_size`.
    #[must_use]
    pub fn new(config: PagingConfig) -> Self {
        let current_page_size = config.min_page_size;
        Self {
            config,
            current_page_size,
            oscillation: OscillationDetector::new(Duration::from_secs(10), 5),
        }
    }

    /// Current page size to request for the next batch.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.current_page_size
    }

    /// Records the elapsed time of the batch just completed and adjusts
    /// `page_size` for the next one. Returns the decision taken, primarily
    /// for tests and diagnostics.
    pub fn record_batch(&mut self, elapsed: Duration) -> PageSizeDecision {
        let decision = if elapsed < self.config.target_batch {
            let grown = ((self.current_page_size as f64) * self.config.grow_factor) as usize;
            let grown = grown.min(self.config.max_page_size);
            if grown > self.current_page_size {
                self.current_page_size = grown;
                PageSizeDecision::Grow
            } else {
                PageSizeDecision::Hold
            }
        } else if elapsed > self.config.target_batch {
            let shrunk =
                ((self.current_page_size as f64) * self.config.shrink_factor) as usize;
            let shrunk = shrunk.max(self.config.min_page_size);
            if shrunk < self.current_page_size {
                self.current_page_size = shrunk;
                PageSizeDecision::Shrink
            } else {
                PageSizeDecision::Hold
            }
        } else {
            PageSizeDecision::Hold
        };

        if decision != PageSizeDecision::Hold {
            self.oscillation.record(Instant::now());
        }

        decision
    }

    /// True if page size decisions have flip-flopped more than the
    /// detector's threshold within its sliding window.
    #[must_use]
    pub fn is_oscillating(&self) -> bool {
        self.oscillation.is_oscillating()
    }
}

/// Flags when an [`AdaptivePager`] is adjusting page size too frequently,
/// a signal that the target batch time is miscalibrated for the backend.
struct OscillationDetector {
    window: Duration,
    threshold: usize,
    decisions: VecDeque<Instant>,
}

impl OscillationDetector {
    fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            decisions: VecDeque::new(),
        }
    }

    fn record(&mut self, at: Instant) {
        self.decisions.push_back(at);
        let cutoff = at.checked_sub(self.window).unwrap_or(at);
        while let Some(front) = self.decisions.front() {
            if *front < cutoff {
                self.decisions.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_oscillating(&self) -> bool {
        self.decisions.len() > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_stays_within_bounds() {
        let mut pager = AdaptivePager::new(PagingConfig {
            min_page_size: 10,
            max_page_size: 100,
            target_batch: Duration::from_millis(50),
            grow_factor: 2.0,
            shrink_factor: 0.5,
        });

        for _ in 0..10 {
            pager.record_batch(Duration::from_millis(1));
            assert!(pager.page_size() <= 100);
        }
        for _ in 0..10 {
            pager.record_batch(Duration::from_millis(500));
            assert!(pager.page_size() >= 10);
        }
    }

    #[test]
    fn grows_once_per_fast_batch() {
        let mut pager = AdaptivePager::new(PagingConfig::default());
        let before = pager.page_size();
        let decision = pager.record_batch(Duration::from_millis(1));
        assert_eq!(decision, PageSizeDecision::Grow);
        assert!(pager.page_size() > before);
    }

    #[test]
    fn detects_oscillation_under_repeated_flip_flop() {
        let mut pager = AdaptivePager::new(PagingConfig::default());
        for i in 0..10 {
            if i % 2 == 0 {
                pager.record_batch(Duration::from_millis(1));
            } else {
                pager.record_batch(Duration::from_secs(1));
            }
        }
        assert!(pager.is_oscillating());
    }
}
