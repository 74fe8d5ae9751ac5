//! Batch Runner — bounded, windowed fan-out with inter-window pacing.
//!
//! ```text
//! items: [a b c d e | f g h i j | k l]      width = 5
//!         └─ join_all ─┘ sleep └─ join_all ─┘ sleep └ join_all ┘
//! ```
//!
//! Every item in a window is polled concurrently on the calling task and the
//! window is awaited until all of them settle. The next window never starts
//! before that, so peak concurrency equals the width. A failing item is counted
//! and never short-circuits its window or the windows after it.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use scout_core::Result;
use serde::Serialize;

/// What a successful dispatch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler was invoked.
    Dispatched,
    /// The dispatch decided not to invoke the handler (no quota, no sandbox).
    Skipped,
}

/// How rejected items are reported. Rejections are always counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Count the failure and drop the reason.
    CountOnly,
    /// Count the failure and log the reason at warn.
    LogAndCount,
}

/// Aggregate counts for one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub items: usize,
    pub windows: usize,
    /// Settled successfully, including skipped.
    pub fulfilled: usize,
    pub skipped: usize,
    pub rejected: usize,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.items == 0
    }
}

/// Processes a sequence of items in fixed-size concurrent windows.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    label: &'static str,
    width: usize,
    delay: Duration,
    policy: FailurePolicy,
}

impl BatchRunner {
    /// A width of 0 is clamped to 1; config validation rejects it earlier.
    pub fn new(label: &'static str, width: usize, delay: Duration) -> Self {
        Self {
            label,
            width: width.max(1),
            delay,
            policy: FailurePolicy::LogAndCount,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Dispatch every item exactly once, `width` at a time.
    ///
    /// Sleeps `delay` between windows, not after the last one. An empty
    /// sequence performs no dispatch and no sleep.
    pub async fn drain<'a, T, F, Fut>(&self, items: &'a [T], dispatch: F) -> DrainReport
    where
        T: Debug,
        F: Fn(&'a T) -> Fut,
        Fut: Future<Output = Result<Outcome>>,
    {
        let mut report = DrainReport {
            items: items.len(),
            ..Default::default()
        };
        let total_windows = items.len().div_ceil(self.width);

        for (index, window) in items.chunks(self.width).enumerate() {
            let results = join_all(window.iter().map(&dispatch)).await;

            let mut succeeded = 0;
            let mut failed = 0;
            for (item, result) in window.iter().zip(results) {
                match result {
                    Ok(Outcome::Dispatched) => succeeded += 1,
                    Ok(Outcome::Skipped) => {
                        succeeded += 1;
                        report.skipped += 1;
                    }
                    Err(e) => {
                        failed += 1;
                        if self.policy == FailurePolicy::LogAndCount {
                            tracing::warn!("[Daily Cron] {} item {:?} failed: {e}", self.label, item);
                        }
                    }
                }
            }
            report.windows += 1;
            report.fulfilled += succeeded;
            report.rejected += failed;

            tracing::info!(
                "[Daily Cron] {} batch {}/{} completed. Success: {}, Failed: {}",
                self.label,
                index + 1,
                total_windows,
                succeeded,
                failed
            );

            if index + 1 < total_windows && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::ScoutError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    const SECOND: Duration = Duration::from_millis(1000);

    fn dispatched() -> Result<Outcome> {
        Ok(Outcome::Dispatched)
    }

    /// Group dispatch start offsets into windows by whole second.
    fn window_sizes(starts: &[Duration]) -> Vec<usize> {
        let mut sizes: Vec<usize> = Vec::new();
        let mut current: Option<u64> = None;
        for start in starts {
            let bucket = start.as_secs();
            if current == Some(bucket) {
                if let Some(last) = sizes.last_mut() {
                    *last += 1;
                }
            } else {
                sizes.push(1);
                current = Some(bucket);
            }
        }
        sizes
    }

    #[tokio::test(start_paused = true)]
    async fn test_twelve_items_width_five_runs_three_windows() {
        let items: Vec<u32> = (0..12).collect();
        let starts = Mutex::new(Vec::new());
        let starts_ref = &starts;
        let begin = Instant::now();

        let runner = BatchRunner::new("Scheduled tasks", 5, SECOND);
        let report = runner
            .drain(&items, move |_| async move {
                starts_ref.lock().unwrap().push(begin.elapsed());
                dispatched()
            })
            .await;

        assert_eq!(report.windows, 3);
        assert_eq!(report.fulfilled, 12);
        assert_eq!(window_sizes(&starts.lock().unwrap()), vec![5, 5, 2]);
        // Two inter-window delays, none after the last window.
        assert_eq!(begin.elapsed(), 2 * SECOND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_item_dispatched_exactly_once() {
        let items: Vec<usize> = (0..23).collect();
        let seen = Mutex::new(Vec::new());
        let seen_ref = &seen;

        let report = BatchRunner::new("test", 4, SECOND)
            .drain(&items, move |item| async move {
                seen_ref.lock().unwrap().push(*item);
                dispatched()
            })
            .await;

        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, items);
        assert_eq!(report.windows, 6);
        assert_eq!(report.items, 23);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_is_noop() {
        let items: Vec<u32> = Vec::new();
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;
        let begin = Instant::now();

        let report = BatchRunner::new("test", 5, SECOND)
            .drain(&items, move |_| async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                dispatched()
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report, DrainReport::default());
        assert!(report.is_empty());
        assert_eq!(begin.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_isolated() {
        let items: Vec<u32> = (0..7).collect();
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;

        let report = BatchRunner::new("test", 3, SECOND)
            .drain(&items, move |item| async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                if *item == 1 {
                    Err(ScoutError::Other("boom".into()))
                } else {
                    dispatched()
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 7);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.fulfilled, 6);
        assert_eq!(report.fulfilled + report.rejected, report.items);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peak_concurrency_bounded_by_width() {
        let items: Vec<u32> = (0..10).collect();
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let log = Mutex::new(Vec::new());
        let (in_flight_ref, peak_ref, log_ref) = (&in_flight, &peak, &log);

        BatchRunner::new("test", 3, SECOND)
            .drain(&items, move |item| async move {
                let now = in_flight_ref.fetch_add(1, Ordering::SeqCst) + 1;
                peak_ref.fetch_max(now, Ordering::SeqCst);
                log_ref.lock().unwrap().push(("start", *item));
                // Later items in a window finish first.
                tokio::time::sleep(Duration::from_millis(100 - u64::from(*item))).await;
                log_ref.lock().unwrap().push(("end", *item));
                in_flight_ref.fetch_sub(1, Ordering::SeqCst);
                dispatched()
            })
            .await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);

        // No item of window k+1 starts before every item of window k ended.
        let log = log.into_inner().unwrap();
        for (pos, (kind, item)) in log.iter().enumerate() {
            if *kind != "start" {
                continue;
            }
            let window = item / 3;
            for earlier in 0..window * 3 {
                let ended = log[..pos].iter().any(|e| *e == ("end", earlier));
                assert!(ended, "item {item} started before item {earlier} settled");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_counts_as_fulfilled() {
        let items = vec![0u64, 3, 0, 7];
        let report = BatchRunner::new("test", 10, SECOND)
            .with_policy(FailurePolicy::CountOnly)
            .drain(&items, |quota| async move {
                if *quota == 0 {
                    Ok(Outcome::Skipped)
                } else {
                    dispatched()
                }
            })
            .await;

        assert_eq!(report.fulfilled, 4);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.rejected, 0);
        assert_eq!(report.windows, 1);
    }

    #[test]
    fn test_zero_width_clamped() {
        assert_eq!(BatchRunner::new("test", 0, SECOND).width(), 1);
    }
}
