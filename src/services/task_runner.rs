//! Bounded-concurrency execution of a phase's units of work.
//!
//! Every reconciliation phase hands its collection (chunks, events, hashes)
//! to [`run_bounded`], which keeps at most `concurrency` units in flight and
//! drives a progress bar. Results come back in completion order; callers
//! must key their writes by item identity, not by position.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};

use crate::cli::output::progress::create_progress_bar;

/// Cooperative cancellation signal shared between phases and the runner.
///
/// Raising the flag stops further unit submission; units already in flight
/// run to completion. Replaces hard process termination on severe
/// divergence.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Raise the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run `f` over `items` with at most `concurrency` units in flight,
/// reporting progress under `label`. Output order is completion order.
pub async fn run_bounded<T, R, F, Fut>(
    label: &str,
    items: Vec<T>,
    concurrency: usize,
    f: F,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    run_bounded_cancellable(label, items, concurrency, &CancelFlag::default(), f).await
}

/// Like [`run_bounded`], but stops submitting new units once `cancel` is
/// raised. Units already in flight still complete and their results are
/// returned.
pub async fn run_bounded_cancellable<T, R, F, Fut>(
    label: &str,
    items: Vec<T>,
    concurrency: usize,
    cancel: &CancelFlag,
    f: F,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let bar = create_progress_bar(items.len() as u64, label);
    let results = stream::iter(items)
        .take_while(|_| future::ready(!cancel.is_cancelled()))
        .map(|item| {
            let fut = f(item);
            let bar = &bar;
            async move {
                let out = fut.await;
                bar.inc(1);
                out
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;
    bar.finish_and_clear();
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn runs_every_item() {
        let results = run_bounded("test", (0..100).collect(), 8, |n| async move { n * 2 }).await;
        assert_eq!(results.len(), 100);
        assert_eq!(results.iter().sum::<i32>(), (0..100).map(|n| n * 2).sum::<i32>());
    }

    #[tokio::test]
    async fn respects_the_concurrency_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        run_bounded("test", (0..50).collect::<Vec<i32>>(), 4, |_| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn pre_raised_flag_submits_nothing() {
        let cancel = CancelFlag::default();
        cancel.cancel();
        let ran = Arc::new(AtomicUsize::new(0));

        let results = run_bounded_cancellable("test", vec![1, 2, 3], 2, &cancel, |_| {
            let ran = Arc::clone(&ran);
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(results.is_empty());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn raising_mid_run_stops_further_submission() {
        let cancel = CancelFlag::default();
        let ran = Arc::new(AtomicUsize::new(0));

        // Concurrency 1 makes submission strictly sequential, so cancelling
        // in the first unit leaves the rest unsubmitted.
        let flag = cancel.clone();
        let results = run_bounded_cancellable("test", (0..10).collect::<Vec<i32>>(), 1, &cancel, |n| {
            let ran = Arc::clone(&ran);
            let flag = flag.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    flag.cancel();
                }
            }
        })
        .await;

        assert_eq!(results.len(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
