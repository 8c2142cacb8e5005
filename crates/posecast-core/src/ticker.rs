//! Fixed-rate tick scheduling.
//!
//! Each tick records its start, runs the work, and sleeps for whatever is
//! left of the interval. Work that overruns the interval is followed
//! immediately by the next tick; missed ticks are never replayed, so under
//! overload the rate degrades instead of building a backlog.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Highest accepted update rate.
pub const MAX_RATE_HZ: f64 = 1000.0;

/// Ticker construction errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TickerError {
    /// Rate is not a finite value in `(0, MAX_RATE_HZ]`.
    #[error("Invalid update rate: {0} Hz")]
    InvalidRate(f64),
}

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickerStats {
    /// Ticks whose work completed.
    pub ticks: u64,
    /// Ticks whose work took at least the whole interval.
    pub overruns: u64,
}

/// Timing of one completed tick, as judged by the ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTiming {
    /// Time from tick start to the end of its work.
    pub elapsed: Duration,
    /// The work used up the whole interval; no sleep follows.
    pub overrun: bool,
}

/// Drives work at a fixed target interval.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    interval: Duration,
}

impl Ticker {
    /// Create a ticker with the given interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Create a ticker firing `hz` times per second.
    ///
    /// # Errors
    ///
    /// Returns an error if `hz` is not finite, not positive, or above
    /// [`MAX_RATE_HZ`].
    pub fn from_rate_hz(hz: f64) -> Result<Self, TickerError> {
        if !hz.is_finite() || hz <= 0.0 || hz > MAX_RATE_HZ {
            return Err(TickerError::InvalidRate(hz));
        }
        Ok(Self::new(Duration::from_secs_f64(1.0 / hz)))
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `work` once per interval until `cancel` fires or `work` fails.
    ///
    /// `on_tick` receives each tick's output together with its timing. A
    /// tick in progress always completes; cancellation is observed before
    /// each tick and during the sleep between ticks.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `work`. No further ticks run.
    pub async fn run<F, Fut, T, E, O>(
        &self,
        mut work: F,
        mut on_tick: O,
        cancel: &CancellationToken,
    ) -> Result<TickerStats, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        O: FnMut(T, TickTiming),
    {
        let mut stats = TickerStats::default();

        while !cancel.is_cancelled() {
            let started = Instant::now();
            let output = work().await?;
            stats.ticks += 1;

            let elapsed = started.elapsed();
            let remaining = self.interval.saturating_sub(elapsed);
            let overrun = remaining.is_zero();
            on_tick(output, TickTiming { elapsed, overrun });

            if overrun {
                stats.overruns += 1;
                debug!(
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    interval_ms = self.interval.as_secs_f64() * 1000.0,
                    "Tick overran interval"
                );
                continue;
            }

            trace!(sleep_us = remaining.as_micros() as u64, "Tick complete");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = time::sleep(remaining) => {}
            }
        }

        debug!(ticks = stats.ticks, overruns = stats.overruns, "Ticker stopped");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    /// Run `ticks` ticks of work lasting `work_time`, returning tick start times.
    async fn record_starts(
        interval: Duration,
        work_time: Duration,
        ticks: usize,
    ) -> (Vec<Instant>, Vec<TickTiming>, TickerStats) {
        let ticker = Ticker::new(interval);
        let cancel = CancellationToken::new();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let mut timings = Vec::new();

        let stats = ticker
            .run(
                || {
                    let starts = Arc::clone(&starts);
                    let cancel = cancel.clone();
                    async move {
                        let count = {
                            let mut starts = starts.lock().unwrap();
                            starts.push(Instant::now());
                            starts.len()
                        };
                        time::sleep(work_time).await;
                        if count >= ticks {
                            cancel.cancel();
                        }
                        Ok::<(), Infallible>(())
                    }
                },
                |(), timing| timings.push(timing),
                &cancel,
            )
            .await
            .unwrap();

        let starts = starts.lock().unwrap().clone();
        (starts, timings, stats)
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_period_without_drift() {
        let interval = Duration::from_millis(33);
        let (starts, timings, stats) = record_starts(interval, Duration::from_millis(12), 120).await;

        assert_eq!(starts.len(), 120);
        assert_eq!(stats.ticks, 120);
        assert_eq!(stats.overruns, 0);
        assert!(timings.iter().all(|t| !t.overrun));

        let epsilon = Duration::from_millis(1);
        for pair in starts.windows(2) {
            let period = pair[1] - pair[0];
            assert!(period + epsilon >= interval && period <= interval + epsilon, "{period:?}");
        }

        // No accumulated drift across the whole run.
        let total = *starts.last().unwrap() - starts[0];
        let expected = interval * 119;
        assert!(total <= expected + epsilon && total + epsilon >= expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_starts_next_tick_immediately() {
        let interval = Duration::from_millis(20);
        let work_time = Duration::from_millis(45);
        let (starts, timings, stats) = record_starts(interval, work_time, 10).await;

        assert_eq!(stats.ticks, 10);
        assert_eq!(stats.overruns, 10);
        assert_eq!(timings.len(), 10);
        assert!(timings.iter().all(|t| t.overrun && t.elapsed >= work_time));
        for pair in starts.windows(2) {
            let period = pair[1] - pair[0];
            assert!(period >= work_time);
            // No catch-up burst and no extra sleep.
            assert!(period < work_time + interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_error_stops_loop() {
        let ticker = Ticker::new(Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let mut calls = 0u32;

        let result = ticker
            .run(
                || {
                    calls += 1;
                    let current = calls;
                    async move {
                        if current == 3 {
                            Err("device lost")
                        } else {
                            Ok(())
                        }
                    }
                },
                |(), _| {},
                &cancel,
            )
            .await;

        assert_eq!(result, Err("device lost"));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep() {
        let ticker = Ticker::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let stats = ticker
            .run(|| async { Ok::<(), Infallible>(()) }, |(), _| {}, &cancel)
            .await
            .unwrap();

        assert_eq!(stats.ticks, 1);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = Ticker::new(Duration::from_millis(1))
            .run(|| async { Ok::<(), Infallible>(()) }, |(), _| {}, &cancel)
            .await
            .unwrap();
        assert_eq!(stats, TickerStats::default());
    }

    #[test]
    fn test_from_rate_hz() {
        let ticker = Ticker::from_rate_hz(30.0).unwrap();
        assert_eq!(ticker.interval(), Duration::from_secs_f64(1.0 / 30.0));

        assert!(Ticker::from_rate_hz(0.0).is_err());
        assert!(Ticker::from_rate_hz(-5.0).is_err());
        assert!(Ticker::from_rate_hz(f64::NAN).is_err());
        assert!(Ticker::from_rate_hz(f64::INFINITY).is_err());
        assert!(Ticker::from_rate_hz(MAX_RATE_HZ + 1.0).is_err());
    }
}
