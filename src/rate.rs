//! Throughput accounting.
//!
//! Workers add every acknowledged record to a shared [`RateAggregator`].
//! A single [`Reporter`] drains it once per interval and prints one line
//! per window:
//!
//! ```text
//! 95.37 MiB/s; 1000.00k records/s
//! ```
//!
//! Drains read and reset the counters atomically, so each acknowledgment
//! lands in exactly one window.

use crate::Result;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default reporting cadence.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

const MIB: f64 = 1024.0 * 1024.0;

/// Records and bytes acknowledged since the last drain.
///
/// Increments are wait-free and may come from any number of threads.
/// The two counters are swapped independently, so a window may count a
/// record whose bytes land in the next window; neither total ever loses
/// or repeats an increment.
#[derive(Debug, Default)]
pub struct RateAggregator {
    records: AtomicU64,
    bytes: AtomicU64,
}

impl RateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_records(&self, records: u64, bytes: u64) {
        self.records.fetch_add(records, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns `(records, bytes)` accumulated since the previous drain and
    /// resets both counters to zero.
    pub fn drain(&self) -> (u64, u64) {
        let records = self.records.swap(0, Ordering::Relaxed);
        let bytes = self.bytes.swap(0, Ordering::Relaxed);
        (records, bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.records.load(Ordering::Relaxed) == 0 && self.bytes.load(Ordering::Relaxed) == 0
    }
}

/// One reporting window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    pub records: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl RateSample {
    pub fn mib_per_sec(&self) -> f64 {
        self.per_sec(self.bytes) / MIB
    }

    pub fn krecords_per_sec(&self) -> f64 {
        self.per_sec(self.records) / 1000.0
    }

    fn per_sec(&self, count: u64) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            count as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for RateSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} MiB/s; {:.2}k records/s",
            self.mib_per_sec(),
            self.krecords_per_sec()
        )
    }
}

/// Lifetime totals over every window a [`Reporter`] printed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateTotals {
    pub windows: u64,
    pub records: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl RateTotals {
    fn add(&mut self, sample: &RateSample) {
        self.windows += 1;
        self.records += sample.records;
        self.bytes += sample.bytes;
        self.elapsed += sample.elapsed;
    }

    /// Average rate over the whole run.
    pub fn average(&self) -> RateSample {
        RateSample {
            records: self.records,
            bytes: self.bytes,
            elapsed: self.elapsed,
        }
    }
}

/// The reporting loop: drains a [`RateAggregator`] on a fixed cadence and
/// writes one line per window to `out`.
pub struct Reporter<W> {
    aggregator: Arc<RateAggregator>,
    out: W,
    interval: Duration,
    run_for: Option<Duration>,
    window_start: Instant,
    totals: RateTotals,
}

impl<W: Write> Reporter<W> {
    pub fn new(aggregator: Arc<RateAggregator>, out: W) -> Self {
        Self {
            aggregator,
            out,
            interval: REPORT_INTERVAL,
            run_for: None,
            window_start: Instant::now(),
            totals: RateTotals::default(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Ends the run once `run_for` has elapsed by cancelling the shutdown
    /// token passed to [`Reporter::run`]. The window in progress is left
    /// for [`Reporter::finish`].
    pub fn with_run_for(mut self, run_for: Option<Duration>) -> Self {
        self.run_for = run_for;
        self
    }

    pub fn totals(&self) -> RateTotals {
        self.totals
    }

    /// Reports every interval until `shutdown` is cancelled or the run
    /// duration is reached.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let start = Instant::now();
        self.window_start = start;

        let mut ticker = tokio::time::interval_at(start + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline = self.run_for.map(|d| start + d);
        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Reporter stopping");
                    return Ok(());
                }
                _ = &mut expired => {
                    info!(duration = ?self.run_for, "Run duration reached, stopping workers");
                    shutdown.cancel();
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.report() {
                        shutdown.cancel();
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Drains the aggregator and prints the window that ends now.
    pub fn report(&mut self) -> Result<RateSample> {
        let now = Instant::now();
        let (records, bytes) = self.aggregator.drain();
        let sample = RateSample {
            records,
            bytes,
            elapsed: now.duration_since(self.window_start),
        };
        self.window_start = now;

        writeln!(self.out, "{}", sample)?;
        self.out.flush()?;
        self.totals.add(&sample);
        Ok(sample)
    }

    /// Prints the final partial window and returns the lifetime totals.
    ///
    /// Call after every worker has exited so that no acknowledgment
    /// arrives after the last drain. A window that is both empty and
    /// zero-length is not printed.
    pub fn finish(&mut self) -> Result<RateTotals> {
        let elapsed = Instant::now().duration_since(self.window_start);
        if self.totals.windows == 0 || !elapsed.is_zero() || !self.aggregator.is_empty() {
            self.report()?;
        }
        Ok(self.totals)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
