use crate::kafka::ProducerClient;
use crate::rate::{RateAggregator, RateTotals, Reporter};
use crate::worker::{WorkerPool, WorkerStats};
use crate::{Config, Result};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct BenchSummary {
    pub workers: Vec<WorkerStats>,
    pub totals: RateTotals,
}

/// Drives one load generation run: the worker pool, the reporting loop and
/// the shutdown sequence that ties them together.
pub struct Bench<C> {
    config: Config,
    client: Arc<C>,
    aggregator: Arc<RateAggregator>,
    shutdown: CancellationToken,
}

impl<C: ProducerClient + 'static> Bench<C> {
    pub fn new(config: Config, client: Arc<C>) -> Self {
        Self {
            config,
            client,
            aggregator: Arc::new(RateAggregator::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the run gracefully.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs until shutdown, the configured duration, or the first fatal
    /// error, writing one rate line per second to `out`.
    ///
    /// Workers are drained before the final window is reported, so the
    /// printed windows add up to every acknowledged record.
    pub async fn run<W: Write>(self, out: W) -> Result<BenchSummary> {
        info!(
            workers = self.config.num_clients,
            record_size = self.config.record_size,
            run_for = ?self.config.run_for,
            "Starting load generation"
        );

        let pool = WorkerPool::new(
            &self.config,
            self.client.clone(),
            self.aggregator.clone(),
            self.shutdown.clone(),
        );
        let mut reporter =
            Reporter::new(self.aggregator.clone(), out).with_run_for(self.config.run_for);

        let pool_run = async {
            let result = pool.run().await;
            self.shutdown.cancel();
            result
        };
        let (pool_result, report_result) =
            tokio::join!(pool_run, reporter.run(self.shutdown.clone()));

        let finish_result = reporter.finish();

        let workers = pool_result?;
        report_result?;
        let totals = finish_result?;

        let average = totals.average();
        info!(
            records = totals.records,
            bytes = totals.bytes,
            elapsed = ?totals.elapsed,
            mib_per_sec = average.mib_per_sec(),
            krecords_per_sec = average.krecords_per_sec(),
            "Load generation finished"
        );

        let abandoned: usize = workers.iter().map(|w| w.abandoned).sum();
        if abandoned > 0 {
            warn!(abandoned, "Deliveries were still outstanding at exit");
        }

        Ok(BenchSummary { workers, totals })
    }
}
