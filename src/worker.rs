//! Producer workers and the pool that runs them.
//!
//! A worker submits records back to back and never waits for an
//! acknowledgment before submitting the next one. Outstanding deliveries
//! are tracked per worker and settled as they complete, in whatever order
//! the client resolves them:
//!
//! ```text
//!  Producing ──(shutdown)──▶ Stopping ──(in-flight drained)──▶ Stopped
//!      │                                                         ▲
//!      └──────────────(delivery or submit error)─────────────────┘
//! ```
//!
//! The pool latches the first worker error, cancels the shared shutdown
//! token so the remaining workers stop, and returns that error once every
//! worker has exited.

use crate::kafka::{Delivery, ProducerClient};
use crate::rate::RateAggregator;
use crate::record::Record;
use crate::{Config, Error, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Submissions between voluntary yields to the scheduler.
const YIELD_EVERY: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Producing,
    Stopping,
    Stopped,
}

/// What a worker did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker: usize,
    pub submitted: u64,
    pub acknowledged: u64,
    /// Deliveries still outstanding when the drain timeout expired.
    pub abandoned: usize,
}

/// A submitted record whose delivery has not resolved yet.
struct InFlight {
    seq: u64,
    delivery: Delivery,
}

impl Future for InFlight {
    type Output = (u64, Result<()>);

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let seq = self.seq;
        self.delivery.poll_unpin(cx).map(|outcome| (seq, outcome))
    }
}

pub struct ProducerWorker<C> {
    id: usize,
    client: Arc<C>,
    aggregator: Arc<RateAggregator>,
    record_size: usize,
    drain_timeout: Duration,
    shutdown: CancellationToken,
    state: WorkerState,
}

impl<C: ProducerClient> ProducerWorker<C> {
    pub fn new(
        id: usize,
        client: Arc<C>,
        aggregator: Arc<RateAggregator>,
        record_size: usize,
        drain_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            client,
            aggregator,
            record_size,
            drain_timeout,
            shutdown,
            state: WorkerState::Producing,
        }
    }

    /// Produces until `shutdown` is cancelled or a record fails.
    ///
    /// On shutdown the worker stops submitting and waits up to the drain
    /// timeout for its in-flight deliveries. A failed delivery returns
    /// immediately with [`Error::Delivery`] naming the record.
    pub async fn run(mut self) -> Result<WorkerStats> {
        debug!(worker = self.id, "Producer worker started");

        let mut stats = WorkerStats {
            worker: self.id,
            ..Default::default()
        };
        let mut inflight = FuturesUnordered::new();

        let produced = self.produce(&mut inflight, &mut stats).await;
        if let Err(e) = produced {
            self.transition(WorkerState::Stopped);
            return Err(e);
        }

        self.transition(WorkerState::Stopping);
        debug!(
            worker = self.id,
            in_flight = inflight.len(),
            "Draining in-flight deliveries"
        );

        let drain = async {
            while let Some((acked, outcome)) = inflight.next().await {
                self.settle(acked, outcome, &mut stats)?;
            }
            Ok::<_, Error>(())
        };
        let drained = tokio::time::timeout(self.drain_timeout, drain).await;

        match drained {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.transition(WorkerState::Stopped);
                return Err(e);
            }
            Err(_) => {
                stats.abandoned = inflight.len();
                warn!(
                    worker = self.id,
                    abandoned = stats.abandoned,
                    timeout = ?self.drain_timeout,
                    "Gave up waiting for in-flight deliveries"
                );
            }
        }

        self.transition(WorkerState::Stopped);
        debug!(
            worker = self.id,
            submitted = stats.submitted,
            acknowledged = stats.acknowledged,
            "Producer worker stopped"
        );
        Ok(stats)
    }

    async fn produce(
        &self,
        inflight: &mut FuturesUnordered<InFlight>,
        stats: &mut WorkerStats,
    ) -> Result<()> {
        let mut seq: u64 = 0;

        loop {
            let mut submit = self
                .client
                .submit(Record::new(self.id, seq, self.record_size));

            let delivery = loop {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return Ok(()),
                    Some((acked, outcome)) = inflight.next(), if !inflight.is_empty() => {
                        self.settle(acked, outcome, stats)?;
                    }
                    submitted = &mut submit => {
                        break submitted.map_err(|e| {
                            debug!(worker = self.id, seq, error = %e, "Record submission failed");
                            Error::delivery(self.id, seq, e)
                        })?;
                    }
                }
            };

            inflight.push(InFlight { seq, delivery });
            stats.submitted += 1;
            seq += 1;

            if seq % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Applies the outcome of record `seq`.
    fn settle(&self, seq: u64, outcome: Result<()>, stats: &mut WorkerStats) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.aggregator.add_records(1, self.record_size as u64);
                stats.acknowledged += 1;
                Ok(())
            }
            Err(e) => {
                debug!(worker = self.id, seq, error = %e, "Record delivery failed");
                Err(Error::delivery(self.id, seq, e))
            }
        }
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(worker = self.id, from = ?self.state, to = ?next, "Worker state change");
        self.state = next;
    }
}

/// Runs `num_clients` workers against one shared client.
pub struct WorkerPool<C> {
    client: Arc<C>,
    aggregator: Arc<RateAggregator>,
    num_workers: usize,
    record_size: usize,
    drain_timeout: Duration,
    shutdown: CancellationToken,
}

impl<C: ProducerClient + 'static> WorkerPool<C> {
    pub fn new(
        config: &Config,
        client: Arc<C>,
        aggregator: Arc<RateAggregator>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            aggregator,
            num_workers: config.num_clients,
            record_size: config.record_size,
            drain_timeout: config.drain_timeout,
            shutdown,
        }
    }

    /// Starts every worker and waits for all of them to exit.
    ///
    /// Workers only exit after `shutdown` is cancelled or on error. The
    /// first error cancels `shutdown` for the rest of the pool and is
    /// returned after the last worker has exited.
    pub async fn run(self) -> Result<Vec<WorkerStats>> {
        let mut workers = JoinSet::new();
        for id in 0..self.num_workers {
            let worker = ProducerWorker::new(
                id,
                self.client.clone(),
                self.aggregator.clone(),
                self.record_size,
                self.drain_timeout,
                self.shutdown.clone(),
            );
            workers.spawn(worker.run());
        }
        info!(workers = self.num_workers, "Producer workers started");

        let mut first_error: Option<Error> = None;
        let mut stats = Vec::with_capacity(self.num_workers);

        while let Some(joined) = workers.join_next().await {
            let outcome = joined
                .map_err(|e| Error::WorkerPanic(e.to_string()))
                .and_then(|result| result);

            match outcome {
                Ok(worker_stats) => stats.push(worker_stats),
                Err(e) if first_error.is_none() => {
                    error!(error = %e, "Worker failed, stopping all workers");
                    self.shutdown.cancel();
                    first_error = Some(e);
                }
                Err(e) => {
                    debug!(error = %e, "Further worker failure during shutdown");
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        stats.sort_by_key(|s| s.worker);
        info!(workers = stats.len(), "Producer workers stopped");
        Ok(stats)
    }
}
