//! In-memory [`ProducerClient`] used to exercise workers without a broker.
//!
//! ```rust
//! use produce_bench::kafka::MemoryProducer;
//! use std::time::Duration;
//!
//! // Worker 0's fifth record fails, every other record is acknowledged.
//! let client = MemoryProducer::new()
//!     .with_submit_delay(Duration::from_millis(1))
//!     .fail_record(0, 4);
//! assert_eq!(client.submitted(), 0);
//! ```

use super::producer::{Delivery, ProducerClient};
use crate::record::Record;
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    acknowledged: AtomicU64,
    failed: AtomicU64,
}

/// Accepts every record and acknowledges it, except records scripted to
/// fail with [`MemoryProducer::fail_record`].
///
/// Every accepted record's `(worker, seq)` is kept in submission order, so
/// the producer is meant for bounded test runs.
#[derive(Debug, Default)]
pub struct MemoryProducer {
    submit_delay: Option<Duration>,
    ack_delay: Option<Duration>,
    failures: HashSet<(usize, u64)>,
    counters: Arc<Counters>,
    log: Mutex<Vec<(usize, u64)>>,
}

impl MemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated time for the client to accept each record.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    /// Simulated time between acceptance and acknowledgment.
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = Some(delay);
        self
    }

    /// Fails the delivery of record `seq` of `worker`.
    pub fn fail_record(mut self, worker: usize, seq: u64) -> Self {
        self.failures.insert((worker, seq));
        self
    }

    pub fn submitted(&self) -> u64 {
        self.counters.submitted.load(Ordering::SeqCst)
    }

    pub fn acknowledged(&self) -> u64 {
        self.counters.acknowledged.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::SeqCst)
    }

    /// `(worker, seq)` of every accepted record, in submission order.
    pub fn submissions(&self) -> Vec<(usize, u64)> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Sequence numbers accepted from `worker`, in submission order.
    pub fn submissions_from(&self, worker: usize) -> Vec<u64> {
        self.submissions()
            .into_iter()
            .filter(|(w, _)| *w == worker)
            .map(|(_, seq)| seq)
            .collect()
    }
}

impl ProducerClient for MemoryProducer {
    fn submit(&self, record: Record) -> BoxFuture<'_, Result<Delivery>> {
        async move {
            if let Some(delay) = self.submit_delay {
                tokio::time::sleep(delay).await;
            }

            if let Ok(mut log) = self.log.lock() {
                log.push((record.worker, record.seq));
            }
            self.counters.submitted.fetch_add(1, Ordering::SeqCst);

            let fails = self.failures.contains(&(record.worker, record.seq));
            let ack_delay = self.ack_delay;
            let counters = self.counters.clone();

            let delivery: Delivery = async move {
                if let Some(delay) = ack_delay {
                    tokio::time::sleep(delay).await;
                }
                if fails {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Kafka(KafkaError::MessageProduction(
                        RDKafkaErrorCode::NotEnoughReplicas,
                    )))
                } else {
                    counters.acknowledged.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
            .boxed();

            Ok(delivery)
        }
        .boxed()
    }
}
