pub mod bench;
pub mod config;
pub mod error;
pub mod rate;
pub mod record;
pub mod worker;

pub mod kafka;

pub use bench::{Bench, BenchSummary};
pub use config::{CliArgs, Config};
pub use error::{Error, Result};
pub use rate::{RateAggregator, Reporter};
pub use worker::{ProducerWorker, WorkerPool};
