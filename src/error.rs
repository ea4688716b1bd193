//! Error types and result handling for produce-bench.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use produce_bench::{Error, Result};
//!
//! fn validate_record_size(size: usize) -> Result<()> {
//!     if size == 0 {
//!         return Err(Error::Config("record bytes must be larger than zero".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! match validate_record_size(0) {
//!     Ok(()) => println!("valid"),
//!     Err(Error::Config(msg)) => eprintln!("{}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for produce-bench operations.
///
/// Every variant is fatal to the run: configuration errors abort before
/// any worker starts, everything else stops the whole worker pool.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid command line or environment configuration.
    #[error("{0}")]
    Config(String),

    /// Kafka client construction or synchronous submission failure.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The broker rejected or failed to deliver a record.
    #[error("produce error: worker {worker} record {seq}: {message}")]
    Delivery {
        /// Index of the worker that submitted the record
        worker: usize,
        /// Sequence number of the failed record within that worker's stream
        seq: u64,
        /// Error reported by the client for this record
        message: String,
    },

    /// I/O error, typically from writing report lines.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker task panicked or was aborted before reporting its outcome.
    #[error("worker task failed: {0}")]
    WorkerPanic(String),
}

impl Error {
    /// Builds a [`Error::Delivery`] for the record `seq` of `worker`.
    pub fn delivery(worker: usize, seq: u64, message: impl ToString) -> Self {
        Error::Delivery {
            worker,
            seq,
            message: message.to_string(),
        }
    }
}

/// A convenient Result type alias for produce-bench operations.
///
/// This is equivalent to `std::result::Result<T, produce_bench::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
