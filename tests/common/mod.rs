use produce_bench::config::{ClientLogLevel, Compression, Config};
use std::env;
use std::time::Duration;

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    // Use TEST_ prefix for test environment variables
    Config {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        topic: env::var("TEST_KAFKA_TOPIC")
            .unwrap_or_else(|_| format!("produce_bench_test_{}", std::process::id())),
        num_clients: 2,
        record_size: 10,
        compression: Compression::None, // No compression for tests
        linger: None,
        max_batch_size: 16_384,
        client_log_level: ClientLogLevel::Off,
        run_for: None,
        drain_timeout: Duration::from_secs(10),
    }
}

/// Parses the `k-records/s` figure out of a report line.
#[allow(dead_code)]
pub fn krecords_per_sec(line: &str) -> f64 {
    let (_, records) = line.split_once("; ").expect("report line has two rates");
    records
        .trim_end_matches("k records/s")
        .parse()
        .expect("numeric record rate")
}
