//! Command line and environment configuration.
//!
//! Every flag can also be set through `PRODUCE_BENCH_<FLAG>`; an explicit
//! flag wins over the environment.

use crate::{Error, Result};
use clap::Parser;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::ClientConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on the bytes a single client buffers before submissions
/// block.
pub const BUFFERED_BYTES_CEILING: usize = 50 << 20;

/// librdkafka debug contexts enabled by `--log-level debug`.
pub const CLIENT_DEBUG_CONTEXTS: &str = "broker,topic,msg";

#[derive(Parser, Debug, Clone)]
#[command(name = "produce-bench")]
#[command(about = "Kafka producer throughput load generator", long_about = None)]
pub struct CliArgs {
    #[arg(long, env = "PRODUCE_BENCH_BROKERS", default_value = "localhost:9092",
          help = "Comma delimited list of seed brokers")]
    pub brokers: String,

    #[arg(long, env = "PRODUCE_BENCH_TOPIC", default_value = "",
          help = "Topic to produce to")]
    pub topic: String,

    #[arg(long, env = "PRODUCE_BENCH_NUM_CLIENTS", default_value_t = 1,
          help = "How many producer workers to run")]
    pub num_clients: usize,

    #[arg(long, env = "PRODUCE_BENCH_RECORD_SIZE", default_value_t = 100,
          help = "Bytes per record")]
    pub record_size: usize,

    #[arg(long, env = "PRODUCE_BENCH_COMPRESSION", default_value = "none",
          help = "Compression codec (none, gzip, snappy, lz4, zstd)")]
    pub compression: String,

    #[arg(long, env = "PRODUCE_BENCH_LINGER", default_value = "0", value_parser = parse_duration,
          help = "If non-zero, linger to use when producing")]
    pub linger: Duration,

    #[arg(long, env = "PRODUCE_BENCH_MAX_BATCH_SIZE", default_value_t = 1_000_000,
          help = "Maximum batch size to allow per partition")]
    pub max_batch_size: usize,

    #[arg(long, env = "PRODUCE_BENCH_LOG_LEVEL", default_value = "",
          help = "If non-empty, client library log level (debug, info, warn, error)")]
    pub log_level: String,

    #[arg(long, env = "PRODUCE_BENCH_DURATION", default_value = "0", value_parser = parse_duration,
          help = "Stop after this long; 0 runs until interrupted")]
    pub duration: Duration,

    #[arg(long, env = "PRODUCE_BENCH_DRAIN_TIMEOUT", default_value = "30s", value_parser = parse_duration,
          help = "How long stopping workers wait for in-flight acknowledgments")]
    pub drain_timeout: Duration,

    #[arg(short, long, help = "Enable JSON output for logs")]
    pub json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    /// The librdkafka `compression.type` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "snappy" => Ok(Compression::Snappy),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(Error::Config(format!("unrecognized compression {}", s))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verbosity of the Kafka client library itself. `Off` silences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientLogLevel {
    #[default]
    Off,
    Debug,
    Info,
    Warn,
    Error,
}

impl ClientLogLevel {
    pub fn rdkafka_level(&self) -> RDKafkaLogLevel {
        match self {
            ClientLogLevel::Off => RDKafkaLogLevel::Emerg,
            ClientLogLevel::Debug => RDKafkaLogLevel::Debug,
            ClientLogLevel::Info => RDKafkaLogLevel::Info,
            ClientLogLevel::Warn => RDKafkaLogLevel::Warning,
            ClientLogLevel::Error => RDKafkaLogLevel::Error,
        }
    }

    /// Level name usable in a tracing `EnvFilter` directive.
    pub fn filter_level(&self) -> &'static str {
        match self {
            ClientLogLevel::Off => "off",
            ClientLogLevel::Debug => "debug",
            ClientLogLevel::Info => "info",
            ClientLogLevel::Warn => "warn",
            ClientLogLevel::Error => "error",
        }
    }
}

impl FromStr for ClientLogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "" => Ok(ClientLogLevel::Off),
            "debug" => Ok(ClientLogLevel::Debug),
            "info" => Ok(ClientLogLevel::Info),
            "warn" => Ok(ClientLogLevel::Warn),
            "error" => Ok(ClientLogLevel::Error),
            _ => Err(Error::Config(format!("unrecognized log level {}", s))),
        }
    }
}

/// Validated run parameters. Immutable once built.
#[derive(Debug, Clone)]
pub struct Config {
    pub brokers: Vec<String>,
    pub topic: String,
    pub num_clients: usize,
    pub record_size: usize,
    pub compression: Compression,
    /// `None` disables lingering.
    pub linger: Option<Duration>,
    pub max_batch_size: usize,
    pub client_log_level: ClientLogLevel,
    /// `None` runs until interrupted.
    pub run_for: Option<Duration>,
    pub drain_timeout: Duration,
}

impl Config {
    /// Validates command line input. Every check runs before any worker
    /// or client exists.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        if args.record_size == 0 {
            return Err(Error::Config("record bytes must be larger than zero".to_string()));
        }

        let client_log_level: ClientLogLevel = args.log_level.parse()?;
        let compression: Compression = args.compression.parse()?;

        if args.num_clients == 0 {
            return Err(Error::Config("number of clients must be positive".to_string()));
        }

        if args.max_batch_size == 0 || args.max_batch_size > i32::MAX as usize {
            return Err(Error::Config(format!(
                "max batch size must be between 1 and {}",
                i32::MAX
            )));
        }

        let brokers: Vec<String> = args
            .brokers
            .split(',')
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        if brokers.is_empty() {
            return Err(Error::Config("at least one seed broker is required".to_string()));
        }

        if args.topic.trim().is_empty() {
            return Err(Error::Config("topic to produce to is required".to_string()));
        }

        Ok(Self {
            brokers,
            topic: args.topic.trim().to_string(),
            num_clients: args.num_clients,
            record_size: args.record_size,
            compression,
            linger: (!args.linger.is_zero()).then_some(args.linger),
            max_batch_size: args.max_batch_size,
            client_log_level,
            run_for: (!args.duration.is_zero()).then_some(args.duration),
            drain_timeout: args.drain_timeout,
        })
    }

    /// How many records a client may buffer before submission blocks.
    pub fn max_buffered_records(&self) -> usize {
        BUFFERED_BYTES_CEILING / self.record_size + 1
    }

    pub fn client_config(&self) -> ClientConfig {
        let linger_ms = self
            .linger
            .map(|l| l.as_nanos() as f64 / 1e6)
            .unwrap_or(0.0);

        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", self.brokers.join(","))
            .set("compression.type", self.compression.as_str())
            .set("acks", "all")
            .set("linger.ms", linger_ms.to_string())
            .set("batch.size", self.max_batch_size.to_string())
            .set(
                "queue.buffering.max.messages",
                self.max_buffered_records().to_string(),
            )
            .set_log_level(self.client_log_level.rdkafka_level());
        if self.client_log_level == ClientLogLevel::Debug {
            client.set("debug", CLIENT_DEBUG_CONTEXTS);
        }
        client
    }
}

/// Parses `0` or a sequence of `<number><unit>` pairs such as `5ms`,
/// `1.5s` or `1m30s`. Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("invalid duration {:?}", input));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| format!("invalid duration {:?}", input))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {:?}", input)),
            unit => return Err(format!("unknown unit {:?} in duration {:?}", unit, input)),
        };
        nanos += value * scale;
        rest = &rest[unit_len..];
    }

    Ok(Duration::from_nanos(nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    // Parsing reads PRODUCE_BENCH_* variables, which are process-wide.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn parse<const N: usize>(argv: [&str; N]) -> std::result::Result<CliArgs, clap::Error> {
        let _env = env_lock();
        CliArgs::try_parse_from(argv)
    }

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["produce-bench", "--topic", "bench"];
        argv.extend_from_slice(extra);
        let _env = env_lock();
        CliArgs::try_parse_from(argv).unwrap()
    }

    fn config_error(extra: &[&str]) -> String {
        match Config::from_args(&args(extra)) {
            Err(Error::Config(msg)) => msg,
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(&args(&[])).unwrap();

        assert_eq!(config.brokers, vec!["localhost:9092".to_string()]);
        assert_eq!(config.topic, "bench");
        assert_eq!(config.num_clients, 1);
        assert_eq!(config.record_size, 100);
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.linger, None);
        assert_eq!(config.max_batch_size, 1_000_000);
        assert_eq!(config.client_log_level, ClientLogLevel::Off);
        assert_eq!(config.run_for, None);
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_full_flag_set() {
        let config = Config::from_args(&args(&[
            "--brokers", "k1:9092, k2:9092,",
            "--num-clients", "8",
            "--record-size", "1024",
            "--compression", "ZSTD",
            "--linger", "5ms",
            "--max-batch-size", "65536",
            "--log-level", "Warn",
            "--duration", "1m",
        ]))
        .unwrap();

        assert_eq!(config.brokers, vec!["k1:9092".to_string(), "k2:9092".to_string()]);
        assert_eq!(config.num_clients, 8);
        assert_eq!(config.record_size, 1024);
        assert_eq!(config.compression, Compression::Zstd);
        assert_eq!(config.linger, Some(Duration::from_millis(5)));
        assert_eq!(config.max_batch_size, 65_536);
        assert_eq!(config.client_log_level, ClientLogLevel::Warn);
        assert_eq!(config.run_for, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_record_size_rejected() {
        assert_eq!(
            config_error(&["--record-size", "0"]),
            "record bytes must be larger than zero"
        );
    }

    #[test]
    fn test_zero_clients_rejected() {
        assert_eq!(
            config_error(&["--num-clients", "0"]),
            "number of clients must be positive"
        );
    }

    #[test]
    fn test_unknown_compression_rejected() {
        assert_eq!(
            config_error(&["--compression", "bogus"]),
            "unrecognized compression bogus"
        );
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        assert_eq!(
            config_error(&["--log-level", "bogus"]),
            "unrecognized log level bogus"
        );
    }

    #[test]
    fn test_empty_topic_and_brokers_rejected() {
        let no_topic = parse(["produce-bench"]).unwrap();
        assert!(matches!(Config::from_args(&no_topic), Err(Error::Config(_))));

        assert_eq!(
            config_error(&["--brokers", " , "]),
            "at least one seed broker is required"
        );
    }

    #[test]
    fn test_batch_size_bounds() {
        assert!(config_error(&["--max-batch-size", "0"]).starts_with("max batch size"));
        assert!(config_error(&["--max-batch-size", "4294967296"]).starts_with("max batch size"));
    }

    #[test]
    fn test_negative_count_is_a_usage_error() {
        assert!(parse(["produce-bench", "--num-clients", "-1"]).is_err());
    }

    #[test]
    fn test_environment_fallback() {
        let _env = env_lock();

        std::env::set_var("PRODUCE_BENCH_NUM_CLIENTS", "0");
        let from_env = CliArgs::try_parse_from(["produce-bench", "--topic", "bench"]);
        std::env::remove_var("PRODUCE_BENCH_NUM_CLIENTS");
        match Config::from_args(&from_env.unwrap()) {
            Err(Error::Config(msg)) => assert_eq!(msg, "number of clients must be positive"),
            other => panic!("expected configuration error, got {:?}", other),
        }

        std::env::set_var("PRODUCE_BENCH_TOPIC", "from-env");
        std::env::set_var("PRODUCE_BENCH_RECORD_SIZE", "512");
        std::env::set_var("PRODUCE_BENCH_DURATION", "3s");
        let from_env = CliArgs::try_parse_from(["produce-bench"]);
        std::env::remove_var("PRODUCE_BENCH_TOPIC");
        std::env::remove_var("PRODUCE_BENCH_RECORD_SIZE");
        std::env::remove_var("PRODUCE_BENCH_DURATION");
        let config = Config::from_args(&from_env.unwrap()).unwrap();
        assert_eq!(config.topic, "from-env");
        assert_eq!(config.record_size, 512);
        assert_eq!(config.run_for, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_flag_overrides_environment() {
        let _env = env_lock();

        std::env::set_var("PRODUCE_BENCH_COMPRESSION", "bogus");
        let parsed = CliArgs::try_parse_from([
            "produce-bench", "--topic", "bench", "--compression", "gzip",
        ]);
        std::env::remove_var("PRODUCE_BENCH_COMPRESSION");

        let config = Config::from_args(&parsed.unwrap()).unwrap();
        assert_eq!(config.compression, Compression::Gzip);
    }

    #[test]
    fn test_all_compression_codecs() {
        for (name, codec) in [
            ("none", Compression::None),
            ("gzip", Compression::Gzip),
            ("snappy", Compression::Snappy),
            ("lz4", Compression::Lz4),
            ("zstd", Compression::Zstd),
        ] {
            assert_eq!(name.parse::<Compression>().unwrap(), codec);
            assert_eq!(codec.to_string(), name);
        }
    }

    #[test]
    fn test_max_buffered_records() {
        let config = Config::from_args(&args(&["--record-size", "100"])).unwrap();
        assert_eq!(config.max_buffered_records(), (50 << 20) / 100 + 1);

        let config = Config::from_args(&args(&["--record-size", "104857600"])).unwrap();
        assert_eq!(config.max_buffered_records(), 1);
    }

    #[test]
    fn test_client_config() {
        let config = Config::from_args(&args(&[
            "--brokers", "a:1,b:2",
            "--compression", "lz4",
            "--linger", "1.5ms",
            "--max-batch-size", "4096",
            "--record-size", "1024",
        ]))
        .unwrap();
        let client = config.client_config();

        assert_eq!(client.get("bootstrap.servers"), Some("a:1,b:2"));
        assert_eq!(client.get("compression.type"), Some("lz4"));
        assert_eq!(client.get("acks"), Some("all"));
        assert_eq!(client.get("linger.ms"), Some("1.5"));
        assert_eq!(client.get("batch.size"), Some("4096"));
        assert_eq!(client.get("queue.buffering.max.messages"), Some("51201"));
    }

    #[test]
    fn test_debug_log_level_enables_client_debug() {
        let config = Config::from_args(&args(&["--log-level", "debug"])).unwrap();
        assert_eq!(config.client_config().get("debug"), Some(CLIENT_DEBUG_CONTEXTS));

        let config = Config::from_args(&args(&["--log-level", "info"])).unwrap();
        assert_eq!(config.client_config().get("debug"), None);
    }

    #[test]
    fn test_linger_disabled_maps_to_zero() {
        let config = Config::from_args(&args(&[])).unwrap();
        assert_eq!(config.client_config().get("linger.ms"), Some("0"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("250ns"), Ok(Duration::from_nanos(250)));
        assert_eq!(parse_duration("10us"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_duration("10µs"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_duration("5ms"), Ok(Duration::from_millis(5)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1_500)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7_200)));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("5 days").is_err());
        assert!(parse_duration("1.2.3s").is_err());
    }
}
