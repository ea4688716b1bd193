use clap::Parser;
use produce_bench::config::ClientLogLevel;
use produce_bench::kafka::KafkaProducer;
use produce_bench::{Bench, CliArgs, Config, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config = match Config::from_args(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(args.json_logs, args.verbose, config.client_log_level);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!("Starting produce-bench");
    info!(
        kafka_brokers = ?config.brokers,
        kafka_topic = %config.topic,
        num_clients = config.num_clients,
        record_size = config.record_size,
        compression = %config.compression,
        linger = ?config.linger,
        max_batch_size = config.max_batch_size,
        max_buffered_records = config.max_buffered_records(),
        "Configuration summary"
    );

    let client = KafkaProducer::new(&config)?;

    let bench = Bench::new(config, Arc::new(client));

    let shutdown = bench.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping workers");
        shutdown.cancel();
    });

    bench.run(std::io::stdout()).await?;
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_logging(json: bool, verbose: bool, client_level: ClientLogLevel) {
    let directives = if verbose {
        "produce_bench=debug,info".to_string()
    } else {
        std::env::var(EnvFilter::DEFAULT_ENV)
            .unwrap_or_else(|_| "produce_bench=info,warn".to_string())
    };
    let client = client_level.filter_level();
    let env_filter = EnvFilter::new(format!(
        "{},librdkafka={},rdkafka={}",
        directives, client, client
    ));

    // stdout carries the rate lines
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
