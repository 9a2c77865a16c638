use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use streampulse_relay::config::Settings;
use streampulse_relay::duration::{format_duration, parse_duration};
use streampulse_relay::{
    sparkline_bars, AnomalyLog, MetricsHistory, Relay, StreamMessage, Thresholds,
};
use streampulse_sim::{server, Emitter, Hub, IngestWorker, MockGenerator, Output};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "streampulse", version)]
#[command(about = "Real-time infrastructure metrics: emit, relay and watch")]
struct Cli {
    /// Settings file (TOML); STREAMPULSE_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set (e.g. "debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate metrics and serve them to clients
    Serve {
        /// NDJSON listener address (host:port)
        #[arg(long)]
        tcp: Option<String>,

        /// HTTP listener address for /events, /metrics, /health and /ingest
        #[arg(long)]
        http: Option<String>,

        /// Emission interval (e.g. "2s", "500ms")
        #[arg(short, long)]
        interval: Option<String>,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Also write the latest snapshot to this JSON file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Connect to a stream and print what arrives
    Watch {
        /// Source address: tcp://host:port, host:port or http(s)://.../events
        #[arg(short = 'c', long)]
        connect: Option<String>,
    },

    /// Print mock snapshots as newline-delimited JSON
    Generate {
        /// Number of snapshots
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&settings.log_level));

    match cli.command {
        Command::Serve {
            tcp,
            http,
            interval,
            seed,
            export,
        } => run_serve(&settings, tcp, http, interval, seed, export).await,
        Command::Watch { connect } => {
            let address = connect.unwrap_or_else(|| settings.source_url.clone());
            run_watch(&settings, &address).await
        }
        Command::Generate { count, seed } => run_generate(count, seed),
    }
}

/// Logs go to stderr so `generate` output stays clean.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_serve(
    settings: &Settings,
    tcp: Option<String>,
    http: Option<String>,
    interval: Option<String>,
    seed: Option<u64>,
    export: Option<PathBuf>,
) -> Result<()> {
    let interval = match interval {
        Some(s) => parse_duration(&s)?,
        None => settings.interval()?,
    };

    // With no listener flags, fall back to the configured ones
    let (tcp, http) = if tcp.is_none() && http.is_none() {
        let http = Some(settings.http_bind.clone()).filter(|s| !s.is_empty());
        (Some(settings.tcp_bind.clone()), http)
    } else {
        (tcp, http)
    };

    let hub = Arc::new(Hub::default());
    let worker = Arc::new(IngestWorker::new(hub.clone()));

    let mut builder = Emitter::builder()
        .output(Output::hub(hub.clone()))
        .interval(interval)
        .throughput_target(settings.throughput_target)
        .anomaly_probability(settings.anomaly_probability);
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    if let Some(path) = export {
        builder = builder.output(Output::file(path));
    }
    let _emission = builder.build().start();
    info!(interval = %format_duration(interval), "emitting metrics");

    let mut servers = tokio::task::JoinSet::new();
    if let Some(addr) = tcp {
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        servers.spawn(server::serve_ndjson(hub.clone(), listener));
    }
    if let Some(addr) = http {
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        servers.spawn(server::serve_http(
            hub.clone(),
            worker.clone(),
            listener,
            server::HttpConfig::default(),
        ));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
        Some(result) = servers.join_next() => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "server stopped"),
                Err(e) => error!(error = %e, "server task failed"),
            }
        }
    }

    let stats = hub.stats();
    let ingest = worker.stats();
    info!(
        published = stats.messages_published,
        connections = stats.active_connections,
        ingested = ingest.processed_count,
        failed = ingest.failed_count,
        "stopped"
    );
    Ok(())
}

async fn run_watch(settings: &Settings, address: &str) -> Result<()> {
    let thresholds = settings.thresholds();
    let history = Arc::new(Mutex::new(MetricsHistory::new(settings.history_size)));
    let anomalies = Arc::new(Mutex::new(AnomalyLog::new(settings.anomaly_log_size)));

    let relay = Relay::<StreamMessage>::new();
    let subscription = {
        let history = history.clone();
        let anomalies = anomalies.clone();
        relay.subscribe(move |message| {
            print_message(message, &thresholds, &history, &anomalies);
        })
    };

    info!(%address, "watching");
    relay.connect(address);
    tokio::signal::ctrl_c().await?;

    subscription.unsubscribe();
    relay.disconnect();

    if let Some(e) = relay.last_error() {
        eprintln!("last error: {}", e);
    }
    let history = history.lock();
    if let Some(avg) = history.average_response_time() {
        println!(
            "{} snapshots, mean response time {:.1}ms",
            history.len(),
            avg
        );
    }
    for (severity, count) in anomalies.lock().counts() {
        if count > 0 {
            println!("{:>8} anomalies: {}", severity.to_string(), count);
        }
    }
    Ok(())
}

fn print_message(
    message: &StreamMessage,
    thresholds: &Thresholds,
    history: &Mutex<MetricsHistory>,
    anomalies: &Mutex<AnomalyLog>,
) {
    match message {
        StreamMessage::Connected { client_id, message } => {
            println!("{} ({})", message, client_id);
        }
        StreamMessage::Metrics(snapshot) => {
            let report = thresholds.assess(snapshot);
            let mut history = history.lock();
            history.record(snapshot.clone());

            println!(
                "[{}] {:<4} rt={:>6.1}ms tput={:>6.0}/s err={:>4.2}% users={:>5} {}",
                snapshot.timestamp,
                report.overall.symbol(),
                snapshot.response_time,
                snapshot.throughput,
                snapshot.error_rate,
                snapshot.active_users,
                sparkline_bars(&history.response_times()),
            );
            for region in report.unhealthy_regions() {
                println!("       {:<4} {}", region.health.symbol(), region.name);
            }
        }
        StreamMessage::AnomalyAlert(event) => {
            println!(
                "  !! {} {} {} at {}: {}",
                event.severity, event.kind, event.metric, event.location, event.description
            );
            anomalies.lock().record(event.clone());
        }
        StreamMessage::ThroughputWarning(warning) => {
            println!(
                "  !! throughput {:.0}/s below {:.0}/s ({:.0}% of target)",
                warning.current_throughput,
                warning.threshold,
                warning.performance_ratio * 100.0
            );
        }
    }
}

fn run_generate(count: usize, seed: Option<u64>) -> Result<()> {
    use std::io::Write;

    let mut builder = MockGenerator::builder();
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    let mut generator = builder.build();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for _ in 0..count {
        serde_json::to_writer(&mut out, &generator.next_snapshot())?;
        out.write_all(b"\n")?;
    }
    Ok(())
}
