use std::{net::SocketAddr, process::ExitCode, sync::Arc};

use blackbox_prober::{
    Dispatcher, Exporter, exposition, read_config_file,
    util::{get_config_path, get_listen_address, get_max_concurrency, get_metrics_path, parse_listen_address},
};
use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Probe endpoints and expose the results to Prometheus")]
struct Args {
    /// Address to listen on for scrapes (also PROBER_LISTEN_ADDRESS)
    #[arg(long = "web-listen-address", alias = "web.listen-address", value_parser = parse_address)]
    listen_address: Option<SocketAddr>,

    /// Path under which metrics are exposed (also PROBER_METRICS_PATH)
    #[arg(long = "web-telemetry-path", alias = "web.telemetry-path")]
    metrics_path: Option<String>,

    /// Configuration file, YAML or JSON (also PROBER_CONFIG_PATH)
    #[arg(long = "conf-path", alias = "conf.path")]
    config_path: Option<String>,

    /// Maximum number of probes running at once (also PROBER_MAX_CONCURRENCY)
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Log probe details
    #[arg(short, long)]
    verbose: bool,
}

fn parse_address(value: &str) -> Result<SocketAddr, String> {
    parse_listen_address(value).ok_or_else(|| format!("invalid listen address '{value}'"))
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("blackbox_prober", level),
        ("prober", level),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let listen_address = args.listen_address.unwrap_or_else(get_listen_address);
    let metrics_path = args.metrics_path.unwrap_or_else(get_metrics_path);
    let config_path = args.config_path.unwrap_or_else(get_config_path);

    let raw = read_config_file(&config_path)?;

    let mut dispatcher = Dispatcher::new();
    if let Some(limit) = args.max_concurrency.or_else(get_max_concurrency) {
        dispatcher = dispatcher.with_max_concurrency(limit);
    }

    let exporter = Exporter::from_raw_with(&raw, dispatcher)?;
    info!(
        "loaded {} targets from {config_path}",
        exporter.targets().len()
    );

    exposition::serve(Arc::new(exporter), listen_address, &metrics_path).await
}
