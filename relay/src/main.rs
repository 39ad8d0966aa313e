use analysis_handler::metrics_defs;
use clap::{Args, Parser};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod config;

const METRICS_PREFIX: &str = "ld_relay";

#[derive(Parser)]
#[command(name = "ld-relay", version)]
enum CliCommand {
    /// Accept build analysis requests and publish their outcome
    AnalysisHandler(RunArgs),
    /// Print every metric the relay emits
    ListMetrics,
}

#[derive(Args)]
struct RunArgs {
    /// Path to the YAML configuration file
    #[arg(long, env = "RELAY_CONFIG")]
    config: PathBuf,
    /// Bearer token for the Log Detective API, overrides the config file
    #[arg(long, env = "LD_TOKEN", hide_env_values = true)]
    ld_token: Option<String>,
}

#[derive(thiserror::Error, Debug)]
enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not start the runtime: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not create the statsd exporter: {0}")]
    Metrics(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    MetricsAlreadyInstalled,
    #[error(transparent)]
    AnalysisHandler(#[from] analysis_handler::AnalysisHandlerError),
}

fn main() {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::AnalysisHandler(args) => {
            if let Err(e) = run_analysis_handler(args) {
                tracing::error!(error = %e, "Analysis handler stopped");
                eprintln!("ld-relay: {e}");
                process::exit(1);
            }
        }
        CliCommand::ListMetrics => {
            for def in metrics_defs::ALL_METRICS {
                println!(
                    "{METRICS_PREFIX}.{}\t{:?}\t{}",
                    def.name, def.metric_type, def.description
                );
            }
        }
    }
}

fn run_analysis_handler(args: RunArgs) -> Result<(), RelayError> {
    let mut config = Config::from_file(&args.config)?;
    if let Some(token) = args.ld_token {
        config.analysis_handler.log_detective.token = Some(token);
    }

    // Keep the guard alive so pending events are flushed on exit
    let _sentry = init_logging(&config.logging);

    if let Some(metrics_config) = &config.metrics {
        init_metrics(metrics_config)?;
    }
    metrics_defs::describe_all();

    tracing::info!(
        url = %config.analysis_handler.log_detective.url,
        topic = %config.analysis_handler.bus.topic,
        "Starting analysis handler"
    );

    // One cooperative worker per process, replicas are up to the process manager
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(analysis_handler::run(config.analysis_handler))?;

    Ok(())
}

fn init_logging(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_deref().unwrap_or("info")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            guard
                .as_ref()
                .map(|_| sentry::integrations::tracing::layer()),
        )
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), RelayError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))?;
    metrics::set_global_recorder(recorder).map_err(|_| RelayError::MetricsAlreadyInstalled)?;

    Ok(())
}
