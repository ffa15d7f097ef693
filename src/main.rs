use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dividend_screener::api::{
    CsvUniverseProvider, StaticUniverse, TickerUniverseProvider, YahooClient,
};
use dividend_screener::models::{Config, UniverseSource};
use dividend_screener::report::CsvReportWriter;
use dividend_screener::{ReportTrigger, Scorer, ScreeningPipeline};

#[derive(Parser, Debug)]
#[command(author, version, about = "Screens dividend stocks and writes a ranked report", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one screening pass and write the report
    Run {
        /// Report file path (overrides SCREENER_REPORT_PATH)
        #[arg(short, long)]
        output: Option<String>,

        /// Number of concurrent workers (overrides SCREENER_WORKERS)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Run at the configured daily times until Ctrl-C
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dividend_screener=info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            std::process::exit(1);
        }
    };

    match args.command {
        Command::Run { output, workers } => {
            if let Some(output) = output {
                config.report_path = output;
            }
            if let Some(workers) = workers {
                config.pipeline.worker_count = workers;
            }

            let trigger = build_trigger(&config)?;
            let result = trigger.run_once().await?;
            info!("📊 {} candidates ranked", result.len());
        }
        Command::Schedule => {
            let trigger = Arc::new(build_trigger(&config)?);
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown_tx.send(());
                }
            });

            info!("🚀 Screener started, waiting for scheduled times: {:?}", config.schedule);
            trigger.run_until(shutdown_rx).await?;
        }
    }

    Ok(())
}

fn build_trigger(config: &Config) -> Result<ReportTrigger> {
    let universe: Arc<dyn TickerUniverseProvider> = match &config.universe {
        UniverseSource::Static(tickers) => Arc::new(StaticUniverse::new(tickers.clone())),
        UniverseSource::Remote(sources) => Arc::new(CsvUniverseProvider::new(sources.clone())?),
    };
    let source = Arc::new(
        YahooClient::new(&config.yahoo_base_url, &config.domestic_suffix)?
            .with_cookie_url(&config.yahoo_cookie_url)?,
    );
    let scorer = Scorer::new(config.criteria.clone(), config.weights.clone(), config.locale);

    let pipeline = ScreeningPipeline::new(universe, source, scorer, config.pipeline.clone());
    let sink = Arc::new(CsvReportWriter::new(&config.report_path));

    Ok(ReportTrigger::new(Arc::new(pipeline), sink, config.schedule.clone()))
}
