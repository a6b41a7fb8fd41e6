//! esquery - render and run panel queries against Elasticsearch

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use esquery::TimeRange;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod http;

use config::Config;
use http::HttpClient;

#[derive(Parser)]
#[command(name = "esquery")]
#[command(about = "Build and run Elasticsearch multi-search batches from panel queries")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "esquery.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the NDJSON multi-search body without sending it
    Render(QueryArgs),

    /// Send the batch and print per-panel results
    Run(QueryArgs),
}

#[derive(Args)]
struct QueryArgs {
    /// JSON file with an array of panel queries
    #[arg(short, long)]
    queries: PathBuf,

    /// Range start, RFC 3339 (default: one hour before --to)
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// Range end, RFC 3339 (default: now)
    #[arg(long)]
    to: Option<DateTime<Utc>>,
}

impl QueryArgs {
    fn time_range(&self) -> TimeRange {
        let to = self.to.unwrap_or_else(Utc::now);
        let from = self.from.unwrap_or(to - Duration::hours(1));
        TimeRange::new(from, to)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_create(&cli.config)?;

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let client = HttpClient::new(&config.datasource)?;

    match cli.command {
        Commands::Render(args) => {
            let queries = commands::read_queries(&args.queries)?;
            commands::render(&client, &queries, args.time_range())?;
        }
        Commands::Run(args) => {
            let queries = commands::read_queries(&args.queries)?;
            commands::run(&client, &queries, args.time_range()).await?;
        }
    }

    Ok(())
}
