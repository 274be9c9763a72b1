mod batch;
mod checkpoint;
mod db;
mod extract;
mod fetch;
mod mapping;
mod pipeline;
mod reconcile;
mod series;
mod translate;
mod upload;
mod variant;

use std::time::Instant;

use clap::{Parser, Subcommand};

use batch::BatchMode;

const SERIES_MAP_PATH: &str = "data/series.json";

#[derive(Parser)]
#[command(name = "cardsync", about = "TCG card-catalog scraper and reconciler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the publisher's series list against the local series map
    Check {
        /// Translate new series titles and merge them into the map
        #[arg(long)]
        update: bool,
    },
    /// Scrape one series' new cards into the store
    Scrape {
        /// Publisher series code (as listed by `check`)
        series: String,
        /// Max new cards to process this run
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Discard any prior checkpoint and start over
        #[arg(long, conflicts_with = "resume")]
        fresh: bool,
        /// Resume from the prior checkpoint (the default, made explicit)
        #[arg(long)]
        resume: bool,
    },
    /// Re-run the failed items of the last run for a series
    Retry {
        /// Publisher series code
        series: String,
    },
    /// Show store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { update } => {
            let mut map = series::SeriesMap::load(SERIES_MAP_PATH)?;
            pipeline::check_series(&mut map, update).await
        }
        Commands::Scrape { series: code, limit, fresh, resume: _ } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let map = series::SeriesMap::load(SERIES_MAP_PATH)?;
            let opts = pipeline::ScrapeOptions {
                limit,
                mode: if fresh { BatchMode::Fresh } else { BatchMode::Resume },
            };
            let summary = pipeline::scrape_series(&conn, &map, &code, &opts).await?;
            summary.print();
            Ok(())
        }
        Commands::Retry { series: code } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let map = series::SeriesMap::load(SERIES_MAP_PATH)?;
            match pipeline::retry_failed(&conn, &map, &code).await? {
                Some(summary) => summary.print(),
                None => println!("No failed items recorded for {}.", code),
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Cards:        {}", s.total);
            println!("Logical ids:  {}", s.logical_cards);
            println!("ALT variants: {}", s.alt_variants);
            println!("Series:       {}", s.series);
            println!("Runs:         {}", s.runs);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
