// crates/dashboard/src/main.rs
//! `servelytics`: load a range from the analytics API and print the aggregated
//! result as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use servelytics_core::{AnalyticsConfig, Granularity, PeriodComparisons, PeriodMetrics};
use servelytics_dashboard::{
    CustomerTimeBlocks, HourRange, LoadStatus, PeriodView, PeriodViewSettings, TimeBlockSettings,
    WeeklyBlockSettings, WeeklyClientBlocks,
};
use servelytics_store::MetricStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "servelytics")]
#[command(about = "Restaurant revenue and customer aggregates", long_about = None)]
struct Cli {
    /// TOML config file (env overrides still apply)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Metrics of one period
    Period {
        /// hour, day, week or month
        #[arg(long, default_value = "day")]
        granularity: Granularity,

        /// Anchor instant (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,

        /// End of the visible range, defaults to the end of the period
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        /// Include child period metrics
        #[arg(long)]
        children: bool,
    },

    /// Customer counts per hour-of-day block
    TimeBlocks {
        #[arg(long)]
        start_day: DateTime<Utc>,

        #[arg(long, default_value = "8")]
        block_start_hour: u32,

        /// Block length in hours
        #[arg(long, default_value = "2")]
        block_duration: u32,

        #[arg(long, default_value = "7")]
        days: u32,
    },

    /// Weekly customer totals
    Weekly {
        #[arg(long)]
        start_date: DateTime<Utc>,

        #[arg(long, default_value = "4")]
        weeks: u32,

        #[arg(long, default_value = "8")]
        start_hour: u32,

        #[arg(long, default_value = "16")]
        end_hour: u32,

        #[arg(long, default_value = "0")]
        buffer_days: u32,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PeriodReport {
    granularity: Granularity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    metrics: PeriodMetrics,
    comparisons: PeriodComparisons,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<PeriodMetrics>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,servelytics=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AnalyticsConfig::load(cli.config.as_deref()).context("loading config")?;
    let store = Arc::new(MetricStore::from_config(&config).context("building HTTP client")?);
    tracing::info!(url = %config.api.timeseries_url(), "Using analytics API");

    let output = match cli.command {
        Commands::Period {
            granularity,
            start,
            end,
            children,
        } => {
            let period_end = granularity.bounds(start).1;
            let end = end.unwrap_or_else(|| period_end - Duration::milliseconds(1));
            let view = PeriodView::new(store);
            let state = view
                .update(&PeriodViewSettings {
                    start: Some(start),
                    end: Some(end),
                    granularity,
                })
                .await;
            let Some(period) = state.period else {
                bail!(state.error.unwrap_or_else(|| "period unavailable".into()));
            };
            let report = PeriodReport {
                granularity,
                start: period.start(),
                end: period.end(),
                metrics: period.metrics().clone(),
                comparisons: period.comparisons(),
                children: children
                    .then(|| period.children().iter().map(|c| c.metrics().clone()).collect()),
            };
            serde_json::to_string_pretty(&report)?
        }
        Commands::TimeBlocks {
            start_day,
            block_start_hour,
            block_duration,
            days,
        } => {
            let aggregator = CustomerTimeBlocks::new(store);
            let state = aggregator
                .update(&TimeBlockSettings {
                    start_day: Some(start_day),
                    block_start_hour,
                    block_duration,
                    number_of_days: days,
                })
                .await;
            if state.status == LoadStatus::Error {
                bail!(state.error.unwrap_or_default());
            }
            serde_json::to_string_pretty(&state)?
        }
        Commands::Weekly {
            start_date,
            weeks,
            start_hour,
            end_hour,
            buffer_days,
        } => {
            let aggregator = WeeklyClientBlocks::new(store);
            let state = aggregator
                .update(&WeeklyBlockSettings {
                    start_date: Some(start_date),
                    number_of_blocks: weeks,
                    time_range: HourRange {
                        start_hour,
                        end_hour,
                    },
                    buffer_days,
                })
                .await;
            if state.status == LoadStatus::Error {
                bail!(state.error.unwrap_or_default());
            }
            serde_json::to_string_pretty(&state)?
        }
    };

    println!("{output}");
    Ok(())
}
