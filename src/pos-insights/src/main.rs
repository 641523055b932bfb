//! POS Insights: revenue, product, traffic, customer and inventory analytics
//! over a point-of-sale transaction export.
//!
//! Loads the export, wires the insight engine behind the response cache and
//! prints the requested report as JSON.

mod service;

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use pos_analytics::inventory::ForecastOptions;
use pos_analytics::InsightEngine;
use pos_cache::ResponseCache;
use pos_core::config::AppConfig;
use pos_core::{DateRange, InMemoryTransactionStore, InsightError, InsightResult};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::service::InsightService;

#[derive(Parser, Debug)]
#[command(name = "pos-insights")]
#[command(about = "Business insights from point-of-sale transactions")]
#[command(version)]
struct Cli {
    /// Transaction export (JSON array)
    #[arg(long, env = "POS_INSIGHTS__DATA")]
    data: String,

    /// Optional TOML config file (env vars still override it)
    #[arg(long, env = "POS_INSIGHTS__CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct RangeArgs {
    /// First day, YYYY-MM-DD
    #[arg(long)]
    start: String,

    /// Last day (inclusive), YYYY-MM-DD
    #[arg(long)]
    end: String,
}

impl RangeArgs {
    fn range(&self) -> InsightResult<DateRange> {
        DateRange::parse(&self.start, &self.end)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Revenue totals, daily breakdown and payment mix
    Revenue(RangeArgs),
    /// Revenue against the preceding period of equal length
    Growth(RangeArgs),
    /// Revenue, transactions and customers between two periods (A against B)
    Compare {
        #[arg(long)]
        a_start: Option<String>,
        #[arg(long)]
        a_end: Option<String>,
        #[arg(long)]
        b_start: Option<String>,
        #[arg(long)]
        b_end: Option<String>,
    },
    /// Revenue buckets by hour, day, week or month
    Trends {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, default_value = "day")]
        period: String,
        #[arg(long, default_value_t = 30)]
        limit: usize,
    },
    /// Monthly revenue for one calendar year
    Yearly {
        #[arg(long)]
        year: i32,
    },
    /// Product ranking and category breakdown
    Products {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, default_value = "revenue")]
        sort_by: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Daily sales of one product
    ProductTrend {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        product: Option<String>,
    },
    /// Monthly product sales for one calendar year
    Seasonal {
        #[arg(long)]
        year: i32,
    },
    /// Transactions and revenue per hour of day
    Hourly {
        #[command(flatten)]
        range: RangeArgs,
        /// 0 = Sunday .. 6 = Saturday
        #[arg(long)]
        day_of_week: Option<u8>,
    },
    /// Per-day statistics and weekday averages
    Daily(RangeArgs),
    /// Weekday by hour grid with staffing for every weekday
    Weekly(RangeArgs),
    /// Staffing recommendation for one weekday
    Staffing {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        day_of_week: u8,
    },
    /// Hourly utilization against a capacity ceiling
    Capacity {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        max_capacity: Option<u32>,
    },
    /// Customer counts, RFM segments and loyalty metrics
    Customers(RangeArgs),
    /// Every identified customer with RFM scores
    Profiles(RangeArgs),
    /// One customer's profile
    Customer {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        token: Option<String>,
    },
    /// Month-over-month retention
    Retention(RangeArgs),
    /// First-purchase cohorts
    Cohorts(RangeArgs),
    /// Demand forecast, safety stock, EOQ and waste risk per product
    Inventory {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        horizon: Option<usize>,
        #[arg(long)]
        min_history: Option<usize>,
    },
    /// Every metric family over one shared pass
    Snapshot(RangeArgs),
}

fn optional_range(start: Option<String>, end: Option<String>) -> InsightResult<Option<DateRange>> {
    match (start, end) {
        (Some(start), Some(end)) => DateRange::parse(&start, &end).map(Some),
        _ => Ok(None),
    }
}

async fn run(service: &InsightService, command: Command) -> anyhow::Result<Value> {
    let value = match command {
        Command::Revenue(args) => service.revenue_metrics(&args.range()?)?,
        Command::Growth(args) => service.growth_rate(&args.range()?)?,
        Command::Compare {
            a_start,
            a_end,
            b_start,
            b_end,
        } => service.compare(
            optional_range(a_start, a_end)?,
            optional_range(b_start, b_end)?,
        )?,
        Command::Trends {
            range,
            period,
            limit,
        } => service.revenue_trends(&range.range()?, &period, limit)?,
        Command::Yearly { year } => service.yearly_revenue(year)?,
        Command::Products {
            range,
            sort_by,
            limit,
        } => service.product_performance(&range.range()?, &sort_by, limit)?,
        Command::ProductTrend { range, product } => {
            service.product_trend(product.as_deref(), &range.range()?)?
        }
        Command::Seasonal { year } => service.seasonal(year)?,
        Command::Hourly { range, day_of_week } => service.hourly(&range.range()?, day_of_week)?,
        Command::Daily(args) => service.daily_traffic(&args.range()?)?,
        Command::Weekly(args) => service.weekly_patterns(&args.range()?)?,
        Command::Staffing { range, day_of_week } => {
            service.staffing(&range.range()?, day_of_week)?
        }
        Command::Capacity {
            range,
            max_capacity,
        } => service.capacity(&range.range()?, max_capacity)?,
        Command::Customers(args) => service.customer_insights(&args.range()?)?,
        Command::Profiles(args) => service.customer_profiles(&args.range()?)?,
        Command::Customer { range, token } => service.customer(token.as_deref(), &range.range()?)?,
        Command::Retention(args) => service.retention(&args.range()?)?,
        Command::Cohorts(args) => service.cohorts(&args.range()?)?,
        Command::Inventory {
            range,
            horizon,
            min_history,
        } => service.inventory_report(
            &range.range()?,
            ForecastOptions {
                horizon_days: horizon,
                min_history_days: min_history,
            },
        )?,
        Command::Snapshot(args) => {
            let snapshot = service.snapshot(&args.range()?).await?;
            serde_json::to_value(snapshot)?
        }
    };
    Ok(value)
}

/// Error body printed for rejected requests.
fn error_body(err: &anyhow::Error) -> Value {
    match err.downcast_ref::<InsightError>() {
        Some(insight) => json!({
            "error": { "code": insight.code(), "message": insight.to_string() }
        }),
        None => json!({
            "error": { "code": "INTERNAL_ERROR", "message": err.to_string() }
        }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pos_insights=info,pos_analytics=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load_from(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    let store = InMemoryTransactionStore::from_json_file(&cli.data)?;
    info!(
        data = %cli.data,
        transactions = store.len(),
        lead_time_days = config.inventory.lead_time_days,
        cache_max_entries = config.cache.max_entries,
        "Transactions loaded"
    );

    let engine = Arc::new(InsightEngine::new(Arc::new(store), &config));
    let service = InsightService::new(engine, ResponseCache::new(&config.cache));

    match run(&service, cli.command).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "Request failed");
            println!("{}", serde_json::to_string_pretty(&error_body(&err))?);
            std::process::exit(1);
        }
    }
}
