use anyhow::{anyhow, Result};
use backtester::{
    context::AppContext,
    models::{BacktestRequest, BacktestStatus},
    orchestrator::DEFAULT_SYMBOL_SAMPLE,
    store::ResultStore,
    worker::WorkerPool,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;
use std::env;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "backtester")]
#[command(about = "Strategy backtesting service for the trading terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a backtest and run it inline
    Run {
        /// Strategy id to simulate
        strategy_id: String,
        /// Simulation window start (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Simulation window end (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
        /// Label for the run; defaults to the strategy id and window
        #[arg(long)]
        name: Option<String>,
        /// Starting cash for the simulated portfolio
        #[arg(long, default_value_t = 100_000.0)]
        initial_capital: f64,
        /// Commission rate override (falls back to the stored setting)
        #[arg(long)]
        commission: Option<f64>,
        /// Slippage rate override (falls back to the stored setting)
        #[arg(long)]
        slippage: Option<f64>,
        /// Symbols to test; empty means a sample of the active universe
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
        /// How many active symbols to sample when none are given
        #[arg(long, default_value_t = DEFAULT_SYMBOL_SAMPLE)]
        sample_size: i64,
    },
    /// Queue a backtest for the worker pool instead of running it inline
    Queue {
        strategy_id: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 100_000.0)]
        initial_capital: f64,
        #[arg(long)]
        commission: Option<f64>,
        #[arg(long)]
        slippage: Option<f64>,
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },
    /// Run every queued backtest with a bounded worker pool
    Worker {
        /// Concurrent runs; defaults to the CPU count
        #[arg(long)]
        max_concurrent: Option<usize>,
    },
    /// Print a stored backtest's results
    Show { backtest_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow!("DATABASE_URL must be set to reach the analytic store"))?;
    let context = AppContext::connect(&database_url).await?;

    match cli.command {
        Commands::Run {
            strategy_id,
            start,
            end,
            name,
            initial_capital,
            commission,
            slippage,
            symbols,
            sample_size,
        } => {
            let request = build_request(
                &context,
                strategy_id,
                name,
                start,
                end,
                initial_capital,
                commission,
                slippage,
                symbols,
            )
            .await?;
            let orchestrator = context.orchestrator(sample_size);
            let backtest_id = orchestrator
                .create(&request, BacktestStatus::Running)
                .await?;
            let summary = orchestrator.run(&backtest_id, &[]).await?;
            print_summary(&backtest_id, &summary.statistics, summary.final_value);
        }
        Commands::Queue {
            strategy_id,
            start,
            end,
            name,
            initial_capital,
            commission,
            slippage,
            symbols,
        } => {
            let request = build_request(
                &context,
                strategy_id,
                name,
                start,
                end,
                initial_capital,
                commission,
                slippage,
                symbols,
            )
            .await?;
            let orchestrator = context.orchestrator(DEFAULT_SYMBOL_SAMPLE);
            let backtest_id = orchestrator
                .create(&request, BacktestStatus::Pending)
                .await?;
            info!("Queued backtest {}", backtest_id);
            println!("{}", backtest_id);
        }
        Commands::Worker { max_concurrent } => {
            let orchestrator = Arc::new(context.orchestrator(DEFAULT_SYMBOL_SAMPLE));
            let pool = WorkerPool::new(orchestrator, context.store(), max_concurrent);
            let report = pool.drain_pending().await?;
            info!(
                "Worker pass finished: {} completed, {} failed of {}",
                report.completed, report.failed, report.total
            );
        }
        Commands::Show { backtest_id } => {
            show_backtest(&context, &backtest_id).await?;
        }
    }

    Ok(())
}

async fn build_request(
    context: &AppContext,
    strategy_id: String,
    name: Option<String>,
    start: NaiveDate,
    end: NaiveDate,
    initial_capital: f64,
    commission: Option<f64>,
    slippage: Option<f64>,
    symbols: Vec<String>,
) -> Result<BacktestRequest> {
    let (default_commission, default_slippage) =
        context.database().resolve_trading_costs().await?;
    let name = name.unwrap_or_else(|| format!("{} {} to {}", strategy_id, start, end));
    Ok(BacktestRequest {
        strategy_id,
        name,
        start_date: start,
        end_date: end,
        initial_capital,
        commission_rate: commission.unwrap_or(default_commission),
        slippage_rate: slippage.unwrap_or(default_slippage),
        symbols,
    })
}

async fn show_backtest(context: &AppContext, backtest_id: &str) -> Result<()> {
    let store = context.store();
    let backtest = store
        .get_backtest(backtest_id)
        .await?
        .ok_or_else(|| anyhow!("backtest {} not found", backtest_id))?;

    println!("Backtest {} ({})", backtest.id, backtest.name);
    println!(
        "  strategy {}  window {} to {}  status {}",
        backtest.strategy_id,
        backtest.start_date,
        backtest.end_date,
        backtest.status.as_str()
    );
    println!("  initial capital {:.2}", backtest.initial_capital);

    match backtest.statistics {
        Some(statistics) => {
            let curve = store.list_equity_curve(backtest_id).await?;
            let final_value = curve
                .last()
                .map(|point| point.portfolio_value)
                .unwrap_or(backtest.initial_capital);
            print_summary(backtest_id, &statistics, final_value);
        }
        None => println!("  no statistics recorded (run not completed)"),
    }

    let trades = store.list_trades(backtest_id).await?;
    println!("  {} trade(s):", trades.len());
    for trade in trades {
        match (trade.exit_date, trade.exit_price, trade.pnl) {
            (Some(exit_date), Some(exit_price), Some(pnl)) => println!(
                "    {} x{} {} @ {:.2} -> {} @ {:.2}  pnl {:.2}",
                trade.symbol,
                trade.quantity,
                trade.entry_date,
                trade.entry_price,
                exit_date,
                exit_price,
                pnl
            ),
            _ => println!(
                "    {} x{} {} @ {:.2}  (open)",
                trade.symbol, trade.quantity, trade.entry_date, trade.entry_price
            ),
        }
    }

    Ok(())
}

fn print_summary(
    backtest_id: &str,
    statistics: &backtester::models::BacktestStatistics,
    final_value: f64,
) {
    println!("Results for backtest {}", backtest_id);
    println!("  final value     {:.2}", final_value);
    println!("  total return    {:.2}%", statistics.total_return);
    println!("  max drawdown    {:.2}%", statistics.max_drawdown);
    println!("  sharpe ratio    {:.2}", statistics.sharpe_ratio);
    println!(
        "  trades          {} ({} wins / {} losses, win rate {:.1}%)",
        statistics.total_trades,
        statistics.winning_trades,
        statistics.losing_trades,
        statistics.win_rate
    );
    println!("  profit factor   {:.2}", statistics.profit_factor);
    println!(
        "  avg win/loss    {:.2} / {:.2}",
        statistics.avg_win, statistics.avg_loss
    );
    println!(
        "  largest win/loss {:.2} / {:.2}",
        statistics.largest_win, statistics.largest_loss
    );
}
