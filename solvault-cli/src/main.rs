//! SolVault CLI: simulated sessions, risk/reward and config commands.
//!
//! Commands:
//! - `run`: drive a session from a TOML config (or the built-in demo)
//! - `risk`: risk, reward and ratio for an entry/stop/target triple
//! - `config`: print the default config, or validate a file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde_json::json;
use solvault_core::domain::Side;
use solvault_core::engine::OrderEvent;
use solvault_core::risk;
use solvault_sim::{init_tracing, SessionConfig, SessionSummary, TickReport, TradingSession};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "solvault",
    about = "SolVault: conditional order engine over a simulated quote/swap venue"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated trading session.
    Run {
        /// Path to a TOML session config. Defaults to the built-in demo.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the number of ticks.
        #[arg(long)]
        ticks: Option<u64>,

        /// Override the random seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Emit logs as JSON instead of pretty text.
        #[arg(long, default_value_t = false)]
        json_logs: bool,

        /// Only print the final summary.
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },
    /// Compute risk, reward and ratio for a bracket.
    Risk {
        #[arg(long)]
        entry: Decimal,

        #[arg(long)]
        stop: Decimal,

        #[arg(long)]
        target: Decimal,

        #[arg(long, value_enum)]
        side: SideArg,

        #[arg(long, default_value_t = Decimal::ONE)]
        size: Decimal,
    },
    /// Print the default session config, or validate one.
    Config {
        /// Validate this file instead of printing the default.
        #[arg(long)]
        check: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Long,
    Short,
}

impl From<SideArg> for Side {
    fn from(arg: SideArg) -> Self {
        match arg {
            SideArg::Long => Side::Long,
            SideArg::Short => Side::Short,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            ticks,
            seed,
            json_logs,
            quiet,
        } => run_session(config, ticks, seed, json_logs, quiet),
        Commands::Risk {
            entry,
            stop,
            target,
            side,
            size,
        } => run_risk(entry, stop, target, side.into(), size),
        Commands::Config { check } => run_config(check),
    }
}

fn run_session(
    config_path: Option<PathBuf>,
    ticks: Option<u64>,
    seed: Option<u64>,
    json_logs: bool,
    quiet: bool,
) -> Result<()> {
    init_tracing(json_logs)?;

    let mut config = match &config_path {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(ticks) = ticks {
        config.ticks = ticks;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    config.validate()?;

    info!(seed = config.seed, ticks = config.ticks, "starting session");
    let session = TradingSession::from_config(&config)?;
    let summary = session.run(|report| {
        if !quiet {
            print_tick(report);
        }
    });

    print_summary(&summary)
}

fn print_tick(report: &TickReport) {
    println!(
        "Tick {} | {} {:.2}",
        report
            .dashboard
            .latest
            .as_ref()
            .map_or(0, |snapshot| snapshot.tick),
        report.tick.instrument,
        report.tick.price
    );
    for event in &report.events {
        println!("  {}", describe(event));
    }
    println!("{}\n", report.dashboard);
}

fn describe(event: &OrderEvent) -> String {
    match event {
        OrderEvent::TrailingStopMoved {
            order_id,
            trigger_price,
        } => format!("{order_id}: trailing stop moved to {trigger_price:.2}"),
        OrderEvent::Triggered { order_id, price } => {
            format!("{order_id}: triggered at {price:.2}")
        }
        OrderEvent::Filled {
            order_id,
            fill,
            position_id,
            realized_pnl,
        } => format!(
            "{order_id}: filled {} @ {:.2} on {position_id} (realized {realized_pnl:.2})",
            fill.size, fill.price
        ),
        OrderEvent::Rejected { order_id, reason } => format!("{order_id}: rejected ({reason})"),
        OrderEvent::Cancelled { order_id, reason } => format!("{order_id}: cancelled ({reason})"),
        OrderEvent::BracketLegActivated {
            order_id,
            position_id,
        } => format!("{order_id}: bracket leg now protecting {position_id}"),
        OrderEvent::PositionClosed {
            position_id,
            realized_pnl,
        } => format!("{position_id}: closed, realized {realized_pnl:.2}"),
    }
}

fn print_summary(summary: &SessionSummary) -> Result<()> {
    let view = json!({
        "instrument": summary.instrument,
        "ticks": summary.ticks,
        "final_price": summary.final_price,
        "initial_balance": summary.initial_balance,
        "final_balance": summary.final_balance,
        "realized_pnl": summary.realized_pnl,
        "portfolio_value": summary.portfolio_value,
        "liquidity_remaining": summary.liquidity_remaining,
        "orders": {
            "filled": summary.orders_filled,
            "cancelled": summary.orders_cancelled,
            "rejected": summary.orders_rejected,
        },
        "positions": summary.report.positions,
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn run_risk(entry: Decimal, stop: Decimal, target: Decimal, side: Side, size: Decimal) -> Result<()> {
    let rr = risk::compute(entry, stop, target, side, size)?;
    println!("Side:   {}", rr.side);
    println!("Risk:   {:.4}", rr.risk);
    println!("Reward: {:.4}", rr.reward);
    println!("Ratio:  {:.4}", rr.ratio);
    println!("P&L at stop:   {:.4}", rr.projected_pnl(stop));
    println!("P&L at target: {:.4}", rr.projected_pnl(target));
    Ok(())
}

fn run_config(check: Option<PathBuf>) -> Result<()> {
    match check {
        Some(path) => {
            let config = SessionConfig::from_file(&path)
                .with_context(|| format!("checking {}", path.display()))?;
            println!(
                "{}: ok ({} ticks, {} orders, {} positions)",
                path.display(),
                config.ticks,
                config.orders.len(),
                config.positions.len()
            );
        }
        None => print!("{}", SessionConfig::default().to_toml()?),
    }
    Ok(())
}
