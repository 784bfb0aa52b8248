// Demo Orchestrator - Replays a stake / deposit / borrow / rebase / repay story
// against one market and prints the state of every account after each step

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use prometheus::{Encoder, TextEncoder};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;
use token_core::{
    generate_address, spawn_market_actor, AccountSnapshot, Address, CompositeObserver, Config,
    Market, MarketHandle, MarketSnapshot, Metrics, MetricsObserver, TracingObserver,
};
use tracing_subscriber::EnvFilter;

const HEADER_WIDTH: usize = 110;

/// Replay the stake / deposit / borrow / rebase / repay story against one market
#[derive(Debug, Clone, Default, Parser)]
#[command(author, version)]
pub struct DemoOptions {
    /// Print every block as JSON instead of a table
    #[arg(long)]
    pub json: bool,
    /// Dump Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedAccount {
    pub name: String,
    #[serde(flatten)]
    pub account: AccountSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub accounts: Vec<NamedAccount>,
    pub market: MarketSnapshot,
}

pub struct DemoOrchestrator {
    handle: MarketHandle,
    accounts: Vec<(String, Address)>,
    options: DemoOptions,
    reports: Vec<StepReport>,
}

impl DemoOrchestrator {
    pub fn new(handle: MarketHandle, options: DemoOptions) -> Self {
        Self {
            handle,
            accounts: Vec::new(),
            options,
            reports: Vec::new(),
        }
    }

    /// Create a named account, staking `units` when non-zero
    async fn open_account(&mut self, name: &str, units: Decimal) -> Result<Address> {
        let address = generate_address();
        if !units.is_zero() {
            let balance = self.handle.stake(address.clone(), units).await?;
            anyhow::ensure!(balance == units, "stake of {} for {} gave {}", units, name, balance);
        }
        self.accounts.push((name.to_string(), address.clone()));
        Ok(address)
    }

    /// Run the full story
    pub async fn run_scenario(&mut self) -> Result<()> {
        let a = self.open_account("a", dec!(1000)).await?;
        let b = self.open_account("b", dec!(1000)).await?;
        let c = self.open_account("c", Decimal::ZERO).await?;
        self.block("Initial state").await?;

        self.handle.deposit(a.clone(), dec!(500)).await?;
        self.handle.deposit(b.clone(), dec!(500)).await?;
        self.block("Deposit #1").await?;

        self.handle.borrow(c.clone(), dec!(500)).await?;
        self.block("Borrow #1").await?;

        self.handle.rebase_by_factor(dec!(2)).await?;
        self.block("Rebase #1").await?;

        self.handle.repay(c.clone(), dec!(500)).await?;
        self.block("Repay #1").await?;

        self.handle.rebase_by_factor(dec!(2)).await?;
        self.block("Rebase #2").await?;

        let d = self.open_account("d", dec!(1000)).await?;
        self.handle.deposit(d, dec!(500)).await?;
        self.block("Deposit #2").await?;

        self.handle.rebase_by_factor(dec!(2)).await?;
        self.block("Rebase #3").await?;

        self.handle.borrow(c.clone(), dec!(500)).await?;
        self.block("Borrow #2").await?;

        self.handle.rebase_by_factor(dec!(2)).await?;
        self.block("Rebase #4").await?;

        self.handle.repay(c, dec!(500)).await?;
        self.block("Repay #2").await?;

        Ok(())
    }

    async fn block(&mut self, step: &str) -> Result<()> {
        let mut accounts = Vec::with_capacity(self.accounts.len());
        for (name, address) in &self.accounts {
            accounts.push(NamedAccount {
                name: name.clone(),
                account: self.handle.account(address.clone()).await?,
            });
        }
        let report = StepReport {
            step: step.to_string(),
            accounts,
            market: self.handle.snapshot().await?,
        };

        if self.options.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_block(&report);
        }
        self.reports.push(report);
        Ok(())
    }

    pub fn reports(&self) -> &[StepReport] {
        &self.reports
    }
}

fn block_header(step: &str) -> String {
    let name = format!("  {}  ", step);
    let name = format!("{:=<70}", name);
    format!("{:=>width$}", name, width = HEADER_WIDTH)
}

fn print_block(report: &StepReport) {
    println!("{}", block_header(&report.step).bright_cyan().bold());
    for named in &report.accounts {
        let account = &named.account;
        println!(
            "{} {} {} {}",
            format!("{:>2}", named.name).bold(),
            format!("base = {}", account.base_balance.normalize()).green(),
            format!("receipt = {}", account.receipt_balance.normalize()).yellow(),
            format!("debt = {}", account.debt_balance.normalize()).red(),
        );
    }
    let market = &report.market;
    println!(
        "{} {} {} {}",
        "vault".bold(),
        format!("base held = {}", market.vault_base_balance.normalize()).green(),
        format!("receipt supply = {}", market.totals.receipt_total_supply.normalize()).yellow(),
        format!("tracked shares = {}", market.totals.receipt_total_shares.normalize()).blue(),
    );
    println!("{}", "=".repeat(HEADER_WIDTH).bright_cyan());
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn dump_metrics(metrics: &Metrics) -> Result<()> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metrics.registry().gather(), &mut buffer)
        .context("encoding metrics")?;
    println!("{}", String::from_utf8(buffer)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = DemoOptions::parse();
    let config = Config::from_env()?;
    init_tracing(&config);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "starting demo orchestrator"
    );

    let metrics = Metrics::new()?;
    let observer = CompositeObserver::new()
        .with(Arc::new(TracingObserver::new(config.logging.verbose)))
        .with(Arc::new(MetricsObserver::new(metrics.clone())));
    let market = Market::from_config(&config.market)?.with_observer(Arc::new(observer));
    let handle = spawn_market_actor(market, config.actor.mailbox_capacity);

    let mut orchestrator = DemoOrchestrator::new(handle.clone(), options.clone());
    orchestrator.run_scenario().await?;

    if options.metrics {
        dump_metrics(&metrics)?;
    }

    handle.shutdown().await?;
    println!(
        "{}",
        format!("Scenario complete: {} steps", orchestrator.reports().len())
            .green()
            .bold()
    );
    Ok(())
}
