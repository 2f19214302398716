use colored::Colorize;
use tab_server::{TabConfig, TabServer};
use tab_settle::SettlementReport;
use tab_types::TipPercent;

use crate::bill::BillFile;
use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Settle(args) => cmd_settle(args, cli.format),
        Command::Config => cmd_config(),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => TabConfig::load(path)?,
        None => TabConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    println!(
        "{} TabSplit server on {}",
        "✓".green().bold(),
        config.server.bind_addr.to_string().bold()
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(TabServer::new(config).serve())?;
    Ok(())
}

fn cmd_settle(args: SettleArgs, format: OutputFormat) -> anyhow::Result<()> {
    let bill = BillFile::load(&args.file)?;
    let tip = args.tip.map(TipPercent::new).transpose()?;
    let report = bill.settle(tip);
    tracing::debug!(shares = report.shares.len(), "bill settled");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_report(&report)),
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    print!("{}", TabConfig::default().to_toml()?);
    Ok(())
}

fn render_report(report: &SettlementReport) -> String {
    let mut out = String::new();
    let currency = report.currency.as_str();
    for share in &report.shares {
        out.push_str(&format!(
            "{:<20} {:>10} + {:>3}% tip {:>10}  = {} {}\n",
            share.display_name.bold(),
            share.dishes_total.round_dp(2),
            share.tip_percent,
            share.tip_amount.round_dp(2),
            share.grand_total.to_string().green().bold(),
            currency
        ));
    }
    for line in &report.unclaimed_items {
        out.push_str(&format!(
            "{} {} × {} ({} {})\n",
            "unclaimed:".yellow(),
            line.name,
            line.unclaimed_units,
            line.unclaimed_amount.round_dp(2),
            currency
        ));
    }
    out.push_str(&format!(
        "{} {} {} (bill {}, rounding {})\n",
        "Total:".bold(),
        report.grand_total.to_string().green().bold(),
        currency,
        report.items_total,
        report.rounding_surplus.round_dp(2)
    ));
    out
}
