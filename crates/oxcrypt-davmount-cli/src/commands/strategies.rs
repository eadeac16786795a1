//! Strategies command - show which mount strategies apply to this host.

use anyhow::Result;
use clap::Args as ClapArgs;
use comfy_table::{Cell, Color, Table};
use tracing::instrument;

use oxcrypt_davmount::{HostInfo, StrategyInfo, StrategySelector};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[instrument(level = "info", name = "cmd::strategies", skip_all)]
pub fn execute(args: &Args) -> Result<()> {
    let selector = StrategySelector::new();
    let info = selector.strategy_info();
    let selected = info.iter().find(|s| s.applicable).map(|s| s.id.as_str());

    if args.json {
        output_json(selector.host(), &info, selected)?;
    } else {
        output_table(selector.host(), &info);
        match selected {
            Some(id) => eprintln!("Selected: {id}"),
            None => eprintln!("No mount strategy applies to this host."),
        }
    }
    Ok(())
}

fn output_json(host: &HostInfo, info: &[StrategyInfo], selected: Option<&str>) -> Result<()> {
    let output = serde_json::json!({
        "host": {
            "os": host.os,
            "os_version": host.os_version,
            "desktop": host.desktop,
        },
        "strategies": info,
        "selected": selected,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn output_table(host: &HostInfo, info: &[StrategyInfo]) {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Applicable"]);

    for strategy in info {
        let applicable = if strategy.applicable {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&strategy.id),
            Cell::new(&strategy.name),
            applicable,
        ]);
    }

    eprintln!(
        "Host: {}{}{}",
        host.os,
        host.os_version
            .as_deref()
            .map(|v| format!(" {v}"))
            .unwrap_or_default(),
        host.desktop
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default(),
    );
    println!("{table}");
}
