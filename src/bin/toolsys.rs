//! Command-line diagnostics for tool system configurations

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use tabled::{builder::Builder, settings::Style};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tool_system::config::ToolSystemConfig;
use tool_system::health;
use tool_system::slot::{AliasMap, SlotRegistry};

#[derive(Parser, Debug)]
#[command(version = tool_system::build_info::PKG_VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the health checks and exit with the report's exit code
    Check {
        #[arg(long, default_value = "desktop")]
        profile: String,
    },
    /// List every configured slot with the trigger slots feeding it
    Slots {
        #[arg(long, default_value = "desktop")]
        profile: String,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Check { profile } => {
            info!(%profile, version = %tool_system::build_info::version_string(), "running health checks");
            let report = health::run_all_checks(&profile);
            health::print_report(&report);
            Ok(ExitCode::from(report.exit_code() as u8))
        }
        Command::Slots { profile } => {
            let config = ToolSystemConfig::load(&profile)
                .with_context(|| format!("failed to load profile '{}'", profile))?;
            println!("{}", slot_table(&config));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Every slot the configuration names, with its producer and trigger slots
fn slot_table(config: &ToolSystemConfig) -> String {
    let mut producers: IndexMap<&str, String> = IndexMap::new();
    for mapping in &config.raw_mappings {
        producers.insert(&mapping.target, format!("raw {}:{}", mapping.device, mapping.source));
    }
    for constant in &config.constants {
        producers.insert(&constant.slot, "constant".to_string());
    }
    for device in &config.virtual_devices {
        for input in &device.inputs {
            producers.entry(input).or_default();
        }
        producers.insert(&device.output, format!("virtual {}", device.kind));
    }
    for mapping in &config.virtual_mappings {
        producers.entry(&mapping.source).or_default();
        producers.insert(&mapping.target, format!("alias of {}", mapping.source));
    }

    let slots = SlotRegistry::new();
    let aliases = AliasMap::from_mappings(&config.virtual_mappings, &slots);

    let mut builder = Builder::default();
    builder.push_record(["Slot", "Producer", "Triggers"]);
    for (name, producer) in &producers {
        let triggers: Vec<String> = aliases
            .resolve(slots.slot(name))
            .into_iter()
            .map(|slot| slots.display(slot))
            .collect();
        let producer = if producer.is_empty() { "-" } else { producer.as_str() };
        builder.push_record([name.to_string(), producer.to_string(), triggers.join(", ")]);
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}
