//! Instance Fleet Resolver CLI
//!
//! A command-line tool for inspecting the instance type catalog, asking for
//! launch targets, and managing the failure blocklist of a running resolver.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use client::Pattern;
use commands::{blocks, failures, instance_types, launch};
use fleet_lib::CapacityType;
use std::path::PathBuf;

/// Instance Fleet Resolver CLI
#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(author, version, about = "CLI for the Instance Fleet Resolver", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via FLEETCTL_API_URL env var)
    #[arg(long, env = "FLEETCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the instance type catalog for a node class
    InstanceTypes {
        /// Node class JSON file
        #[arg(long)]
        node_class: PathBuf,

        /// Bypass cached vendor inventory
        #[arg(long)]
        refresh: bool,
    },

    /// Pick an instance type, zone and subnet for a scheduling request
    Launch {
        /// Node class JSON file
        #[arg(long)]
        node_class: PathBuf,

        /// Scheduling request JSON file (unconstrained if omitted)
        #[arg(long)]
        request: Option<PathBuf>,
    },

    /// Inspect and manage blocked offerings
    #[command(subcommand)]
    Blocks(BlocksCommands),

    /// Inspect and report launch failures
    #[command(subcommand)]
    Failures(FailuresCommands),
}

#[derive(Subcommand)]
pub enum BlocksCommands {
    /// List live blocks
    List,

    /// Block an offering pattern; omitted fields match anything
    Add {
        #[command(flatten)]
        pattern: PatternArgs,

        /// Why the pattern is blocked
        #[arg(long)]
        reason: String,
    },

    /// Check whether an offering is blocked
    Check {
        #[arg(long)]
        instance_type: String,

        #[arg(long)]
        capacity_type: CapacityType,

        #[arg(long)]
        zone: String,
    },
}

#[derive(Subcommand)]
pub enum FailuresCommands {
    /// Show the insufficient-capacity count for a pattern
    Count {
        #[command(flatten)]
        pattern: PatternArgs,
    },

    /// Report a failed launch from a JSON file
    Report {
        /// Failure report JSON file
        #[arg(long)]
        file: PathBuf,
    },
}

/// Offering pattern flags
#[derive(Args)]
pub struct PatternArgs {
    /// Instance type, e.g. S5.LARGE8
    #[arg(long)]
    instance_type: Option<String>,

    /// Capacity type (spot or on-demand)
    #[arg(long)]
    capacity_type: Option<CapacityType>,

    /// Zone, e.g. ap-guangzhou-3
    #[arg(long)]
    zone: Option<String>,
}

impl From<PatternArgs> for Pattern {
    fn from(args: PatternArgs) -> Self {
        Pattern {
            instance_type: args.instance_type,
            capacity_type: args.capacity_type.map(|c| c.as_str().to_string()),
            zone: args.zone,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let api_url = config::Config::load()?.resolve_api_url(cli.api_url);
    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::InstanceTypes {
            node_class,
            refresh,
        } => {
            instance_types::list_instance_types(&client, &node_class, refresh, cli.format).await?;
        }
        Commands::Launch {
            node_class,
            request,
        } => {
            launch::launch(&client, &node_class, request.as_deref(), cli.format).await?;
        }
        Commands::Blocks(blocks_cmd) => match blocks_cmd {
            BlocksCommands::List => {
                blocks::list_blocks(&client, cli.format).await?;
            }
            BlocksCommands::Add { pattern, reason } => {
                blocks::add_block(&client, pattern.into(), reason, cli.format).await?;
            }
            BlocksCommands::Check {
                instance_type,
                capacity_type,
                zone,
            } => {
                let pattern = Pattern {
                    instance_type: Some(instance_type),
                    capacity_type: Some(capacity_type.as_str().to_string()),
                    zone: Some(zone),
                };
                blocks::check_block(&client, pattern, cli.format).await?;
            }
        },
        Commands::Failures(failures_cmd) => match failures_cmd {
            FailuresCommands::Count { pattern } => {
                failures::failure_count(&client, pattern.into(), cli.format).await?;
            }
            FailuresCommands::Report { file } => {
                failures::report_failure(&client, &file, cli.format).await?;
            }
        },
    }

    Ok(())
}
