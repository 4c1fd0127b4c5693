//! CLI module
//!
//! This module defines the command-line interface using clap and implements
//! the command execution logic.

use crate::trace::{ChangePolicy, ClusteringMode};
use crate::{Config, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;
pub mod output;

/// Ledger flow tracer CLI
#[derive(Parser, Debug)]
#[command(name = "flow-tracer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Trace value flow outward from a seed address
    Trace {
        /// Seed address
        #[arg(short, long)]
        address: String,

        /// Data source type (overrides config)
        #[arg(short, long, value_enum)]
        source: Option<DataSourceType>,

        /// JSON ledger fixture for the mock source
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Hops to expand beyond the seed
        #[arg(short, long)]
        depth: Option<u32>,

        /// Maximum number of addresses to expand
        #[arg(long)]
        max_visited: Option<usize>,

        /// Change output heuristic
        #[arg(long, value_enum)]
        change_policy: Option<ChangePolicy>,

        /// How co-spent inputs merge into clusters
        #[arg(long, value_enum)]
        clustering: Option<ClusteringMode>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,

        /// Enable caching
        #[arg(long)]
        cache: bool,

        /// Cache TTL in seconds (overrides config)
        #[arg(long)]
        cache_ttl: Option<u64>,

        /// Blockchair API key (overrides config)
        #[arg(long, env = "BLOCKCHAIR_API_KEY")]
        api_key: Option<String>,
    },

    /// Show one transaction with its change output and input cluster
    Tx {
        /// Transaction id
        #[arg(long)]
        id: String,

        /// Data source type (overrides config)
        #[arg(short, long, value_enum)]
        source: Option<DataSourceType>,

        /// JSON ledger fixture for the mock source
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Change output heuristic
        #[arg(long, value_enum)]
        change_policy: Option<ChangePolicy>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
}

/// Data source types
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DataSourceType {
    /// In-memory ledger (demo data or a JSON fixture)
    Mock,
    /// Blockchair REST API
    Blockchair,
}

/// Output format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text table
    Table,
    /// DOT format (Graphviz)
    Dot,
}

/// Execute the CLI command
pub async fn execute(args: Cli, config: Config) -> Result<()> {
    match args.command {
        Commands::Trace { .. } => commands::trace::execute(args, config).await,
        Commands::Tx { .. } => commands::tx::execute(args, config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "flow-tracer",
            "trace",
            "--address",
            "Alice",
            "--source",
            "mock",
            "--depth",
            "3",
            "--change-policy",
            "smallest-output",
            "--output",
            "dot",
        ])
        .unwrap();

        match cli.command {
            Commands::Trace {
                address,
                source,
                depth,
                change_policy,
                output,
                max_visited,
                ..
            } => {
                assert_eq!(address, "Alice");
                assert_eq!(source, Some(DataSourceType::Mock));
                assert_eq!(depth, Some(3));
                assert_eq!(change_policy, Some(ChangePolicy::SmallestOutput));
                assert_eq!(output, OutputFormat::Dot);
                assert_eq!(max_visited, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from([
            "flow-tracer",
            "tx",
            "--id",
            "tx1",
            "--config",
            "/tmp/tracer.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/tracer.toml")));
        assert!(matches!(cli.command, Commands::Tx { ref id, .. } if id == "tx1"));
    }

    #[test]
    fn test_trace_requires_address() {
        assert!(Cli::try_parse_from(["flow-tracer", "trace"]).is_err());
    }

    #[test]
    fn test_rejects_unknown_source() {
        let result = Cli::try_parse_from([
            "flow-tracer",
            "trace",
            "--address",
            "A",
            "--source",
            "electrum",
        ]);
        assert!(result.is_err());
    }
}
