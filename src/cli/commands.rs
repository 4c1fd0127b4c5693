//! CLI command implementations
//!
//! This module contains the implementation for each CLI command.

use crate::cli::{Cli, DataSourceType};
use crate::{Config, Error, Result};
use clap::ValueEnum;

/// Source named on the command line, else the one from `[default] source`
fn resolve_source(flag: Option<DataSourceType>, config: &Config) -> Result<DataSourceType> {
    match flag {
        Some(source) => Ok(source),
        None => DataSourceType::from_str(&config.default.source, true).map_err(|_| {
            Error::Config(format!(
                "unknown data source '{}' (expected mock or blockchair)",
                config.default.source
            ))
        }),
    }
}

/// Trace command implementation
pub mod trace {
    use super::*;
    use crate::cli::{Commands, OutputFormat, output};
    use crate::data_source::create_data_source;
    use crate::trace::analyzer;
    use std::time::Duration;

    /// Execute the trace command
    pub async fn execute(args: Cli, mut config: Config) -> Result<()> {
        let Commands::Trace {
            address,
            source,
            fixture,
            depth,
            max_visited,
            change_policy,
            clustering,
            output: format,
            cache,
            cache_ttl,
            api_key,
        } = args.command
        else {
            return Err(Error::custom("trace::execute called with wrong command"));
        };

        let address = address.trim().to_string();
        if address.is_empty() {
            return Err(Error::InvalidAddress("seed address is empty".to_string()));
        }

        // Command-line flags override the configuration file
        if let Some(depth) = depth {
            config.trace.max_depth = depth;
        }
        if let Some(max_visited) = max_visited {
            config.trace.max_visited = max_visited;
        }
        if let Some(policy) = change_policy {
            config.trace.change_policy = policy;
        }
        if let Some(mode) = clustering {
            config.trace.clustering = mode;
        }
        if let Some(key) = api_key {
            config.blockchair.api_key = Some(key);
        }
        let cache_enabled = cache || config.cache.enabled;
        let cache_ttl = Duration::from_secs(cache_ttl.unwrap_or(config.cache.ttl_secs));

        let source = resolve_source(source, &config)?;
        tracing::info!("Tracing from address: {}", address);
        tracing::debug!("Using data source: {:?}", source);

        let data_source = create_data_source(
            source,
            &config,
            fixture.as_deref(),
            cache_enabled,
            cache_ttl,
        )?;

        let result =
            crate::trace::trace(data_source.as_ref(), &address, config.trace.clone()).await;
        let analysis = analyzer::analyze(&result.graph);

        if !result.graph.unresolved.is_empty() {
            tracing::warn!(
                "{} address(es) could not be resolved; treated as end users",
                result.graph.unresolved.len()
            );
        }

        let mut stdout = std::io::stdout();
        match format {
            OutputFormat::Json => output::output_json(&mut stdout, &result, &analysis)?,
            OutputFormat::Table => output::output_table(&mut stdout, &result, &analysis)?,
            OutputFormat::Dot => output::output_dot(&mut stdout, &result.graph)?,
        }

        Ok(())
    }
}

/// Tx command implementation
pub mod tx {
    use super::*;
    use crate::cli::{Commands, OutputFormat, output};
    use crate::data_source::create_data_source;
    use crate::trace::ClusterMap;
    use std::time::Duration;

    /// Execute the tx command
    pub async fn execute(args: Cli, config: Config) -> Result<()> {
        let Commands::Tx {
            id,
            source,
            fixture,
            change_policy,
            output: format,
        } = args.command
        else {
            return Err(Error::custom("tx::execute called with wrong command"));
        };

        let source = resolve_source(source, &config)?;
        let data_source = create_data_source(
            source,
            &config,
            fixture.as_deref(),
            config.cache.enabled,
            Duration::from_secs(config.cache.ttl_secs),
        )?;

        tracing::info!("Fetching transaction {}", id);
        let Some(transaction) = data_source.transaction(&id).await? else {
            return Err(Error::custom(format!("transaction {} not found", id)));
        };

        let policy = change_policy.unwrap_or(config.trace.change_policy);
        let change = policy.classify(&transaction.outputs).map(str::to_string);

        let mut clusters = ClusterMap::new();
        let cluster = clusters
            .absorb(&transaction, config.trace.clustering)
            .map(str::to_string)
            .and_then(|rep| {
                clusters
                    .members(&rep)
                    .map(|members| (rep, members.iter().cloned().collect()))
            });

        let view = output::TransactionView {
            transaction,
            change_policy: policy,
            change,
            cluster,
        };

        let mut stdout = std::io::stdout();
        match format {
            OutputFormat::Json => output::output_transaction_json(&mut stdout, &view)?,
            OutputFormat::Table => output::output_transaction_table(&mut stdout, &view)?,
            OutputFormat::Dot => {
                return Err(Error::custom("DOT output is only available for trace"));
            }
        }

        Ok(())
    }
}
