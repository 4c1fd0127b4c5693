//! Ledger Flow Tracer
//!
//! Reconstructs where value went after leaving a seed address on a UTXO
//! ledger.
//!
//! This library provides functionality for:
//! - Fetching spending transactions from a ledger provider (Blockchair, mock data)
//! - Separating genuine payments from change returned to the spender
//! - Clustering addresses that co-sign transaction inputs
//! - Building a depth- and budget-bounded flow graph from a seed address
//! - Reporting the graph as tables, JSON or Graphviz DOT

pub mod cli;
pub mod config;
pub mod data_source;
pub mod error;
pub mod trace;

pub use config::Config;
pub use error::{Error, Result};
pub use trace::{FlowGraph, TraceOptions, TraceResult, Tracer};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging with the given log level
///
/// `RUST_LOG` takes precedence. Logs go to stderr so report output on
/// stdout can be piped.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
