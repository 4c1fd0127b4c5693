//! Trace module - Budget-bounded expansion of value flow from a seed address

use crate::data_source::DataSource;
use serde::{Deserialize, Serialize};

pub mod analyzer;
pub mod change;
pub mod cluster;
pub mod engine;
pub mod graph;

// Re-export key types
pub use change::ChangePolicy;
pub use cluster::{ClusterMap, ClusteringMode};
pub use engine::{TraceResult, TraceStats, Tracer};
pub use graph::{FlowEdge, FlowGraph, FlowGraphExport, GraphStats};

/// Budgets and heuristics for one trace run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOptions {
    /// Hops the seed may be expanded beyond itself
    pub max_depth: u32,

    /// Cap on addresses expanded (queried for their spends)
    pub max_visited: usize,

    pub change_policy: ChangePolicy,

    pub clustering: ClusteringMode,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_visited: 50,
            change_policy: ChangePolicy::default(),
            clustering: ClusteringMode::default(),
        }
    }
}

/// Trace flow from `start_address` with a fresh engine
pub async fn trace<P>(provider: &P, start_address: &str, options: TraceOptions) -> TraceResult
where
    P: DataSource + ?Sized,
{
    Tracer::new(provider, options).run(start_address).await
}
