//! Trace engine
//!
//! Expands value flow depth-first from a seed address. The expansion is
//! driven by an explicit stack of resumable frames rather than recursion;
//! frames are processed in exactly the order a recursive walk would visit
//! them (each recipient is fully expanded before the next output of its
//! parent is looked at).
//!
//! Termination rests on three guards: an address is expanded at most once,
//! at most `max_visited` addresses are expanded, and every child frame has
//! strictly less remaining depth than its parent.

use crate::data_source::{Address, DataSource, Transaction};
use crate::trace::{FlowGraph, TraceOptions};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Counters collected during one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceStats {
    /// Provider lookups issued (one per distinct address at most)
    pub lookups: usize,
    /// Lookups that failed and were treated as empty
    pub failed_lookups: usize,
    /// Addresses expanded
    pub expansions: usize,
    /// Transactions processed across all expansions
    pub transactions: usize,
    /// Outputs skipped as change
    pub change_outputs: usize,
    /// Inputs/outputs lacking a usable address or value
    pub malformed_entries: usize,
    /// Recipients not expanded because the depth budget ran out
    pub depth_cutoffs: usize,
    /// Recipients not expanded because `max_visited` was reached
    pub budget_cutoffs: usize,
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct TraceResult {
    pub graph: FlowGraph,
    pub stats: TraceStats,
    pub options: TraceOptions,
}

/// Position inside the transaction currently being walked by a frame
struct TxCursor {
    tx_index: usize,
    next_output: usize,
    source_label: Address,
    change: Option<Address>,
}

/// One address being expanded
struct Frame {
    address: Address,
    remaining_depth: u32,
    transactions: Arc<[Transaction]>,
    next_tx: usize,
    current: Option<TxCursor>,
}

enum Step {
    /// Work happened inside the top frame
    Continue,
    /// The top frame wants `address` expanded next
    Expand {
        address: Address,
        remaining_depth: u32,
    },
    /// The top frame has no transactions left
    Finished,
}

/// Single-run trace engine. Owns all state of the run; consumed by [`Tracer::run`].
pub struct Tracer<'a, P: DataSource + ?Sized> {
    provider: &'a P,
    options: TraceOptions,
    graph: FlowGraph,
    spends: HashMap<Address, Arc<[Transaction]>>,
    stats: TraceStats,
}

impl<'a, P: DataSource + ?Sized> Tracer<'a, P> {
    pub fn new(provider: &'a P, options: TraceOptions) -> Self {
        Self {
            provider,
            options,
            graph: FlowGraph::new(Address::new()),
            spends: HashMap::new(),
            stats: TraceStats::default(),
        }
    }

    /// Trace from `start_address`. Never fails; provider errors degrade to
    /// empty lookups and whatever was built before a budget ran out is returned.
    pub async fn run(mut self, start_address: &str) -> TraceResult {
        self.graph.seed = start_address.to_string();
        tracing::info!(
            start = start_address,
            max_depth = self.options.max_depth,
            max_visited = self.options.max_visited,
            change_policy = self.options.change_policy.name(),
            "Starting trace"
        );

        let mut stack: Vec<Frame> = Vec::new();
        if let Some(frame) = self.enter(start_address, self.options.max_depth).await {
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            match self.advance(frame).await {
                Step::Continue => {}
                Step::Expand {
                    address,
                    remaining_depth,
                } => {
                    if let Some(child) = self.enter(&address, remaining_depth).await {
                        stack.push(child);
                    }
                }
                Step::Finished => {
                    stack.pop();
                }
            }
        }

        let graph_stats = self.graph.stats();
        tracing::info!(
            nodes = graph_stats.total_nodes,
            edges = graph_stats.total_edges,
            visited = graph_stats.visited,
            terminals = graph_stats.terminals,
            clusters = graph_stats.clusters,
            lookups = self.stats.lookups,
            "Trace finished"
        );

        TraceResult {
            graph: self.graph,
            stats: self.stats,
            options: self.options,
        }
    }

    /// Start expanding `address`, unless already visited or over budget.
    async fn enter(&mut self, address: &str, remaining_depth: u32) -> Option<Frame> {
        if self.graph.is_visited(address) {
            return None;
        }
        if self.graph.visited.len() >= self.options.max_visited {
            tracing::debug!("Visit budget exhausted, not expanding {}", address);
            self.stats.budget_cutoffs += 1;
            return None;
        }

        self.graph.mark_visited(address);
        self.stats.expansions += 1;

        let transactions = self.spends_from(address).await;
        if transactions.is_empty() && self.graph.mark_terminal(address) {
            tracing::debug!("{} has no spending transactions", address);
        }
        tracing::debug!(
            "Expanding {} ({} transactions, depth {} left)",
            address,
            transactions.len(),
            remaining_depth
        );

        Some(Frame {
            address: address.to_string(),
            remaining_depth,
            transactions,
            next_tx: 0,
            current: None,
        })
    }

    /// Do one unit of work in `frame`: open the next transaction or handle one output.
    async fn advance(&mut self, frame: &mut Frame) -> Step {
        let transactions = Arc::clone(&frame.transactions);

        let Some(cursor) = frame.current.as_mut() else {
            let Some(tx) = transactions.get(frame.next_tx) else {
                return Step::Finished;
            };
            frame.current = Some(self.open_transaction(&frame.address, frame.next_tx, tx));
            frame.next_tx += 1;
            return Step::Continue;
        };

        let tx = &transactions[cursor.tx_index];
        let Some(output) = tx.outputs.get(cursor.next_output) else {
            frame.current = None;
            return Step::Continue;
        };
        let output_index = cursor.next_output;
        cursor.next_output += 1;

        let Some((recipient, value)) = output.resolved() else {
            tracing::debug!("Skipping malformed output {} of {}", output_index, tx.id);
            self.stats.malformed_entries += 1;
            return Step::Continue;
        };

        if cursor.change.as_deref() == Some(recipient) {
            tracing::debug!("[change] {} in {}", recipient, tx.id);
            self.stats.change_outputs += 1;
            return Step::Continue;
        }

        self.graph
            .add_flow(&cursor.source_label, recipient, &tx.id, output_index, value);

        if self.spends_from(recipient).await.is_empty() {
            if self.graph.mark_terminal(recipient) {
                tracing::debug!("[end user] {}", recipient);
            }
            return Step::Continue;
        }

        match frame.remaining_depth.checked_sub(1) {
            Some(remaining_depth) => Step::Expand {
                address: recipient.to_string(),
                remaining_depth,
            },
            None => {
                if !self.graph.is_visited(recipient) {
                    self.stats.depth_cutoffs += 1;
                }
                Step::Continue
            }
        }
    }

    /// Cluster inputs, classify change and fix the source label for one transaction.
    fn open_transaction(&mut self, address: &str, tx_index: usize, tx: &Transaction) -> TxCursor {
        self.stats.transactions += 1;
        self.stats.malformed_entries += tx
            .inputs
            .iter()
            .filter(|input| input.resolved().is_none())
            .count();

        self.graph.clusters.absorb(tx, self.options.clustering);
        let change = self
            .options
            .change_policy
            .classify(&tx.outputs)
            .map(str::to_string);
        let source_label = self.graph.clusters.representative_of(address).to_string();

        tracing::debug!(
            "Transaction {} from {}: change {:?}",
            tx.id,
            source_label,
            change
        );

        TxCursor {
            tx_index,
            next_output: 0,
            source_label,
            change,
        }
    }

    /// Spending transactions of `address`, fetched at most once per run.
    async fn spends_from(&mut self, address: &str) -> Arc<[Transaction]> {
        if let Some(known) = self.spends.get(address) {
            return Arc::clone(known);
        }

        self.stats.lookups += 1;
        let transactions: Arc<[Transaction]> =
            match self.provider.transactions_spent_from(address).await {
                Ok(transactions) => transactions.into(),
                Err(e) => {
                    tracing::warn!("Lookup for {} failed, treating as empty: {}", address, e);
                    self.stats.failed_lookups += 1;
                    self.graph.mark_unresolved(address);
                    Arc::from(Vec::new())
                }
            };

        self.spends
            .insert(address.to_string(), Arc::clone(&transactions));
        transactions
    }
}
