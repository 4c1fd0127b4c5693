//! Output formatting module
//!
//! This module renders trace results and single transactions for the
//! different output formats.

use crate::Result;
use crate::data_source::{Address, Transaction, Transfer};
use crate::trace::graph::{format_amount, short_id};
use crate::trace::{ChangePolicy, FlowGraph, TraceResult, analyzer::FlowAnalysis};
use serde_json::json;

/// One transaction as shown by the `tx` command
#[derive(Debug, Clone)]
pub struct TransactionView {
    pub transaction: Transaction,
    pub change_policy: ChangePolicy,
    pub change: Option<Address>,
    /// Representative and members of the cluster its inputs form
    pub cluster: Option<(Address, Vec<Address>)>,
}

/// Output a trace result as JSON
pub fn output_json(
    w: &mut impl std::io::Write,
    result: &TraceResult,
    analysis: &FlowAnalysis,
) -> Result<()> {
    let output = json!({
        "summary": {
            "seed": result.graph.seed,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "options": result.options,
            "graph": result.graph.stats(),
            "stats": result.stats,
            "analysis": analysis,
        },
        "graph": result.graph.export(),
    });

    serde_json::to_writer_pretty(&mut *w, &output)?;
    writeln!(w)?; // Add trailing newline
    Ok(())
}

/// Output a trace result as text tables
pub fn output_table(
    w: &mut impl std::io::Write,
    result: &TraceResult,
    analysis: &FlowAnalysis,
) -> Result<()> {
    let graph = &result.graph;
    let stats = graph.stats();

    writeln!(w, "Ledger Flow Trace - {}", graph.seed)?;
    writeln!(w, "{}", "=".repeat(80))?;
    writeln!(w)?;

    writeln!(w, "Summary:")?;
    writeln!(
        w,
        "  Depth / Budget:    {} / {}",
        result.options.max_depth, result.options.max_visited
    )?;
    writeln!(w, "  Change Policy:     {}", result.options.change_policy.name())?;
    writeln!(w, "  Addresses:         {}", stats.total_nodes)?;
    writeln!(w, "  Flows:             {}", stats.total_edges)?;
    writeln!(w, "  Expanded:          {}", stats.visited)?;
    writeln!(w, "  End Users:         {}", stats.terminals)?;
    writeln!(w, "  Clusters:          {}", stats.clusters)?;
    writeln!(w, "  Total Volume:      {}", format_amount(stats.total_volume))?;
    writeln!(w, "  Pattern:           {}", analysis.pattern.display_name())?;
    writeln!(w, "  Lookups:           {}", result.stats.lookups)?;
    writeln!(w, "  Change Skipped:    {}", result.stats.change_outputs)?;
    writeln!(w)?;

    if stats.total_edges > 0 {
        writeln!(w, "Flows:")?;
        writeln!(w, "{:-<80}", "")?;
        writeln!(
            w,
            "{:<24} {:<24} {:>16} {:<12}",
            "From", "To", "Amount", "TX"
        )?;
        writeln!(w, "{:-<80}", "")?;

        for edge in graph.edges() {
            writeln!(
                w,
                "{:<24} {:<24} {:>16} {:<12}",
                truncate(&edge.source, 24),
                truncate(&edge.destination, 24),
                format_amount(edge.amount),
                short_id(&edge.tx_id)
            )?;
        }
        writeln!(w)?;
    }

    if !analysis.top_sinks.is_empty() {
        writeln!(w, "End Users (by value received):")?;
        for sink in &analysis.top_sinks {
            writeln!(w, "  {:<40} {:>16}", sink.address, format_amount(sink.received))?;
        }
        writeln!(w)?;
    }

    if !graph.clusters.is_empty() {
        writeln!(w, "Clusters:")?;
        for (representative, members) in graph.clusters.iter() {
            let members: Vec<&str> = members.iter().map(String::as_str).collect();
            writeln!(w, "  {} <- {}", representative, members.join(", "))?;
        }
        writeln!(w)?;
    }

    if !graph.unresolved.is_empty() {
        writeln!(w, "Unresolved (lookup failed):")?;
        for address in &graph.unresolved {
            writeln!(w, "  {}", address)?;
        }
        writeln!(w)?;
    }

    Ok(())
}

/// Output the flow graph as Graphviz DOT
pub fn output_dot(w: &mut impl std::io::Write, graph: &FlowGraph) -> Result<()> {
    write!(w, "{}", graph.to_dot())?;
    Ok(())
}

/// Output one transaction as JSON
pub fn output_transaction_json(w: &mut impl std::io::Write, view: &TransactionView) -> Result<()> {
    let output = json!({
        "transaction": view.transaction,
        "total_output": view.transaction.total_output(),
        "change_policy": view.change_policy,
        "change": view.change,
        "cluster": view.cluster.as_ref().map(|(representative, members)| json!({
            "representative": representative,
            "members": members,
        })),
    });

    serde_json::to_writer_pretty(&mut *w, &output)?;
    writeln!(w)?;
    Ok(())
}

/// Output one transaction as text
pub fn output_transaction_table(
    w: &mut impl std::io::Write,
    view: &TransactionView,
) -> Result<()> {
    let tx = &view.transaction;
    writeln!(w, "Transaction {}", tx.id)?;
    writeln!(w, "{:-<80}", "")?;

    writeln!(w, "Inputs:")?;
    for input in &tx.inputs {
        writeln!(w, "  {}", describe(input, None))?;
    }

    writeln!(w, "Outputs:")?;
    for output in &tx.outputs {
        writeln!(w, "  {}", describe(output, view.change.as_deref()))?;
    }
    writeln!(w)?;

    writeln!(w, "Total Output:  {}", format_amount(tx.total_output()))?;
    writeln!(
        w,
        "Change:        {} ({})",
        view.change.as_deref().unwrap_or("none"),
        view.change_policy.name()
    )?;
    match &view.cluster {
        Some((representative, members)) => {
            writeln!(w, "Cluster:       {} <- {}", representative, members.join(", "))?
        }
        None => writeln!(w, "Cluster:       none (single input)")?,
    }

    Ok(())
}

fn describe(transfer: &Transfer, change: Option<&str>) -> String {
    match transfer.resolved() {
        Some((address, value)) => {
            let marker = if change == Some(address) { "  [change]" } else { "" };
            format!("{:<40} {:>16}{}", address, format_amount(value), marker)
        }
        None => "(malformed entry)".to_string(),
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}
