//! Flow graph analyzer
//!
//! Summarizes the shape of a traced graph: whether value loops back,
//! where it fans out, and where it comes to rest.

use super::FlowGraph;
use crate::data_source::Address;
use petgraph::Direction;
use serde::Serialize;

/// Overall shape of the traced flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowPattern {
    /// Nothing traced
    Empty,

    /// A -> B -> C
    Chain,

    /// A -> B
    ///   -> C
    FanOut,

    /// A -> B -> A
    Cyclic,
}

impl FlowPattern {
    pub fn display_name(&self) -> &'static str {
        match self {
            FlowPattern::Empty => "Empty",
            FlowPattern::Chain => "Chain",
            FlowPattern::FanOut => "Fan-out",
            FlowPattern::Cyclic => "Cyclic",
        }
    }
}

/// Terminal address and the total value it received
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sink {
    pub address: Address,
    pub received: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowAnalysis {
    pub pattern: FlowPattern,
    pub has_cycles: bool,
    pub total_volume: f64,
    pub branching_factor: f64,
    pub max_out_degree: usize,
    /// Terminals by value received, largest first
    pub top_sinks: Vec<Sink>,
}

/// Sinks listed in a report
const TOP_SINKS: usize = 5;

pub fn analyze(flow: &FlowGraph) -> FlowAnalysis {
    let node_count = flow.graph.node_count();
    let total_volume = flow.edges().map(|edge| edge.amount).sum();

    if node_count == 0 {
        return FlowAnalysis {
            pattern: FlowPattern::Empty,
            has_cycles: false,
            total_volume,
            branching_factor: 0.0,
            max_out_degree: 0,
            top_sinks: Vec::new(),
        };
    }

    let has_cycles = petgraph::algo::is_cyclic_directed(&flow.graph);

    let out_degrees: Vec<usize> = flow
        .graph
        .node_indices()
        .map(|idx| flow.graph.edges_directed(idx, Direction::Outgoing).count())
        .filter(|&degree| degree > 0)
        .collect();
    let max_out_degree = out_degrees.iter().copied().max().unwrap_or(0);
    let branching_factor = if out_degrees.is_empty() {
        0.0
    } else {
        out_degrees.iter().sum::<usize>() as f64 / out_degrees.len() as f64
    };

    let pattern = if has_cycles {
        FlowPattern::Cyclic
    } else if max_out_degree <= 1 {
        FlowPattern::Chain
    } else {
        FlowPattern::FanOut
    };

    let mut top_sinks: Vec<Sink> = flow
        .terminals
        .iter()
        .filter(|address| flow.contains_node(address))
        .map(|address| Sink {
            address: address.clone(),
            received: flow.incoming(address).iter().map(|edge| edge.amount).sum(),
        })
        .collect();
    top_sinks.sort_by(|a, b| {
        b.received
            .total_cmp(&a.received)
            .then_with(|| a.address.cmp(&b.address))
    });
    top_sinks.truncate(TOP_SINKS);

    FlowAnalysis {
        pattern,
        has_cycles,
        total_volume,
        branching_factor,
        max_out_degree,
        top_sinks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_graph() {
        let analysis = analyze(&FlowGraph::new("A"));
        assert_eq!(analysis.pattern, FlowPattern::Empty);
        assert!(analysis.top_sinks.is_empty());
        assert_eq!(analysis.total_volume, 0.0);
    }

    #[test]
    fn test_chain() {
        let mut flow = FlowGraph::new("A");
        flow.add_flow("A", "B", "t1", 0, 0.5);
        flow.add_flow("B", "C", "t2", 0, 0.25);
        flow.mark_terminal("C");

        let analysis = analyze(&flow);
        assert_eq!(analysis.pattern, FlowPattern::Chain);
        assert!(!analysis.has_cycles);
        assert_eq!(analysis.max_out_degree, 1);
        assert_eq!(analysis.branching_factor, 1.0);
        assert_eq!(analysis.total_volume, 0.75);
        assert_eq!(
            analysis.top_sinks,
            vec![Sink {
                address: "C".to_string(),
                received: 0.25
            }]
        );
    }

    #[test]
    fn test_fan_out_orders_sinks_by_value() {
        let mut flow = FlowGraph::new("A");
        flow.add_flow("A", "B", "t1", 0, 0.25);
        flow.add_flow("A", "C", "t1", 1, 2.0);
        flow.add_flow("A", "D", "t1", 2, 0.5);
        flow.add_flow("D", "C", "t2", 0, 0.5);
        for sink in ["B", "C"] {
            flow.mark_terminal(sink);
        }
        // terminal seed that never appears in the graph is not a sink
        flow.mark_terminal("Z");

        let analysis = analyze(&flow);
        assert_eq!(analysis.pattern, FlowPattern::FanOut);
        assert_eq!(analysis.max_out_degree, 3);
        assert_eq!(analysis.branching_factor, 2.0);

        let sinks: Vec<(&str, f64)> = analysis
            .top_sinks
            .iter()
            .map(|s| (s.address.as_str(), s.received))
            .collect();
        assert_eq!(sinks, vec![("C", 2.5), ("B", 0.25)]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut flow = FlowGraph::new("A");
        flow.add_flow("A", "B", "t1", 0, 1.0);
        flow.add_flow("B", "A", "t2", 0, 0.5);

        let analysis = analyze(&flow);
        assert!(analysis.has_cycles);
        assert_eq!(analysis.pattern, FlowPattern::Cyclic);
        assert_eq!(analysis.pattern.display_name(), "Cyclic");
    }
}
