use crate::data_source::Address;
use crate::trace::ClusterMap;
use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// `(source, destination, transaction id)`
type EdgeKey = (Address, Address, String);

/// Value moved from one address (or cluster representative) to another by one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEdge {
    pub source: Address,
    pub destination: Address,
    pub tx_id: String,
    pub amount: f64,
    /// Amount per output index; `amount` is their sum
    #[serde(skip)]
    outputs: BTreeMap<usize, f64>,
}

impl FlowEdge {
    fn new(source: &str, destination: &str, tx_id: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            tx_id: tx_id.to_string(),
            amount: 0.0,
            outputs: BTreeMap::new(),
        }
    }

    fn set_output(&mut self, output_index: usize, amount: f64) {
        self.outputs.insert(output_index, amount);
        self.amount = self.outputs.values().sum();
    }

    /// Number of transaction outputs folded into this edge
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}

/// The directed flow graph accumulated by one trace run, with the
/// bookkeeping sets the run produces alongside it.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    /// Nodes are addresses; edges carry amount and transaction id.
    pub graph: StableGraph<Address, FlowEdge>,

    /// Address -> node lookup. One node per address.
    pub node_index: HashMap<Address, NodeIndex>,

    edge_index: HashMap<EdgeKey, EdgeIndex>,

    /// Address the trace started from
    pub seed: Address,

    /// Addresses expanded (queried for their spends)
    pub visited: BTreeSet<Address>,

    /// Addresses found to have no spending transactions ("end users")
    pub terminals: BTreeSet<Address>,

    /// Addresses whose lookup failed; also present in `terminals`
    pub unresolved: BTreeSet<Address>,

    pub clusters: ClusterMap,
}

impl FlowGraph {
    pub fn new(seed: impl Into<Address>) -> Self {
        Self {
            graph: StableGraph::new(),
            node_index: HashMap::new(),
            edge_index: HashMap::new(),
            seed: seed.into(),
            visited: BTreeSet::new(),
            terminals: BTreeSet::new(),
            unresolved: BTreeSet::new(),
            clusters: ClusterMap::new(),
        }
    }

    fn ensure_node(&mut self, address: &str) -> NodeIndex {
        *self
            .node_index
            .entry(address.to_string())
            .or_insert_with(|| self.graph.add_node(address.to_string()))
    }

    /// Record that output `output_index` of `tx_id` pays `amount` from
    /// `source` to `destination`.
    ///
    /// Recording the same output again overwrites its amount. Distinct
    /// outputs of one transaction to the same destination share one edge.
    pub fn add_flow(
        &mut self,
        source: &str,
        destination: &str,
        tx_id: &str,
        output_index: usize,
        amount: f64,
    ) -> EdgeIndex {
        let key = (source.to_string(), destination.to_string(), tx_id.to_string());
        if let Some(&edge_idx) = self.edge_index.get(&key) {
            if let Some(edge) = self.graph.edge_weight_mut(edge_idx) {
                edge.set_output(output_index, amount);
            }
            return edge_idx;
        }

        let from_idx = self.ensure_node(source);
        let to_idx = self.ensure_node(destination);
        let mut edge = FlowEdge::new(source, destination, tx_id);
        edge.set_output(output_index, amount);

        let edge_idx = self.graph.add_edge(from_idx, to_idx, edge);
        self.edge_index.insert(key, edge_idx);
        edge_idx
    }

    /// Returns `false` if the address was already visited
    pub fn mark_visited(&mut self, address: &str) -> bool {
        self.visited.insert(address.to_string())
    }

    pub fn is_visited(&self, address: &str) -> bool {
        self.visited.contains(address)
    }

    /// Returns `false` if the address was already terminal
    pub fn mark_terminal(&mut self, address: &str) -> bool {
        self.terminals.insert(address.to_string())
    }

    pub fn is_terminal(&self, address: &str) -> bool {
        self.terminals.contains(address)
    }

    pub fn mark_unresolved(&mut self, address: &str) {
        self.unresolved.insert(address.to_string());
    }

    pub fn contains_node(&self, address: &str) -> bool {
        self.node_index.contains_key(address)
    }

    /// Addresses in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Address> {
        self.graph.node_weights()
    }

    /// Edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &FlowEdge> {
        self.graph.edge_weights()
    }

    pub fn edge(&self, source: &str, destination: &str, tx_id: &str) -> Option<&FlowEdge> {
        let key = (source.to_string(), destination.to_string(), tx_id.to_string());
        self.edge_index
            .get(&key)
            .and_then(|&idx| self.graph.edge_weight(idx))
    }

    pub fn outgoing(&self, address: &str) -> Vec<&FlowEdge> {
        self.edges_directed(address, Direction::Outgoing)
    }

    pub fn incoming(&self, address: &str) -> Vec<&FlowEdge> {
        self.edges_directed(address, Direction::Incoming)
    }

    fn edges_directed(&self, address: &str, direction: Direction) -> Vec<&FlowEdge> {
        match self.node_index.get(address) {
            Some(&node_idx) => self
                .graph
                .edges_directed(node_idx, direction)
                .map(|edge| edge.weight())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            total_nodes: self.graph.node_count(),
            total_edges: self.graph.edge_count(),
            visited: self.visited.len(),
            terminals: self.terminals.len(),
            unresolved: self.unresolved.len(),
            clusters: self.clusters.len(),
            total_volume: self.edges().map(|e| e.amount).sum(),
        }
    }

    /// Cluster representative for an address that belongs to a cluster
    fn cluster_of(&self, address: &str) -> Option<Address> {
        let rep = self.clusters.representative_of(address);
        (rep != address || self.clusters.members(address).is_some()).then(|| rep.to_string())
    }

    /// Flat, serializable view for reporting
    pub fn export(&self) -> FlowGraphExport {
        FlowGraphExport {
            seed: self.seed.clone(),
            nodes: self
                .nodes()
                .map(|address| NodeRecord {
                    address: address.clone(),
                    seed: *address == self.seed,
                    visited: self.is_visited(address),
                    terminal: self.is_terminal(address),
                    cluster: self.cluster_of(address),
                })
                .collect(),
            edges: self.edges().cloned().collect(),
            visited: self.visited.iter().cloned().collect(),
            terminals: self.terminals.iter().cloned().collect(),
            unresolved: self.unresolved.iter().cloned().collect(),
            clusters: self
                .clusters
                .iter()
                .map(|(rep, members)| (rep.clone(), members.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Render as Graphviz DOT
    pub fn to_dot(&self) -> String {
        let mut dot = "digraph FlowGraph {\n".to_string();
        dot.push_str("  rankdir=LR;\n");
        dot.push_str("  node [shape=box, style=filled];\n\n");

        for address in self.nodes() {
            let color = if *address == self.seed {
                "lightblue"
            } else if self.unresolved.contains(address) {
                "lightcoral"
            } else if self.is_terminal(address) {
                "palegreen"
            } else if self.clusters.members(address).is_some() {
                "orange"
            } else {
                "lightgray"
            };
            dot.push_str(&format!(
                "  \"{}\" [fillcolor=\"{}\"];\n",
                escape(address),
                color
            ));
        }

        dot.push('\n');

        for edge in self.edges() {
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{} ({})\"];\n",
                escape(&edge.source),
                escape(&edge.destination),
                format_amount(edge.amount),
                short_id(&edge.tx_id)
            ));
        }

        dot.push_str("}\n");
        dot
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub visited: usize,
    pub terminals: usize,
    pub unresolved: usize,
    pub clusters: usize,
    pub total_volume: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    pub address: Address,
    pub seed: bool,
    pub visited: bool,
    pub terminal: bool,
    pub cluster: Option<Address>,
}

/// Node/edge list of a traced graph
#[derive(Debug, Clone, Serialize)]
pub struct FlowGraphExport {
    pub seed: Address,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<FlowEdge>,
    pub visited: Vec<Address>,
    pub terminals: Vec<Address>,
    pub unresolved: Vec<Address>,
    pub clusters: BTreeMap<Address, Vec<Address>>,
}

/// Up to 8 decimals, trailing zeros dropped
pub fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.8}", amount);
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// First 10 characters of a transaction id
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(10) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}
