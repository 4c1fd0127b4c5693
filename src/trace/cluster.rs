//! Common-input ownership clustering
//!
//! Addresses that co-sign the inputs of one transaction are assumed to be
//! controlled by the same entity. Each cluster is keyed by a representative,
//! the lexicographically smallest input of the transaction that founded it.
//! An address belongs to at most one cluster and a cluster always contains
//! its representative.

use crate::data_source::{Address, Transaction};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How a new co-spend interacts with clusters formed earlier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ClusteringMode {
    /// Already-clustered addresses stay where they were first placed;
    /// new inputs join the cluster of an already-clustered co-input
    #[default]
    FirstSeen,
    /// Every cluster touched by the inputs is merged into one
    Transitive,
}

/// Representative address -> member addresses
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterMap {
    clusters: BTreeMap<Address, BTreeSet<Address>>,
    #[serde(skip)]
    owners: HashMap<Address, Address>,
}

impl ClusterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a transaction's inputs into the map.
    ///
    /// Returns the representative that received members, or `None` when the
    /// transaction has fewer than two distinct input addresses.
    pub fn absorb(&mut self, tx: &Transaction, mode: ClusteringMode) -> Option<&str> {
        let inputs = tx.input_addresses();
        if inputs.len() < 2 {
            return None;
        }

        let representative = match mode {
            ClusteringMode::FirstSeen => self.absorb_first_seen(&inputs),
            ClusteringMode::Transitive => self.absorb_transitive(&inputs),
        };

        tracing::debug!(
            "Clustered {} inputs of {} under {}",
            inputs.len(),
            tx.id,
            representative
        );
        self.clusters
            .get_key_value(&representative)
            .map(|(rep, _)| rep.as_str())
    }

    fn absorb_first_seen(&mut self, inputs: &BTreeSet<&str>) -> Address {
        // An input that is already clustered decides which cluster grows
        let existing = inputs
            .iter()
            .find_map(|address| self.owners.get(*address).cloned());
        let representative = match existing {
            Some(owner) => owner,
            None => inputs
                .first()
                .map(|rep| rep.to_string())
                .unwrap_or_default(),
        };

        for &address in inputs {
            match self.owners.get(address).cloned() {
                Some(owner) if owner != representative => {
                    tracing::debug!(
                        "{} already belongs to cluster {}, not moving it to {}",
                        address,
                        owner,
                        representative
                    );
                }
                Some(_) => {}
                None => {
                    self.clusters
                        .entry(representative.clone())
                        .or_default()
                        .insert(address.to_string());
                    self.owners
                        .insert(address.to_string(), representative.clone());
                }
            }
        }

        representative
    }

    fn absorb_transitive(&mut self, inputs: &BTreeSet<&str>) -> Address {
        let touched: BTreeSet<Address> = inputs
            .iter()
            .map(|address| self.representative_of(address).to_string())
            .collect();

        let mut merged: BTreeSet<Address> = inputs.iter().map(|a| a.to_string()).collect();
        for rep in &touched {
            if let Some(members) = self.clusters.remove(rep) {
                merged.extend(members);
            }
        }

        let representative = merged.first().cloned().unwrap_or_default();
        for member in &merged {
            self.owners.insert(member.clone(), representative.clone());
        }
        self.clusters.insert(representative.clone(), merged);

        representative
    }

    /// Representative owning `address`, or `address` itself when unclustered
    pub fn representative_of<'a>(&'a self, address: &'a str) -> &'a str {
        self.owners
            .get(address)
            .map(String::as_str)
            .unwrap_or(address)
    }

    pub fn members(&self, representative: &str) -> Option<&BTreeSet<Address>> {
        self.clusters.get(representative)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &BTreeSet<Address>)> {
        self.clusters.iter()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn co_spend(id: &str, inputs: &[&str]) -> Transaction {
        inputs
            .iter()
            .fold(Transaction::new(id), |tx, a| tx.with_input(*a, 0.1))
            .with_output("out", 0.1)
    }

    fn members(map: &ClusterMap, rep: &str) -> Vec<String> {
        map.members(rep)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_two_inputs_form_cluster_under_smallest() {
        let mut map = ClusterMap::new();
        let tx = Transaction::new("t")
            .with_input("Y", 0.6)
            .with_input("X", 0.4)
            .with_output("Z", 1.0);

        assert_eq!(map.absorb(&tx, ClusteringMode::FirstSeen), Some("X"));
        assert_eq!(members(&map, "X"), vec!["X", "Y"]);
        assert_eq!(map.representative_of("Y"), "X");
        assert_eq!(map.representative_of("X"), "X");
    }

    #[test]
    fn test_single_input_changes_nothing() {
        let mut map = ClusterMap::new();
        let tx = co_spend("t", &["A", "A"]);

        assert_eq!(map.absorb(&tx, ClusteringMode::FirstSeen), None);
        assert!(map.is_empty());
        assert_eq!(map.representative_of("A"), "A");
    }

    #[test]
    fn test_existing_cluster_is_extended() {
        let mut map = ClusterMap::new();
        map.absorb(&co_spend("t1", &["A", "C"]), ClusteringMode::FirstSeen);
        map.absorb(&co_spend("t2", &["A", "D"]), ClusteringMode::FirstSeen);

        assert_eq!(map.len(), 1);
        assert_eq!(members(&map, "A"), vec!["A", "C", "D"]);
    }

    #[test]
    fn test_first_seen_does_not_move_clustered_addresses() {
        let mut map = ClusterMap::new();
        map.absorb(&co_spend("t1", &["B", "C"]), ClusteringMode::FirstSeen);
        map.absorb(&co_spend("t2", &["D", "E"]), ClusteringMode::FirstSeen);
        let rep = map
            .absorb(&co_spend("t3", &["C", "E", "F"]), ClusteringMode::FirstSeen)
            .map(str::to_string);

        // F joins the cluster of the first clustered input; E stays put
        assert_eq!(rep.as_deref(), Some("B"));
        assert_eq!(members(&map, "B"), vec!["B", "C", "F"]);
        assert_eq!(members(&map, "D"), vec!["D", "E"]);
        assert_eq!(map.representative_of("E"), "D");

        let appearances = map.iter().filter(|(_, m)| m.contains("E")).count();
        assert_eq!(appearances, 1);
    }

    #[test]
    fn test_first_seen_extends_owner_instead_of_new_cluster() {
        let mut map = ClusterMap::new();
        map.absorb(&co_spend("t1", &["B", "C"]), ClusteringMode::FirstSeen);
        map.absorb(&co_spend("t2", &["C", "D"]), ClusteringMode::FirstSeen);

        assert_eq!(map.len(), 1);
        assert!(map.members("C").is_none());
        assert_eq!(members(&map, "B"), vec!["B", "C", "D"]);
        assert_eq!(map.representative_of("D"), "B");

        // a smaller newcomer still joins the existing cluster
        map.absorb(&co_spend("t3", &["A", "B"]), ClusteringMode::FirstSeen);
        assert_eq!(map.len(), 1);
        assert!(map.members("A").is_none());
        assert_eq!(members(&map, "B"), vec!["A", "B", "C", "D"]);

        // every cluster contains its own representative
        for (rep, cluster) in map.iter() {
            assert!(cluster.contains(rep));
        }
    }

    #[test]
    fn test_transitive_merges_out_of_order_groups() {
        let mut map = ClusterMap::new();
        map.absorb(&co_spend("t1", &["B", "C"]), ClusteringMode::Transitive);
        map.absorb(&co_spend("t2", &["D", "E"]), ClusteringMode::Transitive);
        assert_eq!(map.len(), 2);

        let rep = map
            .absorb(&co_spend("t3", &["A", "C", "E"]), ClusteringMode::Transitive)
            .map(str::to_string);
        assert_eq!(rep.as_deref(), Some("A"));
        assert_eq!(map.len(), 1);
        assert_eq!(members(&map, "A"), vec!["A", "B", "C", "D", "E"]);
        for address in ["A", "B", "C", "D", "E"] {
            assert_eq!(map.representative_of(address), "A");
        }
    }

    #[test]
    fn test_transitive_keeps_smallest_existing_representative() {
        let mut map = ClusterMap::new();
        map.absorb(&co_spend("t1", &["A", "M"]), ClusteringMode::Transitive);
        map.absorb(&co_spend("t2", &["M", "Z"]), ClusteringMode::Transitive);

        assert_eq!(map.len(), 1);
        assert_eq!(members(&map, "A"), vec!["A", "M", "Z"]);
        assert!(map.members("M").is_none());
    }
}
