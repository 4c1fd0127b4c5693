//! Change output inference
//!
//! Picks the one output of a transaction that most likely returns funds to
//! the spender. Purely heuristic: a wrong guess costs one edge, never a run.

use crate::data_source::Transfer;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which output is treated as change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ChangePolicy {
    /// The largest output is change
    #[default]
    LargestOutput,
    /// The smallest output is change
    SmallestOutput,
}

impl ChangePolicy {
    /// Address of the change output, if any.
    ///
    /// Only outputs with both a recipient and a value are candidates.
    /// Ties go to the earliest output.
    pub fn classify<'a>(&self, outputs: &'a [Transfer]) -> Option<&'a str> {
        let mut best: Option<(&str, f64)> = None;

        for (address, value) in outputs.iter().filter_map(Transfer::resolved) {
            let better = match best {
                None => true,
                Some((_, current)) => match self {
                    ChangePolicy::LargestOutput => value > current,
                    ChangePolicy::SmallestOutput => value < current,
                },
            };
            if better {
                best = Some((address, value));
            }
        }

        best.map(|(address, _)| address)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChangePolicy::LargestOutput => "largest-output",
            ChangePolicy::SmallestOutput => "smallest-output",
        }
    }
}
