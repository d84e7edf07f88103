//! The `playbook_on_stats` payload: the authoritative per-outcome host sets
//! reported once a run is over.

use std::collections::BTreeMap;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Per-outcome host sets from a stats event. `dark` is unreachable hosts.
#[derive(Getters, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostStats {
    #[serde(default)]
    ok: StatSet,
    #[serde(default)]
    changed: StatSet,
    #[serde(default)]
    dark: StatSet,
    #[serde(default)]
    failures: StatSet,
    #[serde(default)]
    skipped: StatSet,
}

impl HostStats {
    pub fn new(
        ok: StatSet,
        changed: StatSet,
        dark: StatSet,
        failures: StatSet,
        skipped: StatSet,
    ) -> Self {
        Self {
            ok,
            changed,
            dark,
            failures,
            skipped,
        }
    }
}

/// One outcome's host set. Stats are either reported as a plain list of host
/// ids, or as a map of host name to how many times the outcome happened on
/// that host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatSet {
    Counts(BTreeMap<String, u64>),
    Members(Vec<serde_json::Value>),
}

impl StatSet {
    /// Total for this outcome: the number of members, or the sum of counts.
    pub fn total(&self) -> u64 {
        match self {
            StatSet::Counts(counts) => counts.values().sum(),
            StatSet::Members(members) => members.len() as u64,
        }
    }

    /// Count reported for a single host name. Only maps carry per-host
    /// counts.
    pub fn count_for(&self, host_name: &str) -> Option<u64> {
        match self {
            StatSet::Counts(counts) => counts.get(host_name).copied(),
            StatSet::Members(_) => None,
        }
    }
}

impl Default for StatSet {
    fn default() -> Self {
        StatSet::Members(vec![])
    }
}
