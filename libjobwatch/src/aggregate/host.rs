//! Per-host state: results for the active task, and job-wide tallies.
//!
//! Both lists sit in bounded caches. Past the cap the cache drops hosts that
//! haven't reported lately; the lists are sorted by name when read.

use std::collections::HashSet;

use derive_getters::Getters;
use quick_cache::unsync::Cache;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::status::Status;
use crate::event::{EventId, HostId, HostStats, Outcome};
use crate::log::*;

/// The latest outcome of the active task on one host.
#[derive(Getters, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResult {
    event_id: EventId,
    host_id: HostId,
    task_id: EventId,
    name: String,
    status: Outcome,
    status_text: String,
    #[serde(with = "time::serde::rfc3339")]
    created: OffsetDateTime,
    message: String,
    item: Option<String>,
    counter: Option<u64>,
}

impl HostResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: EventId,
        host_id: HostId,
        task_id: EventId,
        name: String,
        status: Outcome,
        created: OffsetDateTime,
        message: String,
        item: Option<String>,
        counter: Option<u64>,
    ) -> Self {
        Self {
            event_id,
            host_id,
            task_id,
            name,
            status,
            status_text: status.text().to_string(),
            created,
            message,
            item,
            counter,
        }
    }
}

/// Host results of the active task, keyed by host id.
pub struct HostResults {
    entries: Cache<HostId, HostResult>,
    max_rows: usize,
}

impl HostResults {
    pub fn new(max_rows: usize) -> Self {
        Self {
            entries: Cache::new(max_rows),
            max_rows,
        }
    }

    /// Insert or replace the result for a host. Past the cap, the cache
    /// evicts a host that hasn't reported lately.
    pub fn upsert(&mut self, result: HostResult) {
        trace!("host results: host {} -> {:?}", result.host_id, result.status);
        self.entries.insert(result.host_id, result);
    }

    pub fn get(&self, host_id: HostId) -> Option<&HostResult> {
        self.entries.peek(&host_id)
    }

    pub fn clear(&mut self) {
        self.entries = Cache::new(self.max_rows);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Results ordered by host name.
    pub fn sorted(&self) -> Vec<&HostResult> {
        let mut results: Vec<&HostResult> = self.entries.iter().map(|(_, r)| r).collect();
        results.sort_by(|a, b| a.name.cmp(&b.name).then(a.host_id.cmp(&b.host_id)));
        results
    }
}

impl std::fmt::Debug for HostResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostResults")
            .field("len", &self.len())
            .field("max_rows", &self.max_rows)
            .finish()
    }
}

/// Cumulative counts for one host across the whole job.
#[derive(Getters, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTally {
    id: HostId,
    name: String,
    ok: u64,
    changed: u64,
    unreachable: u64,
    failed: u64,
    skipped: u64,
    status: Status,
}

impl HostTally {
    fn new(id: HostId, name: String) -> Self {
        Self {
            id,
            name,
            ok: 0,
            changed: 0,
            unreachable: 0,
            failed: 0,
            skipped: 0,
            status: Status::Successful,
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Successful => self.ok += 1,
            Outcome::Changed => self.changed += 1,
            Outcome::Unreachable => self.unreachable += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
        }
        if outcome.is_failure() {
            self.status = Status::Failed;
        }
    }
}

/// Per-host tallies, capped at `max_rows` hosts. Which hosts were ever seen
/// is kept apart from the cap, so a host that dropped out of the list is
/// still known when it reports again.
pub struct HostSummaries {
    entries: Cache<HostId, HostTally>,
    seen: HashSet<HostId>,
    max_rows: usize,
}

impl HostSummaries {
    pub fn new(max_rows: usize) -> Self {
        Self {
            entries: Cache::new(max_rows),
            seen: HashSet::new(),
            max_rows,
        }
    }

    /// Record an outcome for a host. Returns `true` the first time the host
    /// is seen in this job.
    pub fn record(&mut self, host_id: HostId, name: &str, outcome: Outcome) -> bool {
        let first_sighting = self.seen.insert(host_id);
        if let Some(mut tally) = self.entries.get_mut(&host_id) {
            tally.record(outcome);
            return first_sighting;
        }
        if !first_sighting {
            trace!("host summaries: host {} is back", host_id);
        }
        let mut tally = HostTally::new(host_id, name.to_string());
        tally.record(outcome);
        self.entries.insert(host_id, tally);
        first_sighting
    }

    /// Overwrite per-host counts with the ones reported by a stats event.
    /// Only stats reported as name -> count maps carry per-host numbers.
    pub fn apply_stats(&mut self, stats: &HostStats) {
        let hosts: Vec<(HostId, String)> = self
            .entries
            .iter()
            .map(|(id, tally)| (*id, tally.name.clone()))
            .collect();
        for (host_id, name) in hosts {
            let reported = [
                stats.ok().count_for(&name),
                stats.changed().count_for(&name),
                stats.dark().count_for(&name),
                stats.failures().count_for(&name),
                stats.skipped().count_for(&name),
            ];
            if reported.iter().all(Option::is_none) {
                continue;
            }
            let [ok, changed, dark, failures, skipped] = reported.map(Option::unwrap_or_default);
            let Some(mut tally) = self.entries.get_mut(&host_id) else {
                continue;
            };
            tally.ok = ok;
            tally.changed = changed;
            tally.unreachable = dark;
            tally.failed = failures;
            tally.skipped = skipped;
            tally.status = if dark + failures > 0 {
                Status::Failed
            } else {
                Status::Successful
            };
        }
    }

    pub fn get(&self, host_id: HostId) -> Option<&HostTally> {
        self.entries.peek(&host_id)
    }

    /// Hosts listed right now, at most `max_rows`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct hosts seen over the whole job, listed or not.
    pub fn seen(&self) -> usize {
        self.seen.len()
    }

    /// Tallies ordered by host name.
    pub fn sorted(&self) -> Vec<&HostTally> {
        let mut tallies: Vec<&HostTally> = self.entries.iter().map(|(_, t)| t).collect();
        tallies.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        tallies
    }
}

impl std::fmt::Debug for HostSummaries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSummaries")
            .field("len", &self.len())
            .field("seen", &self.seen())
            .field("max_rows", &self.max_rows)
            .finish()
    }
}

/// Job-wide host totals.
#[derive(Getters, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSummary {
    ok: u64,
    changed: u64,
    unreachable: u64,
    failed: u64,
    total: u64,
}

impl HostSummary {
    pub fn new(ok: u64, changed: u64, unreachable: u64, failed: u64) -> Self {
        Self {
            ok,
            changed,
            unreachable,
            failed,
            total: ok + changed + unreachable + failed,
        }
    }

    /// Count a host seen for the first time under its first outcome.
    pub(crate) fn record_new_host(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Successful => self.ok += 1,
            Outcome::Changed => self.changed += 1,
            Outcome::Unreachable => self.unreachable += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => {}
        }
        self.total = self.ok + self.changed + self.unreachable + self.failed;
    }

    /// Totals as reported by a stats event. These replace whatever was
    /// accumulated along the way.
    pub fn from_stats(stats: &HostStats) -> Self {
        Self::new(
            stats.ok().total(),
            stats.changed().total(),
            stats.dark().total(),
            stats.failures().total(),
        )
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use time::macros::datetime;

    use super::*;
    use crate::event::StatSet;

    fn result(event_id: EventId, host_id: HostId, name: &str, status: Outcome) -> HostResult {
        HostResult::new(
            event_id,
            host_id,
            1,
            name.to_string(),
            status,
            datetime!(2015-03-03 21:13:26 UTC),
            String::new(),
            None,
            None,
        )
    }

    #[test]
    fn test_that_results_update_in_place() {
        let mut results = HostResults::new(10);
        results.upsert(result(5, 1, "web01", Outcome::Successful));
        results.upsert(result(6, 1, "web01", Outcome::Failed));
        assert_eq!(1, results.len());
        assert_eq!(&Outcome::Failed, results.get(1).unwrap().status());
        assert_eq!("Failed", results.get(1).unwrap().status_text());
    }

    #[test]
    fn test_that_results_sort_by_name() {
        let mut results = HostResults::new(10);
        results.upsert(result(5, 1, "zeta", Outcome::Successful));
        results.upsert(result(6, 2, "beta", Outcome::Successful));
        results.upsert(result(7, 3, "alpha", Outcome::Changed));
        let names: Vec<&str> = results.sorted().iter().map(|r| r.name().as_str()).collect();
        assert_eq!(vec!["alpha", "beta", "zeta"], names);

        results.clear();
        assert!(results.is_empty());
        assert!(results.get(1).is_none());
    }

    #[test]
    fn test_that_results_stay_under_the_cap() {
        let mut results = HostResults::new(2);
        for host in 0..10 {
            results.upsert(result(host, host, &format!("web{:02}", host), Outcome::Successful));
            assert!(results.len() <= 2);
        }
        let sorted = results.sorted();
        assert!(sorted.windows(2).all(|pair| pair[0].name() <= pair[1].name()));
    }

    #[test]
    fn test_that_summaries_accumulate_per_host() {
        let mut hosts = HostSummaries::new(10);
        assert!(hosts.record(1, "web01", Outcome::Successful));
        assert!(hosts.record(2, "web02", Outcome::Successful));
        assert!(!hosts.record(1, "web01", Outcome::Unreachable));
        assert_eq!(2, hosts.len());

        let web01 = hosts.get(1).unwrap();
        assert_eq!(1, *web01.ok());
        assert_eq!(1, *web01.unreachable());
        assert_eq!(&Status::Failed, web01.status());
        assert_eq!(&Status::Successful, hosts.get(2).unwrap().status());
    }

    #[test]
    fn test_that_hosts_past_the_cap_are_only_new_once() {
        let mut hosts = HostSummaries::new(2);
        let mut new_hosts = 0;
        for _task in 0..3 {
            for host in 0..5 {
                if hosts.record(host, &format!("web{:02}", host), Outcome::Successful) {
                    new_hosts += 1;
                }
                assert!(hosts.len() <= 2);
            }
        }
        assert_eq!(5, new_hosts);
        assert_eq!(5, hosts.seen());
    }

    #[test]
    fn test_that_stats_overwrite_tallies_reported_by_name() {
        let mut hosts = HostSummaries::new(10);
        hosts.record(1, "web01", Outcome::Successful);
        hosts.record(2, "web02", Outcome::Failed);

        let counts = |pairs: &[(&str, u64)]| {
            StatSet::Counts(
                pairs
                    .iter()
                    .map(|(name, count)| (name.to_string(), *count))
                    .collect::<BTreeMap<_, _>>(),
            )
        };
        let stats = HostStats::new(
            counts(&[("web01", 4)]),
            counts(&[("web01", 2)]),
            StatSet::default(),
            StatSet::default(),
            counts(&[("web01", 3)]),
        );
        hosts.apply_stats(&stats);

        assert_eq!(4, *hosts.get(1).unwrap().ok());
        assert_eq!(2, *hosts.get(1).unwrap().changed());
        assert_eq!(3, *hosts.get(1).unwrap().skipped());
        assert_eq!(&Status::Successful, hosts.get(1).unwrap().status());
        // Not named in the stats, so left alone.
        assert_eq!(1, *hosts.get(2).unwrap().failed());
    }

    #[test]
    fn test_that_skipped_hosts_are_not_totalled() {
        let mut summary = HostSummary::default();
        summary.record_new_host(Outcome::Skipped);
        summary.record_new_host(Outcome::Changed);
        assert_eq!(HostSummary::new(0, 1, 0, 0), summary);
    }
}
