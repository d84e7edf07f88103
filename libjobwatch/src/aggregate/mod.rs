//! Folds a stream of [`JobEvent`]s into live play, task and host state.
//!
//! The aggregator owns all of its state and is driven one event at a time
//! through [`EventAggregator::digest`], or a batch at a time through
//! [`EventAggregator::process_queue`]. Nothing in here does I/O or fails:
//! events that can't be placed (unknown kind, parent we don't track, bad
//! payload) are counted in [`IgnoredEvents`] and otherwise dropped.

use std::collections::BTreeMap;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::AggregatorConfig;
use crate::event::{EventId, EventKind, JobEvent, Outcome};
use crate::log::*;
use crate::queue::EventQueue;

pub mod bar;
pub mod elapsed;
pub mod host;
pub mod play;
pub mod status;

pub use bar::{OutcomeCounts, TaskBar};
pub use elapsed::get_elapsed;
pub use host::{HostResult, HostResults, HostSummaries, HostSummary, HostTally};
pub use play::{Play, Task};
pub use status::{JobState, JobStatus, Status, StatusUpdate, UnknownJobState};

const NO_HOSTS_MATCHED: &str = "failed - no hosts matched";

/// Events that had no effect, by reason.
#[derive(Getters, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredEvents {
    /// Parent isn't a play or task we track.
    orphan: u64,
    /// Kind tag we don't know.
    unknown: u64,
    /// Record didn't decode, or lacks what its kind needs.
    malformed: u64,
    /// A play or task we already have.
    duplicate: u64,
}

impl IgnoredEvents {
    pub fn total(&self) -> u64 {
        self.orphan + self.unknown + self.malformed + self.duplicate
    }
}

/// The search the view is filtered by. Any active search makes play and task
/// selection clear derived state even when the selection doesn't change.
#[derive(Getters, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default)]
    host_name: Option<String>,
    #[serde(default)]
    failed_only: bool,
}

impl SearchFilter {
    pub fn for_host<S: Into<String>>(host_name: S) -> Self {
        Self {
            host_name: Some(host_name.into()),
            failed_only: false,
        }
    }

    pub fn failures() -> Self {
        Self {
            host_name: None,
            failed_only: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.failed_only || self.host_name.as_deref().is_some_and(|name| !name.is_empty())
    }
}

#[derive(Getters, Debug)]
pub struct EventAggregator {
    config: AggregatorConfig,
    plays: BTreeMap<EventId, Play>,
    active_play: Option<EventId>,
    active_task: Option<EventId>,
    host_results: HostResults,
    host_summary: HostSummary,
    hosts: HostSummaries,
    job_status: JobStatus,
    filter: SearchFilter,
    /// Whether any task seen so far belongs to a role.
    has_roles: bool,
    ignored: IgnoredEvents,
    digested: u64,
    /// Highest event id seen, for resuming a feed.
    last_event_id: Option<EventId>,
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl EventAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            host_results: HostResults::new(*config.host_results_max_rows()),
            hosts: HostSummaries::new(*config.host_summaries_max_rows()),
            config,
            plays: BTreeMap::new(),
            active_play: None,
            active_task: None,
            host_summary: HostSummary::default(),
            job_status: JobStatus::default(),
            filter: SearchFilter::default(),
            has_roles: false,
            ignored: IgnoredEvents::default(),
            digested: 0,
            last_event_id: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.job_status.is_finished()
    }

    /// Drain `queue` into the aggregator, in the configured order. Returns
    /// how many events were digested.
    #[tracing::instrument(skip(self, queue), fields(queued = queue.len()))]
    pub fn process_queue(&mut self, queue: &mut EventQueue) -> usize {
        let order = *self.config.drain_order();
        let mut digested = 0;
        while let Some(event) = queue.pop(order) {
            self.digest(&event);
            digested += 1;
        }
        if digested > 0 {
            debug!("processed {} queued events", digested);
        }
        digested
    }

    /// Dispatch one event to the handler for its kind.
    pub fn digest(&mut self, event: &JobEvent) {
        trace!("processing event: {} ({})", event.id(), event.event());
        self.digested += 1;
        self.last_event_id = self.last_event_id.max(Some(*event.id()));

        match event.event() {
            EventKind::PlaybookOnStart => self.on_playbook_start(event),
            EventKind::PlaybookOnPlayStart => self.on_play_start(event),
            EventKind::PlaybookOnSetup | EventKind::PlaybookOnTaskStart => {
                self.on_task_start(event)
            }
            EventKind::RunnerOnOk
            | EventKind::RunnerOnAsyncOk
            | EventKind::RunnerOnFailed
            | EventKind::RunnerOnError
            | EventKind::RunnerOnAsyncFailed
            | EventKind::RunnerOnUnreachable
            | EventKind::RunnerOnSkipped => match event.outcome() {
                Some(outcome) => self.on_runner_outcome(event, outcome),
                None => self.ignored.malformed += 1,
            },
            EventKind::RunnerOnNoHosts => self.on_runner_no_hosts(event),
            EventKind::PlaybookOnNoHostsMatched => self.on_no_hosts_matched(event),
            EventKind::PlaybookOnNoHostsRemaining => self.on_no_hosts_remaining(event),
            EventKind::PlaybookOnStats => self.on_stats(event),
            // Informational only; nothing on screen depends on them.
            EventKind::PlaybookOnVarsPrompt
            | EventKind::PlaybookOnImportForHost
            | EventKind::PlaybookOnNotImportForHost
            | EventKind::PlaybookOnNotify
            | EventKind::RunnerOnAsyncPoll
            | EventKind::RunnerOnFileDiff => {}
            EventKind::Unknown(tag) => {
                debug!("ignoring event {} of unknown kind {}", event.id(), tag);
                self.ignored.unknown += 1;
            }
        }
    }

    /// Count records that never made it to [`digest`](Self::digest) because
    /// they failed to decode.
    pub fn record_malformed(&mut self, count: usize) {
        self.ignored.malformed += count as u64;
    }

    fn orphan(&mut self, event: &JobEvent) {
        debug!(
            "ignoring {} event {}: parent {:?} isn't tracked",
            event.event(),
            event.id(),
            event.parent()
        );
        self.ignored.orphan += 1;
    }

    pub fn on_playbook_start(&mut self, event: &JobEvent) {
        if self.job_status.start(*event.created()) {
            info!("job started at {}", event.created());
        }
    }

    /// A new play starts and becomes the active one.
    pub fn on_play_start(&mut self, event: &JobEvent) {
        let id = *event.id();
        if self.plays.contains_key(&id) {
            debug!("ignoring duplicate play start {}", id);
            self.ignored.duplicate += 1;
            return;
        }
        let play = Play::from_event(event);
        debug!("play started: {} ({})", play.name(), id);
        self.plays.insert(id, play);
        self.activate_play(id);
    }

    /// A task (or the implicit fact-gathering setup task) starts under one of
    /// our plays. It becomes the active task when that play is the one on
    /// screen.
    pub fn on_task_start(&mut self, event: &JobEvent) {
        let id = *event.id();
        let Some(play_id) = *event.parent() else {
            return self.orphan(event);
        };
        let Some(play) = self.plays.get_mut(&play_id) else {
            return self.orphan(event);
        };
        if play.tasks.contains_key(&id) {
            debug!("ignoring duplicate task start {}", id);
            self.ignored.duplicate += 1;
            return;
        }

        let task = Task::from_event(event, play_id, play.host_count);
        if task.role().is_some() {
            self.has_roles = true;
        }
        debug!("task started: {} ({})", task.name(), id);
        if play.first_task.is_none() {
            play.first_task = Some(id);
        }
        play.task_count += 1;
        play.tasks.insert(id, task);
        play.fold_status(
            StatusUpdate::from_flags(*event.failed(), *event.changed()),
            event.modified(),
        );

        if self.active_play == Some(play_id) {
            self.host_results.clear();
            self.active_task = Some(id);
        }
        self.job_status.touch(event.modified());
    }

    /// A host reported a result for a task.
    pub fn on_runner_outcome(&mut self, event: &JobEvent, outcome: Outcome) {
        let Some(task_id) = *event.parent() else {
            return self.orphan(event);
        };
        let Some(play_id) = self.play_for_task(task_id) else {
            return self.orphan(event);
        };
        let Some(host_id) = *event.host() else {
            debug!("ignoring runner event {} without a host", event.id());
            self.ignored.malformed += 1;
            return;
        };
        let name = event
            .display_host_name()
            .unwrap_or_else(|| host_id.to_string());
        let modified = event.modified();

        if self.hosts.record(host_id, &name, outcome) {
            self.host_summary.record_new_host(outcome);
        }

        let Some(play) = self.plays.get_mut(&play_id) else {
            return self.orphan(event);
        };
        let is_first_task = play.first_task == Some(task_id);
        if outcome == Outcome::Unreachable {
            play.unreachable_count += 1;
        }
        if let Some(task) = play.tasks.get_mut(&task_id) {
            if is_first_task && outcome != Outcome::Unreachable {
                play.host_count += 1;
                task.host_count += 1;
            }
            task.record(outcome);
            task.fold_status(outcome.into(), modified);
        }
        play.fold_status(outcome.into(), modified);
        self.job_status.touch(modified);

        if self.active_task == Some(task_id) {
            self.host_results.upsert(HostResult::new(
                *event.id(),
                host_id,
                task_id,
                name,
                outcome,
                *event.created(),
                event.message(),
                event.item(),
                *event.counter(),
            ));
        }
    }

    /// A task had no hosts left to run on.
    pub fn on_runner_no_hosts(&mut self, event: &JobEvent) {
        let Some(task_id) = *event.parent() else {
            return self.orphan(event);
        };
        let Some(play_id) = self.play_for_task(task_id) else {
            return self.orphan(event);
        };
        let modified = event.modified();
        if let Some(play) = self.plays.get_mut(&play_id) {
            if let Some(task) = play.tasks.get_mut(&task_id) {
                task.mark_no_hosts(modified);
            }
            play.fold_status(
                StatusUpdate::no_hosts(*event.failed(), *event.changed()),
                modified,
            );
        }
        self.job_status.touch(modified);
    }

    /// The play's host pattern matched nothing. Terminal for the play.
    pub fn on_no_hosts_matched(&mut self, event: &JobEvent) {
        let Some(play) = event.parent().and_then(|id| self.plays.get_mut(&id)) else {
            return self.orphan(event);
        };
        play.force_status(Status::Failed, NO_HOSTS_MATCHED, event.modified());
        self.job_status.touch(event.modified());
    }

    /// Every host of the play failed or went unreachable before the play
    /// finished.
    pub fn on_no_hosts_remaining(&mut self, event: &JobEvent) {
        let Some(play) = event.parent().and_then(|id| self.plays.get_mut(&id)) else {
            return self.orphan(event);
        };
        play.fold_status(
            StatusUpdate::no_hosts(*event.failed(), *event.changed()),
            event.modified(),
        );
        self.job_status.touch(event.modified());
    }

    /// The run is over. The stats payload is authoritative for host totals.
    pub fn on_stats(&mut self, event: &JobEvent) {
        match event.stats() {
            Ok(stats) => {
                self.host_summary = HostSummary::from_stats(&stats);
                self.hosts.apply_stats(&stats);
            }
            Err(err) => {
                warn!("stats event {} has an unreadable payload: {}", event.id(), err);
                self.ignored.malformed += 1;
            }
        }
        let state = if *event.failed() {
            JobState::Failed
        } else {
            JobState::Successful
        };
        if self.job_status.finish(state, event.modified()) {
            info!(
                "job finished: {} after {}",
                state,
                self.job_status.elapsed()
            );
        }
    }

    /// Apply a status change reported out of band, e.g. the job being
    /// canceled. Finished jobs stay finished.
    pub fn set_job_status(&mut self, state: JobState, at: OffsetDateTime) -> bool {
        match state {
            JobState::Pending => false,
            JobState::Running => {
                if *self.job_status.status() == JobState::Pending {
                    self.job_status.start(at)
                } else {
                    false
                }
            }
            finished => self.job_status.finish(finished, at),
        }
    }

    pub fn set_filter(&mut self, filter: SearchFilter) {
        self.filter = filter;
    }

    /// Make `id` the active play. The active task and its host results are
    /// cleared when the play changes, or always while a search filter is
    /// active. Tasks stay with their plays; the view lists the active play's.
    /// Returns whether state was cleared.
    pub fn select_play(&mut self, id: Option<EventId>) -> bool {
        let clear = self.filter.is_active() || self.active_play != id;
        if clear {
            self.active_task = None;
            self.host_results.clear();
        }
        self.active_play = id;
        clear
    }

    /// Make `id` the active task of the active play. Host results are
    /// cleared when the task changes, or always while a search filter is
    /// active. Returns whether they were cleared.
    pub fn select_task(&mut self, id: Option<EventId>) -> bool {
        let clear = self.filter.is_active() || self.active_task != id;
        if clear {
            self.host_results.clear();
        }
        self.active_task = id;
        clear
    }

    /// Switch to a freshly started play.
    fn activate_play(&mut self, id: EventId) {
        self.active_play = Some(id);
        self.active_task = None;
        self.host_results.clear();
    }

    fn play_for_task(&self, task_id: EventId) -> Option<EventId> {
        self.plays
            .values()
            .find(|play| play.tasks.contains_key(&task_id))
            .map(|play| *play.id())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use time::macros::datetime;
    use time::Duration;

    use super::*;
    use crate::config::DrainOrder;

    fn at(secs: i64) -> OffsetDateTime {
        datetime!(2015-03-03 21:00:00 UTC) + Duration::seconds(secs)
    }

    fn playbook_start(id: EventId) -> JobEvent {
        JobEvent::new(id, EventKind::PlaybookOnStart, at(0))
    }

    fn play_start(id: EventId, name: &str) -> JobEvent {
        JobEvent::new(id, EventKind::PlaybookOnPlayStart, at(id as i64)).with_play(name)
    }

    fn task_start(id: EventId, play: EventId, name: &str) -> JobEvent {
        JobEvent::new(id, EventKind::PlaybookOnTaskStart, at(id as i64))
            .with_parent(play)
            .with_task(name)
    }

    fn runner(id: EventId, kind: EventKind, task: EventId, host: u64, name: &str) -> JobEvent {
        JobEvent::new(id, kind, at(id as i64))
            .with_parent(task)
            .with_host(host, name)
    }

    fn ok(id: EventId, task: EventId, host: u64, name: &str) -> JobEvent {
        runner(id, EventKind::RunnerOnOk, task, host, name)
    }

    fn digest_all(aggregator: &mut EventAggregator, events: Vec<JobEvent>) {
        for event in events {
            aggregator.digest(&event);
        }
    }

    /// One play, one task, running against `hosts` hosts.
    fn running_job(hosts: u64) -> EventAggregator {
        let mut aggregator = EventAggregator::default();
        digest_all(
            &mut aggregator,
            vec![
                playbook_start(1),
                play_start(2, "deploy"),
                task_start(3, 2, "gather facts"),
            ],
        );
        for host in 0..hosts {
            aggregator.digest(&ok(10 + host, 3, host, &format!("web{:02}", host)));
        }
        aggregator
    }

    #[test]
    fn test_that_untracked_hosts_count_once() {
        let mut aggregator = running_job(0);
        aggregator.digest(&ok(10, 3, 7, "web07"));
        assert_eq!(1, *aggregator.host_summary().total());
        assert_eq!(1, *aggregator.host_summary().ok());

        aggregator.digest(&ok(11, 3, 8, "web08"));
        assert_eq!(2, *aggregator.host_summary().total());
        assert_eq!(2, *aggregator.host_summary().ok());

        // A host we already track only bumps its own tally.
        aggregator.digest(&runner(12, EventKind::RunnerOnFailed, 3, 7, "web07"));
        assert_eq!(2, *aggregator.host_summary().total());
        assert_eq!(0, *aggregator.host_summary().failed());
        assert_eq!(1, *aggregator.hosts().get(7).unwrap().failed());
    }

    #[test]
    fn test_that_first_task_learns_host_count() {
        let mut aggregator = running_job(3);
        aggregator.digest(&runner(20, EventKind::RunnerOnUnreachable, 3, 9, "db01"));

        let play = &aggregator.plays()[&2];
        assert_eq!(3, *play.host_count());
        assert_eq!(1, *play.unreachable_count());
        assert_eq!(Some(3), *play.first_task());

        let task = &play.tasks()[&3];
        assert_eq!(3, *task.host_count());
        assert_eq!(4, *task.reported_hosts());
        assert_eq!(100, *task.bar().successful_pct());
        assert_eq!(&Status::Failed, task.status());
        assert_eq!(&Status::Failed, play.status());

        // The next task expects the hosts the first one saw.
        aggregator.digest(&task_start(30, 2, "install nginx"));
        let task = &aggregator.plays()[&2].tasks()[&30];
        assert_eq!(3, *task.host_count());
        aggregator.digest(&ok(31, 30, 0, "web00"));
        assert_eq!(3, *aggregator.plays()[&2].host_count());
    }

    #[test]
    fn test_that_task_bars_track_outcomes() {
        let mut aggregator = running_job(3);
        digest_all(
            &mut aggregator,
            vec![
                task_start(30, 2, "install nginx"),
                runner(31, EventKind::RunnerOnOk, 30, 0, "web00").with_flags(false, true),
                runner(32, EventKind::RunnerOnSkipped, 30, 1, "web01"),
                runner(33, EventKind::RunnerOnError, 30, 2, "web02"),
            ],
        );
        let task = &aggregator.plays()[&2].tasks()[&30];
        assert_eq!(3, *task.reported_hosts());
        assert_eq!(32, *task.bar().failed_pct());
        assert_eq!(34, *task.bar().changed_pct());
        assert_eq!(34, *task.bar().skipped_pct());
        assert_eq!(&Status::Failed, task.status());
        assert_eq!("Failed", task.status_text());
    }

    #[test]
    fn test_that_failed_plays_stay_failed() {
        let mut aggregator = running_job(1);
        aggregator.digest(&runner(20, EventKind::RunnerOnFailed, 3, 0, "web00"));
        assert_eq!(&Status::Failed, aggregator.plays()[&2].status());

        digest_all(
            &mut aggregator,
            vec![
                runner(21, EventKind::RunnerOnOk, 3, 0, "web00").with_flags(false, true),
                task_start(22, 2, "restart").with_flags(false, true),
                ok(23, 22, 0, "web00"),
                JobEvent::new(24, EventKind::PlaybookOnNoHostsRemaining, at(24)).with_parent(2),
                JobEvent::new(25, EventKind::RunnerOnNoHosts, at(25)).with_parent(22),
                play_start(2, "deploy again"),
            ],
        );
        assert_eq!(&Status::Failed, aggregator.plays()[&2].status());
        assert_eq!(1, *aggregator.ignored().duplicate());

        // A different play starts fresh.
        aggregator.digest(&play_start(40, "cleanup"));
        assert_eq!(&Status::Successful, aggregator.plays()[&40].status());
        assert_eq!(Some(40), *aggregator.active_play());
    }

    #[test]
    fn test_that_changed_is_sticky() {
        let mut aggregator = running_job(0);
        aggregator.digest(&ok(10, 3, 0, "web00").with_flags(false, true));
        aggregator.digest(&ok(11, 3, 1, "web01"));
        assert_eq!(&Status::Changed, aggregator.plays()[&2].status());
        assert_eq!(&Status::Changed, aggregator.plays()[&2].tasks()[&3].status());
    }

    #[test]
    fn test_that_no_hosts_matched_fails_the_play() {
        let mut aggregator = EventAggregator::default();
        digest_all(
            &mut aggregator,
            vec![
                play_start(2, "deploy"),
                JobEvent::new(3, EventKind::PlaybookOnNoHostsMatched, at(9)).with_parent(2),
            ],
        );
        let play = &aggregator.plays()[&2];
        assert_eq!(&Status::Failed, play.status());
        assert_eq!("failed - no hosts matched", play.status_text());
        assert_eq!("00:00:07", play.elapsed());
    }

    #[test]
    fn test_that_runner_no_hosts_marks_the_task() {
        let mut aggregator = running_job(0);
        aggregator.digest(&JobEvent::new(4, EventKind::RunnerOnNoHosts, at(4)).with_parent(3));
        let play = &aggregator.plays()[&2];
        assert_eq!(&Status::NoMatchingHosts, play.tasks()[&3].status());
        assert_eq!(&Status::NoMatchingHosts, play.status());
    }

    #[test]
    fn test_that_orphans_are_counted_not_applied() {
        let mut aggregator = running_job(1);
        digest_all(
            &mut aggregator,
            vec![
                task_start(20, 99, "no such play"),
                ok(21, 99, 5, "web05"),
                JobEvent::new(22, EventKind::PlaybookOnNoHostsMatched, at(22)).with_parent(98),
                JobEvent::new(23, EventKind::RunnerOnOk, at(23)).with_parent(3),
                JobEvent::new(24, "playbook_on_include".parse().unwrap(), at(24)),
            ],
        );
        assert_eq!(3, *aggregator.ignored().orphan());
        assert_eq!(1, *aggregator.ignored().malformed());
        assert_eq!(1, *aggregator.ignored().unknown());
        assert_eq!(1, *aggregator.host_summary().total());
        assert!(aggregator.hosts().get(5).is_none());
    }

    #[test]
    fn test_that_stats_replace_running_totals() {
        let mut aggregator = running_job(6);
        aggregator.digest(
            &JobEvent::new(50, EventKind::PlaybookOnStats, at(3661)).with_event_data(json!({
                "ok": [1, 2],
                "changed": [3],
                "dark": [],
                "failures": [4],
            })),
        );
        assert_eq!(&HostSummary::new(2, 1, 0, 1), aggregator.host_summary());
        assert_eq!(4, *aggregator.host_summary().total());
        assert!(aggregator.is_finished());
        assert_eq!(&JobState::Successful, aggregator.job_status().status());
        assert_eq!("01:01:01", aggregator.job_status().elapsed());
    }

    #[test]
    fn test_that_failed_stats_fail_the_job() {
        let mut aggregator = running_job(1);
        aggregator.digest(
            &JobEvent::new(50, EventKind::PlaybookOnStats, at(60))
                .with_flags(true, false)
                .with_event_data(json!({ "failures": { "web00": 1 } })),
        );
        assert_eq!(&JobState::Failed, aggregator.job_status().status());
        assert_eq!(1, *aggregator.hosts().get(0).unwrap().failed());
        assert_eq!(0, *aggregator.hosts().get(0).unwrap().ok());

        // Nothing moves a finished job.
        assert!(!aggregator.set_job_status(JobState::Canceled, at(90)));
        aggregator.digest(&playbook_start(60));
        assert_eq!(&JobState::Failed, aggregator.job_status().status());
    }

    #[test]
    fn test_that_external_status_changes_apply() {
        let mut aggregator = EventAggregator::default();
        assert!(aggregator.set_job_status(JobState::Running, at(0)));
        assert!(!aggregator.set_job_status(JobState::Pending, at(1)));
        assert!(aggregator.set_job_status(JobState::Canceled, at(30)));
        assert_eq!("00:00:30", aggregator.job_status().elapsed());
    }

    #[test]
    fn test_that_switching_plays_clears_derived_state() {
        let mut aggregator = running_job(2);
        aggregator.digest(&play_start(20, "second"));
        aggregator.digest(&task_start(21, 20, "migrate"));
        aggregator.digest(&ok(22, 21, 0, "web00"));
        assert_eq!(1, aggregator.host_results().len());

        assert!(aggregator.select_play(Some(2)));
        assert!(aggregator.host_results().is_empty());
        assert_eq!(None, *aggregator.active_task());
        // Both plays keep their tasks.
        assert!(aggregator.plays()[&2].tasks().contains_key(&3));
        assert!(aggregator.plays()[&20].tasks().contains_key(&21));

        // Same play, no filter: nothing to clear.
        assert!(!aggregator.select_play(Some(2)));
    }

    #[test]
    fn test_that_switching_plays_clears_the_active_task_and_results() {
        let mut aggregator = running_job(2);
        assert_eq!(2, aggregator.host_results().len());
        assert!(aggregator.select_play(Some(40)));
        assert!(aggregator.host_results().is_empty());
        assert_eq!(None, *aggregator.active_task());
        assert_eq!(Some(40), *aggregator.active_play());
        assert_eq!(1, aggregator.plays()[&2].tasks().len());
    }

    #[test]
    fn test_that_searching_always_clears() {
        let mut aggregator = running_job(2);
        aggregator.set_filter(SearchFilter::for_host("web"));
        assert!(aggregator.select_play(Some(2)));
        assert!(aggregator.host_results().is_empty());
        assert_eq!(None, *aggregator.active_task());
    }

    #[test]
    fn test_that_selection_under_a_search_keeps_counting_the_live_task() {
        let mut aggregator = running_job(1);
        aggregator.set_filter(SearchFilter::for_host("web"));
        assert!(aggregator.select_play(Some(2)));

        aggregator.digest(&ok(20, 3, 8, "web02"));
        assert_eq!(2, *aggregator.host_summary().total());
        assert_eq!(0, *aggregator.ignored().orphan());
        assert_eq!(2, *aggregator.plays()[&2].tasks()[&3].reported_hosts());
    }

    #[test]
    fn test_that_the_live_play_grows_while_another_is_selected() {
        let mut aggregator = running_job(1);
        aggregator.digest(&play_start(20, "second"));
        aggregator.digest(&task_start(21, 20, "migrate"));
        assert_eq!(Some(21), *aggregator.active_task());

        aggregator.select_play(Some(2));
        aggregator.digest(&task_start(22, 20, "restart"));
        aggregator.digest(&ok(23, 22, 4, "db01"));
        aggregator.digest(&ok(24, 3, 5, "web05"));

        assert_eq!(0, *aggregator.ignored().orphan());
        assert_eq!(2, aggregator.plays()[&20].tasks().len());
        assert_eq!(1, *aggregator.plays()[&20].tasks()[&22].reported_hosts());
        assert_eq!(3, *aggregator.host_summary().total());
        // The selection stays put, and only results of its active task show.
        assert_eq!(Some(2), *aggregator.active_play());
        assert_eq!(None, *aggregator.active_task());
        assert!(aggregator.host_results().is_empty());
    }

    #[test]
    fn test_that_totals_count_hosts_past_the_list_cap_once() {
        let mut aggregator =
            EventAggregator::new(AggregatorConfig::default().with_max_rows(2));
        digest_all(
            &mut aggregator,
            vec![play_start(1, "deploy"), task_start(2, 1, "ping")],
        );
        for host in 0..3 {
            aggregator.digest(&ok(10 + host, 2, host, &format!("web{:02}", host)));
        }
        aggregator.digest(&task_start(20, 1, "install"));
        for host in 0..3 {
            aggregator.digest(&ok(30 + host, 20, host, &format!("web{:02}", host)));
        }

        assert_eq!(3, *aggregator.host_summary().total());
        assert_eq!(3, *aggregator.host_summary().ok());
        assert_eq!(3, aggregator.hosts().seen());
        assert!(aggregator.hosts().len() <= 2);
    }

    #[test]
    fn test_that_selecting_tasks_clears_host_results() {
        let mut aggregator = running_job(2);
        assert!(!aggregator.select_task(Some(3)));
        assert_eq!(2, aggregator.host_results().len());
        assert!(aggregator.select_task(None));
        assert!(aggregator.host_results().is_empty());

        aggregator.set_filter(SearchFilter::failures());
        assert!(aggregator.select_task(None));
    }

    #[test]
    fn test_that_new_tasks_reset_host_results() {
        let mut aggregator = running_job(2);
        aggregator.digest(&task_start(20, 2, "install"));
        assert!(aggregator.host_results().is_empty());
        assert_eq!(Some(20), *aggregator.active_task());

        // Late results for the previous task still count, but aren't shown.
        aggregator.digest(&ok(21, 3, 5, "web05"));
        assert!(aggregator.host_results().is_empty());
        assert_eq!(3, *aggregator.plays()[&2].tasks()[&3].reported_hosts());
    }

    #[test]
    fn test_that_roles_are_noticed() {
        let mut aggregator = running_job(0);
        assert!(!*aggregator.has_roles());
        aggregator.digest(&task_start(4, 2, "nginx : install").with_role("nginx"));
        assert!(*aggregator.has_roles());
        assert_eq!(
            &Some("nginx".to_string()),
            aggregator.plays()[&2].tasks()[&4].role()
        );
    }

    #[test]
    fn test_that_queues_drain_in_the_configured_order() {
        let events = vec![play_start(1, "first"), play_start(2, "second")];

        let mut queue = EventQueue::from(events.clone());
        let mut aggregator = EventAggregator::default();
        assert_eq!(2, aggregator.process_queue(&mut queue));
        assert!(queue.is_empty());
        assert_eq!(Some(2), *aggregator.active_play());

        let mut queue = EventQueue::from(events);
        let mut aggregator = EventAggregator::new(
            AggregatorConfig::default().with_drain_order(DrainOrder::Newest),
        );
        aggregator.process_queue(&mut queue);
        assert_eq!(Some(1), *aggregator.active_play());
        assert_eq!(Some(2), *aggregator.last_event_id());
    }

    #[test]
    fn test_that_empty_queues_are_a_no_op() {
        let mut aggregator = EventAggregator::default();
        assert_eq!(0, aggregator.process_queue(&mut EventQueue::default()));
        assert_eq!(0, *aggregator.digested());
    }
}
