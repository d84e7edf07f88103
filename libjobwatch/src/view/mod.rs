//! A read-only, serializable picture of an aggregator, trimmed to what a
//! screen shows.

use derive_getters::Getters;
use serde::Serialize;

use crate::aggregate::{
    EventAggregator, HostResult, HostSummary, HostTally, IgnoredEvents, JobStatus, Play,
    SearchFilter, Task,
};
use crate::event::EventId;

#[derive(Getters, Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    job_status: JobStatus,
    host_summary: HostSummary,
    active_play: Option<EventId>,
    active_task: Option<EventId>,
    /// Newest plays, oldest first.
    plays: Vec<Play>,
    /// Tasks of the active play, oldest first.
    tasks: Vec<Task>,
    host_results: Vec<HostResult>,
    hosts: Vec<HostTally>,
    filter: SearchFilter,
    has_roles: bool,
    ignored: IgnoredEvents,
    digested: u64,
    last_event_id: Option<EventId>,
}

impl ViewSnapshot {
    pub fn active_play_detail(&self) -> Option<&Play> {
        let id = self.active_play?;
        self.plays.iter().find(|play| *play.id() == id)
    }

    pub fn active_task_detail(&self) -> Option<&Task> {
        let id = self.active_task?;
        self.tasks.iter().find(|task| *task.id() == id)
    }
}

impl EventAggregator {
    pub fn snapshot(&self) -> ViewSnapshot {
        let config = self.config();
        let plays = newest(self.plays().values(), *config.plays_max_rows());
        let tasks = self
            .active_play()
            .and_then(|id| self.plays().get(&id))
            .map(|play| newest(play.tasks().values(), *config.tasks_max_rows()))
            .unwrap_or_default();

        let filter = self.filter();
        let host_results = self
            .host_results()
            .sorted()
            .into_iter()
            .filter(|result| {
                matches(filter, result.name(), result.status().is_failure())
            })
            .cloned()
            .collect();
        let hosts = self
            .hosts()
            .sorted()
            .into_iter()
            .filter(|tally| {
                matches(filter, tally.name(), tally.failed() + tally.unreachable() > 0)
            })
            .take(*config.host_summaries_max_rows())
            .cloned()
            .collect();

        ViewSnapshot {
            job_status: self.job_status().clone(),
            host_summary: *self.host_summary(),
            active_play: *self.active_play(),
            active_task: *self.active_task(),
            plays,
            tasks,
            host_results,
            hosts,
            filter: filter.clone(),
            has_roles: *self.has_roles(),
            ignored: *self.ignored(),
            digested: *self.digested(),
            last_event_id: *self.last_event_id(),
        }
    }
}

/// The last `max` items of an id-ordered sequence, still in id order.
fn newest<'a, T, I>(items: I, max: usize) -> Vec<T>
where
    T: Clone + 'a,
    I: DoubleEndedIterator<Item = &'a T>,
{
    let mut out: Vec<T> = items.rev().take(max).cloned().collect();
    out.reverse();
    out
}

fn matches(filter: &SearchFilter, name: &str, failed: bool) -> bool {
    if *filter.failed_only() && !failed {
        return false;
    }
    match filter.host_name().as_deref() {
        Some(needle) if !needle.is_empty() => {
            name.to_lowercase().contains(&needle.to_lowercase())
        }
        _ => true,
    }
}
