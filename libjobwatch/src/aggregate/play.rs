use std::collections::BTreeMap;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::bar::{OutcomeCounts, TaskBar};
use super::elapsed::{get_elapsed, ZERO_ELAPSED};
use super::status::{Status, StatusUpdate};
use crate::event::{EventId, JobEvent, Outcome};

/// A play, keyed by the id of its `playbook_on_play_start` event.
#[derive(Getters, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Play {
    id: EventId,
    name: String,
    pub(crate) status: Status,
    pub(crate) status_text: String,
    #[serde(with = "time::serde::rfc3339")]
    created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(crate) finished: Option<OffsetDateTime>,
    pub(crate) elapsed: String,
    /// Hosts the play runs against, learned from its first task.
    pub(crate) host_count: u32,
    pub(crate) task_count: u32,
    pub(crate) first_task: Option<EventId>,
    pub(crate) unreachable_count: u32,
    #[serde(skip)]
    pub(crate) tasks: BTreeMap<EventId, Task>,
}

impl Play {
    pub(crate) fn from_event(event: &JobEvent) -> Self {
        let status = Status::from_flags(*event.failed(), *event.changed());
        Self {
            id: *event.id(),
            name: event.play().clone().unwrap_or_default(),
            status,
            status_text: status.text().to_string(),
            created: *event.created(),
            finished: None,
            elapsed: ZERO_ELAPSED.to_string(),
            host_count: 0,
            task_count: 0,
            first_task: None,
            unreachable_count: 0,
            tasks: BTreeMap::new(),
        }
    }

    pub(crate) fn fold_status(&mut self, update: StatusUpdate, modified: OffsetDateTime) {
        self.status = self.status.fold(update);
        self.status_text = self.status.text().to_string();
        self.stamp(modified);
    }

    /// Force a terminal status regardless of what came before.
    pub(crate) fn force_status<S: Into<String>>(
        &mut self,
        status: Status,
        status_text: S,
        modified: OffsetDateTime,
    ) {
        self.status = status;
        self.status_text = status_text.into();
        self.stamp(modified);
    }

    fn stamp(&mut self, modified: OffsetDateTime) {
        self.finished = Some(modified);
        self.elapsed = get_elapsed(self.created, modified);
    }
}

/// A task within a play, keyed by the id of its task start event.
#[derive(Getters, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: EventId,
    play_id: EventId,
    name: String,
    role: Option<String>,
    status: Status,
    status_text: String,
    #[serde(with = "time::serde::rfc3339")]
    created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    modified: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    finished: Option<OffsetDateTime>,
    elapsed: String,
    pub(crate) host_count: u32,
    reported_hosts: u32,
    counts: OutcomeCounts,
    bar: TaskBar,
}

impl Task {
    pub(crate) fn from_event(event: &JobEvent, play_id: EventId, host_count: u32) -> Self {
        let status = Status::from_flags(*event.failed(), *event.changed());
        Self {
            id: *event.id(),
            play_id,
            name: event.display_task_name(),
            role: event.role_name(),
            status,
            status_text: status.text().to_string(),
            created: *event.created(),
            modified: event.modified(),
            finished: None,
            elapsed: ZERO_ELAPSED.to_string(),
            host_count,
            reported_hosts: 0,
            counts: OutcomeCounts::default(),
            bar: TaskBar::default(),
        }
    }

    /// Count a host outcome and redraw the bar.
    pub(crate) fn record(&mut self, outcome: Outcome) {
        self.reported_hosts += 1;
        self.counts.record(outcome);
        self.restyle();
    }

    /// Redraw the bar. More hosts reporting than expected widens the host
    /// count to match.
    pub(crate) fn restyle(&mut self) {
        self.host_count = self.host_count.max(self.counts.charted());
        self.bar = TaskBar::from_counts(self.host_count, &self.counts);
    }

    pub(crate) fn fold_status(&mut self, update: StatusUpdate, modified: OffsetDateTime) {
        self.status = self.status.fold(update);
        self.status_text = self.status.text().to_string();
        self.stamp(modified);
    }

    pub(crate) fn mark_no_hosts(&mut self, modified: OffsetDateTime) {
        self.status = self.status.override_no_hosts();
        self.status_text = self.status.text().to_string();
        self.stamp(modified);
    }

    fn stamp(&mut self, modified: OffsetDateTime) {
        self.modified = modified;
        self.finished = Some(modified);
        self.elapsed = get_elapsed(self.created, modified);
    }
}
