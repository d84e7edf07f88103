use std::fmt;
use std::str::FromStr;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::elapsed::{get_elapsed, ZERO_ELAPSED};
use crate::event::Outcome;

/// Status of a play or a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Successful,
    Changed,
    Failed,
    NoMatchingHosts,
}

/// What a single event says about the play or task it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusUpdate {
    pub failed: bool,
    pub changed: bool,
    pub no_hosts: bool,
}

impl StatusUpdate {
    pub fn from_flags(failed: bool, changed: bool) -> Self {
        Self {
            failed,
            changed,
            no_hosts: false,
        }
    }

    pub fn no_hosts(failed: bool, changed: bool) -> Self {
        Self {
            failed,
            changed,
            no_hosts: true,
        }
    }
}

impl From<Outcome> for StatusUpdate {
    fn from(outcome: Outcome) -> Self {
        Self::from_flags(outcome.is_failure(), outcome == Outcome::Changed)
    }
}

impl Status {
    pub fn from_flags(failed: bool, changed: bool) -> Self {
        if failed {
            Status::Failed
        } else if changed {
            Status::Changed
        } else {
            Status::Successful
        }
    }

    /// Failed and no-matching-hosts never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Failed | Status::NoMatchingHosts)
    }

    /// Fold an update into this status. Moves only forward:
    /// successful -> changed -> failed. A no-hosts update only lands on a
    /// status that is still successful.
    pub fn fold(self, update: StatusUpdate) -> Self {
        if self.is_terminal() {
            return self;
        }
        if update.failed {
            return Status::Failed;
        }
        match self {
            Status::Successful if update.no_hosts => Status::NoMatchingHosts,
            Status::Successful if update.changed => Status::Changed,
            status => status,
        }
    }

    /// The explicit "no hosts" override a task gets from `runner_on_no_hosts`.
    /// Beats changed, but not a terminal status.
    pub fn override_no_hosts(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            Status::NoMatchingHosts
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Status::Successful => "OK",
            Status::Changed => "Changed",
            Status::Failed => "Failed",
            Status::NoMatchingHosts => "No matching hosts",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Successful => "successful",
            Status::Changed => "changed",
            Status::Failed => "failed",
            Status::NoMatchingHosts => "no-matching-hosts",
        })
    }
}

/// Overall state of the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Successful,
    Failed,
    Canceled,
    Error,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobState::Successful | JobState::Failed | JobState::Canceled | JobState::Error
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Successful => "successful",
            JobState::Failed => "failed",
            JobState::Canceled => "canceled",
            JobState::Error => "error",
        })
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Unknown job status `{0}`.")]
pub struct UnknownJobState(String);

impl FromStr for JobState {
    type Err = UnknownJobState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "new" | "waiting" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "successful" => Ok(JobState::Successful),
            "failed" => Ok(JobState::Failed),
            "canceled" => Ok(JobState::Canceled),
            "error" => Ok(JobState::Error),
            other => Err(UnknownJobState(other.to_string())),
        }
    }
}

/// Status of the job as a whole.
#[derive(Getters, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    status: JobState,
    #[serde(with = "time::serde::rfc3339::option")]
    started: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    finished: Option<OffsetDateTime>,
    elapsed: String,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            status: JobState::Pending,
            started: None,
            finished: None,
            elapsed: ZERO_ELAPSED.to_string(),
        }
    }
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Mark the job as running. No-op once it has finished.
    pub(crate) fn start(&mut self, at: OffsetDateTime) -> bool {
        if self.is_finished() {
            return false;
        }
        self.started = Some(at);
        self.status = JobState::Running;
        true
    }

    /// Keep the live elapsed time current while the job runs.
    pub(crate) fn touch(&mut self, modified: OffsetDateTime) {
        if self.status != JobState::Running {
            return;
        }
        if let Some(started) = self.started {
            self.elapsed = get_elapsed(started, modified);
        }
    }

    /// Move to a finished state. The first finish wins.
    pub(crate) fn finish(&mut self, status: JobState, at: OffsetDateTime) -> bool {
        if self.is_finished() || !status.is_finished() {
            return false;
        }
        self.status = status;
        self.finished = Some(at);
        self.elapsed = match self.started {
            Some(started) => get_elapsed(started, at),
            None => ZERO_ELAPSED.to_string(),
        };
        true
    }
}
