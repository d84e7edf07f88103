//! Playbook job events as they come off the job-events API.
//!
//! A run produces events in roughly this hierarchy:
//!
//! ```text
//! playbook_on_start
//!   playbook_on_play_start
//!     playbook_on_no_hosts_matched / playbook_on_no_hosts_remaining
//!     playbook_on_setup / playbook_on_task_start
//!       runner_on_ok / runner_on_failed / runner_on_unreachable / ...
//!   playbook_on_stats
//! ```
//!
//! Runner events point at their task through `parent`, tasks point at their
//! play the same way.

use std::fmt;
use std::str::FromStr;

use derive_getters::Getters;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

use crate::log::*;

pub mod stats;

pub use stats::{HostStats, StatSet};

pub type EventId = u64;
pub type HostId = u64;

/// A single job event record.
#[derive(Getters, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    id: EventId,
    #[serde(alias = "event_name")]
    event: EventKind,
    #[serde(default)]
    parent: Option<EventId>,
    #[serde(with = "time::serde::rfc3339")]
    created: OffsetDateTime,
    #[getter(skip)]
    #[serde(default, with = "time::serde::rfc3339::option")]
    modified: Option<OffsetDateTime>,
    #[serde(default)]
    host: Option<HostId>,
    #[serde(default)]
    host_name: Option<String>,
    #[serde(default)]
    play: Option<String>,
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    event_display: Option<String>,
    #[serde(default)]
    counter: Option<u64>,
    #[serde(default)]
    event_data: serde_json::Value,
    #[serde(default)]
    failed: bool,
    #[serde(default)]
    changed: bool,
}

impl JobEvent {
    pub fn new(id: EventId, event: EventKind, created: OffsetDateTime) -> Self {
        Self {
            id,
            event,
            parent: None,
            created,
            modified: None,
            host: None,
            host_name: None,
            play: None,
            task: None,
            role: None,
            event_display: None,
            counter: None,
            event_data: serde_json::Value::Null,
            failed: false,
            changed: false,
        }
    }

    pub fn with_parent(mut self, parent: EventId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_modified(mut self, modified: OffsetDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_host<S: Into<String>>(mut self, host: HostId, host_name: S) -> Self {
        self.host = Some(host);
        self.host_name = Some(host_name.into());
        self
    }

    pub fn with_play<S: Into<String>>(mut self, play: S) -> Self {
        self.play = Some(play.into());
        self
    }

    pub fn with_task<S: Into<String>>(mut self, task: S) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_role<S: Into<String>>(mut self, role: S) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_event_data(mut self, event_data: serde_json::Value) -> Self {
        self.event_data = event_data;
        self
    }

    pub fn with_flags(mut self, failed: bool, changed: bool) -> Self {
        self.failed = failed;
        self.changed = changed;
        self
    }

    /// When the event was last modified. Records without a `modified` stamp
    /// fall back to `created`.
    pub fn modified(&self) -> OffsetDateTime {
        self.modified.unwrap_or(self.created)
    }

    /// Host name for runner events. Newer records carry `host_name`, older
    /// ones only have it inside `event_data.host`.
    pub fn display_host_name(&self) -> Option<String> {
        self.host_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.event_data
                    .get("host")
                    .and_then(|host| host.as_str())
                    .map(str::to_string)
            })
    }

    /// Display name of a task start event.
    pub fn display_task_name(&self) -> String {
        self.task
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| self.event_display.clone())
            .unwrap_or_default()
    }

    /// Role the task belongs to, if any.
    pub fn role_name(&self) -> Option<String> {
        self.role
            .clone()
            .or_else(|| {
                self.event_data
                    .get("role")
                    .and_then(|role| role.as_str())
                    .map(str::to_string)
            })
            .filter(|role| !role.is_empty())
    }

    /// The runner result message. `res` is either an object with a `msg`
    /// field or a bare string.
    pub fn message(&self) -> String {
        match self.event_data.get("res") {
            Some(serde_json::Value::String(msg)) => msg.clone(),
            Some(res @ serde_json::Value::Object(_)) => res
                .get("msg")
                .and_then(|msg| msg.as_str())
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }

    /// The loop item a runner result was produced for, stringified.
    pub fn item(&self) -> Option<String> {
        match self.event_data.get("res").and_then(|res| res.get("item")) {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(item)) => Some(item.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    /// Outcome of a runner event; `None` for every other kind.
    pub fn outcome(&self) -> Option<Outcome> {
        self.event.outcome(self.failed, self.changed)
    }

    /// Decode the `playbook_on_stats` payload.
    pub fn stats(&self) -> serde_json::Result<HostStats> {
        HostStats::deserialize(&self.event_data)
    }
}

/// Decode a batch of raw records one at a time so a single bad record
/// doesn't take the batch down with it. Returns the decoded events and how
/// many records were malformed.
#[tracing::instrument(skip(values), fields(count = values.len()))]
pub fn decode_events(values: Vec<serde_json::Value>) -> (Vec<JobEvent>, usize) {
    let mut events = Vec::with_capacity(values.len());
    let mut malformed = 0;
    for value in values {
        match serde_json::from_value::<JobEvent>(value) {
            Ok(event) => events.push(event),
            Err(err) => {
                debug!("dropping malformed event: {}", err);
                malformed += 1;
            }
        }
    }
    (events, malformed)
}

/// What happened to a single host when a task ran against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Successful,
    Changed,
    Failed,
    Unreachable,
    Skipped,
}

impl Outcome {
    pub fn text(&self) -> &'static str {
        match self {
            Outcome::Successful => "OK",
            Outcome::Changed => "Changed",
            Outcome::Failed => "Failed",
            Outcome::Unreachable => "Unreachable",
            Outcome::Skipped => "Skipped",
        }
    }

    /// Unreachable hosts fail the task just like failed ones.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed | Outcome::Unreachable)
    }
}

/// The kind tag of a [`JobEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    PlaybookOnStart,
    PlaybookOnVarsPrompt,
    PlaybookOnPlayStart,
    PlaybookOnImportForHost,
    PlaybookOnNotImportForHost,
    PlaybookOnNoHostsMatched,
    PlaybookOnNoHostsRemaining,
    PlaybookOnSetup,
    PlaybookOnTaskStart,
    PlaybookOnNotify,
    PlaybookOnStats,
    RunnerOnOk,
    RunnerOnFailed,
    RunnerOnError,
    RunnerOnSkipped,
    RunnerOnUnreachable,
    RunnerOnNoHosts,
    RunnerOnAsyncPoll,
    RunnerOnAsyncOk,
    RunnerOnAsyncFailed,
    RunnerOnFileDiff,
    /// Anything this crate doesn't know about. Keeps the original tag.
    Unknown(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::PlaybookOnStart => "playbook_on_start",
            EventKind::PlaybookOnVarsPrompt => "playbook_on_vars_prompt",
            EventKind::PlaybookOnPlayStart => "playbook_on_play_start",
            EventKind::PlaybookOnImportForHost => "playbook_on_import_for_host",
            EventKind::PlaybookOnNotImportForHost => "playbook_on_not_import_for_host",
            EventKind::PlaybookOnNoHostsMatched => "playbook_on_no_hosts_matched",
            EventKind::PlaybookOnNoHostsRemaining => "playbook_on_no_hosts_remaining",
            EventKind::PlaybookOnSetup => "playbook_on_setup",
            EventKind::PlaybookOnTaskStart => "playbook_on_task_start",
            EventKind::PlaybookOnNotify => "playbook_on_notify",
            EventKind::PlaybookOnStats => "playbook_on_stats",
            EventKind::RunnerOnOk => "runner_on_ok",
            EventKind::RunnerOnFailed => "runner_on_failed",
            EventKind::RunnerOnError => "runner_on_error",
            EventKind::RunnerOnSkipped => "runner_on_skipped",
            EventKind::RunnerOnUnreachable => "runner_on_unreachable",
            EventKind::RunnerOnNoHosts => "runner_on_no_hosts",
            EventKind::RunnerOnAsyncPoll => "runner_on_async_poll",
            EventKind::RunnerOnAsyncOk => "runner_on_async_ok",
            EventKind::RunnerOnAsyncFailed => "runner_on_async_failed",
            EventKind::RunnerOnFileDiff => "runner_on_file_diff",
            EventKind::Unknown(tag) => tag.as_str(),
        }
    }

    /// Map a runner event onto the outcome it reports for its host. Ok
    /// events carry their real result in the failed/changed flags.
    pub fn outcome(&self, failed: bool, changed: bool) -> Option<Outcome> {
        match self {
            EventKind::RunnerOnOk | EventKind::RunnerOnAsyncOk => Some(if failed {
                Outcome::Failed
            } else if changed {
                Outcome::Changed
            } else {
                Outcome::Successful
            }),
            EventKind::RunnerOnFailed | EventKind::RunnerOnError | EventKind::RunnerOnAsyncFailed => {
                Some(Outcome::Failed)
            }
            EventKind::RunnerOnUnreachable => Some(Outcome::Unreachable),
            EventKind::RunnerOnSkipped => Some(Outcome::Skipped),
            _ => None,
        }
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Ok(match tag {
            "playbook_on_start" => EventKind::PlaybookOnStart,
            "playbook_on_vars_prompt" => EventKind::PlaybookOnVarsPrompt,
            "playbook_on_play_start" => EventKind::PlaybookOnPlayStart,
            "playbook_on_import_for_host" => EventKind::PlaybookOnImportForHost,
            "playbook_on_not_import_for_host" => EventKind::PlaybookOnNotImportForHost,
            "playbook_on_no_hosts_matched" => EventKind::PlaybookOnNoHostsMatched,
            "playbook_on_no_hosts_remaining" => EventKind::PlaybookOnNoHostsRemaining,
            "playbook_on_setup" => EventKind::PlaybookOnSetup,
            "playbook_on_task_start" => EventKind::PlaybookOnTaskStart,
            "playbook_on_notify" => EventKind::PlaybookOnNotify,
            "playbook_on_stats" => EventKind::PlaybookOnStats,
            "runner_on_ok" => EventKind::RunnerOnOk,
            "runner_on_failed" => EventKind::RunnerOnFailed,
            "runner_on_error" => EventKind::RunnerOnError,
            "runner_on_skipped" => EventKind::RunnerOnSkipped,
            "runner_on_unreachable" => EventKind::RunnerOnUnreachable,
            "runner_on_no_hosts" => EventKind::RunnerOnNoHosts,
            "runner_on_async_poll" => EventKind::RunnerOnAsyncPoll,
            "runner_on_async_ok" => EventKind::RunnerOnAsyncOk,
            "runner_on_async_failed" => EventKind::RunnerOnAsyncFailed,
            "runner_on_file_diff" => EventKind::RunnerOnFileDiff,
            other => EventKind::Unknown(other.to_string()),
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        match tag.parse() {
            Ok(kind) => Ok(kind),
            Err(never) => match never {},
        }
    }
}
