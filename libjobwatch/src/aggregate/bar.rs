//! Per-task outcome counts and the percentage bar drawn from them.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

use crate::event::Outcome;

#[derive(Getters, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    successful: u32,
    changed: u32,
    failed: u32,
    skipped: u32,
    unreachable: u32,
}

impl OutcomeCounts {
    pub fn new(successful: u32, changed: u32, failed: u32, skipped: u32) -> Self {
        Self {
            successful,
            changed,
            failed,
            skipped,
            unreachable: 0,
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Successful => self.successful += 1,
            Outcome::Changed => self.changed += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Unreachable => self.unreachable += 1,
        }
    }

    /// Hosts that show up on the bar.
    pub fn charted(&self) -> u32 {
        self.successful + self.changed + self.failed + self.skipped
    }
}

/// Width of each segment of a task's progress bar, in percent.
#[derive(Getters, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBar {
    successful_pct: u32,
    changed_pct: u32,
    skipped_pct: u32,
    failed_pct: u32,
}

fn percent(count: u32, host_count: u32) -> u32 {
    if host_count == 0 {
        return 0;
    }
    let pct = (100 * u64::from(count) + u64::from(host_count) - 1) / u64::from(host_count);
    pct.min(100) as u32
}

impl TaskBar {
    /// Each segment is `ceil(100 * count / host_count)`. Rounding up can push
    /// the total past 100; the excess comes off the first segment, in order
    /// failed, changed, skipped, successful, that is wider than the excess.
    pub fn from_counts(host_count: u32, counts: &OutcomeCounts) -> Self {
        let mut bar = Self {
            successful_pct: percent(counts.successful, host_count),
            changed_pct: percent(counts.changed, host_count),
            skipped_pct: percent(counts.skipped, host_count),
            failed_pct: percent(counts.failed, host_count),
        };

        let total = bar.total();
        if total > 100 {
            let diff = total - 100;
            if bar.failed_pct > diff {
                bar.failed_pct -= diff;
            } else if bar.changed_pct > diff {
                bar.changed_pct -= diff;
            } else if bar.skipped_pct > diff {
                bar.skipped_pct -= diff;
            } else if bar.successful_pct > diff {
                bar.successful_pct -= diff;
            }
        }
        bar
    }

    pub fn total(&self) -> u32 {
        self.successful_pct + self.changed_pct + self.skipped_pct + self.failed_pct
    }
}
