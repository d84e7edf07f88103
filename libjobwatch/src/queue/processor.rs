//! The poll-drain-reschedule loop that keeps an aggregator fed.

use std::time::Duration;

use color_eyre::eyre::Result;
use derive_getters::Getters;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{EventQueue, EventSource, PartialEventStream};
use crate::aggregate::EventAggregator;
use crate::log::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The job reached a terminal status.
    JobFinished,
    /// The source sent its end marker.
    SourceEnded,
    /// Somebody cancelled the processor.
    Cancelled,
}

#[derive(Getters, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessorReport {
    drains: u64,
    digested: u64,
    stop: StopReason,
}

/// Pulls whatever the source has every `interval`, drains it into an
/// aggregator, and stops once the job is finished, the source ends, or the
/// token is cancelled.
#[derive(Debug)]
pub struct QueueProcessor<S: EventSource> {
    source: S,
    queue: EventQueue,
    interval: Duration,
    cancel: CancellationToken,
}

impl<S: EventSource + Send> QueueProcessor<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        Self {
            source,
            queue: EventQueue::new(),
            interval,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A token that stops this processor when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&mut self, aggregator: &mut EventAggregator) -> Result<ProcessorReport> {
        self.run_with(aggregator, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_drain` after every drain that
    /// digested at least one event.
    #[tracing::instrument(skip(self, aggregator, on_drain))]
    pub async fn run_with<F>(
        &mut self,
        aggregator: &mut EventAggregator,
        mut on_drain: F,
    ) -> Result<ProcessorReport>
    where
        F: FnMut(&EventAggregator),
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut drains = 0;
        let mut digested = 0;

        let stop = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break StopReason::Cancelled,
                _ = ticker.tick() => {}
            }

            let ended = match self.source.source().await? {
                PartialEventStream::Next(events) => {
                    self.queue.extend(events);
                    false
                }
                PartialEventStream::End => true,
            };

            let count = aggregator.process_queue(&mut self.queue);
            drains += 1;
            digested += count as u64;
            if count > 0 {
                on_drain(aggregator);
            }

            if aggregator.is_finished() {
                break StopReason::JobFinished;
            }
            if ended {
                break StopReason::SourceEnded;
            }
        };

        info!(
            "event processing stopped ({:?}) after {} drains, {} events",
            stop, drains, digested
        );
        Ok(ProcessorReport {
            drains,
            digested,
            stop,
        })
    }
}
