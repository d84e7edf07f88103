use std::collections::VecDeque;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DrainOrder;
use crate::event::JobEvent;

pub mod channel;
pub mod processor;

pub use channel::{ChannelEventSink, ChannelEventSource};
pub use processor::{ProcessorReport, QueueProcessor, StopReason};

pub type Events = Vec<JobEvent>;

#[derive(Debug, PartialEq, Clone)]
pub enum PartialEventStream {
    Next(Events),
    End,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Event sink lost before the stream ended.")]
    SinkLost,
    #[error("Event source already ended.")]
    SourceEnded,
    #[error("Event source went away.")]
    SourceLost,
}

#[async_trait]
pub trait EventSink: std::fmt::Debug {
    async fn sink(&mut self, events: PartialEventStream) -> Result<usize, QueueError>;
}

#[async_trait]
pub trait EventSource: std::fmt::Debug {
    async fn source(&mut self) -> Result<PartialEventStream, QueueError>;
}

/// Events waiting to be digested.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: VecDeque<JobEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: JobEvent) {
        self.events.push_back(event);
    }

    pub fn pop(&mut self, order: DrainOrder) -> Option<JobEvent> {
        match order {
            DrainOrder::Oldest => self.events.pop_front(),
            DrainOrder::Newest => self.events.pop_back(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Extend<JobEvent> for EventQueue {
    fn extend<T: IntoIterator<Item = JobEvent>>(&mut self, iter: T) {
        self.events.extend(iter);
    }
}

impl From<Events> for EventQueue {
    fn from(events: Events) -> Self {
        Self {
            events: events.into(),
        }
    }
}
