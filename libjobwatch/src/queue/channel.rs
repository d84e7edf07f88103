use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{EventSink, EventSource, PartialEventStream, QueueError};
use crate::log::*;

pub type EventTx = mpsc::Sender<PartialEventStream>;
pub type EventRx = mpsc::Receiver<PartialEventStream>;

/// Create a connected sink/source pair.
pub fn channel(buffer: usize) -> (ChannelEventSink, ChannelEventSource) {
    let (tx, rx) = mpsc::channel(buffer);
    (ChannelEventSink::new(tx), ChannelEventSource::new(rx))
}

#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: EventTx,
}

impl ChannelEventSink {
    pub fn new(tx: EventTx) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    #[tracing::instrument(skip(self, events))]
    async fn sink(&mut self, events: PartialEventStream) -> Result<usize, QueueError> {
        let out = match events {
            PartialEventStream::Next(ref events) => events.len(),
            PartialEventStream::End => 0,
        };
        self.tx
            .send(events)
            .await
            .map_err(|_| QueueError::SourceLost)?;
        Ok(out)
    }
}

/// Non-blocking source: each call hands back everything that is waiting
/// right now, which may be nothing. Events that arrived ahead of the end
/// marker are handed out before `End` is.
#[derive(Debug)]
pub struct ChannelEventSource {
    rx: EventRx,
    end_seen: bool,
    ended: bool,
}

impl ChannelEventSource {
    pub fn new(rx: EventRx) -> Self {
        Self {
            rx,
            end_seen: false,
            ended: false,
        }
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    #[tracing::instrument(skip(self))]
    async fn source(&mut self) -> Result<PartialEventStream, QueueError> {
        if self.ended {
            return Err(QueueError::SourceEnded);
        }
        let mut out = vec![];
        while !self.end_seen {
            match self.rx.try_recv() {
                Ok(PartialEventStream::Next(mut events)) => out.append(&mut events),
                Ok(PartialEventStream::End) => self.end_seen = true,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if out.is_empty() {
                        return Err(QueueError::SinkLost);
                    }
                    warn!("event sink lost, handing over the last {} events", out.len());
                    break;
                }
            }
        }
        if self.end_seen && out.is_empty() {
            self.ended = true;
            Ok(PartialEventStream::End)
        } else {
            Ok(PartialEventStream::Next(out))
        }
    }
}

#[cfg(test)]
mod test {
    use time::OffsetDateTime;

    use super::*;
    use crate::event::{EventKind, JobEvent};

    fn event(id: u64) -> JobEvent {
        JobEvent::new(id, EventKind::PlaybookOnNotify, OffsetDateTime::UNIX_EPOCH)
    }

    #[tokio::test]
    async fn test_channel_source_batches_until_end() -> Result<(), QueueError> {
        let (mut sink, mut source) = channel(16);
        assert_eq!(PartialEventStream::Next(vec![]), source.source().await?);

        assert_eq!(2, sink.sink(PartialEventStream::Next(vec![event(1), event(2)])).await?);
        sink.sink(PartialEventStream::Next(vec![event(3)])).await?;
        sink.sink(PartialEventStream::End).await?;

        assert_eq!(
            PartialEventStream::Next(vec![event(1), event(2), event(3)]),
            source.source().await?
        );
        assert_eq!(PartialEventStream::End, source.source().await?);
        assert!(matches!(source.source().await, Err(QueueError::SourceEnded)));
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_sink_is_an_error() -> Result<(), QueueError> {
        let (mut sink, mut source) = channel(16);
        sink.sink(PartialEventStream::Next(vec![event(1)])).await?;
        drop(sink);

        assert_eq!(PartialEventStream::Next(vec![event(1)]), source.source().await?);
        assert!(matches!(source.source().await, Err(QueueError::SinkLost)));
        Ok(())
    }
}
