use async_trait::async_trait;
use clap::ArgMatches;
use color_eyre::eyre::{eyre, Result, WrapErr};
use libjobwatch::aggregate::EventAggregator;
use libjobwatch::event::decode_events;
use libjobwatch::log::*;
use libjobwatch::queue::channel::channel;
use libjobwatch::queue::{EventSink, PartialEventStream, QueueProcessor};
use serde_json::Value;
use tokio::fs;

use super::{config_from_args, Arguments};
use crate::render::render;

/// How many events go down the channel at once.
const REPLAY_BATCH: usize = 100;

pub struct ReplayCommand;

impl ReplayCommand {
    async fn replay<'a>(&self, matches: &'a ArgMatches) -> Result<()> {
        let file = self.read_argument_with_validator(matches, "file", &mut |_| Ok(()))?;
        let config = config_from_args(matches).await?;
        let raw = fs::read_to_string(&file)
            .await
            .wrap_err_with(|| format!("Failed reading event file {}", file))?;

        let (events, malformed) = decode_events(parse_records(&raw)?);
        info!("replaying {} events from {}", events.len(), file);
        if malformed > 0 {
            warn!("{} records in {} could not be decoded", malformed, file);
        }

        let (mut sink, source) = channel(16);
        let feeder = tokio::task::spawn(async move {
            for batch in events.chunks(REPLAY_BATCH) {
                sink.sink(PartialEventStream::Next(batch.to_vec())).await?;
            }
            sink.sink(PartialEventStream::End).await
        });

        let mut aggregator = EventAggregator::new(config.clone());
        aggregator.record_malformed(malformed);
        let report = QueueProcessor::new(source, config.drain_interval())
            .run(&mut aggregator)
            .await?;
        debug!("replay finished: {:?}", report);
        // The processor may stop early once the job finishes, taking the
        // source with it; a feeder that lost its source is fine then.
        if let Err(err) = feeder.await? {
            debug!("feeder stopped early: {}", err);
        }

        let snapshot = aggregator.snapshot();
        if matches.get_flag("json") {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        } else {
            print!("{}", render(&snapshot));
        }
        Ok(())
    }
}

/// Accepts a JSON array of events, a paged API response (`{"results": [..]}`),
/// or one event per line.
pub fn parse_records(raw: &str) -> Result<Vec<Value>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return match value {
                Value::Array(records) => Ok(records),
                Value::Object(mut page) => match page.remove("results") {
                    Some(Value::Array(records)) => Ok(records),
                    _ => Ok(vec![Value::Object(page)]),
                },
                other => Err(eyre!("expected events, got {}", other)),
            };
        }
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).wrap_err_with(|| format!("line {} is not valid JSON", n + 1))
        })
        .collect()
}

#[async_trait]
impl<'a> super::Command<'a> for ReplayCommand {
    fn new() -> Self
    where
        Self: Sized,
    {
        Self {}
    }

    async fn run(&self, context: &'a super::CliContext) -> Result<()> {
        self.replay(context.matches).await
    }
}

impl<'a> super::Arguments<'a> for ReplayCommand {}
