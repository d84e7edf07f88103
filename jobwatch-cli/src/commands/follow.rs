use std::time::Duration;

use async_trait::async_trait;
use clap::ArgMatches;
use color_eyre::eyre::{Result, WrapErr};
use libjobwatch::aggregate::EventAggregator;
use libjobwatch::event::{decode_events, EventId};
use libjobwatch::log::*;
use libjobwatch::queue::channel::{channel, ChannelEventSink};
use libjobwatch::queue::{EventSink, PartialEventStream, QueueProcessor, StopReason};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{config_from_args, Arguments, CommandErrors};
use crate::render::render;

const DEFAULT_PAGE_SIZE: u64 = 200;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// One page of the job events listing.
#[derive(Deserialize, Debug)]
struct EventPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

/// Polls a job events endpoint and hands every page to a sink.
#[derive(Debug)]
struct EventPoller {
    client: reqwest::Client,
    url: Url,
    token: Option<String>,
    page_size: u64,
    poll_interval: Duration,
    last_id: Option<EventId>,
    malformed: usize,
}

impl EventPoller {
    /// The first page of events newer than the last one we saw.
    fn first_page(&self) -> Url {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(last_id) = self.last_id {
                query.append_pair("id__gt", &last_id.to_string());
            }
            query
                .append_pair("order_by", "id")
                .append_pair("page_size", &self.page_size.to_string());
        }
        url
    }

    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: Url) -> Result<EventPage> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let page = request
            .send()
            .await
            .wrap_err_with(|| format!("requesting {}", url))?
            .error_for_status()?
            .json::<EventPage>()
            .await
            .wrap_err("decoding job events page")?;
        Ok(page)
    }

    /// Fetch every page available right now. Returns how many events went
    /// to the sink.
    async fn poll(&mut self, sink: &mut ChannelEventSink) -> Result<usize> {
        let mut url = self.first_page();
        let mut sent = 0;
        loop {
            let page = self.fetch(url.clone()).await?;
            let (events, malformed) = decode_events(page.results);
            self.malformed += malformed;
            if let Some(last_id) = events.iter().map(|event| *event.id()).max() {
                self.last_id = self.last_id.max(Some(last_id));
            }
            if !events.is_empty() {
                sent += sink.sink(PartialEventStream::Next(events)).await?;
            }
            match page.next {
                Some(next) => {
                    url = url
                        .join(&next)
                        .wrap_err_with(|| format!("following next page {}", next))?
                }
                None => return Ok(sent),
            }
        }
    }

    /// Poll until cancelled, then close the stream.
    async fn run(mut self, mut sink: ChannelEventSink, cancel: CancellationToken) -> Result<usize> {
        loop {
            let sent = tokio::select! {
                _ = cancel.cancelled() => break,
                sent = self.poll(&mut sink) => sent?,
            };
            if sent > 0 {
                debug!("fetched {} events, last id {:?}", sent, self.last_id);
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        // The processor may already be gone; nothing left to tell it then.
        let _ = sink.sink(PartialEventStream::End).await;
        Ok(self.malformed)
    }
}

pub struct FollowCommand;

impl FollowCommand {
    async fn follow<'a>(&self, context: &'a super::CliContext<'a>) -> Result<()> {
        let matches = context.matches;
        let url = self.read_argument_with_validator(matches, "url", &mut |url| {
            Url::parse(url).map(|_| ()).map_err(|err| {
                CommandErrors::InputValidationFailure("url".into(), err.to_string())
            })
        })?;
        let config = config_from_args(matches).await?;
        let poller = EventPoller {
            client: context.client.clone(),
            url: Url::parse(&url)?,
            token: matches.get_one::<String>("token").cloned(),
            page_size: self
                .read_positive_argument(matches, "page-size")?
                .unwrap_or(DEFAULT_PAGE_SIZE),
            poll_interval: Duration::from_millis(
                self.read_positive_argument(matches, "poll-interval")?
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            last_id: None,
            malformed: 0,
        };

        let cancel = CancellationToken::new();
        let (sink, source) = channel(64);
        let poller = tokio::task::spawn(poller.run(sink, cancel.child_token()));

        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, stopping");
                ctrl_c.cancel();
            }
        });

        let json = matches.get_flag("json");
        let mut aggregator = EventAggregator::new(config.clone());
        let report = QueueProcessor::new(source, config.drain_interval())
            .with_cancellation(cancel.child_token())
            .run_with(&mut aggregator, |aggregator| {
                if !json {
                    print!("{}", render(&aggregator.snapshot()));
                }
            })
            .await;
        cancel.cancel();
        let malformed = poller.await??;
        let report = report?;
        aggregator.record_malformed(malformed);
        if report.stop() != &StopReason::JobFinished {
            warn!("stopped following before the job finished ({:?})", report.stop());
        }

        let snapshot = aggregator.snapshot();
        if json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        } else {
            print!("{}", render(&snapshot));
        }
        Ok(())
    }
}

#[async_trait]
impl<'a> super::Command<'a> for FollowCommand {
    fn new() -> Self
    where
        Self: Sized,
    {
        Self {}
    }

    async fn run(&self, context: &'a super::CliContext) -> Result<()> {
        self.follow(context).await
    }
}

impl<'a> super::Arguments<'a> for FollowCommand {}
