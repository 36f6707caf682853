//! Bounded producer/consumer loop around the [`Coordinator`].
//!
//! Producers push [`InboundMessage`]s into a bounded `tokio` channel. One
//! consumer, running on a blocking thread, pre-filters each message and feeds
//! survivors to the coordinator. The number of messages still queued is
//! reported to the coordinator as its buffer depth; when the coordinator
//! answers with `NeedsMaintenance` the consumer runs maintenance before
//! taking the next message. When every sender is dropped the queue drains
//! and the coordinator is closed.

use std::sync::Arc;

use canonical::{prefilter, FilterConfig, InboundMessage};
use matcher::{Coordinator, MatchError, MatchStats, Outcome, StatsSnapshot};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("matcher error: {0}")]
    Match(#[from] MatchError),
    #[error("consumer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Per-run totals returned when the stream ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub received: u64,
    pub filtered: u64,
    pub hits: u64,
    pub suppressed: u64,
    pub filed: u64,
    pub refiled: u64,
    pub deferred: u64,
    /// Inputs answered with `NeedsMaintenance`. These are not counted under
    /// any outcome above.
    pub maintenance_runs: u64,
    pub stats: StatsSnapshot,
}

impl RunSummary {
    /// Inputs that reached the coordinator, whatever they resolved to.
    pub fn matched_inputs(&self) -> u64 {
        self.hits
            + self.suppressed
            + self.filed
            + self.refiled
            + self.deferred
            + self.maintenance_runs
    }

    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Hit => self.hits += 1,
            Outcome::Suppressed => self.suppressed += 1,
            Outcome::Filed => self.filed += 1,
            Outcome::Refiled => self.refiled += 1,
            Outcome::Deferred => self.deferred += 1,
        }
    }
}

pub struct StreamRunner {
    coordinator: Coordinator,
    filter: FilterConfig,
    stats: Arc<MatchStats>,
    queue_capacity: usize,
    status_every: u64,
}

impl StreamRunner {
    pub fn new(coordinator: Coordinator, filter: FilterConfig) -> Self {
        let stats = Arc::clone(coordinator.stats());
        let defaults = StreamConfig::default();
        Self {
            coordinator,
            filter,
            stats,
            queue_capacity: defaults.queue_capacity,
            status_every: defaults.status_every,
        }
    }

    pub fn with_stream_config(mut self, config: &StreamConfig) -> Self {
        self.queue_capacity = config.queue_capacity.max(1);
        self.status_every = config.status_every;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Start the consumer. Send messages through the returned sender and
    /// drop it to end the stream; the handle resolves once the coordinator
    /// has been closed.
    pub fn spawn(
        self,
    ) -> (
        mpsc::Sender<InboundMessage>,
        JoinHandle<Result<RunSummary, RunError>>,
    ) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let handle = tokio::task::spawn_blocking(move || self.consume(rx));
        (tx, handle)
    }

    /// Feed `messages` through the queue and wait for the run to finish.
    pub async fn run<I>(self, messages: I) -> Result<RunSummary, RunError>
    where
        I: IntoIterator<Item = InboundMessage>,
    {
        let (tx, handle) = self.spawn();
        for message in messages {
            if tx.send(message).await.is_err() {
                warn!("stream_consumer_gone");
                break;
            }
        }
        drop(tx);
        handle.await?
    }

    fn consume(mut self, mut rx: mpsc::Receiver<InboundMessage>) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary::default();
        while let Some(message) = rx.blocking_recv() {
            summary.received += 1;
            self.coordinator.set_buffer_depth(rx.len());
            self.process(message, &mut summary)?;
            if self.status_every > 0 && summary.received % self.status_every == 0 {
                info!(status = %self.stats, "stream_status");
            }
        }

        self.coordinator.close()?;
        summary.stats = self.stats.snapshot();
        info!(
            received = summary.received,
            filtered = summary.filtered,
            hits = summary.hits,
            maintenance_runs = summary.maintenance_runs,
            "stream_finished"
        );
        Ok(summary)
    }

    fn process(
        &mut self,
        message: InboundMessage,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        let record = match prefilter(&message, &self.filter) {
            Ok(record) => record,
            Err(rejection) => {
                summary.filtered += 1;
                self.stats.record_filtered(rejection.label());
                debug!(id = message.id, reason = rejection.label(), "message_filtered");
                return Ok(());
            }
        };

        match self.coordinator.handle_input(record) {
            Ok(outcome) => summary.count(outcome),
            Err(MatchError::NeedsMaintenance(reason)) => {
                // the input was already handled; catch up before the next one
                summary.maintenance_runs += 1;
                warn!(%reason, depth = self.coordinator.buffer_depth(), "maintenance_requested");
                let report = self.coordinator.perform_maintenance()?;
                debug!(?report, "maintenance_report");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}

/// Parse one input line.
///
/// Accepted forms are `id<TAB>lang<TAB>text`, `id<TAB>text` and bare text.
/// The middle field is read as a language only when it looks like a tag
/// (`en`, `pt-BR`) or is empty; otherwise everything after the id is text.
/// Bare text takes `line_no` as its id. Messages without a language get
/// `default_lang`. Blank lines yield `None`.
pub fn parse_line(line_no: u64, line: &str, default_lang: Option<&str>) -> Option<InboundMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    let (id, lang, text) = match line.split_once('\t') {
        Some((id, rest)) => match id.trim().parse::<u64>() {
            Ok(id) => match rest.split_once('\t') {
                Some(("", text)) => (id, None, text),
                Some((lang, text)) if is_lang_tag(lang) => (id, Some(lang), text),
                _ => (id, None, rest),
            },
            Err(_) => (line_no, None, line),
        },
        None => (line_no, None, line),
    };

    let mut message = InboundMessage::new(id, text);
    if let Some(lang) = lang.or(default_lang) {
        message = message.with_lang(lang);
    }
    Some(message)
}

/// `xx`, `xxx` or a subtagged form like `pt-BR` / `zh-Hant`.
fn is_lang_tag(field: &str) -> bool {
    let mut parts = field.split('-');
    let primary_ok = parts
        .next()
        .is_some_and(|p| (2..=3).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_alphabetic()));
    primary_ok
        && parts.all(|p| (2..=8).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_alphanumeric()))
}
