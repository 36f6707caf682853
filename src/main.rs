//! Read messages from stdin, print anagram hits as JSON lines on stdout.
//!
//! Usage: `anagrammatic [config.yaml] < messages.tsv`
//!
//! Each input line is `id<TAB>text`, `id<TAB>lang<TAB>text` or bare text.

use std::path::PathBuf;
use std::sync::Arc;

use anagrammatic::{
    open_coordinator, parse_line, AppConfig, HitStore, InMemoryHitStore, MatchStats, StreamRunner,
};
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())
        .with_context(|| format!("loading configuration from {config_path:?}"))?;

    init_tracing(&config);
    info!(config = ?config_path, "anagrammatic_starting");

    let stats = Arc::new(MatchStats::new());
    let hits: Arc<dyn HitStore> = Arc::new(InMemoryHitStore::new());
    let coordinator = open_coordinator(&config, Arc::clone(&stats))
        .context("opening coordinator")?
        .with_hit_store(Arc::clone(&hits))
        .with_hit_handler(|hit| match serde_json::to_string(hit) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(id = hit.id, error = %err, "hit_encode_failed"),
        });

    let (tx, consumer) = StreamRunner::new(coordinator, config.filter.clone())
        .with_stream_config(&config.stream)
        .spawn();

    let default_lang = config.stream.default_lang.as_deref();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0u64;
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        line_no += 1;
        let Some(message) = parse_line(line_no, &line, default_lang) else {
            continue;
        };
        if tx.send(message).await.is_err() {
            warn!(line_no, "stream_consumer_gone");
            break;
        }
    }
    drop(tx);

    let summary = consumer.await.context("joining consumer")??;
    info!(
        received = summary.received,
        hits = summary.hits,
        review_queue = hits.len(),
        "anagrammatic_finished"
    );
    eprintln!("{stats}");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder
            .json()
            .with_thread_ids(true)
            .with_thread_names(true)
            .init();
    } else {
        builder.init();
    }
}
