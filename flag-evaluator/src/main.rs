use std::sync::Arc;

use envconfig::Envconfig;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use flag_evaluator::client::{ClientOptions, FlagEvaluationOptions, FlagsClient};
use flag_evaluator::config::Config;
use flag_evaluator::definitions::DefinitionStore;
use flag_evaluator::flag_request::{evaluate_request, FlagRequest};
use flag_evaluator::poller::{DefinitionPoller, FileDefinitionSource};

fn init_tracing(config: &Config) {
    // Logs go to stderr, stdout carries the results
    let base_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    let log_layer = if *config.debug {
        base_layer
            .with_ansi(true)
            .with_filter(EnvFilter::from_default_env())
            .boxed()
    } else {
        base_layer
            .json()
            .with_filter(EnvFilter::from_default_env())
            .boxed()
    };

    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env()?;
    init_tracing(&config);

    let store = Arc::new(DefinitionStore::new());
    let poller = DefinitionPoller::new(
        Arc::new(FileDefinitionSource::new(&config.definitions_path)),
        store.clone(),
        config.poll_interval(),
    );
    if let Err(e) = poller.refresh().await {
        tracing::warn!(
            "Failed to load flag definitions from {}: {}",
            config.definitions_path.display(),
            e
        );
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let poller_handle = poller.spawn(async move {
        shutdown_rx.await.ok();
    });

    let client = FlagsClient::new(store, ClientOptions::from(&config));
    let options = FlagEvaluationOptions::local_only();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<FlagRequest>(&line) {
            Ok(request) => serde_json::to_string(&evaluate_request(&client, request, &options).await)?,
            Err(e) => {
                tracing::warn!("Invalid evaluation request: {}", e);
                json!({"error": e.to_string()}).to_string()
            }
        };

        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    shutdown_tx.send(()).ok();
    poller_handle.await?;
    Ok(())
}
