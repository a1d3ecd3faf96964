use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::definitions::{DefinitionStore, FlagDefinitions};
use crate::errors::FlagError;

/// Wherever fresh definitions come from.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn load(&self) -> Result<FlagDefinitions, FlagError>;
}

/// Reads the local evaluation payload from a JSON file.
pub struct FileDefinitionSource {
    path: PathBuf,
}

impl FileDefinitionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileDefinitionSource { path: path.into() }
    }
}

#[async_trait]
impl DefinitionSource for FileDefinitionSource {
    async fn load(&self) -> Result<FlagDefinitions, FlagError> {
        let payload = tokio::fs::read_to_string(&self.path).await?;
        FlagDefinitions::from_json(&payload)
    }
}

pub struct DefinitionPoller {
    source: Arc<dyn DefinitionSource>,
    store: Arc<DefinitionStore>,
    interval: Duration,
}

impl DefinitionPoller {
    pub fn new(
        source: Arc<dyn DefinitionSource>,
        store: Arc<DefinitionStore>,
        interval: Duration,
    ) -> Self {
        DefinitionPoller {
            source,
            store,
            interval,
        }
    }

    /// Loads once and swaps the snapshot in. On failure the current snapshot stays.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Result<(), FlagError> {
        let definitions = self.source.load().await?;
        tracing::info!(
            flags = definitions.flags.len(),
            cohorts = definitions.cohorts.len(),
            "Loaded flag definitions"
        );
        self.store.replace(definitions);
        Ok(())
    }

    /// Refreshes every interval until `shutdown` resolves. The first load is the caller's,
    /// see [`DefinitionPoller::refresh`].
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Stopping flag definitions poller");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!("Failed to refresh flag definitions, keeping the previous ones: {}", e);
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: impl Future<Output = ()> + Send + 'static) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::test_utils::random_string;

    struct SequenceSource {
        responses: Mutex<Vec<Result<String, String>>>,
        calls: AtomicUsize,
    }

    impl SequenceSource {
        fn new(responses: Vec<Result<&str, &str>>) -> Self {
            SequenceSource {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .rev()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DefinitionSource for SequenceSource {
        async fn load(&self) -> Result<FlagDefinitions, FlagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop();
            match next {
                Some(Ok(payload)) => FlagDefinitions::from_json(&payload),
                Some(Err(message)) => Err(FlagError::Internal(message)),
                None => Err(FlagError::DefinitionsUnavailable),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let source = Arc::new(SequenceSource::new(vec![
            Ok(r#"{"flags": [{"key": "beta-feature", "active": true}]}"#),
            Err("boom"),
            Ok("not json"),
        ]));
        let store = Arc::new(DefinitionStore::new());
        let poller = DefinitionPoller::new(source.clone(), store.clone(), Duration::from_secs(30));

        poller.refresh().await.unwrap();
        assert!(store.snapshot().get_flag("beta-feature").is_some());

        assert!(matches!(poller.refresh().await, Err(FlagError::Internal(_))));
        assert!(matches!(
            poller.refresh().await,
            Err(FlagError::DefinitionsParsing(_))
        ));
        assert!(store.snapshot().get_flag("beta-feature").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval_until_shutdown() {
        let source = Arc::new(SequenceSource::new(vec![
            Ok(r#"{"flags": []}"#),
            Ok(r#"{"flags": [{"key": "beta-feature", "active": true}]}"#),
        ]));
        let store = Arc::new(DefinitionStore::new());
        let poller = DefinitionPoller::new(source.clone(), store.clone(), Duration::from_secs(30));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = poller.spawn(async move {
            rx.await.ok();
        });

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(store.snapshot().get_flag("beta-feature").is_some());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_file_source() {
        let path = std::env::temp_dir().join(random_string("flag_definitions_", 12) + ".json");
        tokio::fs::write(
            &path,
            r#"{"flags": [{"key": "beta-feature", "active": true}], "group_type_mapping": {"0": "company"}}"#,
        )
        .await
        .unwrap();

        let definitions = FileDefinitionSource::new(&path).load().await.unwrap();
        assert!(definitions.get_flag("beta-feature").is_some());
        assert_eq!(definitions.group_type_mapping.get(&0), Some(&"company".to_string()));

        tokio::fs::remove_file(&path).await.unwrap();
        assert!(matches!(
            FileDefinitionSource::new(&path).load().await,
            Err(FlagError::Io(_))
        ));
    }
}
