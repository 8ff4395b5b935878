//! A complete sync run with its run-scoped resources.
//!
//! The PostgreSQL session, the SurrealDB connection and the checkpoint
//! tracker are acquired at the start of [`run_once`] and dropped when it
//! returns, on success and on error alike.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use checkpoint::{FilesystemStore, Surreal2Store, WatermarkTracker};
use index_sink::SurrealIndexSink;
use postgresql_source::{ConnectOpts, PostgresRowSource, PostgresSession};
use tracing::{error, info};

use crate::config::{StateOpts, SurrealOpts};
use crate::load::{IndexTarget, SinkWriter};
use crate::pipeline::{run_parts, PipelineConfig, RunSummary};
use crate::retry::Retrier;

/// Record holding the cursors when they are kept in SurrealDB.
pub const STATE_RECORD: &str = "surreal_index_sync";

/// Everything [`run_once`] needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub postgres: ConnectOpts,
    pub surreal: SurrealOpts,
    pub state: StateOpts,
    pub target: IndexTarget,
    pub pipeline: PipelineConfig,
}

async fn connect_surreal(opts: &SurrealOpts) -> Result<SurrealIndexSink> {
    SurrealIndexSink::connect(
        &opts.surreal_endpoint,
        &opts.surreal_username,
        &opts.surreal_password,
        &opts.surreal_namespace,
        &opts.surreal_database,
    )
    .await
}

async fn load_tracker(state: &StateOpts, sink: Option<&SurrealIndexSink>) -> Result<WatermarkTracker> {
    match (&state.state_table, sink) {
        (Some(table), Some(sink)) => {
            info!("Loading cursors from SurrealDB table '{}'", table);
            let store = Surreal2Store::new(
                sink.inner().clone(),
                table.clone(),
                STATE_RECORD.to_string(),
            );
            WatermarkTracker::load(store).await
        }
        (Some(table), None) => {
            anyhow::bail!("SurrealDB connection required for state table '{table}'")
        }
        (None, _) => {
            info!("Loading cursors from {:?}", state.state_file);
            WatermarkTracker::load(FilesystemStore::new(&state.state_file)).await
        }
    }
}

/// Open the configured checkpoint state outside of a run, connecting to
/// SurrealDB only when the cursors live there.
pub async fn open_tracker(state: &StateOpts, surreal: &SurrealOpts) -> Result<WatermarkTracker> {
    match &state.state_table {
        Some(_) => {
            let sink = connect_surreal(surreal).await?;
            load_tracker(state, Some(&sink)).await
        }
        None => load_tracker(state, None).await,
    }
}

/// One run of every configured part.
pub async fn run_once(settings: &SyncSettings) -> Result<RunSummary> {
    let session = PostgresSession::connect(&settings.postgres).await?;
    let sink = connect_surreal(&settings.surreal).await?;
    let mut tracker = load_tracker(&settings.state, Some(&sink)).await?;

    let mut source = PostgresRowSource::new(&session);
    let writer = SinkWriter::new(sink, settings.target.clone());
    run_parts(&mut source, &mut tracker, &writer, &settings.pipeline).await
}

/// Repeat `run` under `retrier` every `freq` until `shutdown` completes.
///
/// A run that fails even its final attempt is logged and the schedule goes
/// on, so a later run can pick up once the outage is over. With `once` the
/// first run's error is returned instead.
pub async fn run_scheduled<F, Fut>(
    retrier: &mut Retrier,
    freq: Duration,
    once: bool,
    mut run: F,
    shutdown: impl Future<Output = ()>,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunSummary>>,
{
    tokio::pin!(shutdown);
    loop {
        match retrier.run(&mut run).await {
            Ok(summary) => info!(
                "Run finished: {} actions written over {} parts",
                summary.total_actions(),
                summary.parts.len()
            ),
            Err(e) if once => return Err(e),
            Err(e) => error!("Run failed after retries: {:#}", e),
        }
        if once {
            return Ok(());
        }

        info!("Next run in {:?}", freq);
        tokio::select! {
            _ = tokio::time::sleep(freq) => {}
            _ = &mut shutdown => {
                info!("Received interrupt signal (Ctrl+C), stopping");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{RetryPolicy, RunState};
    use std::cell::Cell;
    use sync_core::Cursor;

    #[tokio::test]
    async fn test_file_state_needs_no_connection() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateOpts {
            state_file: dir.path().join("state.json"),
            state_table: None,
        };
        let mut tracker = load_tracker(&state, None).await.unwrap();
        tracker
            .set("films", Cursor::parse("2021-06-16").unwrap())
            .await
            .unwrap();
        assert!(dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn test_table_state_without_connection_fails() {
        let state = StateOpts {
            state_file: "state.json".into(),
            state_table: Some("sync_state".to_string()),
        };
        let Err(err) = load_tracker(&state, None).await else {
            panic!("a state table needs a SurrealDB connection");
        };
        assert!(err.to_string().contains("sync_state"));
    }

    #[tokio::test]
    async fn test_table_state_over_embedded_surreal() {
        let client = surrealdb::engine::any::connect("mem://").await.unwrap();
        client.use_ns("test").use_db("test").await.unwrap();
        let sink = SurrealIndexSink::new(client);
        let state = StateOpts {
            state_file: "unused.json".into(),
            state_table: Some("sync_state".to_string()),
        };

        let mut tracker = load_tracker(&state, Some(&sink)).await.unwrap();
        let cursor = Cursor::parse("2021-06-16T20:14:09Z").unwrap();
        tracker.set("genres", cursor).await.unwrap();

        let reloaded = load_tracker(&state, Some(&sink)).await.unwrap();
        assert_eq!(reloaded.get("genres"), Some(cursor));
    }

    fn no_retries() -> Retrier {
        Retrier::new(RetryPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            max_retries: 0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_keeps_going_after_failed_run() {
        let mut retrier = no_retries();
        let calls = Cell::new(0);

        let result = run_scheduled(
            &mut retrier,
            Duration::from_secs(60),
            false,
            || {
                calls.set(calls.get() + 1);
                async { Err::<RunSummary, _>(anyhow::anyhow!("connection refused")) }
            },
            tokio::time::sleep(Duration::from_secs(150)),
        )
        .await;

        assert!(result.is_ok());
        // Runs at 0s, 60s and 120s, stopped while waiting for the next one
        assert_eq!(calls.get(), 3);
        assert_eq!(retrier.state(), RunState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_run_returns_its_error() {
        let mut retrier = no_retries();
        let calls = Cell::new(0);

        let result = run_scheduled(
            &mut retrier,
            Duration::from_secs(60),
            true,
            || {
                calls.set(calls.get() + 1);
                async { Err::<RunSummary, _>(anyhow::anyhow!("connection refused")) }
            },
            std::future::pending(),
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("connection refused"));
        assert_eq!(calls.get(), 1);
    }
}
