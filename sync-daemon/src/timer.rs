//! Fetch loop: one engine tick per interval, with backoff.

use crate::engine::SyncEngine;
use crate::error::SyncError;
use std::time::Duration;
use sync_core::BackoffPolicy;
use tokio::sync::watch;

/// Run ticks until `shutdown` fires or a tick fails fatally.
///
/// The sleep between ticks comes from `backoff`: the base interval after a
/// clean tick, growing while ticks keep reporting retriable failures.
/// Shutdown interrupts the sleep, not a running tick.
pub async fn run_fetch_loop(
    mut engine: SyncEngine,
    mut backoff: BackoffPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SyncError> {
    tracing::info!("Fetch loop started (interval: {:?})", backoff.base());

    loop {
        let delay = tick(&mut engine, &mut backoff).await?;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!(
                        "Fetch loop stopped (tasks finished: {})",
                        engine.tasks_finished()
                    );
                    return Ok(());
                }
            }
        }
    }
}

/// Run one engine tick and return the sleep that should follow it.
async fn tick(
    engine: &mut SyncEngine,
    backoff: &mut BackoffPolicy,
) -> Result<Duration, SyncError> {
    let report = engine.fetch().await?;
    for (task, error) in &report.retriable {
        tracing::debug!("Tick saw retriable {} failure: {}", task, error);
    }

    let delay = backoff.next_delay(report.should_back_off());
    if backoff.is_backing_off() {
        tracing::info!("Backing off for {:?}", delay);
    }
    Ok(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::storage::SqliteStorage;
    use std::sync::Arc;
    use std::time::Duration;
    use sync_client::{ApiError, FatalKind, MockSource, RetriableKind};

    async fn engine(source: &MockSource) -> SyncEngine {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        SyncEngine::new(
            Arc::new(source.clone()),
            storage,
            EngineConfig::default(),
        )
    }

    fn fast_backoff() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(40))
    }

    async fn settle(engine: &SyncEngine) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !engine.tasks_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("tasks should finish");
    }

    #[tokio::test]
    async fn failing_live_stream_grows_the_backoff() {
        let source = MockSource::new();
        for _ in 0..6 {
            source.fail_next_live(ApiError::retriable(RetriableKind::Unavailable));
        }
        let mut engine = engine(&source).await;
        let mut backoff = BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(600));

        let mut delays = Vec::new();
        for _ in 0..6 {
            let delay = tick(&mut engine, &mut backoff).await.unwrap();
            delays.push(delay.as_secs());
            settle(&engine).await;
        }

        // The first tick only starts the stream; every later tick sees it fail.
        assert_eq!(delays, vec![10, 10, 20, 40, 80, 160]);
        assert_eq!(source.live_opens(), 6);
    }

    #[tokio::test]
    async fn backoff_resets_once_the_stream_recovers() {
        let source = MockSource::new();
        for _ in 0..3 {
            source.fail_next_live(ApiError::retriable(RetriableKind::ServerError));
        }
        let mut engine = engine(&source).await;
        let mut backoff = BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(600));

        let mut delays = Vec::new();
        for _ in 0..5 {
            let delay = tick(&mut engine, &mut backoff).await.unwrap();
            delays.push(delay.as_secs());
            settle(&engine).await;
        }

        assert_eq!(delays, vec![10, 10, 20, 40, 10]);
    }

    #[tokio::test]
    async fn tick_after_fatal_error_is_refused() {
        let source = MockSource::new();
        source.fail_next_live(ApiError::fatal(FatalKind::InvalidCredentials));
        let mut engine = engine(&source).await;
        let mut backoff = fast_backoff();

        tick(&mut engine, &mut backoff).await.unwrap();
        settle(&engine).await;
        assert!(tick(&mut engine, &mut backoff).await.is_err());
        assert!(matches!(
            tick(&mut engine, &mut backoff).await,
            Err(SyncError::EngineStopped)
        ));
        assert_eq!(source.live_opens(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let source = MockSource::new();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_fetch_loop(engine(&source).await, fast_backoff(), rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop")
            .expect("loop should not panic");
        assert!(result.is_ok());
        assert!(source.live_opens() >= 2, "ticks keep restarting live");
    }

    #[tokio::test]
    async fn fatal_error_ends_the_loop() {
        let source = MockSource::new();
        source.fail_next_live(ApiError::fatal(FatalKind::NoAccess));
        let (_tx, rx) = watch::channel(false);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_fetch_loop(engine(&source).await, fast_backoff(), rx),
        )
        .await
        .expect("loop should stop on fatal error");

        assert!(matches!(
            result,
            Err(SyncError::Api(ApiError::Fatal {
                kind: FatalKind::NoAccess
            }))
        ));
    }

    #[tokio::test]
    async fn retriable_errors_keep_the_loop_running() {
        let source = MockSource::new();
        for _ in 0..3 {
            source.fail_next_live(ApiError::retriable(RetriableKind::ServerError));
        }
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_fetch_loop(engine(&source).await, fast_backoff(), rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while source.live_opens() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("live should be retried past the failures");

        tx.send(true).unwrap();
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn dropped_sender_stops_the_loop() {
        let source = MockSource::new();
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_fetch_loop(engine(&source).await, fast_backoff(), rx),
        )
        .await
        .expect("loop should stop");
        assert!(result.is_ok());
    }
}
