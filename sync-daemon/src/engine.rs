//! Live/replay task scheduling.
//!
//! The engine owns two task slots. Each [`SyncEngine::fetch`] call (one per
//! tick) collects the outcome of a finished task, then fills empty slots:
//!
//! ```text
//!           start                 stream ends / error
//!   IDLE ──────────► RUNNING ───────────────────────► outcome collected ──► IDLE
//! ```
//!
//! A slot holds at most one handle, so a second task of the same kind cannot
//! be started while one is running. `fetch` never waits for streaming I/O.
//!
//! A collected outcome frees the slot and a new task starts in the same tick,
//! whether the old one completed or failed retriably. Retriable failures only
//! feed the backoff, so consecutive failing ticks stay consecutive. A fatal
//! outcome stops the engine for good: running tasks are aborted and every
//! later `fetch` returns [`SyncError::EngineStopped`].

use crate::error::{StorageError, SyncError};
use crate::flusher::BatchFlusher;
use crate::storage::SyncStorage;
use std::fmt;
use std::sync::Arc;
use sync_client::{ApiError, MeasurementSource};
use sync_types::ReplayWindow;
use tokio::task::JoinHandle;

/// The two kinds of task the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Streams the live endpoint.
    Live,
    /// Backfills one pending window.
    Replay,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Live => f.write_str("live"),
            TaskKind::Replay => f.write_str("replay"),
        }
    }
}

/// How a replay task ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The server delivered the whole window; it was deleted.
    Completed,
    /// The server rejected the window (HTTP 400); it was deleted unreplayed.
    Abandoned,
}

/// Retriable failures collected during one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Failed tasks and their errors.
    pub retriable: Vec<(TaskKind, ApiError)>,
}

impl TickReport {
    /// Whether the next sleep should back off.
    pub fn should_back_off(&self) -> bool {
        !self.retriable.is_empty()
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum measurements per transaction.
    pub batch_size: usize,
    /// Whether gaps are tracked and replayed.
    pub replay_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            replay_enabled: false,
        }
    }
}

struct ReplaySlot {
    window: ReplayWindow,
    handle: JoinHandle<Result<ReplayOutcome, SyncError>>,
}

/// Schedules live and replay tasks.
pub struct SyncEngine {
    source: Arc<dyn MeasurementSource>,
    storage: Arc<dyn SyncStorage>,
    flusher: Arc<BatchFlusher>,
    replay_enabled: bool,
    live: Option<JoinHandle<Result<(), SyncError>>>,
    replay: Option<ReplaySlot>,
    stopped: bool,
}

impl SyncEngine {
    /// Create an engine. No task runs until the first [`fetch`](Self::fetch).
    pub fn new(
        source: Arc<dyn MeasurementSource>,
        storage: Arc<dyn SyncStorage>,
        config: EngineConfig,
    ) -> Self {
        let flusher = BatchFlusher::new(
            Arc::clone(&storage),
            config.batch_size,
            config.replay_enabled,
        );
        Self {
            source,
            storage,
            flusher: Arc::new(flusher),
            replay_enabled: config.replay_enabled,
            live: None,
            replay: None,
            stopped: false,
        }
    }

    /// Run one tick.
    ///
    /// Retriable task failures are returned in the report. Any other failure
    /// is returned as an error and stops the engine.
    pub async fn fetch(&mut self) -> Result<TickReport, SyncError> {
        if self.stopped {
            return Err(SyncError::EngineStopped);
        }

        let mut report = TickReport::default();
        if let Err(e) = self.tick(&mut report).await {
            self.stop();
            return Err(e);
        }
        Ok(report)
    }

    /// Whether a fatal error has stopped the engine.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    async fn tick(&mut self, report: &mut TickReport) -> Result<(), SyncError> {
        self.fetch_live(report).await?;
        if self.replay_enabled {
            self.fetch_replay(report).await?;
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped = true;
        if let Some(handle) = self.live.take() {
            handle.abort();
        }
        if let Some(slot) = self.replay.take() {
            tracing::debug!("Aborting replay of {}", slot.window);
            slot.handle.abort();
        }
    }

    /// Whether no task is running.
    pub fn tasks_finished(&self) -> bool {
        let live_done = self.live.as_ref().map_or(true, JoinHandle::is_finished);
        let replay_done = self
            .replay
            .as_ref()
            .map_or(true, |slot| slot.handle.is_finished());
        live_done && replay_done
    }

    /// The window the replay slot is working on, if any.
    pub fn replaying(&self) -> Option<&ReplayWindow> {
        self.replay.as_ref().map(|slot| &slot.window)
    }

    async fn fetch_live(&mut self, report: &mut TickReport) -> Result<(), SyncError> {
        match self.live.take() {
            Some(handle) if !handle.is_finished() => {
                self.live = Some(handle);
                return Ok(());
            }
            Some(handle) => {
                let outcome = handle.await.map_err(|source| SyncError::TaskFailed {
                    task: TaskKind::Live,
                    source,
                })?;
                match outcome {
                    Ok(()) => tracing::info!("Live stream ended, restarting"),
                    Err(SyncError::Api(e)) if e.is_retriable() => {
                        tracing::warn!("Live stream failed, restarting: {}", e);
                        report.retriable.push((TaskKind::Live, e));
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {}
        }

        self.live = Some(self.spawn_live());
        Ok(())
    }

    async fn fetch_replay(&mut self, report: &mut TickReport) -> Result<(), SyncError> {
        match self.replay.take() {
            Some(slot) if !slot.handle.is_finished() => {
                self.replay = Some(slot);
                return Ok(());
            }
            Some(ReplaySlot { window, handle }) => {
                let outcome = handle.await.map_err(|source| SyncError::TaskFailed {
                    task: TaskKind::Replay,
                    source,
                })?;
                match outcome {
                    Ok(ReplayOutcome::Completed) => {
                        tracing::info!("Replay of {} completed", window);
                    }
                    Ok(ReplayOutcome::Abandoned) => {
                        tracing::warn!("Replay window {} rejected by server, abandoned", window);
                    }
                    Err(SyncError::Api(e)) if e.is_retriable() => {
                        tracing::warn!("Replay of {} failed, will resume: {}", window, e);
                        report.retriable.push((TaskKind::Replay, e));
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {}
        }

        if let Some(window) = self.storage.first_pending_window().await? {
            tracing::info!("Starting replay of {}", window);
            self.replay = Some(ReplaySlot {
                handle: self.spawn_replay(window.clone()),
                window,
            });
        }
        Ok(())
    }

    fn spawn_live(&self) -> JoinHandle<Result<(), SyncError>> {
        tokio::spawn(run_live(
            Arc::clone(&self.source),
            Arc::clone(&self.flusher),
        ))
    }

    fn spawn_replay(&self, window: ReplayWindow) -> JoinHandle<Result<ReplayOutcome, SyncError>> {
        tokio::spawn(run_replay(
            Arc::clone(&self.source),
            Arc::clone(&self.storage),
            Arc::clone(&self.flusher),
            window,
        ))
    }
}

async fn run_live(
    source: Arc<dyn MeasurementSource>,
    flusher: Arc<BatchFlusher>,
) -> Result<(), SyncError> {
    tracing::debug!("Opening live stream");
    let stream = source.live().await?;
    flusher.flush_live(stream, false).await?;
    Ok(())
}

async fn run_replay(
    source: Arc<dyn MeasurementSource>,
    storage: Arc<dyn SyncStorage>,
    flusher: Arc<BatchFlusher>,
    window: ReplayWindow,
) -> Result<ReplayOutcome, SyncError> {
    let Some(to) = window.to.clone() else {
        return Err(StorageError::Corrupt {
            table: "replay",
            reason: format!("{window} selected for replay has no end"),
        }
        .into());
    };

    let stream = match source.replay(&window.from, &to).await {
        Ok(stream) => stream,
        Err(ApiError::InvalidRequest) => {
            storage.delete_window(&window).await?;
            return Ok(ReplayOutcome::Abandoned);
        }
        Err(e) => return Err(e.into()),
    };

    flusher.flush_replay(stream, window).await?;
    Ok(ReplayOutcome::Completed)
}
