use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::db::Database;

use super::state::{CycleBoundary, FocusConfig, FocusSessionState, FocusStatus};
use super::store::FocusStore;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FocusEvent {
    StateChanged {
        state: FocusSessionState,
    },
    Tick {
        #[serde(rename = "remainingSecs")]
        remaining_secs: u32,
        #[serde(rename = "currentCycle")]
        current_cycle: u32,
    },
    /// A cycle finished and more remain; the driver turns this into a stretch prompt.
    CycleCompleted {
        cycle: u32,
        #[serde(rename = "totalCycles")]
        total_cycles: u32,
    },
    AllCyclesCompleted {
        #[serde(rename = "totalCycles")]
        total_cycles: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigOutcome {
    /// Idle session: countdown reset to the new configuration.
    Applied,
    /// Active session: held until the session is stopped.
    Deferred,
    /// Same configuration as the current one; nothing touched.
    Unchanged,
}

struct Shared {
    state: Mutex<FocusSessionState>,
    pending_config: Mutex<Option<FocusConfig>>,
    store: FocusStore,
    events: broadcast::Sender<FocusEvent>,
}

/// Work-interval countdown and cycle counter with durable state.
///
/// Mounting restores a persisted session instead of starting over. Only
/// `stop` and a configuration change while idle clear what is stored.
///
/// The ticker stops once the last handle is dropped, even without `unmount`.
#[derive(Clone)]
pub struct FocusController {
    shared: Arc<Shared>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
    shutdown: CancellationToken,
    _shutdown_guard: Arc<DropGuard>,
}

impl FocusController {
    pub async fn mount(db: Database, config: FocusConfig, tick_interval: Duration) -> Self {
        let store = FocusStore::new(db);

        let state = match store.load().await {
            Ok(Some(restored)) if restored.status != FocusStatus::Idle => {
                log_info!(
                    "restoring focus session: cycle {}/{} ({:?}, {}s left)",
                    restored.current_cycle,
                    restored.total_cycles,
                    restored.status,
                    restored.remaining_secs
                );
                restored
            }
            Ok(_) => {
                log_info!("no persisted focus session, starting idle");
                FocusSessionState::idle(config)
            }
            Err(err) => {
                log_warn!("failed to read persisted focus session, starting idle: {err:#}");
                if let Err(clear_err) = store.clear().await {
                    log_error!("failed to clear unreadable focus session: {clear_err:#}");
                }
                FocusSessionState::idle(config)
            }
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let running = state.status == FocusStatus::Running;
        let shutdown = CancellationToken::new();

        let controller = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                pending_config: Mutex::new(None),
                store,
                events,
            }),
            ticker: Arc::new(Mutex::new(None)),
            tick_interval,
            _shutdown_guard: Arc::new(shutdown.clone().drop_guard()),
            shutdown,
        };

        if running {
            controller.spawn_ticker().await;
        }

        controller
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FocusEvent> {
        self.shared.events.subscribe()
    }

    pub async fn snapshot(&self) -> FocusSessionState {
        self.shared.state.lock().await.clone()
    }

    pub async fn pending_config(&self) -> Option<FocusConfig> {
        *self.shared.pending_config.lock().await
    }

    /// Begin a session, continue after a resting cycle boundary, or resume a
    /// paused one. A running session is left alone.
    pub async fn start(&self) -> Result<FocusSessionState> {
        let snapshot = {
            let mut state = self.shared.state.lock().await;
            match state.status {
                FocusStatus::Running => return Ok(state.clone()),
                FocusStatus::Paused => {
                    state.resume();
                    log_info!("focus session resumed at cycle {}", state.current_cycle);
                }
                FocusStatus::CycleComplete => {
                    state.continue_next_cycle();
                    log_info!(
                        "continuing focus session with cycle {}/{}",
                        state.current_cycle,
                        state.total_cycles
                    );
                }
                FocusStatus::Idle | FocusStatus::AllCyclesComplete => {
                    if let Some(pending) = self.shared.pending_config.lock().await.take() {
                        state.apply_config(pending);
                    }
                    state.begin(Utc::now());
                    log_info!(
                        "focus session started: {} x {}s",
                        state.total_cycles,
                        state.work_duration_secs
                    );
                }
            }
            self.shared.store.save(&state).await?;
            state.clone()
        };

        self.spawn_ticker().await;
        self.emit(FocusEvent::StateChanged {
            state: snapshot.clone(),
        });
        Ok(snapshot)
    }

    pub async fn pause(&self) -> Result<FocusSessionState> {
        let snapshot = {
            let mut state = self.shared.state.lock().await;
            if !state.pause() {
                return Ok(state.clone());
            }
            log_info!("focus session paused with {}s left", state.remaining_secs);
            self.shared.store.save(&state).await?;
            state.clone()
        };

        self.cancel_ticker().await;
        self.emit(FocusEvent::StateChanged {
            state: snapshot.clone(),
        });
        Ok(snapshot)
    }

    pub async fn resume(&self) -> Result<FocusSessionState> {
        let snapshot = {
            let mut state = self.shared.state.lock().await;
            if !state.resume() {
                return Ok(state.clone());
            }
            log_info!("focus session resumed at cycle {}", state.current_cycle);
            self.shared.store.save(&state).await?;
            state.clone()
        };

        self.spawn_ticker().await;
        self.emit(FocusEvent::StateChanged {
            state: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// Explicit stop: back to idle and erase the persisted session. A
    /// configuration deferred during the session takes effect here.
    pub async fn stop(&self) -> Result<FocusSessionState> {
        self.cancel_ticker().await;

        let snapshot = {
            let mut state = self.shared.state.lock().await;
            let config = self
                .shared
                .pending_config
                .lock()
                .await
                .take()
                .unwrap_or_else(|| state.config());
            *state = FocusSessionState::idle(config);
            self.shared.store.clear().await?;
            log_info!("focus session stopped");
            state.clone()
        };

        self.emit(FocusEvent::StateChanged {
            state: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// A user-driven configuration change.
    ///
    /// A configuration equal to the current one is the remount case and
    /// leaves the session untouched.
    pub async fn configure(&self, config: FocusConfig) -> Result<ConfigOutcome> {
        config.validate()?;

        let mut state = self.shared.state.lock().await;
        let mut pending = self.shared.pending_config.lock().await;

        if state.config() == config {
            *pending = None;
            return Ok(ConfigOutcome::Unchanged);
        }

        if state.is_active() {
            log_info!("focus session active, deferring configuration change");
            *pending = Some(config);
            return Ok(ConfigOutcome::Deferred);
        }

        *pending = None;
        state.apply_config(config);
        self.shared.store.clear().await?;
        log_info!(
            "focus configuration applied: {} x {}s",
            config.total_cycles,
            config.work_duration_secs
        );
        let snapshot = state.clone();
        drop(pending);
        drop(state);

        self.cancel_ticker().await;
        self.emit(FocusEvent::StateChanged { state: snapshot });
        Ok(ConfigOutcome::Applied)
    }

    /// Advance the countdown by one tick. Returns the boundary crossed, if any.
    pub async fn tick(&self) -> Result<Option<CycleBoundary>> {
        advance(&self.shared).await.map(|(boundary, _)| boundary)
    }

    /// Stop the ticker without touching state. Persisted progress survives.
    pub async fn unmount(&self) {
        self.cancel_ticker().await;
        log_debug!("focus controller unmounted");
    }

    pub async fn has_ticker(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let shared = self.shared.clone();
        let shutdown = self.shutdown.clone();
        let period = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        log_debug!("focus controller dropped, stopping ticker");
                        break;
                    }

                    _ = interval.tick() => {
                        match advance(&shared).await {
                            Ok((_, true)) => {}
                            Ok((_, false)) => break,
                            Err(err) => {
                                log_error!("focus tick failed to persist: {err:#}");
                            }
                        }
                    }
                }
            }
            log_debug!("focus ticker exited");
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    fn emit(&self, event: FocusEvent) {
        emit(&self.shared, event);
    }
}

/// One countdown step. The flag reports whether the session is still running.
async fn advance(shared: &Shared) -> Result<(Option<CycleBoundary>, bool)> {
    let mut state = shared.state.lock().await;
    if state.status != FocusStatus::Running {
        return Ok((None, false));
    }

    let boundary = state.tick();
    let snapshot = state.clone();
    let persisted = shared.store.save(&snapshot).await;
    drop(state);

    emit(
        shared,
        FocusEvent::Tick {
            remaining_secs: snapshot.remaining_secs,
            current_cycle: snapshot.current_cycle,
        },
    );

    match boundary {
        Some(CycleBoundary::CycleCompleted {
            cycle,
            total_cycles,
        }) => {
            log_info!("focus cycle {cycle}/{total_cycles} complete");
            emit(
                shared,
                FocusEvent::CycleCompleted {
                    cycle,
                    total_cycles,
                },
            );
            emit(shared, FocusEvent::StateChanged { state: snapshot.clone() });
        }
        Some(CycleBoundary::AllCyclesCompleted { total_cycles }) => {
            log_info!("all {total_cycles} focus cycles complete");
            emit(shared, FocusEvent::AllCyclesCompleted { total_cycles });
            emit(shared, FocusEvent::StateChanged { state: snapshot.clone() });
        }
        None => {}
    }

    persisted?;
    Ok((boundary, snapshot.status == FocusStatus::Running))
}

fn emit(shared: &Shared, event: FocusEvent) {
    // No subscribers is fine.
    let _ = shared.events.send(event);
}
