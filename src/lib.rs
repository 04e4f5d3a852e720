pub mod commands;
pub mod db;
pub mod engine;
pub mod exercise;
pub mod focus;
pub mod pose;
pub mod progress;
pub mod settings;
pub mod stream;
mod utils;


use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, Mutex},
};

use commands::{dispatch, Command, Reply};
use db::Database;
use engine::{EngineEvent, StretchEngine};
use exercise::ExerciseCatalog;
use focus::{FocusController, FocusEvent};
use settings::SettingsStore;
use stream::FrameStreamController;

const DEFAULT_DATA_DIR: &str = ".limber";
const DEBUG_FOCUS_TICK: Duration = Duration::from_millis(100);
const FOCUS_TICK: Duration = Duration::from_secs(1);

pub struct AppState {
    pub(crate) db: Database,
    pub(crate) settings: SettingsStore,
    pub(crate) engine: Arc<Mutex<StretchEngine>>,
    pub(crate) stream: Mutex<FrameStreamController>,
    pub(crate) focus: FocusController,
}

impl AppState {
    pub async fn build(db: Database, settings: SettingsStore, focus_tick: Duration) -> Result<Self> {
        let app_settings = settings.get()?;
        let catalog = Arc::new(ExerciseCatalog::builtin().context("built-in exercise catalog is invalid")?);
        info!("Loaded {} exercises", catalog.len());

        let engine = Arc::new(Mutex::new(StretchEngine::new(
            catalog,
            app_settings.classifier.clone(),
            &app_settings.progress,
        )));
        let stream = FrameStreamController::new(engine.clone(), app_settings.frame_watchdog());
        let focus = FocusController::mount(db.clone(), app_settings.focus, focus_tick).await;

        Ok(Self {
            db,
            settings,
            engine,
            stream: Mutex::new(stream),
            focus,
        })
    }

    pub async fn open(data_dir: &Path, focus_tick: Duration) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
        let db = Database::new(data_dir.join("limber.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        Self::build(db, settings, focus_tick).await
    }

    pub async fn shutdown(&self) {
        if let Err(err) = self.stream.lock().await.stop().await {
            error!("Failed to stop frame stream: {err:#}");
        }
        self.focus.unmount().await;
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Outbound<'a> {
    Reply(&'a Reply),
    Event(&'a EngineEvent),
    Focus(&'a FocusEvent),
    StretchPrompt {
        cycle: u32,
        #[serde(rename = "totalCycles")]
        total_cycles: u32,
        message: String,
    },
}

fn write_line(message: &Outbound<'_>) {
    match serde_json::to_string(message) {
        Ok(line) => println!("{line}"),
        Err(err) => error!("Failed to serialize output: {err}"),
    }
}

/// Prompt shown between focus cycles, pointing the user at a stretch.
fn stretch_prompt(event: &FocusEvent) -> Option<Outbound<'static>> {
    match event {
        FocusEvent::CycleCompleted {
            cycle,
            total_cycles,
        } => Some(Outbound::StretchPrompt {
            cycle: *cycle,
            total_cycles: *total_cycles,
            message: format!("Cycle {cycle} of {total_cycles} done. Time for a quick stretch!"),
        }),
        _ => None,
    }
}

/// Print engine events and write completions to the history table.
fn spawn_engine_forwarder(mut events: broadcast::Receiver<EngineEvent>, db: Database) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let EngineEvent::ExerciseCompleted {
                        exercise_id, record, ..
                    } = &event
                    {
                        if let Err(err) = db.insert_completion(exercise_id, record).await {
                            error!("Failed to store completion history: {err:#}");
                        }
                    }
                    write_line(&Outbound::Event(&event));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Engine event forwarder lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_focus_forwarder(mut events: broadcast::Receiver<FocusEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(FocusEvent::Tick { .. }) => {}
                Ok(event) => {
                    write_line(&Outbound::Focus(&event));
                    if let Some(prompt) = stretch_prompt(&event) {
                        write_line(&prompt);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Focus event forwarder lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn serve(state: AppState) -> Result<()> {
    spawn_engine_forwarder(state.stream.lock().await.subscribe(), state.db.clone());
    spawn_focus_forwarder(state.focus.subscribe());
    state.stream.lock().await.start()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Command>(line) {
            Ok(command) => dispatch(&state, command).await.unwrap_or_else(|err| Reply::Error {
                message: format!("{err:#}"),
            }),
            Err(err) => Reply::Error {
                message: format!("invalid command: {err}"),
            },
        };
        write_line(&Outbound::Reply(&reply));

        if matches!(reply, Reply::Bye) {
            break;
        }
    }

    state.shutdown().await;
    Ok(())
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("Limber starting up...");

    let data_dir = std::env::var("LIMBER_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
    let debug_mode = std::env::var("LIMBER_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let focus_tick = if debug_mode { DEBUG_FOCUS_TICK } else { FOCUS_TICK };

    let result = tokio::runtime::Runtime::new()
        .context("failed to start tokio runtime")
        .and_then(|runtime| {
            runtime.block_on(async {
                let state = AppState::open(&data_dir, focus_tick).await?;
                serve(state).await
            })
        });

    if let Err(err) = result {
        error!("Limber exited with error: {err:#}");
        std::process::exit(1);
    }
}
