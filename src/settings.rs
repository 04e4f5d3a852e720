use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::{focus::FocusConfig, pose::ClassifierConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressSettings {
    pub daily_goal: u32,
    /// Repeat completions of one exercise inside this window are dropped.
    pub completion_window_ms: u64,
    pub points_per_goal: u32,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            daily_goal: 3,
            completion_window_ms: 3000,
            points_per_goal: 1,
        }
    }
}

impl ProgressSettings {
    pub fn completion_window(&self) -> Duration {
        Duration::from_millis(self.completion_window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub classifier: ClassifierConfig,
    pub progress: ProgressSettings,
    pub focus: FocusConfig,
    pub frame_watchdog_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            progress: ProgressSettings::default(),
            focus: FocusConfig::default(),
            frame_watchdog_ms: 250,
        }
    }
}

impl AppSettings {
    pub fn frame_watchdog(&self) -> Duration {
        Duration::from_millis(self.frame_watchdog_ms.max(1))
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppSettings>,
}

impl SettingsStore {
    /// Missing or unreadable settings fall back to defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    log::warn!(
                        "Ignoring malformed settings at {}: {err}",
                        path.display()
                    );
                    AppSettings::default()
                }
            }
        } else {
            AppSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> Result<AppSettings> {
        Ok(self.read()?.clone())
    }

    pub fn update_focus(&self, focus: FocusConfig) -> Result<()> {
        focus.validate()?;
        self.update(|settings| settings.focus = focus)
    }

    pub fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut AppSettings),
    {
        let mut guard = self.write()?;
        apply(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &AppSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, AppSettings>> {
        self.data
            .read()
            .map_err(|_| anyhow!("settings lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, AppSettings>> {
        self.data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))
    }
}
