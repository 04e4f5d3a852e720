use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActiveMode {
    None,
    Focus,
    Calendar,
}

impl Default for ActiveMode {
    fn default() -> Self {
        ActiveMode::None
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FocusStatus {
    Idle,
    Running,
    Paused,
    CycleComplete,
    AllCyclesComplete,
}

impl Default for FocusStatus {
    fn default() -> Self {
        FocusStatus::Idle
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct FocusConfig {
    pub work_duration_secs: u32,
    pub total_cycles: u32,
    /// Roll straight into the next cycle instead of resting in `CycleComplete`.
    pub auto_continue: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            work_duration_secs: 1500,
            total_cycles: 4,
            auto_continue: true,
        }
    }
}

impl FocusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.work_duration_secs == 0 {
            bail!("work duration must be greater than zero");
        }
        if self.total_cycles == 0 {
            bail!("total cycles must be at least one");
        }
        Ok(())
    }
}

/// A cycle boundary crossed by [`FocusSessionState::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleBoundary {
    /// `cycle` finished and more remain.
    CycleCompleted { cycle: u32, total_cycles: u32 },
    AllCyclesCompleted { total_cycles: u32 },
}

/// The persisted focus-session record.
///
/// `current_cycle` is `cycles_completed + 1` until the last cycle finishes,
/// after which it stays at `total_cycles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSessionState {
    pub active_mode: ActiveMode,
    pub status: FocusStatus,
    pub current_cycle: u32,
    pub total_cycles: u32,
    pub work_duration_secs: u32,
    pub cycles_completed: u32,
    pub remaining_secs: u32,
    #[serde(default = "default_auto_continue")]
    pub auto_continue: bool,
    pub started_at: Option<DateTime<Utc>>,
}

fn default_auto_continue() -> bool {
    true
}

impl Default for FocusSessionState {
    fn default() -> Self {
        Self::idle(FocusConfig::default())
    }
}

impl FocusSessionState {
    pub fn idle(config: FocusConfig) -> Self {
        Self {
            active_mode: ActiveMode::None,
            status: FocusStatus::Idle,
            current_cycle: 1,
            total_cycles: config.total_cycles,
            work_duration_secs: config.work_duration_secs,
            cycles_completed: 0,
            remaining_secs: config.work_duration_secs,
            auto_continue: config.auto_continue,
            started_at: None,
        }
    }

    pub fn config(&self) -> FocusConfig {
        FocusConfig {
            work_duration_secs: self.work_duration_secs,
            total_cycles: self.total_cycles,
            auto_continue: self.auto_continue,
        }
    }

    /// Running, paused, or waiting between cycles.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            FocusStatus::Running | FocusStatus::Paused | FocusStatus::CycleComplete
        )
    }

    pub fn begin(&mut self, started_at: DateTime<Utc>) {
        let config = self.config();
        *self = Self {
            active_mode: ActiveMode::Focus,
            status: FocusStatus::Running,
            started_at: Some(started_at),
            ..Self::idle(config)
        };
    }

    pub fn pause(&mut self) -> bool {
        if self.status != FocusStatus::Running {
            return false;
        }
        self.status = FocusStatus::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.status != FocusStatus::Paused {
            return false;
        }
        self.status = FocusStatus::Running;
        true
    }

    /// Leave `CycleComplete` and start counting down the next cycle.
    pub fn continue_next_cycle(&mut self) -> bool {
        if self.status != FocusStatus::CycleComplete {
            return false;
        }
        self.status = FocusStatus::Running;
        self.remaining_secs = self.work_duration_secs;
        true
    }

    /// One clock tick. Only a running session counts down.
    pub fn tick(&mut self) -> Option<CycleBoundary> {
        if self.status != FocusStatus::Running {
            return None;
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs > 0 {
            return None;
        }

        let finished = self.current_cycle;
        self.cycles_completed = (self.cycles_completed + 1).min(self.total_cycles);

        if self.cycles_completed >= self.total_cycles {
            self.status = FocusStatus::AllCyclesComplete;
            self.current_cycle = self.total_cycles;
            return Some(CycleBoundary::AllCyclesCompleted {
                total_cycles: self.total_cycles,
            });
        }

        self.current_cycle = self.cycles_completed + 1;
        if self.auto_continue {
            self.remaining_secs = self.work_duration_secs;
        } else {
            self.status = FocusStatus::CycleComplete;
        }

        Some(CycleBoundary::CycleCompleted {
            cycle: finished,
            total_cycles: self.total_cycles,
        })
    }

    /// Replace the configuration and reset the countdown. Only meaningful while idle.
    pub fn apply_config(&mut self, config: FocusConfig) {
        *self = Self::idle(config);
    }

    /// Cycle counters agree with each other and the configuration is usable.
    pub fn is_consistent(&self) -> bool {
        if self.config().validate().is_err() {
            return false;
        }
        if self.cycles_completed > self.total_cycles {
            return false;
        }
        if self.remaining_secs > self.work_duration_secs {
            return false;
        }
        let expected_cycle = if self.status == FocusStatus::AllCyclesComplete {
            self.total_cycles
        } else {
            self.cycles_completed + 1
        };
        if self.current_cycle != expected_cycle {
            return false;
        }
        match self.status {
            FocusStatus::AllCyclesComplete => self.cycles_completed == self.total_cycles,
            _ => self.cycles_completed < self.total_cycles,
        }
    }
}
