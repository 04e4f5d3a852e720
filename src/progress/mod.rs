//! Daily exercise progress toward a goal, and the one-shot reward it unlocks.

mod debounce;
mod score;

pub use debounce::CompletionDebouncer;
pub use score::Scoreboard;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedExercise {
    pub id: String,
    pub name: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub record: CompletedExercise,
    /// True only on the completion that first reached the goal since the last reset.
    pub goal_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub completed: Vec<CompletedExercise>,
    pub completed_count: usize,
    pub daily_goal: u32,
    pub percentage: u32,
    /// `percentage` capped at 100, for progress bars.
    pub display_percentage: u32,
    pub goal_reached: bool,
}

/// Records completed exercises and fires `goalReached` at most once per reset.
///
/// Callers own idempotency: each call appends a record, so duplicate
/// completion signals must be filtered before they get here.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    records: Vec<CompletedExercise>,
    goal: u32,
    reward_fired: bool,
}

impl ProgressAggregator {
    pub fn new(goal: u32) -> Self {
        Self {
            records: Vec::new(),
            goal: goal.max(1),
            reward_fired: false,
        }
    }

    pub fn record_completion(&mut self, exercise_name: &str) -> RecordOutcome {
        let record = CompletedExercise {
            id: Uuid::new_v4().to_string(),
            name: exercise_name.to_string(),
            completed_at: Utc::now(),
        };
        self.records.push(record.clone());

        let goal_reached = !self.reward_fired && self.completed_count() >= self.goal as usize;
        if goal_reached {
            self.reward_fired = true;
            log::info!(
                "daily goal of {} reached with '{}'",
                self.goal,
                exercise_name
            );
        }

        RecordOutcome {
            record,
            goal_reached,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.records.len()
    }

    /// `round(100 * count / goal)`. Not clamped: extra completions push it past 100.
    pub fn progress_percentage(&self) -> u32 {
        ((self.records.len() as f64 / self.goal as f64) * 100.0).round() as u32
    }

    /// Percentage capped at 100 for progress bars.
    pub fn display_percentage(&self) -> u32 {
        self.progress_percentage().min(100)
    }

    /// Clear all records and re-arm the reward.
    pub fn reset_daily_progress(&mut self) {
        log::info!("resetting daily progress ({} records)", self.records.len());
        self.records.clear();
        self.reward_fired = false;
    }

    pub fn records(&self) -> &[CompletedExercise] {
        &self.records
    }

    pub fn daily_goal(&self) -> u32 {
        self.goal
    }

    pub fn goal_reached(&self) -> bool {
        self.reward_fired
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.records.clone(),
            completed_count: self.completed_count(),
            daily_goal: self.goal,
            percentage: self.progress_percentage(),
            display_percentage: self.display_percentage(),
            goal_reached: self.reward_fired,
        }
    }
}
