use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::pose::{classify, ClassifierConfig, IssueCode, LandmarkFrame};

use super::catalog::{CatalogError, ExerciseCatalog, ExerciseDefinition, StepDefinition};
use super::validator::{StepValidator, ValidationStatus};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

pub const COMPLETED_MESSAGE: &str = "Exercise completed! Great job!";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no exercise selected")]
    NoExerciseSelected,

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "step", rename_all = "camelCase")]
pub enum SessionPhase {
    NotStarted,
    StepActive(usize),
    Completed,
}

/// How one step of the current run went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step_index: usize,
    /// Attempts that ran out of time before this one succeeded.
    pub timeouts: u32,
    /// Time from activation of the successful attempt to success.
    pub attempt_ms: u64,
}

/// Emitted exactly once when the last step of a run succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseCompleted {
    pub run_id: String,
    pub exercise_id: String,
    pub exercise_name: String,
    pub completed_at: DateTime<Utc>,
}

/// What the UI shows for the current tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFeedback {
    pub exercise_id: Option<String>,
    pub phase: SessionPhase,
    pub step_count: usize,
    pub instruction: Option<String>,
    pub ok: bool,
    pub issues: Vec<IssueCode>,
    pub held_ms: u64,
    pub required_ms: u64,
    /// Whole seconds left in the current attempt, rounded up.
    pub remaining_secs: u64,
    pub message: String,
}

/// Result of one frame tick or poll.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub feedback: StepFeedback,
    pub completed: Option<ExerciseCompleted>,
}

struct ActiveRun {
    run_id: String,
    exercise: Arc<ExerciseDefinition>,
    outcomes: Vec<StepOutcome>,
    timeouts: u32,
    completion_emitted: bool,
}

/// Sequences step validators across one exercise.
///
/// At most one validator exists at a time: activating the next step drops the
/// previous validator first, so a finished step can never report twice.
pub struct ExerciseSessionController {
    catalog: Arc<ExerciseCatalog>,
    classifier: ClassifierConfig,
    selected: Option<Arc<ExerciseDefinition>>,
    phase: SessionPhase,
    run: Option<ActiveRun>,
    validator: Option<StepValidator>,
    message: String,
}

impl ExerciseSessionController {
    pub fn new(catalog: Arc<ExerciseCatalog>, classifier: ClassifierConfig) -> Self {
        Self {
            catalog,
            classifier,
            selected: None,
            phase: SessionPhase::NotStarted,
            run: None,
            validator: None,
            message: String::new(),
        }
    }

    pub fn list_exercises(&self) -> Vec<String> {
        self.catalog
            .list_exercises()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Pick an exercise and begin its first step. Any run in progress is
    /// discarded first.
    pub fn select_exercise(&mut self, id: &str, now: Instant) -> Result<StepFeedback, SessionError> {
        let exercise = self
            .catalog
            .get_exercise(id)
            .ok_or_else(|| CatalogError::UnknownExercise(id.to_string()))?;

        if self.phase != SessionPhase::NotStarted {
            log_info!("switching exercise to '{}', discarding current run", id);
        }
        self.reset_exercise();
        self.selected = Some(exercise);
        self.begin_run(now)?;
        Ok(self.feedback(None, now))
    }

    /// Start a fresh run of the selected exercise. A run already in progress
    /// is left alone.
    pub fn start_exercise(&mut self, now: Instant) -> Result<StepFeedback, SessionError> {
        if self.selected.is_none() {
            return Err(SessionError::NoExerciseSelected);
        }
        if !matches!(self.phase, SessionPhase::StepActive(_)) {
            self.begin_run(now)?;
        }
        Ok(self.feedback(None, now))
    }

    /// Back to `NotStarted`, keeping the selection.
    pub fn reset_exercise(&mut self) {
        self.validator = None;
        self.run = None;
        self.phase = SessionPhase::NotStarted;
        self.message.clear();
    }

    /// Drop everything, selection included. Used when the camera stops.
    pub fn teardown(&mut self) {
        self.reset_exercise();
        self.selected = None;
    }

    /// Classify one frame against the active step and advance the run.
    pub fn on_frame(&mut self, frame: Option<&LandmarkFrame>, now: Instant) -> TickOutcome {
        let (movement, step_index) = match (&self.validator, self.phase) {
            (Some(validator), SessionPhase::StepActive(index)) => (validator.movement(), index),
            _ => {
                return TickOutcome {
                    feedback: self.feedback(None, now),
                    completed: None,
                }
            }
        };

        let verdict = frame.map(|frame| classify(frame, movement, &self.classifier));
        let status = match self.validator.as_mut() {
            Some(validator) => validator.on_verdict(verdict.as_ref(), now),
            None => ValidationStatus::Idle,
        };
        log_debug!(
            "step {} verdict ok={} status={:?}",
            step_index,
            verdict.as_ref().map(|v| v.ok).unwrap_or(false),
            status
        );

        let completed = self.handle_status(status, step_index, now);
        TickOutcome {
            feedback: self.feedback(verdict.as_ref().map(|v| (v.ok, v.issues.clone())), now),
            completed,
        }
    }

    /// Advance timeouts when no frame arrived this tick.
    pub fn poll(&mut self, now: Instant) -> TickOutcome {
        let step_index = match self.phase {
            SessionPhase::StepActive(index) => index,
            _ => {
                return TickOutcome {
                    feedback: self.feedback(None, now),
                    completed: None,
                }
            }
        };

        let status = match self.validator.as_mut() {
            Some(validator) => validator.poll(now),
            None => ValidationStatus::Idle,
        };
        let completed = self.handle_status(status, step_index, now);
        TickOutcome {
            feedback: self.feedback(None, now),
            completed,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn selected_exercise(&self) -> Option<&str> {
        self.selected.as_deref().map(|exercise| exercise.id.as_str())
    }

    pub fn current_step(&self) -> Option<&StepDefinition> {
        match (self.phase, self.run.as_ref()) {
            (SessionPhase::StepActive(index), Some(run)) => run.exercise.step(index),
            _ => None,
        }
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        self.run.as_ref().map(|run| run.outcomes.as_slice()).unwrap_or(&[])
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run.as_ref().map(|run| run.run_id.as_str())
    }

    pub fn has_active_validator(&self) -> bool {
        self.validator.is_some()
    }

    fn begin_run(&mut self, now: Instant) -> Result<(), SessionError> {
        let exercise = self.selected.clone().ok_or(SessionError::NoExerciseSelected)?;
        let run_id = Uuid::new_v4().to_string();
        log_info!("starting run {} of '{}'", run_id, exercise.id);

        self.run = Some(ActiveRun {
            run_id,
            exercise,
            outcomes: Vec::new(),
            timeouts: 0,
            completion_emitted: false,
        });
        self.activate_step(0, now)
    }

    fn activate_step(&mut self, index: usize, now: Instant) -> Result<(), SessionError> {
        // Retire the previous validator before arming the next one.
        self.validator = None;

        let run = self.run.as_mut().ok_or(SessionError::NoExerciseSelected)?;
        let step = run.exercise.step(index).ok_or_else(|| CatalogError::InvalidStep {
            exercise: run.exercise.id.clone(),
            step: index,
            reason: "step index out of range".into(),
        })?;

        let mut validator = StepValidator::new(step);
        validator.activate(now);
        run.timeouts = 0;
        self.message = step.instruction.clone();
        self.validator = Some(validator);
        self.phase = SessionPhase::StepActive(index);
        Ok(())
    }

    fn handle_status(
        &mut self,
        status: ValidationStatus,
        step_index: usize,
        now: Instant,
    ) -> Option<ExerciseCompleted> {
        match status {
            ValidationStatus::Succeeded => self.finish_step(step_index, now),
            ValidationStatus::TimedOut => {
                self.retry_step(step_index, now);
                None
            }
            ValidationStatus::Idle | ValidationStatus::Validating => None,
        }
    }

    fn finish_step(&mut self, step_index: usize, now: Instant) -> Option<ExerciseCompleted> {
        let attempt = self
            .validator
            .take()
            .map(|validator| validator.elapsed(now))
            .unwrap_or_default();
        let run = self.run.as_mut()?;
        let exercise = Arc::clone(&run.exercise);
        let step = exercise.step(step_index)?;

        run.outcomes.push(StepOutcome {
            step_index,
            timeouts: run.timeouts,
            attempt_ms: duration_ms(attempt),
        });
        log_info!(
            "'{}' step {} succeeded after {}ms",
            exercise.id,
            step_index,
            duration_ms(attempt)
        );

        if step_index + 1 < exercise.step_count() {
            let success_text = step.success_text.clone();
            if self.advance_to(step_index + 1, now) {
                self.message = success_text;
            }
            return None;
        }

        self.phase = SessionPhase::Completed;
        self.message = COMPLETED_MESSAGE.to_string();
        if run.completion_emitted {
            return None;
        }
        run.completion_emitted = true;
        log_info!("run {} of '{}' completed", run.run_id, exercise.id);

        Some(ExerciseCompleted {
            run_id: run.run_id.clone(),
            exercise_id: exercise.id.clone(),
            exercise_name: exercise.name.clone(),
            completed_at: Utc::now(),
        })
    }

    /// Activate `index`, or abandon the run if that fails so it cannot stall
    /// in a step with no validator.
    fn advance_to(&mut self, index: usize, now: Instant) -> bool {
        match self.activate_step(index, now) {
            Ok(()) => true,
            Err(err) => {
                log_error!("abandoning run, cannot activate step {}: {}", index, err);
                self.reset_exercise();
                false
            }
        }
    }

    fn retry_step(&mut self, step_index: usize, now: Instant) {
        let failure_text = match self.current_step() {
            Some(step) => step.failure_text.clone(),
            None => return,
        };
        if let Some(run) = self.run.as_mut() {
            run.timeouts += 1;
            log_info!(
                "'{}' step {} timed out (attempt {}), re-arming",
                run.exercise.id,
                step_index,
                run.timeouts
            );
        }
        if let Some(validator) = self.validator.as_mut() {
            validator.activate(now);
        }
        self.message = failure_text;
    }

    fn feedback(&self, verdict: Option<(bool, Vec<IssueCode>)>, now: Instant) -> StepFeedback {
        let (ok, issues) = verdict.unwrap_or((false, Vec::new()));
        let (held_ms, required_ms, remaining_secs) = self
            .validator
            .as_ref()
            .map(|validator| {
                (
                    duration_ms(validator.held()),
                    duration_ms(validator.required()),
                    duration_ms(validator.remaining(now)).div_ceil(1000),
                )
            })
            .unwrap_or((0, 0, 0));
        let exercise = self.selected.as_deref();

        StepFeedback {
            exercise_id: exercise.map(|exercise| exercise.id.clone()),
            phase: self.phase,
            step_count: exercise.map(|exercise| exercise.step_count()).unwrap_or(0),
            instruction: self.current_step().map(|step| step.instruction.clone()),
            ok,
            issues,
            held_ms,
            required_ms,
            remaining_secs,
            message: self.message.clone(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
