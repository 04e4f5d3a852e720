use std::{sync::Arc, time::Instant};

use serde::Serialize;

use crate::{
    exercise::{
        ExerciseCatalog, ExerciseCompleted, ExerciseSessionController, SessionError,
        StepFeedback, TickOutcome,
    },
    pose::{ClassifierConfig, LandmarkFrame},
    progress::{CompletedExercise, CompletionDebouncer, ProgressAggregator, ProgressSnapshot, Scoreboard},
    settings::ProgressSettings,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    Feedback {
        feedback: StepFeedback,
    },
    ExerciseCompleted {
        #[serde(rename = "exerciseId")]
        exercise_id: String,
        record: CompletedExercise,
        progress: ProgressSnapshot,
    },
    /// A repeat completion inside the debounce window; nothing was recorded.
    DuplicateCompletionSignal {
        #[serde(rename = "exerciseId")]
        exercise_id: String,
    },
    GoalReached {
        score: u64,
    },
}

/// Exercise session, daily progress, and score behind one facade.
///
/// Completion signals pass through the debouncer before they reach the
/// aggregator, so a double "completed" from the pose pipeline counts once.
pub struct StretchEngine {
    session: ExerciseSessionController,
    progress: ProgressAggregator,
    debouncer: CompletionDebouncer,
    scoreboard: Scoreboard,
    points_per_goal: u32,
    last_feedback: Option<StepFeedback>,
}

impl StretchEngine {
    pub fn new(
        catalog: Arc<ExerciseCatalog>,
        classifier: ClassifierConfig,
        settings: &ProgressSettings,
    ) -> Self {
        Self {
            session: ExerciseSessionController::new(catalog, classifier),
            progress: ProgressAggregator::new(settings.daily_goal),
            debouncer: CompletionDebouncer::new(settings.completion_window()),
            scoreboard: Scoreboard::new(),
            points_per_goal: settings.points_per_goal,
            last_feedback: None,
        }
    }

    pub fn list_exercises(&self) -> Vec<String> {
        self.session.list_exercises()
    }

    pub fn select_exercise(&mut self, id: &str, now: Instant) -> Result<StepFeedback, SessionError> {
        let feedback = self.session.select_exercise(id, now)?;
        self.last_feedback = Some(feedback.clone());
        Ok(feedback)
    }

    pub fn start_exercise(&mut self, now: Instant) -> Result<StepFeedback, SessionError> {
        let feedback = self.session.start_exercise(now)?;
        self.last_feedback = Some(feedback.clone());
        Ok(feedback)
    }

    pub fn reset_exercise(&mut self) {
        self.session.reset_exercise();
        self.last_feedback = None;
    }

    /// Tear down the active run and selection. Progress and score stay.
    pub fn teardown(&mut self) {
        self.session.teardown();
        self.last_feedback = None;
    }

    pub fn handle_frame(&mut self, frame: Option<&LandmarkFrame>, now: Instant) -> Vec<EngineEvent> {
        let outcome = self.session.on_frame(frame, now);
        self.absorb(outcome, now, true)
    }

    /// Watchdog tick. Feedback is only reported when it changed.
    pub fn poll(&mut self, now: Instant) -> Vec<EngineEvent> {
        let outcome = self.session.poll(now);
        self.absorb(outcome, now, false)
    }

    /// Record a completion unless it repeats the previous one inside the window.
    pub fn accept_completion(&mut self, completed: &ExerciseCompleted, now: Instant) -> Vec<EngineEvent> {
        if !self.debouncer.admit(&completed.exercise_id, now) {
            log_warn!(
                "DuplicateCompletionSignal: '{}' completed again within {:?}",
                completed.exercise_id,
                self.debouncer.window()
            );
            return vec![EngineEvent::DuplicateCompletionSignal {
                exercise_id: completed.exercise_id.clone(),
            }];
        }

        let outcome = self.progress.record_completion(&completed.exercise_name);
        log_info!(
            "recorded '{}' ({}/{})",
            completed.exercise_name,
            self.progress.completed_count(),
            self.progress.daily_goal()
        );

        let mut events = vec![EngineEvent::ExerciseCompleted {
            exercise_id: completed.exercise_id.clone(),
            record: outcome.record,
            progress: self.progress.snapshot(),
        }];

        if outcome.goal_reached {
            let score = self.scoreboard.award(self.points_per_goal);
            events.push(EngineEvent::GoalReached { score });
        }
        events
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn reset_daily_progress(&mut self) -> ProgressSnapshot {
        self.progress.reset_daily_progress();
        self.debouncer.clear();
        self.progress.snapshot()
    }

    pub fn score(&self) -> u64 {
        self.scoreboard.score()
    }

    pub fn reset_score(&mut self) {
        self.scoreboard.reset_score();
    }

    pub fn session(&self) -> &ExerciseSessionController {
        &self.session
    }

    fn absorb(&mut self, outcome: TickOutcome, now: Instant, always_report: bool) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let changed = self.last_feedback.as_ref() != Some(&outcome.feedback);
        if always_report || changed {
            events.push(EngineEvent::Feedback {
                feedback: outcome.feedback.clone(),
            });
        }
        self.last_feedback = Some(outcome.feedback);

        if let Some(completed) = outcome.completed {
            events.extend(self.accept_completion(&completed, now));
        }
        events
    }
}
