use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::pose::{MovementType, UnsupportedMovement};

const BUILTIN_CATALOG: &str = include_str!("catalog.json");

/// Configuration defects found while loading the catalog. These are deployment
/// bugs, so they propagate instead of being recovered.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse exercise catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("exercise '{exercise}' step {step}: {source}")]
    UnsupportedMovement {
        exercise: String,
        step: usize,
        #[source]
        source: UnsupportedMovement,
    },

    #[error("unknown exercise '{0}'")]
    UnknownExercise(String),

    #[error("exercise '{0}' has no steps")]
    EmptyExercise(String),

    #[error("duplicate exercise id '{0}'")]
    DuplicateExercise(String),

    #[error("exercise '{exercise}' step {step}: {reason}")]
    InvalidStep {
        exercise: String,
        step: usize,
        reason: String,
    },
}

/// One movement within an exercise.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    pub name: String,
    pub movement: MovementType,
    /// How long the movement must be held without a single bad frame.
    pub hold: Duration,
    /// Budget for one attempt, measured from activation.
    pub timeout: Duration,
    pub instruction: String,
    pub success_text: String,
    pub failure_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseDefinition {
    pub id: String,
    pub name: String,
    pub steps: Vec<StepDefinition>,
}

impl ExerciseDefinition {
    pub fn step(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

#[derive(Deserialize)]
struct RawCatalog {
    exercises: Vec<RawExercise>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExercise {
    id: String,
    name: String,
    steps: Vec<RawStep>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    name: String,
    movement_type: String,
    hold_ms: u64,
    timeout_ms: u64,
    instruction: String,
    success_message: String,
    fail_message: String,
}

/// Read-only registry of exercises, fixed after load.
#[derive(Debug, Clone)]
pub struct ExerciseCatalog {
    exercises: Vec<Arc<ExerciseDefinition>>,
    by_id: HashMap<String, usize>,
}

impl ExerciseCatalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Parse and validate a catalog. Every movement name is resolved to its
    /// classifier here, so a typo fails at startup rather than mid-exercise.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(json)?;

        let mut exercises = Vec::with_capacity(raw.exercises.len());
        let mut by_id = HashMap::new();

        for raw_exercise in raw.exercises {
            let exercise = build_exercise(raw_exercise)?;
            if by_id.insert(exercise.id.clone(), exercises.len()).is_some() {
                return Err(CatalogError::DuplicateExercise(exercise.id));
            }
            exercises.push(Arc::new(exercise));
        }

        Ok(Self { exercises, by_id })
    }

    /// Exercise ids in catalog order.
    pub fn list_exercises(&self) -> Vec<&str> {
        self.exercises.iter().map(|exercise| exercise.id.as_str()).collect()
    }

    pub fn get_exercise(&self, id: &str) -> Option<Arc<ExerciseDefinition>> {
        self.by_id.get(id).map(|index| Arc::clone(&self.exercises[*index]))
    }

    /// `Ok(None)` past the last step marks the end of an exercise; an id the
    /// catalog never had is an error.
    pub fn get_step(&self, id: &str, index: usize) -> Result<Option<&StepDefinition>, CatalogError> {
        let position = self
            .by_id
            .get(id)
            .ok_or_else(|| CatalogError::UnknownExercise(id.to_string()))?;
        Ok(self.exercises[*position].step(index))
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }
}

fn build_exercise(raw: RawExercise) -> Result<ExerciseDefinition, CatalogError> {
    if raw.steps.is_empty() {
        return Err(CatalogError::EmptyExercise(raw.id));
    }

    let mut steps = Vec::with_capacity(raw.steps.len());
    for (index, step) in raw.steps.into_iter().enumerate() {
        let movement = step
            .movement_type
            .parse::<MovementType>()
            .map_err(|source| CatalogError::UnsupportedMovement {
                exercise: raw.id.clone(),
                step: index,
                source,
            })?;

        if step.hold_ms == 0 {
            return Err(CatalogError::InvalidStep {
                exercise: raw.id.clone(),
                step: index,
                reason: "hold duration must be greater than zero".into(),
            });
        }
        if step.timeout_ms <= step.hold_ms {
            return Err(CatalogError::InvalidStep {
                exercise: raw.id.clone(),
                step: index,
                reason: format!(
                    "timeout {}ms must exceed hold duration {}ms",
                    step.timeout_ms, step.hold_ms
                ),
            });
        }

        steps.push(StepDefinition {
            name: step.name,
            movement,
            hold: Duration::from_millis(step.hold_ms),
            timeout: Duration::from_millis(step.timeout_ms),
            instruction: step.instruction,
            success_text: step.success_message,
            failure_text: step.fail_message,
        });
    }

    Ok(ExerciseDefinition {
        id: raw.id,
        name: raw.name,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_step(movement: &str, hold_ms: u64, timeout_ms: u64) -> String {
        format!(
            r#"{{"exercises": [{{"id": "x", "name": "X", "steps": [{{
                "name": "only", "movementType": "{movement}", "holdMs": {hold_ms},
                "timeoutMs": {timeout_ms}, "instruction": "do it",
                "successMessage": "done", "failMessage": "again"
            }}]}}]}}"#
        )
    }

    #[test]
    fn builtin_catalog_loads_in_order() {
        let catalog = ExerciseCatalog::builtin().unwrap();
        assert_eq!(catalog.list_exercises(), vec!["neck_roll", "arm_stretch"]);

        let neck = catalog.get_exercise("neck_roll").unwrap();
        assert_eq!(neck.name, "Neck Roll Exercise");
        assert_eq!(neck.step_count(), 2);
        assert_eq!(neck.steps[0].movement, MovementType::InitialPosture);
        assert_eq!(neck.steps[1].movement, MovementType::NeckRoll);
        assert_eq!(neck.steps[1].hold, Duration::from_millis(4500));
        assert_eq!(neck.steps[1].timeout, Duration::from_secs(45));
    }

    #[test]
    fn step_past_the_end_is_not_an_error() {
        let catalog = ExerciseCatalog::builtin().unwrap();
        assert!(catalog.get_step("arm_stretch", 1).unwrap().is_some());
        assert!(catalog.get_step("arm_stretch", 2).unwrap().is_none());
    }

    #[test]
    fn unknown_exercise_is_an_error() {
        let catalog = ExerciseCatalog::builtin().unwrap();
        assert!(catalog.get_exercise("cartwheel").is_none());
        assert!(matches!(
            catalog.get_step("cartwheel", 0),
            Err(CatalogError::UnknownExercise(id)) if id == "cartwheel"
        ));
    }

    #[test]
    fn unsupported_movement_fails_at_load() {
        let err = ExerciseCatalog::from_json(&catalog_with_step("backflip", 1000, 5000)).unwrap_err();
        match err {
            CatalogError::UnsupportedMovement { exercise, step, source } => {
                assert_eq!(exercise, "x");
                assert_eq!(step, 0);
                assert_eq!(source, UnsupportedMovement("backflip".into()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn timeout_must_exceed_hold() {
        let err = ExerciseCatalog::from_json(&catalog_with_step("squat", 5000, 5000)).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidStep { .. }));

        let err = ExerciseCatalog::from_json(&catalog_with_step("squat", 0, 5000)).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidStep { .. }));
    }

    #[test]
    fn empty_and_duplicate_exercises_are_rejected() {
        let empty = r#"{"exercises": [{"id": "a", "name": "A", "steps": []}]}"#;
        assert!(matches!(
            ExerciseCatalog::from_json(empty),
            Err(CatalogError::EmptyExercise(id)) if id == "a"
        ));

        let single = catalog_with_step("squat", 1000, 5000);
        let raw: serde_json::Value = serde_json::from_str(&single).unwrap();
        let exercise = raw["exercises"][0].clone();
        let doubled = serde_json::json!({ "exercises": [exercise.clone(), exercise] }).to_string();
        assert!(matches!(
            ExerciseCatalog::from_json(&doubled),
            Err(CatalogError::DuplicateExercise(id)) if id == "x"
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            ExerciseCatalog::from_json("{ not json"),
            Err(CatalogError::Parse(_))
        ));
    }
}
