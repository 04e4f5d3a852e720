pub mod catalog;
pub mod session;
pub mod validator;

pub use catalog::{CatalogError, ExerciseCatalog, ExerciseDefinition, StepDefinition};
pub use session::{
    ExerciseCompleted, ExerciseSessionController, SessionError, SessionPhase, StepFeedback,
    StepOutcome, TickOutcome,
};
pub use validator::{StepValidator, ValidationStatus};
