//! Pomodoro-style focus sessions: a work-interval countdown over a fixed
//! number of cycles, persisted so a remount picks up where it left off.

pub mod controller;
pub mod state;
pub mod store;

pub use controller::{ConfigOutcome, FocusController, FocusEvent};
pub use state::{ActiveMode, CycleBoundary, FocusConfig, FocusSessionState, FocusStatus};
pub use store::FocusStore;
