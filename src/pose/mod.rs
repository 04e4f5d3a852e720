//! Pose frames and the per-frame movement checks run against them.

pub mod classifier;
pub mod geometry;
pub mod landmarks;

pub use classifier::{classify, ClassifierConfig, IssueCode, MovementType, UnsupportedMovement, Verdict};
pub use geometry::{angle_between, tilt_from_horizontal};
pub use landmarks::{BodyPoint, Landmark, LandmarkFrame, LANDMARK_COUNT};
