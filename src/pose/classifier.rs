use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::geometry::{is_above, is_below, tilt_from_horizontal};
use super::landmarks::{BodyPoint, Landmark, LandmarkFrame};

/// Movements the exercise catalog can ask for. Each maps to exactly one
/// classifier function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Shoulders and head held level.
    InitialPosture,
    /// Both wrists raised above the shoulders.
    ArmRaise,
    /// Both knees below the hips.
    Squat,
    /// Head tilted past the configured threshold.
    NeckRoll,
}

/// A step named a movement with no registered classifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported movement type '{0}'")]
pub struct UnsupportedMovement(pub String);

impl MovementType {
    pub const ALL: [MovementType; 4] = [
        MovementType::InitialPosture,
        MovementType::ArmRaise,
        MovementType::Squat,
        MovementType::NeckRoll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::InitialPosture => "initial_posture",
            MovementType::ArmRaise => "arm_raise",
            MovementType::Squat => "squat",
            MovementType::NeckRoll => "neck_roll",
        }
    }

    /// Landmarks that must be visible before the movement can be judged.
    pub fn required_points(&self) -> &'static [BodyPoint] {
        match self {
            MovementType::InitialPosture => &[
                BodyPoint::LeftShoulder,
                BodyPoint::RightShoulder,
                BodyPoint::LeftEye,
                BodyPoint::RightEye,
            ],
            MovementType::ArmRaise => &[
                BodyPoint::LeftShoulder,
                BodyPoint::RightShoulder,
                BodyPoint::LeftWrist,
                BodyPoint::RightWrist,
            ],
            MovementType::Squat => &[
                BodyPoint::LeftHip,
                BodyPoint::RightHip,
                BodyPoint::LeftKnee,
                BodyPoint::RightKnee,
            ],
            MovementType::NeckRoll => &[BodyPoint::LeftEar, BodyPoint::RightEar],
        }
    }

    fn classifier(&self) -> ClassifierFn {
        match self {
            MovementType::InitialPosture => check_initial_posture,
            MovementType::ArmRaise => check_arm_raise,
            MovementType::Squat => check_squat,
            MovementType::NeckRoll => check_neck_roll,
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = UnsupportedMovement;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|movement| movement.as_str() == value)
            .copied()
            .ok_or_else(|| UnsupportedMovement(value.to_string()))
    }
}

/// Why a frame failed its movement check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    LandmarkMissing,
    ShouldersNotLevel,
    HeadNotLevel,
    LeftArmNotRaised,
    RightArmNotRaised,
    LeftKneeNotBent,
    RightKneeNotBent,
    HeadNotTilted,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::LandmarkMissing => "landmark_missing",
            IssueCode::ShouldersNotLevel => "shoulders_not_level",
            IssueCode::HeadNotLevel => "head_not_level",
            IssueCode::LeftArmNotRaised => "left_arm_not_raised",
            IssueCode::RightArmNotRaised => "right_arm_not_raised",
            IssueCode::LeftKneeNotBent => "left_knee_not_bent",
            IssueCode::RightKneeNotBent => "right_knee_not_bent",
            IssueCode::HeadNotTilted => "head_not_tilted",
        }
    }
}

/// Frame-scoped result of checking one movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub ok: bool,
    pub issues: Vec<IssueCode>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            ok: true,
            issues: Vec::new(),
        }
    }

    pub fn from_issues(issues: Vec<IssueCode>) -> Self {
        Self {
            ok: issues.is_empty(),
            issues,
        }
    }

    pub fn landmark_missing() -> Self {
        Self::from_issues(vec![IssueCode::LandmarkMissing])
    }
}

/// Tolerances shared by every classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassifierConfig {
    /// Maximum shoulder-line tilt still considered level.
    pub shoulder_tolerance_deg: f32,
    /// Maximum eye-line tilt still considered level.
    pub head_tolerance_deg: f32,
    /// Ear-line tilt a neck roll has to exceed.
    pub head_tilt_threshold_deg: f32,
    /// Landmarks below this confidence count as missing.
    pub min_confidence: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            shoulder_tolerance_deg: 10.0,
            head_tolerance_deg: 10.0,
            head_tilt_threshold_deg: 15.0,
            min_confidence: 0.5,
        }
    }
}

/// Visible landmarks for one movement, looked up by name.
struct Points<'a> {
    frame: &'a LandmarkFrame,
    min_confidence: f32,
}

impl Points<'_> {
    /// Only called after `required_points` were verified present.
    fn xy(&self, point: BodyPoint) -> (f32, f32) {
        self.frame
            .visible(point, self.min_confidence)
            .map(|landmark: Landmark| landmark.xy())
            .unwrap_or_default()
    }
}

type ClassifierFn = fn(&Points<'_>, &ClassifierConfig) -> Verdict;

/// Judge one frame against one movement.
///
/// Absent or low-confidence landmarks yield `landmark_missing` instead of an
/// error, so partial occlusion reads as an ordinary failed frame.
pub fn classify(frame: &LandmarkFrame, movement: MovementType, config: &ClassifierConfig) -> Verdict {
    let all_visible = movement
        .required_points()
        .iter()
        .all(|point| frame.visible(*point, config.min_confidence).is_some());
    if !all_visible {
        return Verdict::landmark_missing();
    }

    let points = Points {
        frame,
        min_confidence: config.min_confidence,
    };
    (movement.classifier())(&points, config)
}

fn check_initial_posture(points: &Points<'_>, config: &ClassifierConfig) -> Verdict {
    let shoulder_tilt = tilt_from_horizontal(
        points.xy(BodyPoint::RightShoulder),
        points.xy(BodyPoint::LeftShoulder),
    );
    let head_tilt = tilt_from_horizontal(
        points.xy(BodyPoint::RightEye),
        points.xy(BodyPoint::LeftEye),
    );

    let mut issues = Vec::new();
    if shoulder_tilt > config.shoulder_tolerance_deg {
        issues.push(IssueCode::ShouldersNotLevel);
    }
    if head_tilt > config.head_tolerance_deg {
        issues.push(IssueCode::HeadNotLevel);
    }
    Verdict::from_issues(issues)
}

fn check_arm_raise(points: &Points<'_>, _config: &ClassifierConfig) -> Verdict {
    let mut issues = Vec::new();
    if !is_above(points.xy(BodyPoint::LeftWrist), points.xy(BodyPoint::LeftShoulder)) {
        issues.push(IssueCode::LeftArmNotRaised);
    }
    if !is_above(points.xy(BodyPoint::RightWrist), points.xy(BodyPoint::RightShoulder)) {
        issues.push(IssueCode::RightArmNotRaised);
    }
    Verdict::from_issues(issues)
}

fn check_squat(points: &Points<'_>, _config: &ClassifierConfig) -> Verdict {
    let mut issues = Vec::new();
    if !is_below(points.xy(BodyPoint::LeftKnee), points.xy(BodyPoint::LeftHip)) {
        issues.push(IssueCode::LeftKneeNotBent);
    }
    if !is_below(points.xy(BodyPoint::RightKnee), points.xy(BodyPoint::RightHip)) {
        issues.push(IssueCode::RightKneeNotBent);
    }
    Verdict::from_issues(issues)
}

fn check_neck_roll(points: &Points<'_>, config: &ClassifierConfig) -> Verdict {
    let ear_tilt = tilt_from_horizontal(
        points.xy(BodyPoint::LeftEar),
        points.xy(BodyPoint::RightEar),
    );
    if ear_tilt > config.head_tilt_threshold_deg {
        Verdict::pass()
    } else {
        Verdict::from_issues(vec![IssueCode::HeadNotTilted])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lm(x: f32, y: f32) -> Landmark {
        Landmark::new(x, y, 0.9)
    }

    fn upright() -> LandmarkFrame {
        LandmarkFrame::new()
            .with(BodyPoint::RightShoulder, lm(0.35, 0.55))
            .with(BodyPoint::LeftShoulder, lm(0.65, 0.55))
            .with(BodyPoint::RightEye, lm(0.46, 0.30))
            .with(BodyPoint::LeftEye, lm(0.54, 0.30))
            .with(BodyPoint::RightEar, lm(0.42, 0.32))
            .with(BodyPoint::LeftEar, lm(0.58, 0.32))
            .with(BodyPoint::RightWrist, lm(0.30, 0.85))
            .with(BodyPoint::LeftWrist, lm(0.70, 0.85))
            .with(BodyPoint::RightHip, lm(0.40, 0.90))
            .with(BodyPoint::LeftHip, lm(0.60, 0.90))
            .with(BodyPoint::RightKnee, lm(0.40, 0.80))
            .with(BodyPoint::LeftKnee, lm(0.60, 0.80))
    }

    #[test]
    fn level_posture_passes() {
        let verdict = classify(&upright(), MovementType::InitialPosture, &ClassifierConfig::default());
        assert_eq!(verdict, Verdict::pass());
    }

    #[test]
    fn mirrored_posture_passes() {
        // Same body with left/right swapped horizontally.
        let frame = LandmarkFrame::new()
            .with(BodyPoint::RightShoulder, lm(0.65, 0.55))
            .with(BodyPoint::LeftShoulder, lm(0.35, 0.55))
            .with(BodyPoint::RightEye, lm(0.54, 0.30))
            .with(BodyPoint::LeftEye, lm(0.46, 0.30));
        let verdict = classify(&frame, MovementType::InitialPosture, &ClassifierConfig::default());
        assert!(verdict.ok);
    }

    #[test]
    fn sloped_shoulders_are_reported() {
        let frame = upright().with(BodyPoint::LeftShoulder, lm(0.65, 0.40));
        let verdict = classify(&frame, MovementType::InitialPosture, &ClassifierConfig::default());
        assert!(!verdict.ok);
        assert_eq!(verdict.issues, vec![IssueCode::ShouldersNotLevel]);
    }

    #[test]
    fn shoulder_and_head_issues_keep_order() {
        let frame = upright()
            .with(BodyPoint::LeftShoulder, lm(0.65, 0.40))
            .with(BodyPoint::LeftEye, lm(0.54, 0.20));
        let verdict = classify(&frame, MovementType::InitialPosture, &ClassifierConfig::default());
        assert_eq!(
            verdict.issues,
            vec![IssueCode::ShouldersNotLevel, IssueCode::HeadNotLevel]
        );
    }

    #[test]
    fn tolerance_is_configurable() {
        // About 14 degrees of shoulder slope.
        let frame = upright().with(BodyPoint::LeftShoulder, lm(0.65, 0.475));
        let strict = ClassifierConfig::default();
        let relaxed = ClassifierConfig {
            shoulder_tolerance_deg: 20.0,
            ..ClassifierConfig::default()
        };
        assert!(!classify(&frame, MovementType::InitialPosture, &strict).ok);
        assert!(classify(&frame, MovementType::InitialPosture, &relaxed).ok);
    }

    #[test]
    fn arms_must_both_be_raised() {
        let config = ClassifierConfig::default();
        let lowered = classify(&upright(), MovementType::ArmRaise, &config);
        assert_eq!(
            lowered.issues,
            vec![IssueCode::LeftArmNotRaised, IssueCode::RightArmNotRaised]
        );

        let one_up = upright().with(BodyPoint::LeftWrist, lm(0.70, 0.20));
        assert_eq!(
            classify(&one_up, MovementType::ArmRaise, &config).issues,
            vec![IssueCode::RightArmNotRaised]
        );

        let both_up = one_up.with(BodyPoint::RightWrist, lm(0.30, 0.20));
        assert!(classify(&both_up, MovementType::ArmRaise, &config).ok);
    }

    #[test]
    fn squat_needs_knees_below_hips() {
        let config = ClassifierConfig::default();
        assert!(!classify(&upright(), MovementType::Squat, &config).ok);

        let squatting = upright()
            .with(BodyPoint::RightKnee, lm(0.40, 0.95))
            .with(BodyPoint::LeftKnee, lm(0.60, 0.95));
        assert!(classify(&squatting, MovementType::Squat, &config).ok);
    }

    #[test]
    fn neck_roll_needs_a_clear_tilt() {
        let config = ClassifierConfig::default();
        let level = classify(&upright(), MovementType::NeckRoll, &config);
        assert_eq!(level.issues, vec![IssueCode::HeadNotTilted]);

        let tilted = upright().with(BodyPoint::LeftEar, lm(0.58, 0.22));
        assert!(classify(&tilted, MovementType::NeckRoll, &config).ok);
    }

    #[test]
    fn occluded_landmarks_degrade_to_missing() {
        let config = ClassifierConfig::default();
        let empty = LandmarkFrame::new();
        for movement in MovementType::ALL {
            assert_eq!(classify(&empty, movement, &config), Verdict::landmark_missing());
        }

        let faint = upright().with(BodyPoint::LeftWrist, Landmark::new(0.70, 0.20, 0.1));
        assert_eq!(
            classify(&faint, MovementType::ArmRaise, &config).issues,
            vec![IssueCode::LandmarkMissing]
        );
    }

    #[test]
    fn movement_names_round_trip_and_unknown_fails() {
        for movement in MovementType::ALL {
            assert_eq!(movement.as_str().parse::<MovementType>(), Ok(movement));
        }
        assert_eq!(
            "jumping_jack".parse::<MovementType>(),
            Err(UnsupportedMovement("jumping_jack".into()))
        );
    }
}
