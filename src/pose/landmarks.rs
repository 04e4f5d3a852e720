//! Landmark frames delivered by the external pose estimator.
//!
//! A frame maps each of the 33 well-known body points to a normalized 2D
//! position plus a confidence score. Frames are built once per camera tick
//! and never mutated afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Number of body points produced by the pose model.
pub const LANDMARK_COUNT: usize = 33;

/// Values per landmark in a flat buffer: x, y, confidence.
const FLAT_STRIDE: usize = 3;

/// Named body points, in the pose model's index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPoint {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl BodyPoint {
    pub const ALL: [BodyPoint; LANDMARK_COUNT] = [
        BodyPoint::Nose,
        BodyPoint::LeftEyeInner,
        BodyPoint::LeftEye,
        BodyPoint::LeftEyeOuter,
        BodyPoint::RightEyeInner,
        BodyPoint::RightEye,
        BodyPoint::RightEyeOuter,
        BodyPoint::LeftEar,
        BodyPoint::RightEar,
        BodyPoint::MouthLeft,
        BodyPoint::MouthRight,
        BodyPoint::LeftShoulder,
        BodyPoint::RightShoulder,
        BodyPoint::LeftElbow,
        BodyPoint::RightElbow,
        BodyPoint::LeftWrist,
        BodyPoint::RightWrist,
        BodyPoint::LeftPinky,
        BodyPoint::RightPinky,
        BodyPoint::LeftIndex,
        BodyPoint::RightIndex,
        BodyPoint::LeftThumb,
        BodyPoint::RightThumb,
        BodyPoint::LeftHip,
        BodyPoint::RightHip,
        BodyPoint::LeftKnee,
        BodyPoint::RightKnee,
        BodyPoint::LeftAnkle,
        BodyPoint::RightAnkle,
        BodyPoint::LeftHeel,
        BodyPoint::RightHeel,
        BodyPoint::LeftFootIndex,
        BodyPoint::RightFootIndex,
    ];

    /// Position of this point in the model's output.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// A single landmark in normalized frame space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Detection confidence in [0, 1]. MediaPipe calls this `visibility`.
    #[serde(alias = "visibility", default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl Landmark {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn xy(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// One camera tick worth of landmarks. Points the model did not report are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "HashMap<BodyPoint, Landmark>",
    into = "HashMap<BodyPoint, Landmark>"
)]
pub struct LandmarkFrame {
    points: [Option<Landmark>; LANDMARK_COUNT],
}

impl Default for LandmarkFrame {
    fn default() -> Self {
        Self {
            points: [None; LANDMARK_COUNT],
        }
    }
}

impl LandmarkFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy when assembling frames by hand.
    pub fn with(mut self, point: BodyPoint, landmark: Landmark) -> Self {
        self.points[point.index()] = Some(landmark);
        self
    }

    /// Parse the flat `[x, y, confidence] * 33` buffer the pose bridge emits.
    /// Returns `None` when the buffer has the wrong length.
    pub fn from_flat(data: &[f32]) -> Option<Self> {
        if data.len() != LANDMARK_COUNT * FLAT_STRIDE {
            return None;
        }

        let mut frame = Self::default();
        for (slot, chunk) in frame.points.iter_mut().zip(data.chunks_exact(FLAT_STRIDE)) {
            *slot = Some(Landmark::new(chunk[0], chunk[1], chunk[2]));
        }
        Some(frame)
    }

    pub fn get(&self, point: BodyPoint) -> Option<&Landmark> {
        self.points[point.index()].as_ref()
    }

    /// The landmark for `point` if present with at least `min_confidence`.
    pub fn visible(&self, point: BodyPoint, min_confidence: f32) -> Option<Landmark> {
        self.get(point)
            .filter(|landmark| landmark.confidence >= min_confidence)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.points.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<HashMap<BodyPoint, Landmark>> for LandmarkFrame {
    fn from(map: HashMap<BodyPoint, Landmark>) -> Self {
        map.into_iter()
            .fold(Self::default(), |frame, (point, landmark)| frame.with(point, landmark))
    }
}

impl From<LandmarkFrame> for HashMap<BodyPoint, Landmark> {
    fn from(frame: LandmarkFrame) -> Self {
        BodyPoint::ALL
            .iter()
            .filter_map(|point| frame.get(*point).map(|landmark| (*point, *landmark)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_model_order() {
        assert_eq!(BodyPoint::Nose.index(), 0);
        assert_eq!(BodyPoint::LeftShoulder.index(), 11);
        assert_eq!(BodyPoint::RightFootIndex.index(), 32);
        assert_eq!(BodyPoint::from_index(12), Some(BodyPoint::RightShoulder));
        assert_eq!(BodyPoint::from_index(33), None);
    }

    #[test]
    fn flat_buffer_requires_exact_length() {
        assert!(LandmarkFrame::from_flat(&[0.0; 98]).is_none());

        let mut data = vec![0.0; 99];
        data[11 * 3] = 0.6;
        data[11 * 3 + 1] = 0.4;
        data[11 * 3 + 2] = 0.9;
        let frame = LandmarkFrame::from_flat(&data).unwrap();
        assert_eq!(frame.len(), LANDMARK_COUNT);
        assert_eq!(
            frame.get(BodyPoint::LeftShoulder),
            Some(&Landmark::new(0.6, 0.4, 0.9))
        );
    }

    #[test]
    fn low_confidence_points_are_not_visible() {
        let frame = LandmarkFrame::new().with(BodyPoint::Nose, Landmark::new(0.5, 0.2, 0.3));
        assert!(frame.visible(BodyPoint::Nose, 0.5).is_none());
        assert!(frame.visible(BodyPoint::Nose, 0.2).is_some());
        assert!(frame.visible(BodyPoint::LeftEar, 0.0).is_none());
    }

    #[test]
    fn deserializes_from_named_points() {
        let json = r#"{
            "left_shoulder": {"x": 0.6, "y": 0.5, "visibility": 0.8},
            "nose": {"x": 0.5, "y": 0.3}
        }"#;
        let frame: LandmarkFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.get(BodyPoint::LeftShoulder).unwrap().confidence, 0.8);
        assert_eq!(frame.get(BodyPoint::Nose).unwrap().confidence, 1.0);
    }

    #[test]
    fn rejects_unknown_point_names() {
        let json = r#"{"left_antenna": {"x": 0.1, "y": 0.1}}"#;
        assert!(serde_json::from_str::<LandmarkFrame>(json).is_err());
    }
}
