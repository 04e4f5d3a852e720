//! Planar geometry over normalized landmark coordinates.
//!
//! Image space has y growing downward, so "above" means a smaller y.

/// Angle of the line from `a` to `b`, in degrees within [0, 180].
///
/// The absolute value of the line's direction: 0° when `b` is level and to
/// the right of `a`, 180° when level and to the left.
pub fn angle_between(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    dy.atan2(dx).to_degrees().abs()
}

/// How far the line through `a` and `b` leans away from horizontal, in [0, 90].
///
/// Direction-agnostic, so mirrored feeds read the same as unmirrored ones.
pub fn tilt_from_horizontal(a: (f32, f32), b: (f32, f32)) -> f32 {
    let angle = angle_between(a, b);
    angle.min(180.0 - angle)
}

/// Whether `point` sits higher in the frame than `reference`.
pub fn is_above(point: (f32, f32), reference: (f32, f32)) -> bool {
    point.1 < reference.1
}

/// Whether `point` sits lower in the frame than `reference`.
pub fn is_below(point: (f32, f32), reference: (f32, f32)) -> bool {
    point.1 > reference.1
}
