//! Viewpoint interpolation
//!
//! Blends the camera between the two Command-Info samples bracketing the view
//! target tick. Orientation is blended with quaternion slerp.

use glam::{EulerRot, Quat, Vec3};

use crate::replay::types::{ViewPose, ViewTransition};

/// Thresholds above which a change between samples is treated as a teleport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationLimits {
    /// Units per second
    pub max_velocity: f32,
    /// Degrees per second
    pub max_angular_velocity: f32,
}

impl Default for InterpolationLimits {
    fn default() -> Self {
        Self {
            max_velocity: 4000.0,
            max_angular_velocity: 2000.0,
        }
    }
}

/// One camera sample at a point in playback time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSample {
    /// Seconds since the last resync
    pub time: f32,
    pub transition: ViewTransition,
    pub pose: ViewPose,
}

/// Per-slot interpolator
#[derive(Debug, Clone, Default)]
pub struct ViewInterpolator {
    limits: InterpolationLimits,
    last_applied: Option<ViewPose>,
}

impl ViewInterpolator {
    pub fn new(limits: InterpolationLimits) -> Self {
        Self {
            limits,
            last_applied: None,
        }
    }

    pub fn limits(&self) -> InterpolationLimits {
        self.limits
    }

    /// Remember the pose of the most recently delivered record
    pub fn record_applied(&mut self, pose: ViewPose) {
        self.last_applied = Some(pose);
    }

    /// Forget velocity history, e.g. after a seek
    pub fn reset(&mut self) {
        self.last_applied = None;
    }

    /// Blend `prev` toward `next` by `t`.
    ///
    /// Returns `next.pose` unchanged when the samples describe a teleport.
    pub fn interpolate(&self, prev: &ViewSample, next: &ViewSample, t: f32) -> ViewPose {
        if self.is_teleport(prev, next) {
            return next.pose;
        }
        if t <= 0.0 {
            return prev.pose;
        }
        if t >= 1.0 {
            return next.pose;
        }

        ViewPose {
            origin: prev.pose.origin.lerp(next.pose.origin, t),
            angles: quat_to_angles(blend_orientation(prev.pose.angles, next.pose.angles, t)),
            local_angles: quat_to_angles(blend_orientation(
                prev.pose.local_angles,
                next.pose.local_angles,
                t,
            )),
        }
    }

    fn is_teleport(&self, prev: &ViewSample, next: &ViewSample) -> bool {
        if next.transition == ViewTransition::Discontinuous {
            return true;
        }
        let dt = next.time - prev.time;
        if dt <= 0.0 {
            return false;
        }

        let from = self.last_applied.unwrap_or(prev.pose).origin;
        let velocity = next.pose.origin.distance(from) / dt;
        let angular = max_angle_delta(prev.pose.local_angles, next.pose.local_angles)
            .max(max_angle_delta(prev.pose.angles, next.pose.angles))
            / dt;

        velocity > self.limits.max_velocity || angular > self.limits.max_angular_velocity
    }
}

/// Spherical blend between two pitch/yaw/roll orientations in degrees
pub fn blend_orientation(from: Vec3, to: Vec3, t: f32) -> Quat {
    angles_to_quat(from)
        .slerp(angles_to_quat(to), t.clamp(0.0, 1.0))
        .normalize()
}

pub fn angles_to_quat(angles: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZYX,
        angles.y.to_radians(),
        angles.x.to_radians(),
        angles.z.to_radians(),
    )
}

pub fn quat_to_angles(q: Quat) -> Vec3 {
    let (yaw, pitch, roll) = q.to_euler(EulerRot::ZYX);
    Vec3::new(pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
}

/// Wrap an angle into (-180, 180]
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

fn max_angle_delta(a: Vec3, b: Vec3) -> f32 {
    (0..3)
        .map(|i| normalize_angle(b[i] - a[i]).abs())
        .fold(0.0, f32::max)
}
