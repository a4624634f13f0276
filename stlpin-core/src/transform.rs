/// Orbit state used by hosts to move the camera around the model
use nalgebra::{Point3, Vector3};

/// Keeps the eye off the poles where `up` would become parallel to the view direction
const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.01;
const MIN_DISTANCE: f32 = 1e-3;

/// Spherical eye position around a target (angles in radians)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orbit {
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
}

impl Orbit {
    pub fn new(yaw: f32, pitch: f32, distance: f32) -> Self {
        Self {
            yaw,
            pitch: pitch.clamp(-MAX_PITCH, MAX_PITCH),
            distance: distance.max(MIN_DISTANCE),
        }
    }

    /// Looking down -Z from `distance` along +Z
    pub fn facing(distance: f32) -> Self {
        Self::new(0.0, 0.0, distance)
    }

    /// Rotate by delta amounts (in radians)
    pub fn rotate(&mut self, dyaw: f32, dpitch: f32) {
        self.yaw += dyaw;
        self.pitch = (self.pitch + dpitch).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Scale the distance; factors below 1 move closer
    pub fn zoom(&mut self, factor: f32) {
        self.distance = (self.distance * factor).max(MIN_DISTANCE);
    }

    /// Eye position for this orbit around `target`
    pub fn eye(&self, target: &Point3<f32>) -> Point3<f32> {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let direction = Vector3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw);
        target + direction * self.distance
    }
}

impl Default for Orbit {
    fn default() -> Self {
        Self::facing(5.0)
    }
}
