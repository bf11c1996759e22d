//! Planar rigid transforms for image-plane motion.
//!
//! Camera rotation over a short interval is approximated on the image plane
//! by a roll rotation about the sensor centre followed by a pan/tilt
//! translation.

use nalgebra::{Rotation2, Vector2};

/// Rigid transform `p' = R(theta) * p + t` on the image plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rigid2 {
    pub rotation: Rotation2<f64>,
    pub translation: Vector2<f64>,
}

impl Rigid2 {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation2::identity(),
            translation: Vector2::zeros(),
        }
    }

    pub fn new(angle_rad: f64, translation: Vector2<f64>) -> Self {
        Self {
            rotation: Rotation2::new(angle_rad),
            translation,
        }
    }

    #[inline]
    pub fn apply(&self, p: &Vector2<f64>) -> Vector2<f64> {
        self.rotation * p + self.translation
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }
}

impl Default for Rigid2 {
    fn default() -> Self {
        Self::identity()
    }
}
