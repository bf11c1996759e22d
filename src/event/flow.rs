use nalgebra::Vector2;

/// Instantaneous image-plane velocity in pixels per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlowVector {
    pub vx: f64,
    pub vy: f64,
}

impl FlowVector {
    pub const ZERO: FlowVector = FlowVector { vx: 0.0, vy: 0.0 };

    pub fn new(vx: f64, vy: f64) -> Self {
        Self { vx, vy }
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    #[inline]
    pub fn dot(&self, other: &FlowVector) -> f64 {
        self.vx * other.vx + self.vy * other.vy
    }

    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite()
    }

    pub fn as_vector(&self) -> Vector2<f64> {
        Vector2::new(self.vx, self.vy)
    }

    /// Direction in degrees, measured counter-clockwise from +x.
    pub fn angle_deg(&self) -> f64 {
        self.vy.atan2(self.vx).to_degrees()
    }
}

impl From<Vector2<f64>> for FlowVector {
    fn from(v: Vector2<f64>) -> Self {
        Self { vx: v.x, vy: v.y }
    }
}
