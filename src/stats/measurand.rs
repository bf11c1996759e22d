//! Numerically stable running mean and standard deviation.

use std::fmt;

/// Running mean/variance accumulator (Welford's algorithm).
///
/// The mean is undefined until the first sample arrives, so it is exposed
/// as an `Option`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurand {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Measurand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample standard deviation; zero for fewer than two samples.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / (self.count - 1) as f64).sqrt()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for Measurand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mean() {
            Some(mean) => write!(f, "{:.2} +/- {:.2} (n={})", mean, self.std_dev(), self.count),
            None => write!(f, "n/a (n=0)"),
        }
    }
}
