use std::fmt;

/// Polarity of a DVS event. Doubles as the type index into per-type maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    Off,
    On,
}

impl Polarity {
    /// Number of distinct event types.
    pub const COUNT: usize = 2;

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Polarity::Off => 0,
            Polarity::On => 1,
        }
    }

    /// Maps any non-positive raw polarity to `Off`.
    pub fn from_raw(raw: i64) -> Self {
        if raw > 0 { Polarity::On } else { Polarity::Off }
    }
}

/// A single pixel event from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub x: u16,
    pub y: u16,
    /// Microseconds, monotonically increasing within a stream.
    pub timestamp_us: i64,
    pub polarity: Polarity,
}

impl EventRecord {
    pub fn new(x: u16, y: u16, timestamp_us: i64, polarity: Polarity) -> Self {
        Self {
            x,
            y,
            timestamp_us,
            polarity,
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.x,
            self.y,
            self.timestamp_us,
            self.polarity.index()
        )
    }
}
