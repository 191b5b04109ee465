use serde::{Deserialize, Serialize};

/// Readings strictly above this are flagged as intense.
pub const INTENSE_THRESHOLD: f64 = 70.0;

/// A single analyst score as shown in a gauge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Gauge {
    pub value: f64,
}

impl Gauge {
    /// Missing readings default to zero.
    pub fn from_reading(reading: Option<f64>) -> Self {
        Self {
            value: reading.unwrap_or(0.0),
        }
    }

    pub fn is_intense(&self) -> bool {
        self.value > INTENSE_THRESHOLD
    }

    /// Bar fill in percent. Only the rendered width is clamped; `value` keeps the raw reading.
    pub fn display_percent(&self) -> u16 {
        if self.value.is_nan() {
            return 0;
        }
        self.value.round().clamp(0.0, 100.0) as u16
    }
}

/// The heat / ROI pair revealed by the first analyst update carrying metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsPanel {
    pub heat: Gauge,
    pub roi: Gauge,
}

impl MetricsPanel {
    pub fn from_readings(heat: Option<f64>, roi: Option<f64>) -> Self {
        Self {
            heat: Gauge::from_reading(heat),
            roi: Gauge::from_reading(roi),
        }
    }
}
