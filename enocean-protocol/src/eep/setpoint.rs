//! Set point scaling for room panels and thermostats.
//!
//! The raw byte is centred on `base`: 127.5 is `base`, 0 and 255 are
//! `base - range` and `base + range`.

use log::warn;
use serde::{Deserialize, Serialize};

/// Range used when sending a set point; gives 12.75 raw steps per kelvin.
pub const SEND_RANGE: f64 = 10.0;

/// Range assumed for set points reported by a panel.
pub const DEFAULT_REPORT_RANGE: f64 = 5.0;

/// Linear mapping between a temperature and a raw set point byte.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointScale {
    pub base: f64,
    pub range: f64,
}

/// Encoded set point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetpointRaw {
    pub raw: u8,
    /// The requested temperature was outside `base ± range`.
    pub clamped: bool,
}

impl SetpointScale {
    pub const fn new(base: f64, range: f64) -> Self {
        Self { base, range }
    }

    /// Scale used for outgoing set points around `base`.
    pub const fn for_sending(base: f64) -> Self {
        Self::new(base, SEND_RANGE)
    }

    /// Encode a temperature, clamping to `0..=255`.
    pub fn encode(&self, temperature: f64) -> SetpointRaw {
        let raw = ((temperature - self.base) * 127.5 / self.range + 127.5).round();

        if raw > 255.0 {
            warn!("Set point {} above range, clipping to 255", temperature);
            SetpointRaw {
                raw: 255,
                clamped: true,
            }
        } else if raw < 0.0 || raw.is_nan() {
            warn!("Set point {} below range, clipping to 0", temperature);
            SetpointRaw {
                raw: 0,
                clamped: true,
            }
        } else {
            SetpointRaw {
                raw: raw as u8,
                clamped: false,
            }
        }
    }

    /// Decode a raw set point byte.
    pub fn decode(&self, raw: u8) -> f64 {
        (raw as f64 * 2.0 / 255.0 - 1.0) * self.range + self.base
    }
}

impl Default for SetpointScale {
    fn default() -> Self {
        Self::new(20.0, DEFAULT_REPORT_RANGE)
    }
}
