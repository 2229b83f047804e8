use serde::{Deserialize, Serialize};

use crate::backpack::{BlinkRate, DEFAULT_BRIGHTNESS};
use crate::I2C_ADDR;

/// Startup settings for a backpack. Missing fields fall back to [`Config::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bus: u8,
    pub address: u8,
    /// Clamped to `0..=15` when applied.
    pub brightness: u8,
    pub blink_rate: BlinkRate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: 0,
            address: I2C_ADDR,
            brightness: DEFAULT_BRIGHTNESS,
            blink_rate: BlinkRate::Off,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
