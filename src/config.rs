// src/config.rs
//! JSON configuration model.
//!
//! The file is deserialized as-is; only the fields the engine needs are
//! modelled and missing optional fields fall back to the LRADC defaults below.
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/sysfs-adc.conf";

/// Raw-to-millivolt factor of the i.MX23/28 LRADC (1.85 V reference, 12 bits).
pub const MXS_LRADC_DEFAULT_SCALE: f64 = 0.451660156;

/// Page holding the LRADC register block on i.MX23/28.
pub const MXS_LRADC_BASE_ADDRESS: u64 = 0x8005_0000;

#[derive(Debug, Clone, Deserialize)]
pub struct AdcConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_sysfs_dir")]
    pub sysfs_dir: PathBuf,
    #[serde(default)]
    pub current_source: Option<CurrentSourceConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl AdcConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CurrentSourceConfig {
    /// Current sources built into the i.MX23/28 LRADC, driven through `/dev/mem`.
    MxsLradc {
        #[serde(default = "default_mem_device")]
        device: PathBuf,
        #[serde(default = "default_lradc_base")]
        base_address: u64,
    },
}

/// One physical ADC channel, possibly fanned out through a multiplexer.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    /// IIO channel name, e.g. `voltage1` for `in_voltage1_raw`.
    pub channel_number: String,
    /// Substring of the device link target; empty selects `iio:device0`.
    #[serde(default)]
    pub match_iio: String,
    #[serde(default = "default_averaging_window")]
    pub averaging_window: usize,
    /// Ceiling for `scale * raw`, in millivolts.
    #[serde(default = "default_max_voltage")]
    pub max_voltage: f64,
    #[serde(default = "default_max_adc_value")]
    pub max_adc_value: i32,
    /// Desired scale; zero or negative picks the largest available one.
    #[serde(default)]
    pub scale: f64,
    #[serde(default = "default_scale")]
    pub default_scale: f64,
    #[serde(default)]
    pub min_switch_interval_ms: u64,
    #[serde(default = "default_sample_delay_ms")]
    pub sample_delay_ms: u64,
    /// GPIO lines driving mux address bits A, B and C. Absent for direct inputs.
    #[serde(default)]
    pub gpios: Option<[u32; 3]>,
    #[serde(default)]
    pub mux: Vec<MuxChannelConfig>,
}

impl DeviceConfig {
    pub fn min_switch_interval(&self) -> Duration {
        Duration::from_millis(self.min_switch_interval_ms)
    }

    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }

    /// True when every mux input is a resistance channel, in which case the
    /// current source may stay on permanently.
    pub fn resistance_only(&self) -> bool {
        !self.mux.is_empty()
            && self
                .mux
                .iter()
                .all(|ch| matches!(ch.kind, ChannelKindConfig::Resistance(_)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MuxChannelConfig {
    pub mux_channel_number: u8,
    pub id: String,
    #[serde(default = "default_readings_number")]
    pub readings_number: usize,
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
    /// `-1` in the file means no discharge input.
    #[serde(default, deserialize_with = "discharge_from_index")]
    pub discharge_channel: Option<u8>,
    #[serde(flatten)]
    pub kind: ChannelKindConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelKindConfig {
    Voltage {
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
    Resistance(ResistanceConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResistanceConfig {
    /// Source current in microamps.
    pub current: u32,
    pub resistance1: f64,
    pub resistance2: f64,
    #[serde(default = "default_multiplier")]
    pub current_calibration_factor: f64,
    /// Defaults to on when the device only carries resistance channels.
    #[serde(default)]
    pub current_source_always_on: Option<bool>,
}

fn discharge_from_index<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let index = Option::<i64>::deserialize(deserializer)?;
    match index {
        None => Ok(None),
        Some(i) if i < 0 => Ok(None),
        Some(i) => u8::try_from(i)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("discharge channel {i} out of range"))),
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}
fn default_sysfs_dir() -> PathBuf {
    PathBuf::from("/sys")
}
fn default_mem_device() -> PathBuf {
    PathBuf::from("/dev/mem")
}
fn default_lradc_base() -> u64 {
    MXS_LRADC_BASE_ADDRESS
}
fn default_averaging_window() -> usize {
    10
}
fn default_max_voltage() -> f64 {
    3100.0
}
fn default_max_adc_value() -> i32 {
    4095
}
fn default_scale() -> f64 {
    MXS_LRADC_DEFAULT_SCALE
}
fn default_sample_delay_ms() -> u64 {
    10
}
fn default_readings_number() -> usize {
    10
}
fn default_decimal_places() -> u32 {
    3
}
fn default_multiplier() -> f64 {
    1.0
}
