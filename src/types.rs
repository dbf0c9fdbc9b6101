// src/types.rs
use serde::Serialize;

use crate::drivers::ChannelKind;

// Messages the polling thread sends to whoever reports the readings
#[derive(Clone, Debug)]
pub enum AdcMessage {
    Reading(Reading),
    // Fatal error; the device is no longer polled
    DeviceFailed { device: String, error: String },
    // Every device failed, the thread is about to exit
    Stopped,
}

#[derive(Clone, Debug, Serialize)]
pub struct Reading {
    pub device: String,
    pub channel: String,
    pub kind: ChannelKind,
    pub decimal_places: u32,
    /// Volts or ohms; `None` when the input was out of range.
    pub value: Option<f64>,
}

impl Reading {
    /// Value rounded to the channel's decimal places.
    pub fn formatted(&self) -> Option<String> {
        self.value
            .map(|v| format!("{:.*}", self.decimal_places as usize, v))
    }
}
