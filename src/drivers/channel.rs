use std::fmt;
use std::rc::Rc;
use std::thread;
use log::{debug, info};
use serde::Serialize;
use crate::config::{ChannelKindConfig, DeviceConfig, MuxChannelConfig, ResistanceConfig};
use crate::drivers::buffer::AveragingBuffer;
use crate::drivers::conversion::{resistance_from_voltage, sensor_voltage, voltage_from_raw};
use crate::drivers::current_source::SharedCurrentSource;
use crate::drivers::device::SharedDevice;
use crate::drivers::AdcError;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Voltage,
    Resistance,
}
impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Voltage => "voltage",
            ChannelKind::Resistance => "resistance",
        }
    }
}
impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
/// State every converter carries: its mux input, its averaging buffer and the
/// device it samples through.
struct ChannelCore {
    device: SharedDevice,
    input: u8,
    id: String,
    decimal_places: u32,
    buffer: AveragingBuffer,
}
impl ChannelCore {
    fn new(device: &SharedDevice, cfg: &MuxChannelConfig) -> Result<Self, AdcError> {
        let dev = device.borrow();
        if !dev.supports_input(cfg.mux_channel_number) {
            return Err(AdcError::InvalidConfig(format!(
                "{}: mux input {} is out of range",
                cfg.id, cfg.mux_channel_number
            )));
        }
        Ok(Self {
            device: Rc::clone(device),
            input: cfg.mux_channel_number,
            id: cfg.id.clone(),
            decimal_places: cfg.decimal_places,
            buffer: AveragingBuffer::new(cfg.readings_number, dev.averaging_window())?,
        })
    }
    /// Runs one sampling cycle and returns the averaged raw value with the
    /// device scale, or `None` when the average is out of range.
    fn averaged(&mut self) -> Result<Option<(i32, f64)>, AdcError> {
        let mut device = self.device.borrow_mut();
        let input = self.input;
        let delay = device.sample_delay();
        self.buffer.refresh(|| device.sample(input), delay)?;
        let average = self.buffer.average();
        debug!("{} = {average}", self.id);
        if !device.accepts(&self.id, average) {
            return Ok(None);
        }
        Ok(Some((average, device.scale())))
    }
}
/// Plain voltage input, optionally behind a divider (`multiplier`).
pub struct VoltageChannel {
    core: ChannelCore,
    multiplier: f64,
}
impl VoltageChannel {
    pub fn read(&mut self) -> Result<Option<f64>, AdcError> {
        let multiplier = self.multiplier;
        Ok(self
            .core
            .averaged()?
            .map(|(raw, scale)| voltage_from_raw(raw, scale, multiplier)))
    }
}
/// Resistive sensor excited by the current source.
pub struct ResistanceChannel {
    core: ChannelCore,
    discharge: Option<u8>,
    current_ua: u32,
    calibration_factor: f64,
    resistance1: f64,
    resistance2: f64,
    always_on: bool,
    source: SharedCurrentSource,
    source_channel: u8,
}
impl ResistanceChannel {
    fn new(
        core: ChannelCore,
        discharge: Option<u8>,
        cfg: &ResistanceConfig,
        always_on: bool,
        source: &SharedCurrentSource,
        source_channel: u8,
    ) -> Result<Self, AdcError> {
        let channel = Self {
            core,
            discharge,
            current_ua: cfg.current,
            calibration_factor: cfg.current_calibration_factor,
            resistance1: cfg.resistance1,
            resistance2: cfg.resistance2,
            always_on,
            source: Rc::clone(source),
            source_channel,
        };
        if always_on {
            channel
                .source
                .borrow_mut()
                .set_up(source_channel, channel.current_ua)?;
        }
        Ok(channel)
    }
    pub fn read(&mut self) -> Result<Option<f64>, AdcError> {
        let delay = {
            let mut device = self.core.device.borrow_mut();
            if let Some(discharge) = self.discharge {
                device.select_input(discharge)?;
            }
            device.select_input(self.core.input)?;
            device.sample_delay()
        };
        if self.always_on {
            return self.measure();
        }
        self.source
            .borrow_mut()
            .set_up(self.source_channel, self.current_ua)?;
        thread::sleep(delay);
        let reading = self.measure();
        let switched_off = self.source.borrow_mut().switch_off(self.source_channel);
        let value = reading?;
        switched_off?;
        Ok(value)
    }
    fn measure(&mut self) -> Result<Option<f64>, AdcError> {
        let Some((raw, scale)) = self.core.averaged()? else {
            return Ok(None);
        };
        let voltage = sensor_voltage(raw, scale);
        let ohms = resistance_from_voltage(
            voltage,
            self.current_ua,
            self.calibration_factor,
            self.resistance1,
            self.resistance2,
        );
        if ohms.is_none() {
            debug!("{}: open input at {voltage} V", self.core.id);
        }
        Ok(ohms)
    }
}
/// Converter for one configured mux input.
pub enum AdcChannel {
    Voltage(VoltageChannel),
    Resistance(ResistanceChannel),
}
impl AdcChannel {
    fn core(&self) -> &ChannelCore {
        match self {
            AdcChannel::Voltage(ch) => &ch.core,
            AdcChannel::Resistance(ch) => &ch.core,
        }
    }
    pub fn id(&self) -> &str {
        &self.core().id
    }
    pub fn kind(&self) -> ChannelKind {
        match self {
            AdcChannel::Voltage(_) => ChannelKind::Voltage,
            AdcChannel::Resistance(_) => ChannelKind::Resistance,
        }
    }
    pub fn decimal_places(&self) -> u32 {
        self.core().decimal_places
    }
    /// Volts or ohms, `None` when the reading is out of range this cycle.
    pub fn read(&mut self) -> Result<Option<f64>, AdcError> {
        match self {
            AdcChannel::Voltage(ch) => ch.read(),
            AdcChannel::Resistance(ch) => ch.read(),
        }
    }
}
/// Builds the converters for every mux input of `cfg` on top of `device`.
///
/// The device's current source is switched off first. Resistance channels
/// without an explicit always-on flag keep the source on permanently when the
/// device carries nothing but resistance channels.
pub fn build_channels(
    device: &SharedDevice,
    cfg: &DeviceConfig,
    source: &SharedCurrentSource,
) -> Result<Vec<AdcChannel>, AdcError> {
    let source_channel = device.borrow().current_source_channel();
    if let Some(channel) = source_channel {
        source.borrow_mut().switch_off(channel)?;
    }
    let resistance_only = cfg.resistance_only();
    let mut channels = Vec::with_capacity(cfg.mux.len());
    for mux in &cfg.mux {
        let core = ChannelCore::new(device, mux)?;
        let channel = match &mux.kind {
            ChannelKindConfig::Voltage { multiplier } => AdcChannel::Voltage(VoltageChannel {
                core,
                multiplier: *multiplier,
            }),
            ChannelKindConfig::Resistance(res) => {
                let source_channel = source_channel.ok_or_else(|| {
                    AdcError::InvalidConfig(format!(
                        "{}: no current source for IIO channel {}",
                        mux.id, cfg.channel_number
                    ))
                })?;
                let always_on = res.current_source_always_on.unwrap_or(resistance_only);
                AdcChannel::Resistance(ResistanceChannel::new(
                    core,
                    mux.discharge_channel,
                    res,
                    always_on,
                    source,
                    source_channel,
                )?)
            }
        };
        info!(
            "{}: {} channel {} on mux input {}",
            cfg.id,
            channel.kind(),
            mux.id,
            mux.mux_channel_number
        );
        channels.push(channel);
    }
    Ok(channels)
}
