use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use log::debug;
use crate::drivers::sysfs::{open_attr, write_attr};
use crate::drivers::AdcError;
/// Number of inputs a 3-bit address can reach.
pub const MUX_INPUTS: u8 = 8;
/// Routes one physical input to the ADC channel.
pub trait InputSelector {
    fn select_input(&mut self, input: u8) -> Result<(), AdcError>;
    fn supports_input(&self, _input: u8) -> bool {
        true
    }
}
/// ADC channel wired straight to a single input.
#[derive(Debug, Default)]
pub struct DirectInput;
impl InputSelector for DirectInput {
    fn select_input(&mut self, _input: u8) -> Result<(), AdcError> {
        Ok(())
    }
}
/// 8-to-1 analog multiplexer addressed through three sysfs GPIO lines.
///
/// Re-selecting the current input is free. Any actual switch is followed by
/// `min_switch_interval` of settle time, and two switches are never closer
/// together than that interval.
#[derive(Debug)]
pub struct GpioMux {
    gpio_root: PathBuf,
    lines: [u32; 3],
    min_switch_interval: Duration,
    current: Option<u8>,
    last_switch: Option<Instant>,
    initialized: bool,
}
impl GpioMux {
    pub fn new(gpio_root: impl Into<PathBuf>, lines: [u32; 3], min_switch_interval: Duration) -> Self {
        Self {
            gpio_root: gpio_root.into(),
            lines,
            min_switch_interval,
            current: None,
            last_switch: None,
            initialized: false,
        }
    }
    pub fn current_input(&self) -> Option<u8> {
        self.current
    }
    pub fn last_switch(&self) -> Option<Instant> {
        self.last_switch
    }
    fn gpio_path(&self, gpio: u32, attr: &str) -> PathBuf {
        self.gpio_root.join(format!("gpio{gpio}")).join(attr)
    }
    fn init(&mut self) -> Result<(), AdcError> {
        if self.initialized {
            return Ok(());
        }
        for gpio in self.lines {
            self.make_output(gpio)?;
        }
        self.initialized = true;
        Ok(())
    }
    fn make_output(&self, gpio: u32) -> Result<(), AdcError> {
        let direction = self.gpio_path(gpio, "direction");
        let mut file = match open_attr(&direction) {
            Ok(file) => file,
            Err(_) => {
                debug!("exporting GPIO {gpio}");
                write_attr(&self.gpio_root.join("export"), &format!("{gpio}\n")).map_err(
                    |source| AdcError::GpioControlFailed {
                        gpio,
                        action: "export",
                        source,
                    },
                )?;
                open_attr(&direction).map_err(|source| AdcError::GpioControlFailed {
                    gpio,
                    action: "set direction of",
                    source,
                })?
            }
        };
        file.write_all(b"out")
            .map_err(|source| AdcError::GpioControlFailed {
                gpio,
                action: "set direction of",
                source,
            })
    }
    fn set_value(&self, gpio: u32, high: bool) -> Result<(), AdcError> {
        let value = if high { "1\n" } else { "0\n" };
        write_attr(&self.gpio_path(gpio, "value"), value).map_err(|source| {
            AdcError::GpioControlFailed {
                gpio,
                action: "set value of",
                source,
            }
        })
    }
}
impl InputSelector for GpioMux {
    fn select_input(&mut self, input: u8) -> Result<(), AdcError> {
        self.init()?;
        if self.current == Some(input) {
            return Ok(());
        }
        if !self.supports_input(input) {
            return Err(AdcError::InvalidConfig(format!(
                "mux input {input} needs more than three address lines"
            )));
        }
        if let Some(last) = self.last_switch {
            let elapsed = last.elapsed();
            if elapsed < self.min_switch_interval {
                thread::sleep(self.min_switch_interval - elapsed);
            }
        }
        debug!("mux: select input {input}");
        for (bit, &gpio) in self.lines.iter().enumerate() {
            self.set_value(gpio, (input >> bit) & 1 == 1)?;
        }
        self.current = Some(input);
        self.last_switch = Some(Instant::now());
        thread::sleep(self.min_switch_interval);
        Ok(())
    }
    fn supports_input(&self, input: u8) -> bool {
        input < MUX_INPUTS
    }
}
