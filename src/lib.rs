//! Multiplexed sampling and calibration of Linux IIO ADC channels.
//!
//! The driver layer talks to sysfs directly: an [`drivers::AdcDevice`] owns
//! the raw-sample file and the calibrated scale, channels share it through
//! `Rc<RefCell<_>>` and turn averaged raw samples into volts or ohms. The
//! [`engine`] polls every configured channel from one thread.
pub mod config;
pub mod drivers;
pub mod engine;
pub mod types;
