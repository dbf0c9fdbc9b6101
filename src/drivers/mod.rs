// src/drivers/mod.rs
pub mod buffer;
pub mod channel;
pub mod conversion;
pub mod current_source;
pub mod device;
pub mod error;
pub mod mux;
pub mod scale;
mod sysfs;
pub use buffer::AveragingBuffer;
pub use channel::{build_channels, AdcChannel, ChannelKind, ResistanceChannel, VoltageChannel};
pub use current_source::{
    CurrentSource, MxsLradcCurrentSource, NoCurrentSource, SharedCurrentSource,
};
pub use device::{find_iio_dir, AdcDevice, SharedDevice};
pub use error::AdcError;
pub use mux::{DirectInput, GpioMux, InputSelector};
pub use scale::{find_best_scale, select_scale};
