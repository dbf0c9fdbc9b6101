use std::path::PathBuf;
use thiserror::Error;
/// Fatal driver errors. Transient "not available" readings are not errors and
/// never show up here; converters report them as `Ok(None)`.
#[derive(Debug, Error)]
pub enum AdcError {
    #[error("cannot open sysfs IIO directory {path:?}: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no sysfs IIO device matches {pattern:?}")]
    DeviceNotFound { pattern: String },
    #[error("cannot open {path:?}: {source}")]
    FileUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot commit scale to {path:?}: {source}")]
    ScaleWriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unable to {action} GPIO {gpio}: {source}")]
    GpioControlFailed {
        gpio: u32,
        action: &'static str,
        source: std::io::Error,
    },
    #[error("failed to read raw sample from {path:?}: {source}")]
    RawRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("raw sample {content:?} in {path:?} is not an integer")]
    InvalidRawSample { path: PathBuf, content: String },
    #[error("current source error: {0}")]
    CurrentSource(String),
    #[error("invalid channel configuration: {0}")]
    InvalidConfig(String),
}
