//! One-shot scale calibration run while a device is opened.
use std::path::Path;
use log::{debug, info, warn};
use crate::drivers::sysfs::{read_first, write_attr};
use crate::drivers::AdcError;
/// Picks a scale out of `candidates`.
///
/// With a positive `desired` scale the closest candidate wins, otherwise the
/// largest one does. Ties keep the candidate seen first. Tokens that do not
/// parse as numbers are skipped. Returns the winning token with its value.
pub fn find_best_scale<'a, I>(candidates: I, desired: f64) -> Option<(&'a str, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, f64)> = None;
    for token in candidates {
        let Ok(value) = token.parse::<f64>() else {
            debug!("skipping malformed scale {token:?}");
            continue;
        };
        let better = match best {
            None => true,
            Some((_, current)) if desired > 0.0 => {
                (value - desired).abs() < (current - desired).abs()
            }
            Some((_, current)) => value > current,
        };
        if better {
            best = Some((token, value));
        }
    }
    best
}
/// Selects and commits the scale for `channel` of the IIO device at `iio_dir`.
///
/// Falls back to the current per-channel or per-device scale when no list of
/// available scales exists, and to `default_scale` when neither can be read.
pub fn select_scale(
    iio_dir: &Path,
    channel: &str,
    desired: f64,
    default_scale: f64,
) -> Result<f64, AdcError> {
    let scale_path = iio_dir.join(format!("in_{channel}_scale"));
    let available = [
        iio_dir.join(format!("in_{channel}_scale_available")),
        iio_dir.join("in_voltage_scale_available"),
        iio_dir.join("scale_available"),
    ];
    if let Some((source, contents)) = read_first(&available) {
        debug!("available scales in {}: {}", source.display(), contents.trim());
        if let Some((token, value)) = find_best_scale(contents.split_whitespace(), desired) {
            write_attr(&scale_path, token).map_err(|source| AdcError::ScaleWriteFailed {
                path: scale_path.clone(),
                source,
            })?;
            info!("{} is set to {token}", scale_path.display());
            return Ok(value);
        }
        warn!("no usable scale in {}", source.display());
    }
    let current = [scale_path.clone(), iio_dir.join("in_voltage_scale")];
    let scale = match read_first(&current) {
        Some((source, contents)) => match contents.trim().parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    "ignoring malformed scale {:?} in {}",
                    contents.trim(),
                    source.display()
                );
                default_scale
            }
        },
        None => default_scale,
    };
    debug!("{} = {scale}", scale_path.display());
    Ok(scale)
}
