//! Conversion of averaged, scaled ADC readings into physical values.
//!
//! Voltage inputs:
//! - `volts = raw * multiplier / 1000 * scale` (scale is mV per count).
//!
//! Resistance inputs, measured with a known current through a divider:
//! - `volts = scale * raw / 1000`
//! - `ohms = 1 / ((current_uA * calibration / 1e6) / volts - 1/r1) - r2`
//! - Negative results are clamped to zero and the value is rounded to whole ohms.
/// Voltage in volts for an averaged raw reading.
pub fn voltage_from_raw(raw: i32, scale: f64, multiplier: f64) -> f64 {
    f64::from(raw) * multiplier / 1000.0 * scale
}
/// Voltage in volts seen across a resistive sensor.
pub fn sensor_voltage(raw: i32, scale: f64) -> f64 {
    scale * f64::from(raw) / 1000.0
}
/// Sensor resistance (ohms) for `voltage` volts with `current_ua` microamps
/// flowing into the parallel `r1` and series `r2` network.
///
/// Returns `None` when the input looks open (infinite resistance).
pub fn resistance_from_voltage(
    voltage: f64,
    current_ua: u32,
    calibration_factor: f64,
    r1: f64,
    r2: f64,
) -> Option<f64> {
    let current_a = f64::from(current_ua) * calibration_factor / 1_000_000.0;
    let mut ohms = 1.0 / (current_a / voltage - 1.0 / r1) - r2;
    if ohms.is_nan() || ohms < 0.0 {
        ohms = 0.0;
    }
    if ohms.is_infinite() {
        return None;
    }
    Some(ohms.round())
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn voltage_uses_scale_and_multiplier() {
        assert!((voltage_from_raw(1000, 0.001, 1000.0) - 1.0).abs() < 1e-9);
        assert!((voltage_from_raw(2048, 0.451660156, 1.0) - 0.925).abs() < 1e-3);
    }
    #[test]
    fn resistance_matches_divider_math() {
        // (1 mA / V) - 1/100k == 2e-5  =>  V = 1e-3 / 3e-5
        let voltage = 1.0e-3 / 3.0e-5;
        let ohms = resistance_from_voltage(voltage, 1000, 1.0, 100_000.0, 0.0);
        assert_eq!(ohms, Some(50_000.0));
        let ohms = resistance_from_voltage(voltage, 1000, 1.0, 100_000.0, 1_000.0);
        assert_eq!(ohms, Some(49_000.0));
    }
    #[test]
    fn negative_resistance_clamps_to_zero() {
        let voltage = 1.0e-3 / 3.0e-5;
        let ohms = resistance_from_voltage(voltage, 1000, 1.0, 100_000.0, 1_000_000.0);
        assert_eq!(ohms, Some(0.0));
        assert_eq!(resistance_from_voltage(0.0, 0, 1.0, 1e6, 0.0), Some(0.0));
    }
    #[test]
    fn open_input_is_not_available() {
        // current / V == 1 / r1 leaves the divider term at zero
        let ohms = resistance_from_voltage(4.0, 1_000_000, 1.0, 4.0, 0.0);
        assert_eq!(ohms, None);
    }
}
