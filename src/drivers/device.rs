use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use log::{debug, info};
use regex::Regex;
use crate::config::DeviceConfig;
use crate::drivers::mux::{DirectInput, GpioMux, InputSelector};
use crate::drivers::scale::select_scale;
use crate::drivers::AdcError;
/// Device handle shared by the channels built on top of it.
///
/// `Rc` keeps the handle on the polling thread that created it; the
/// multiplexer inside is not safe to drive from two threads.
pub type SharedDevice = Rc<RefCell<AdcDevice>>;
/// One IIO ADC channel: raw sample file, committed scale and input selector.
pub struct AdcDevice {
    id: String,
    iio_dir: PathBuf,
    channel: String,
    raw_path: PathBuf,
    raw: File,
    scale: f64,
    max_adc_value: i32,
    max_voltage: f64,
    averaging_window: usize,
    sample_delay: Duration,
    selector: Box<dyn InputSelector>,
}
impl AdcDevice {
    /// Resolves the IIO device under `sysfs_root`, opens its raw sample file and
    /// commits a scale. The multiplexer is driven through GPIOs when the
    /// configuration names them.
    pub fn open(sysfs_root: &Path, cfg: &DeviceConfig) -> Result<Self, AdcError> {
        let selector: Box<dyn InputSelector> = match cfg.gpios {
            Some(lines) => Box::new(GpioMux::new(
                sysfs_root.join("class/gpio"),
                lines,
                cfg.min_switch_interval(),
            )),
            None => Box::new(DirectInput),
        };
        Self::with_selector(sysfs_root, cfg, selector)
    }
    pub fn with_selector(
        sysfs_root: &Path,
        cfg: &DeviceConfig,
        selector: Box<dyn InputSelector>,
    ) -> Result<Self, AdcError> {
        let iio_dir = find_iio_dir(sysfs_root, &cfg.match_iio)?;
        let raw_path = iio_dir.join(format!("in_{}_raw", cfg.channel_number));
        let raw = File::open(&raw_path).map_err(|source| AdcError::FileUnavailable {
            path: raw_path.clone(),
            source,
        })?;
        let scale = select_scale(&iio_dir, &cfg.channel_number, cfg.scale, cfg.default_scale)?;
        info!(
            "{}: using {} with scale {scale}",
            cfg.id,
            raw_path.display()
        );
        Ok(Self {
            id: cfg.id.clone(),
            iio_dir,
            channel: cfg.channel_number.clone(),
            raw_path,
            raw,
            scale,
            max_adc_value: cfg.max_adc_value,
            max_voltage: cfg.max_voltage,
            averaging_window: cfg.averaging_window,
            sample_delay: cfg.sample_delay(),
            selector,
        })
    }
    pub fn into_shared(self) -> SharedDevice {
        Rc::new(RefCell::new(self))
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn iio_dir(&self) -> &Path {
        &self.iio_dir
    }
    pub fn channel(&self) -> &str {
        &self.channel
    }
    pub fn scale(&self) -> f64 {
        self.scale
    }
    pub fn averaging_window(&self) -> usize {
        self.averaging_window
    }
    pub fn sample_delay(&self) -> Duration {
        self.sample_delay
    }
    /// Current-source channel wired to this ADC channel: the trailing number
    /// of the IIO channel name (`voltage1` -> 1).
    pub fn current_source_channel(&self) -> Option<u8> {
        let digits = self.channel.len()
            - self
                .channel
                .chars()
                .rev()
                .take_while(char::is_ascii_digit)
                .count();
        self.channel[digits..].parse().ok()
    }
    pub fn supports_input(&self, input: u8) -> bool {
        self.selector.supports_input(input)
    }
    pub fn select_input(&mut self, input: u8) -> Result<(), AdcError> {
        self.selector.select_input(input)
    }
    /// Reads the current raw sample, rewinding the attribute first.
    pub fn read_raw(&mut self) -> Result<i32, AdcError> {
        let mut text = String::new();
        self.raw
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.raw.read_to_string(&mut text))
            .map_err(|source| AdcError::RawRead {
                path: self.raw_path.clone(),
                source,
            })?;
        text.trim()
            .parse()
            .map_err(|_| AdcError::InvalidRawSample {
                path: self.raw_path.clone(),
                content: text.trim().to_string(),
            })
    }
    /// Selects `input` and takes one raw sample from it.
    pub fn sample(&mut self, input: u8) -> Result<i32, AdcError> {
        self.select_input(input)?;
        self.read_raw()
    }
    pub fn exceeds_max_raw(&self, raw: i32) -> bool {
        raw > self.max_adc_value
    }
    pub fn is_within_voltage_bound(&self, raw: i32) -> bool {
        self.scale * f64::from(raw) <= self.max_voltage
    }
    /// Accepts an averaged reading for conversion, or explains at debug level
    /// why it is not available.
    pub fn accepts(&self, channel_id: &str, raw: i32) -> bool {
        if self.exceeds_max_raw(raw) {
            debug!(
                "{channel_id}: average ({raw}) is bigger than maximum ({})",
                self.max_adc_value
            );
            return false;
        }
        if !self.is_within_voltage_bound(raw) {
            debug!(
                "{channel_id}: scaled value ({}) is bigger than maximum ({})",
                self.scale * f64::from(raw),
                self.max_voltage
            );
            return false;
        }
        true
    }
}
/// Locates `iio:deviceN` under `<sysfs_root>/bus/iio/devices`.
///
/// An empty `match_iio` selects `iio:device0`. Otherwise the first device (in
/// name order) whose link target matches the shell pattern `*<match_iio>*` wins.
pub fn find_iio_dir(sysfs_root: &Path, match_iio: &str) -> Result<PathBuf, AdcError> {
    let devices = sysfs_root.join("bus/iio/devices");
    if match_iio.is_empty() {
        return Ok(devices.join("iio:device0"));
    }
    let pattern = format!("*{match_iio}*");
    let matcher = Regex::new(&glob_to_regex(&pattern))
        .map_err(|e| AdcError::InvalidConfig(format!("bad IIO match {match_iio:?}: {e}")))?;
    let entries = fs::read_dir(&devices).map_err(|source| AdcError::DirectoryUnavailable {
        path: devices.clone(),
        source,
    })?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().contains("iio:device"))
        .map(|entry| entry.path())
        .collect();
    candidates.sort();
    for candidate in candidates {
        let Ok(target) = fs::read_link(&candidate) else {
            continue;
        };
        if matcher.is_match(&target.to_string_lossy()) {
            debug!("{} -> {} matches {pattern}", candidate.display(), target.display());
            return Ok(candidate);
        }
    }
    Err(AdcError::DeviceNotFound {
        pattern: match_iio.to_string(),
    })
}
/// Translates a shell wildcard pattern (`*`, `?`, `[...]`, `\`) into an
/// anchored regular expression. `*` also crosses `/`, like `fnmatch` without
/// `FNM_PATHNAME`.
fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut re = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => match bracket_end(&chars, i) {
                Some(end) => {
                    re.push('[');
                    let mut j = i + 1;
                    if chars[j] == '!' {
                        re.push('^');
                        j += 1;
                    }
                    for &c in &chars[j..end] {
                        if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
                            re.push('\\');
                        }
                        re.push(c);
                    }
                    re.push(']');
                    i = end;
                }
                None => re.push_str(r"\["),
            },
            '\\' if i + 1 < chars.len() => {
                i += 1;
                re.push_str(&regex::escape(&chars[i].to_string()));
            }
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    re.push('$');
    re
}
fn bracket_end(chars: &[char], open: usize) -> Option<usize> {
    let mut j = open + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    chars
        .get(j..)?
        .iter()
        .position(|&c| c == ']')
        .map(|p| p + j)
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdcConfig;
    use std::os::unix::fs::symlink;
    fn device_config(match_iio: &str) -> DeviceConfig {
        let text = format!(
            r#"{{ "devices": [{{ "id": "adc", "channel_number": "voltage1",
                "match_iio": "{match_iio}", "max_voltage": 2000, "max_adc_value": 4000 }}] }}"#
        );
        AdcConfig::from_json(&text).unwrap().devices.remove(0)
    }
    fn fake_device(root: &Path, name: &str, raw: &str) -> PathBuf {
        let dir = root.join("bus/iio/devices").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("in_voltage1_raw"), raw).unwrap();
        fs::write(dir.join("in_voltage1_scale"), "0.5\n").unwrap();
        dir
    }
    #[test]
    fn glob_translation() {
        let re = |g: &str| Regex::new(&glob_to_regex(g)).unwrap();
        assert!(re("*ads1015*").is_match("../../devices/soc/i2c/ads1015@48/iio:device1"));
        assert!(!re("*ads1015*").is_match("../../devices/soc/lradc/iio:device0"));
        assert!(re("*80050000.lradc*").is_match("/sys/devices/80050000.lradc/iio:device0"));
        assert!(!re("*80050000.lradc*").is_match("/sys/devices/80050000xlradc/iio:device0"));
        assert!(re("*dev?ce[0-3]").is_match("iio:device2"));
        assert!(!re("*device[!0-3]").is_match("iio:device2"));
        assert!(re("*[x*").is_match("a[xyz"));
    }
    #[test]
    fn default_device_is_index_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = find_iio_dir(dir.path(), "").unwrap();
        assert_eq!(path, dir.path().join("bus/iio/devices/iio:device0"));
    }
    #[test]
    fn finds_device_by_link_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let lradc = root.join("devices/80050000.lradc/iio:device0");
        let ads = root.join("devices/i2c-1/1-0048/iio:device1");
        fs::create_dir_all(&lradc).unwrap();
        fs::create_dir_all(&ads).unwrap();
        let devices = root.join("bus/iio/devices");
        fs::create_dir_all(&devices).unwrap();
        symlink(&lradc, devices.join("iio:device0")).unwrap();
        symlink(&ads, devices.join("iio:device1")).unwrap();
        fs::write(devices.join("unrelated"), "").unwrap();
        assert_eq!(
            find_iio_dir(root, "1-0048").unwrap(),
            devices.join("iio:device1")
        );
        assert_eq!(
            find_iio_dir(root, "lradc").unwrap(),
            devices.join("iio:device0")
        );
        assert!(matches!(
            find_iio_dir(root, "ina219"),
            Err(AdcError::DeviceNotFound { .. })
        ));
    }
    #[test]
    fn missing_devices_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_iio_dir(dir.path(), "lradc"),
            Err(AdcError::DirectoryUnavailable { .. })
        ));
    }
    #[test]
    fn opens_device_and_reads_raw_repeatedly() {
        let dir = tempfile::tempdir().unwrap();
        let iio = fake_device(dir.path(), "iio:device0", "1234\n");
        let mut device = AdcDevice::open(dir.path(), &device_config("")).unwrap();
        assert_eq!(device.scale(), 0.5);
        assert_eq!(device.iio_dir(), iio.as_path());
        assert_eq!(device.read_raw().unwrap(), 1234);
        fs::write(iio.join("in_voltage1_raw"), "17\n").unwrap();
        assert_eq!(device.read_raw().unwrap(), 17);
        assert_eq!(device.sample(3).unwrap(), 17);
        assert_eq!(device.current_source_channel(), Some(1));
    }
    #[test]
    fn raw_file_is_required() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bus/iio/devices/iio:device0")).unwrap();
        assert!(matches!(
            AdcDevice::open(dir.path(), &device_config("")),
            Err(AdcError::FileUnavailable { .. })
        ));
    }
    #[test]
    fn garbage_raw_sample_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fake_device(dir.path(), "iio:device0", "busy");
        let mut device = AdcDevice::open(dir.path(), &device_config("")).unwrap();
        assert!(matches!(
            device.read_raw(),
            Err(AdcError::InvalidRawSample { .. })
        ));
    }
    #[test]
    fn bounds_checks() {
        let dir = tempfile::tempdir().unwrap();
        fake_device(dir.path(), "iio:device0", "0");
        let device = AdcDevice::open(dir.path(), &device_config("")).unwrap();
        assert!(!device.exceeds_max_raw(4000));
        assert!(device.exceeds_max_raw(4001));
        assert!(device.is_within_voltage_bound(4000));
        assert!(!device.is_within_voltage_bound(4001));
        assert!(device.accepts("A1", 3999));
        assert!(!device.accepts("A1", 4001));
    }
}
