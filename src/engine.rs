// src/engine.rs
use crate::config::{AdcConfig, CurrentSourceConfig};
use crate::drivers::{
    build_channels, AdcChannel, AdcDevice, MxsLradcCurrentSource, NoCurrentSource,
    SharedCurrentSource,
};
use crate::types::{AdcMessage, Reading};
use anyhow::{Context, Result};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

struct DeviceChannels {
    id: String,
    channels: Vec<AdcChannel>,
    failed: bool,
}

/// Every configured device with its converters, polled one channel at a time.
pub struct Engine {
    devices: Vec<DeviceChannels>,
}

impl Engine {
    /// Opens every device of `cfg`. Any device that cannot be initialised
    /// aborts startup.
    pub fn from_config(cfg: &AdcConfig, source: &SharedCurrentSource) -> Result<Self> {
        let mut devices = Vec::with_capacity(cfg.devices.len());
        for dev_cfg in &cfg.devices {
            let device = AdcDevice::open(&cfg.sysfs_dir, dev_cfg)
                .with_context(|| format!("failed to open device {}", dev_cfg.id))?
                .into_shared();
            let channels = build_channels(&device, dev_cfg, source)
                .with_context(|| format!("failed to set up channels of {}", dev_cfg.id))?;
            devices.push(DeviceChannels {
                id: dev_cfg.id.clone(),
                channels,
                failed: false,
            });
        }
        Ok(Self { devices })
    }

    pub fn channel_count(&self) -> usize {
        self.devices.iter().map(|d| d.channels.len()).sum()
    }

    pub fn has_live_devices(&self) -> bool {
        self.devices.iter().any(|d| !d.failed)
    }

    /// Reads every channel of every live device once. A fatal error stops
    /// polling of that device only.
    pub fn poll(&mut self) -> Vec<AdcMessage> {
        let mut messages = Vec::with_capacity(self.channel_count());
        for device in self.devices.iter_mut().filter(|d| !d.failed) {
            for channel in device.channels.iter_mut() {
                match channel.read() {
                    Ok(value) => {
                        if value.is_none() {
                            log::debug!("{}/{}: not available", device.id, channel.id());
                        }
                        messages.push(AdcMessage::Reading(Reading {
                            device: device.id.clone(),
                            channel: channel.id().to_string(),
                            kind: channel.kind(),
                            decimal_places: channel.decimal_places(),
                            value,
                        }));
                    }
                    Err(err) => {
                        log::error!("{}: {err}; device disabled", device.id);
                        device.failed = true;
                        messages.push(AdcMessage::DeviceFailed {
                            device: device.id.clone(),
                            error: err.to_string(),
                        });
                        break;
                    }
                }
            }
        }
        messages
    }
}

pub fn open_current_source(cfg: Option<&CurrentSourceConfig>) -> Result<SharedCurrentSource> {
    let source: SharedCurrentSource = match cfg {
        Some(CurrentSourceConfig::MxsLradc {
            device,
            base_address,
        }) => Rc::new(RefCell::new(MxsLradcCurrentSource::open(device, *base_address)?)),
        None => Rc::new(RefCell::new(NoCurrentSource)),
    };
    Ok(source)
}

/// Runs the engine on its own thread until `stop` is set, the receiver hangs
/// up or every device has failed.
///
/// The engine is built inside the thread: device handles are not `Send`.
pub fn spawn_thread(
    cfg: AdcConfig,
    tx: Sender<AdcMessage>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<Result<()>> {
    thread::spawn(move || {
        let source = open_current_source(cfg.current_source.as_ref())?;
        let mut engine = Engine::from_config(&cfg, &source)?;
        log::info!(
            "polling {} channels every {} ms",
            engine.channel_count(),
            cfg.poll_interval_ms
        );
        let interval = cfg.poll_interval();
        while !stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            for message in engine.poll() {
                if tx.send(message).is_err() {
                    return Ok(());
                }
            }
            if !engine.has_live_devices() {
                tx.send(AdcMessage::Stopped).ok();
                return Ok(());
            }
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::mpsc;
    use std::time::Duration;

    fn fake_sysfs(root: &Path) {
        let iio = root.join("bus/iio/devices/iio:device0");
        fs::create_dir_all(&iio).unwrap();
        fs::write(iio.join("in_voltage0_raw"), "2000").unwrap();
        fs::write(iio.join("in_voltage0_scale"), "0.5").unwrap();
        fs::write(iio.join("in_voltage1_raw"), "1000").unwrap();
        fs::write(iio.join("in_voltage1_scale"), "0.5").unwrap();
    }

    fn config(root: &Path) -> AdcConfig {
        let text = format!(
            r#"{{
            "poll_interval_ms": 5,
            "sysfs_dir": {root:?},
            "devices": [
                {{ "id": "first", "channel_number": "voltage0", "averaging_window": 1,
                   "sample_delay_ms": 0,
                   "mux": [{{ "mux_channel_number": 0, "id": "V0", "readings_number": 1,
                              "type": "voltage" }}] }},
                {{ "id": "second", "channel_number": "voltage1", "averaging_window": 1,
                   "sample_delay_ms": 0,
                   "mux": [{{ "mux_channel_number": 0, "id": "V1", "readings_number": 1,
                              "decimal_places": 1, "type": "voltage", "multiplier": 2 }}] }}
            ]
        }}"#,
            root = root.display().to_string()
        );
        AdcConfig::from_json(&text).unwrap()
    }

    fn readings(messages: &[AdcMessage]) -> Vec<(String, Option<f64>)> {
        messages
            .iter()
            .filter_map(|m| match m {
                AdcMessage::Reading(r) => Some((r.channel.clone(), r.value)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn polls_every_channel() {
        let dir = tempfile::tempdir().unwrap();
        fake_sysfs(dir.path());
        let source = open_current_source(None).unwrap();
        let mut engine = Engine::from_config(&config(dir.path()), &source).unwrap();
        assert_eq!(engine.channel_count(), 2);
        let got = readings(&engine.poll());
        assert_eq!(
            got,
            [("V0".to_string(), Some(1.0)), ("V1".to_string(), Some(1.0))]
        );
    }

    #[test]
    fn failed_device_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        fake_sysfs(dir.path());
        let source = open_current_source(None).unwrap();
        let mut engine = Engine::from_config(&config(dir.path()), &source).unwrap();
        fs::write(
            dir.path().join("bus/iio/devices/iio:device0/in_voltage0_raw"),
            "oops",
        )
        .unwrap();
        let messages = engine.poll();
        assert!(matches!(
            &messages[0],
            AdcMessage::DeviceFailed { device, .. } if device == "first"
        ));
        assert_eq!(readings(&messages), [("V1".to_string(), Some(1.0))]);
        assert!(engine.has_live_devices());
        assert_eq!(readings(&engine.poll()).len(), 1);
    }

    #[test]
    fn startup_fails_on_missing_device() {
        let dir = tempfile::tempdir().unwrap();
        let source = open_current_source(None).unwrap();
        let err = Engine::from_config(&config(dir.path()), &source)
            .err()
            .unwrap();
        assert!(err.to_string().contains("first"));
    }

    #[test]
    fn thread_streams_readings_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        fake_sysfs(dir.path());
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_thread(config(dir.path()), tx, Arc::clone(&stop));
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, AdcMessage::Reading(ref r) if r.device == "first"));
        stop.store(true, Ordering::Relaxed);
        drop(rx);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn thread_reports_when_all_devices_fail() {
        let dir = tempfile::tempdir().unwrap();
        fake_sysfs(dir.path());
        let iio = dir.path().join("bus/iio/devices/iio:device0");
        fs::write(iio.join("in_voltage0_raw"), "x").unwrap();
        fs::write(iio.join("in_voltage1_raw"), "y").unwrap();
        let (tx, rx) = mpsc::channel();
        let handle = spawn_thread(config(dir.path()), tx, Arc::new(AtomicBool::new(false)));
        handle.join().unwrap().unwrap();
        let messages: Vec<_> = rx.iter().collect();
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[2], AdcMessage::Stopped));
    }
}
