// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::Arc;
use sysfs_adc::config::{AdcConfig, DEFAULT_CONFIG_PATH};
use sysfs_adc::engine;
use sysfs_adc::types::{AdcMessage, Reading};

#[derive(Parser)]
#[command(name = "sysfs-adc")]
#[command(about = "Polls multiplexed IIO ADC channels and prints calibrated readings", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level: >0 debug, 0 info, <0 warnings only
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    debug: i8,

    /// Print one JSON object per reading
    #[arg(long)]
    json: bool,
}

fn print_reading(reading: &Reading, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(reading)?);
        return Ok(());
    }
    let value = reading
        .formatted()
        .unwrap_or_else(|| "not available".to_string());
    println!(
        "{}/{} {} {}",
        reading.device, reading.channel, reading.kind, value
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = AdcConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let level = if cli.debug > 0 || cfg.debug {
        "debug"
    } else if cli.debug == 0 {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    log::info!(
        "{} device(s) configured, sysfs at {}",
        cfg.devices.len(),
        cfg.sysfs_dir.display()
    );

    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let handle = engine::spawn_thread(cfg, tx, Arc::clone(&stop));

    for message in rx {
        match message {
            AdcMessage::Reading(reading) => print_reading(&reading, cli.json)?,
            AdcMessage::DeviceFailed { device, error } => {
                eprintln!("{device}: disabled after error: {error}");
            }
            AdcMessage::Stopped => {
                log::warn!("every device failed, stopping");
                break;
            }
        }
    }

    match handle.join() {
        Ok(result) => result.context("polling thread failed"),
        Err(_) => anyhow::bail!("polling thread panicked"),
    }
}
