use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use log::LevelFilter;
use rust_iio::{Conf, Iio};
use simplelog::{ColorChoice, TermLogger, TerminalMode};

/// IIO device client.
#[derive(Parser, Debug)]
#[command(version, about = "IIO device client")]
struct Cli {
    /// Scan and report available devices
    #[arg(long)]
    show_devices: bool,
    /// Read N unscaled raw snapshots per device
    #[arg(long, value_name = "N")]
    read_raw: Option<usize>,
    /// Read N buffered records from the named sensor
    #[arg(long, value_name = "N")]
    read: Option<usize>,
    /// Enable a device, or one of its channels as device:channel
    #[arg(long, value_name = "DEV[:CHAN]")]
    enable: Option<String>,
    /// Disable a device, or one of its channels as device:channel
    #[arg(long, value_name = "DEV[:CHAN]")]
    disable: Option<String>,
    /// Start buffering for the named device
    #[arg(long, value_name = "DEV")]
    start_buffer: Option<String>,
    /// Stop buffering for the named device
    #[arg(long, value_name = "DEV")]
    stop_buffer: Option<String>,
    /// Collect continuously from the named device, then print the rows
    #[arg(long, value_name = "DEV")]
    read_data: Option<String>,
    /// How long to collect data for, in seconds
    #[arg(long, value_name = "SECS")]
    read_time: Option<f64>,
    /// Optional TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Sensor to use
    sensor: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let conf = Conf::load(cli.config.as_deref())?;
    let mut iios = Iio::discover(&conf)?;

    if cli.show_devices {
        print!("{}", iios.status_string());
        return Ok(());
    }

    if let Some(n) = cli.read_raw {
        println!("NB. values are RAW and unscaled");
        for dev in &mut iios.devices {
            if cli.sensor.as_ref().is_some_and(|s| !dev.name.contains(s.as_str())) {
                continue;
            }
            dev.enable_channels()?;
            println!("{}", dev.name);
            for _ in 0..n {
                println!("{:#?}", dev.read_raw()?);
            }
            dev.disable_channels()?;
        }
        return Ok(());
    }

    if let Some(count) = cli.read {
        let Some(sensor) = cli.sensor.as_deref() else {
            bail!("--read needs a sensor name");
        };
        let Some(dev) = iios.devices.iter_mut().find(|d| d.name.contains(sensor)) else {
            bail!("no such device {sensor:?}");
        };
        let data = dev.read_buffer(count)?;
        println!("{data:#?}");
        return Ok(());
    }

    if let Some(target) = cli.enable.as_deref() {
        if let Some((dev_name, chan)) = target.split_once(':') {
            if iios.enable_device_channel(dev_name, chan)? {
                println!("Channel(s) {chan} enabled for {dev_name}");
            } else {
                println!("Failed to enable any channel(s) {chan} for {dev_name}");
            }
        } else {
            iios.enable_device(target)?;
            println!("Channels enabled for {target}");
        }
        return Ok(());
    }

    if let Some(target) = cli.disable.as_deref() {
        if let Some((dev_name, chan)) = target.split_once(':') {
            if iios.disable_device_channel(dev_name, chan)? {
                println!("Channel(s) {chan} disabled for {dev_name}");
            } else {
                println!("Failed to disable any channel(s) {chan} for {dev_name}");
            }
        } else {
            iios.disable_device(target)?;
            println!("Channels disabled for {target}");
        }
        return Ok(());
    }

    if let Some(name) = cli.start_buffer.as_deref() {
        for dev in iios.devices.iter_mut().filter(|d| d.name == name) {
            dev.start_buffer()?;
            println!("Buffering started for {}", dev.name);
        }
    }

    if let Some(name) = cli.read_data.as_deref() {
        let secs = cli.read_time.unwrap_or(conf.capture.read_time);
        for dev in iios.devices.iter_mut().filter(|d| d.name == name) {
            dev.start_collecting()?;
        }
        thread::sleep(Duration::from_secs_f64(secs));
        for dev in iios.devices.iter_mut().filter(|d| d.name == name) {
            let rows = dev.stop_collecting()?;
            dev.disable_channels()?;
            println!("{}:\n{rows:#?}", dev.name);
        }
    }

    if let Some(name) = cli.stop_buffer.as_deref() {
        for dev in iios.devices.iter_mut().filter(|d| d.name == name) {
            dev.stop_buffer()?;
            println!("Buffering stopped for {}", dev.name);
        }
    }

    Ok(())
}
