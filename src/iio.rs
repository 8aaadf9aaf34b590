use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::config::Conf;
use crate::device::{Device, Row};
use crate::{IioError, Result};

/// Registry of every device on the IIO bus.
///
/// Devices are found and built once, when the registry is created. Entries
/// for triggers live in the same bus directory and are skipped.
pub struct Iio {
    pub devices: Vec<Device>,
    /// How many devices came up with at least one channel enabled.
    pub enabled: usize,
}

impl Iio {
    /// Scan the bus directory and build a device per entry. A device that
    /// fails to come up is logged and skipped, never fatal.
    pub fn discover(conf: &Conf) -> Result<Iio> {
        let bus = Path::new(&conf.paths.sysfs_dir);
        let mut devices = Vec::new();
        let mut enabled = 0;

        for entry in fs::read_dir(bus).map_err(|e| IioError::io(bus, e))? {
            let entry = entry.map_err(|e| IioError::io(bus, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains("trigger") {
                continue;
            }
            match Device::open(entry.path(), &conf.paths.dev_dir) {
                Ok(device) => {
                    if device.is_enabled() {
                        enabled += 1;
                    }
                    devices.push(device);
                }
                Err(e) => warn!("skipping {name}: {e}"),
            }
        }
        devices.sort_by_key(|d| d.devnum);
        info!("found {} iio devices", devices.len());
        Ok(Iio { devices, enabled })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Unique device names, sorted.
    pub fn sensor_list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.iter().map(|d| d.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn enable_all(&mut self) -> Result<()> {
        for device in &mut self.devices {
            device.enable_channels()?;
        }
        Ok(())
    }

    pub fn disable_all(&mut self) -> Result<()> {
        for device in &mut self.devices {
            device.disable_channels()?;
        }
        Ok(())
    }

    pub fn enable_device(&mut self, name: &str) -> Result<()> {
        for device in &mut self.devices {
            if device.name == name {
                device.enable_channels()?;
            }
        }
        Ok(())
    }

    pub fn disable_device(&mut self, name: &str) -> Result<()> {
        for device in &mut self.devices {
            if device.name == name {
                device.disable_channels()?;
            }
        }
        Ok(())
    }

    /// Enable the channels of `dev_name` whose names contain `chan_name`.
    /// Returns whether anything matched.
    pub fn enable_device_channel(&mut self, dev_name: &str, chan_name: &str) -> Result<bool> {
        for device in &mut self.devices {
            if device.name == dev_name {
                return device.enable_channel_by_name(chan_name);
            }
        }
        Ok(false)
    }

    pub fn disable_device_channel(&mut self, dev_name: &str, chan_name: &str) -> Result<bool> {
        for device in &mut self.devices {
            if device.name == dev_name {
                return device.disable_channel_by_name(chan_name);
            }
        }
        Ok(false)
    }

    /// Take `iterations` bounded captures of `records` records each from
    /// every device whose name contains `name`. Channels and buffering are
    /// brought up for the duration and torn down afterwards.
    pub fn read_sensor(
        &mut self,
        name: &str,
        iterations: usize,
        records: usize,
    ) -> Result<HashMap<String, Vec<Vec<Row>>>> {
        let matching: Vec<usize> = self
            .devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.name.contains(name))
            .map(|(i, _)| i)
            .collect();
        let mut vals: HashMap<String, Vec<Vec<Row>>> = HashMap::new();
        if matching.is_empty() {
            return Ok(vals);
        }

        for &i in &matching {
            let device = &mut self.devices[i];
            device.enable_channels()?;
            device.start_buffer()?;
        }
        for _ in 0..iterations {
            for &i in &matching {
                let device = &mut self.devices[i];
                let rows = device.read_buffer(records)?;
                vals.entry(device.name.clone()).or_default().push(rows);
            }
        }
        for &i in &matching {
            let device = &mut self.devices[i];
            device.stop_buffer()?;
            device.disable_channels()?;
        }
        Ok(vals)
    }

    /// A status table covering every device and channel.
    pub fn status_string(&self) -> String {
        let mut s = String::from(
            "Dev Sensor          Channel                                  Enabled? Index Format\n",
        );
        s.push_str(
            "--- --------------  ---------------------------------------  -------- ----- ------\n",
        );
        for device in &self.devices {
            s.push_str(&device.status());
        }
        s
    }
}
