use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::channel::{Channel, Value};
use crate::collector::Collector;
use crate::sysfs::SysfsDir;
use crate::{IioError, Result};

/// One fully decoded interleaved record, keyed by channel name.
pub type Row = HashMap<String, Value>;

/// Read attempts per record before a bounded capture gives up on it.
const READ_ATTEMPTS: usize = 3;

pub(crate) fn would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// A device on the IIO bus: a sensor or other hardware publishing a set of
/// channels.
///
/// Configuration lives in the device's sysfs directory; packed sample
/// records come from its node in `/dev`. The `buffering` flag caches the
/// last state this struct wrote to `buffer/enable`; it is re-read from
/// sysfs only at construction.
pub struct Device {
    sysfs: SysfsDir,
    pub sys_id: String,
    pub devnum: u32,
    pub name: String,
    pub channels: Vec<Channel>,
    scales: HashMap<String, f64>,
    pub buffering: bool,
    pub trigger: Option<String>,
    dev_node: PathBuf,
    collector: Option<Collector>,
}

impl Device {
    /// Open the device rooted at a `iio:device<N>` sysfs directory.
    /// `dev_dir` is the directory holding its data node, normally `/dev`.
    pub fn open(sysfs_path: impl AsRef<Path>, dev_dir: impl AsRef<Path>) -> Result<Device> {
        let sysfs_path = sysfs_path.as_ref();
        let sys_id = sysfs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let devnum = sys_id
            .strip_prefix("iio:device")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| IioError::InvalidDeviceId(sys_id.clone()))?;

        let sysfs = SysfsDir::new(sysfs_path);
        let name = sysfs.read_string("name", "")?;
        let mut device = Device {
            dev_node: dev_dir.as_ref().join(&sys_id),
            sysfs,
            sys_id,
            devnum,
            name,
            channels: Vec::new(),
            scales: HashMap::new(),
            buffering: false,
            trigger: None,
            collector: None,
        };
        device.scan_channels()?;
        device.buffering = device.sysfs.read_flag("buffer/enable", false)?;
        Ok(device)
    }

    pub fn dev_node(&self) -> &Path {
        &self.dev_node
    }

    /// Discover the channel set from `scan_elements/`, reading each
    /// family's scale factor once into the per-device table.
    fn scan_channels(&mut self) -> Result<()> {
        self.channels.clear();
        let scan_dir = self.sysfs.join("scan_elements");
        if !scan_dir.path().exists() {
            debug!("{} has no scan_elements, no channels", self.sys_id);
            return Ok(());
        }
        for entry in self.sysfs.list("scan_elements")? {
            let Some(name) = entry.strip_suffix("_en") else {
                continue;
            };
            let family = Channel::family_of(name);
            if !self.scales.contains_key(&family) {
                let mut scale = self.sysfs.read_number(&format!("{family}_scale"), 1.0)?;
                if scale == 0.0 {
                    scale = 1.0;
                }
                self.scales.insert(family.clone(), scale);
            }
            let channel = Channel::new(scan_dir.clone(), name, self.scales[&family])?;
            debug!(
                "{}: channel {} index {} scale {}",
                self.sys_id, channel.name, channel.index, channel.scale
            );
            self.channels.push(channel);
        }
        Ok(())
    }

    /// True when at least one channel is enabled.
    pub fn is_enabled(&self) -> bool {
        self.channels.iter().any(|c| c.enabled)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c.name.contains(name))
    }

    /// The channels the kernel packs into a record: enabled ones, in
    /// ascending index order.
    pub(crate) fn scan_set(&self) -> Vec<&Channel> {
        let mut set: Vec<&Channel> = self.channels.iter().filter(|c| c.enabled).collect();
        set.sort_by_key(|c| c.index);
        set
    }

    /// Byte size of one interleaved record over the currently enabled
    /// channels. Recomputed on demand so it tracks enable/disable changes.
    pub fn record_size(&self) -> usize {
        self.scan_set()
            .iter()
            .filter_map(|c| c.plan.as_ref())
            .map(|p| p.storage_size)
            .sum()
    }

    /// Decode one packed record by walking the scan set in index order.
    /// Each channel advances the position by its own storage size.
    pub fn decode_record(&self, data: &[u8]) -> Result<Row> {
        let mut row = Row::new();
        let mut pos = 0;
        for channel in self.scan_set() {
            let (value, consumed) = channel.decode(&data[pos..])?;
            pos += consumed;
            row.insert(channel.name.clone(), value);
        }
        Ok(row)
    }

    /// Unscaled point-in-time snapshot of every channel via its `_raw`
    /// attribute.
    pub fn read_raw(&self) -> Result<HashMap<String, Value>> {
        let mut vals = HashMap::new();
        for channel in &self.channels {
            let text = self.sysfs.read_string(&format!("{}_raw", channel.name), "")?;
            vals.insert(channel.name.clone(), channel.parse_raw(&text)?);
        }
        Ok(vals)
    }

    /// Enable every channel.
    pub fn enable_channels(&mut self) -> Result<()> {
        for channel in &mut self.channels {
            channel.enable()?;
        }
        Ok(())
    }

    /// Disable every channel. Buffering cannot outlive the channel set, so
    /// it is stopped first.
    pub fn disable_channels(&mut self) -> Result<()> {
        if self.buffering {
            self.stop_buffer()?;
        }
        for channel in &mut self.channels {
            channel.disable()?;
        }
        Ok(())
    }

    /// Enable every channel whose name contains `name`. Case sensitive.
    /// Returns whether anything matched.
    pub fn enable_channel_by_name(&mut self, name: &str) -> Result<bool> {
        let mut matched = false;
        for channel in &mut self.channels {
            if channel.name.contains(name) {
                channel.enable()?;
                matched = true;
            }
        }
        Ok(matched)
    }

    /// Disable every channel whose name contains `name`. Case sensitive.
    pub fn disable_channel_by_name(&mut self, name: &str) -> Result<bool> {
        let mut matched = false;
        for channel in &mut self.channels {
            if channel.name.contains(name) {
                channel.disable()?;
                matched = true;
            }
        }
        Ok(matched)
    }

    /// Wire the trigger and enable buffering. No-op when already buffering.
    /// If no channel is enabled, all of them are enabled first.
    pub fn start_buffer(&mut self) -> Result<()> {
        if self.buffering {
            return Ok(());
        }
        if !self.is_enabled() {
            self.enable_channels()?;
        }
        let trigger = format!("{}-dev{}", self.name, self.devnum);
        self.sysfs.write_string("trigger/current_trigger", &trigger)?;
        self.sysfs.write_flag("buffer/enable", true)?;
        self.trigger = Some(trigger);
        self.buffering = true;
        info!("{}: buffering started", self.sys_id);
        Ok(())
    }

    /// Disable buffering. No-op when idle. Channel enables and the trigger
    /// assignment stay as they are.
    pub fn stop_buffer(&mut self) -> Result<()> {
        if !self.buffering {
            return Ok(());
        }
        self.sysfs.write_flag("buffer/enable", false)?;
        self.buffering = false;
        info!("{}: buffering stopped", self.sys_id);
        Ok(())
    }

    /// Read up to `count` records from the buffer, leaving the device as it
    /// was found.
    ///
    /// Channel enables and the buffering state are recorded on entry,
    /// brought up as needed for the capture, and restored on the way out,
    /// whether or not the capture succeeded.
    ///
    /// Must not run while a collector is consuming the same device: both
    /// would compete for buffer contents and toggle the same endpoints.
    pub fn read_buffer(&mut self, count: usize) -> Result<Vec<Row>> {
        let prior: Vec<bool> = self.channels.iter().map(|c| c.enabled).collect();
        if prior.iter().any(|enabled| !enabled) {
            self.enable_channels()?;
        }
        let was_buffering = self.buffering;
        if !was_buffering {
            self.start_buffer()?;
        }

        let captured = self.capture_bounded(count);

        if !was_buffering {
            self.stop_buffer()?;
        }
        for (channel, was_enabled) in self.channels.iter_mut().zip(prior) {
            if !was_enabled {
                channel.disable()?;
            }
        }
        captured
    }

    fn capture_bounded(&self, count: usize) -> Result<Vec<Row>> {
        let size = self.record_size();
        let mut node =
            File::open(&self.dev_node).map_err(|e| IioError::io(&self.dev_node, e))?;
        let mut data = vec![0u8; size];
        let mut rows = Vec::new();

        'records: for _ in 0..count {
            let mut row = None;
            for _ in 0..READ_ATTEMPTS {
                match node.read(&mut data) {
                    Ok(n) if n == size => {
                        row = Some(self.decode_record(&data)?);
                        break;
                    }
                    // A short read cut the record off; drop it and end the
                    // capture with what decoded so far.
                    Ok(_) => break 'records,
                    Err(e) if would_block(&e) => continue,
                    Err(e) => return Err(IioError::io(&self.dev_node, e)),
                }
            }
            match row {
                Some(r) if !r.is_empty() => rows.push(r),
                _ => break,
            }
        }
        Ok(rows)
    }

    /// Start open-ended background collection, bringing buffering up first
    /// if needed. At most one collector runs per device, and `read_buffer`
    /// must not be used while it does.
    pub fn start_collecting(&mut self) -> Result<()> {
        if self.collector.is_some() {
            warn!("{}: already collecting", self.sys_id);
            return Ok(());
        }
        if !self.buffering {
            self.start_buffer()?;
        }
        let mut collector = Collector::new(self)?;
        collector.start();
        self.collector = Some(collector);
        Ok(())
    }

    /// Rows collected since the last call. Empty when no collector runs.
    pub fn collect_data(&mut self) -> Vec<Row> {
        self.collector.as_ref().map_or_else(Vec::new, Collector::get_data)
    }

    /// Stop background collection and buffering, returning the rows not yet
    /// drained by `collect_data`.
    pub fn stop_collecting(&mut self) -> Result<Vec<Row>> {
        let Some(mut collector) = self.collector.take() else {
            return Ok(Vec::new());
        };
        collector.stop();
        let rows = collector.get_data();
        self.stop_buffer()?;
        Ok(rows)
    }

    /// One formatted status block for this device.
    pub fn status(&self) -> String {
        let mut s = format!(" {:<2} {:15} ", self.devnum, self.name);
        for channel in &self.channels {
            if s.contains('\n') {
                s.push_str("                    ");
            }
            let descriptor = channel.descriptor.as_deref().unwrap_or("-");
            s.push_str(&format!(
                "{:40} {:7} {:2}     {}\n",
                channel.name,
                channel.enabled.to_string(),
                channel.index,
                descriptor
            ));
        }
        s
    }
}
