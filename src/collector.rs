use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};

use crate::channel::DecodePlan;
use crate::device::{would_block, Device, Row};
use crate::{IioError, Result};

/// Pause between read attempts when the data node has nothing to give.
const RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Scan-set snapshot the worker decodes against: name, plan and scale per
/// channel in packed order. The layout never changes while a collector runs.
struct ScanLayout {
    channels: Vec<(String, DecodePlan, f64)>,
    record_size: usize,
}

fn decode_record(layout: &ScanLayout, data: &[u8]) -> Result<Row> {
    let mut row = Row::new();
    let mut pos = 0;
    for (name, plan, scale) in &layout.channels {
        let (value, consumed) = plan.decode(&data[pos..], *scale)?;
        pos += consumed;
        row.insert(name.clone(), value);
    }
    Ok(row)
}

/// Open-ended background capture bound to one device.
///
/// Construction opens a non-blocking read handle on the device's data node
/// and snapshots the scan layout; `start` launches one worker thread that
/// owns the handle until the collector stops. Decoded rows flow through an
/// unbounded channel, so draining them never races the worker.
pub struct Collector {
    node: Option<File>,
    layout: Option<ScanLayout>,
    tx: Option<Sender<Row>>,
    rows: Receiver<Row>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Collector {
    /// Snapshot the device's scan set and open its data node non-blocking.
    ///
    /// Fails up front when nothing is enabled or when an enabled channel has
    /// no decode plan, so the worker itself can never hit either case.
    pub fn new(device: &Device) -> Result<Collector> {
        let mut channels = Vec::new();
        for channel in device.scan_set() {
            let plan = channel
                .plan
                .clone()
                .ok_or_else(|| IioError::UnsupportedFormat(channel.name.clone()))?;
            channels.push((channel.name.clone(), plan, channel.scale));
        }
        if channels.is_empty() {
            return Err(IioError::NothingEnabled);
        }
        let record_size = channels.iter().map(|(_, plan, _)| plan.storage_size).sum();

        let node = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(device.dev_node())
            .map_err(|e| IioError::io(device.dev_node(), e))?;

        let (tx, rows) = unbounded();
        Ok(Collector {
            node: Some(node),
            layout: Some(ScanLayout {
                channels,
                record_size,
            }),
            tx: Some(tx),
            rows,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    /// Launch the worker thread. It reads one record per iteration until
    /// the stop flag is set.
    pub fn start(&mut self) {
        let (Some(mut node), Some(layout), Some(tx)) =
            (self.node.take(), self.layout.take(), self.tx.take())
        else {
            return;
        };
        let stop = Arc::clone(&self.stop);
        self.worker = Some(thread::spawn(move || {
            let mut data = vec![0u8; layout.record_size];
            while !stop.load(Ordering::SeqCst) {
                match node.read(&mut data) {
                    Ok(n) if n == data.len() => match decode_record(&layout, &data) {
                        Ok(row) => {
                            if tx.send(row).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("dropping undecodable record: {e}");
                            thread::sleep(RETRY_PAUSE);
                        }
                    },
                    // A partial or empty read means a full record has not
                    // arrived yet; treated the same as would-block.
                    Ok(_) => thread::sleep(RETRY_PAUSE),
                    Err(e) if would_block(&e) => thread::sleep(RETRY_PAUSE),
                    Err(e) => {
                        warn!("read error on data node: {e}");
                        thread::sleep(RETRY_PAUSE);
                    }
                }
            }
            debug!("collector worker finished");
        }));
    }

    /// Drain everything collected since the previous call. Rows come back
    /// in read order and are delivered at most once.
    pub fn get_data(&self) -> Vec<Row> {
        self.rows.try_iter().collect()
    }

    /// Cooperative stop: flag the worker and wait for its current
    /// iteration. The read handle closes when the worker drops it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("collector worker panicked");
            }
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn fake_device(root: &TempDir, descriptor: &str) -> Device {
        let sys = root.path().join("iio:device0");
        let dev = root.path().join("dev");
        let scan = sys.join("scan_elements");
        fs::create_dir_all(&scan).unwrap();
        fs::create_dir_all(&dev).unwrap();
        write(&sys, "name", "test_sensor\n");
        write(&scan, "in_test_a_en", "1\n");
        write(&scan, "in_test_a_index", "0\n");
        write(&scan, "in_test_a_type", descriptor);
        fs::write(dev.join("iio:device0"), b"").unwrap();
        Device::open(&sys, &dev).unwrap()
    }

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn refuses_an_empty_scan_set() {
        let root = TempDir::new().unwrap();
        let mut device = fake_device(&root, "le:s16/16>>0\n");
        device.disable_channels().unwrap();
        assert!(matches!(Collector::new(&device), Err(IioError::NothingEnabled)));
    }

    #[test]
    fn refuses_enabled_channels_without_a_plan() {
        let root = TempDir::new().unwrap();
        let device = fake_device(&root, "le:u24/32>>0\n");
        assert!(matches!(
            Collector::new(&device),
            Err(IioError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn get_data_is_empty_before_start() {
        let root = TempDir::new().unwrap();
        let device = fake_device(&root, "le:s16/16>>0\n");
        let collector = Collector::new(&device).unwrap();
        assert!(collector.get_data().is_empty());
    }
}
