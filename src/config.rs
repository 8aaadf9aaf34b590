use std::path::Path;

use confique::Config;

/// Runtime configuration: defaults, overlaid by an optional TOML file,
/// overlaid by `IIO_`-prefixed environment variables.
#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub paths: PathSettings,
    #[config(nested)]
    pub capture: CaptureSettings,
}

#[derive(Config, Debug, Clone)]
pub struct PathSettings {
    /// Where the kernel publishes the bus's device directories.
    #[config(default = "/sys/bus/iio/devices", env = "IIO_SYSFS_DIR")]
    pub sysfs_dir: String,
    /// Directory holding the per-device data nodes.
    #[config(default = "/dev", env = "IIO_DEV_DIR")]
    pub dev_dir: String,
}

#[derive(Config, Debug, Clone)]
pub struct CaptureSettings {
    /// Seconds of continuous collection for a timed read.
    #[config(default = 5.0)]
    pub read_time: f64,
    /// Records per bounded capture.
    #[config(default = 10)]
    pub read_records: usize,
}

impl Conf {
    pub fn load(file: Option<&Path>) -> Result<Conf, confique::Error> {
        let mut builder = Conf::builder().env();
        if let Some(file) = file {
            builder = builder.file(file);
        }
        builder.load()
    }
}
