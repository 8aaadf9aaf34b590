pub mod channel;
pub mod collector;
pub mod config;
pub mod device;
pub mod error;
pub mod iio;
pub mod sysfs;

pub use channel::{Channel, DecodePlan, Endian, Value};
pub use collector::Collector;
pub use config::Conf;
pub use device::{Device, Row};
pub use error::{IioError, Result};
pub use iio::Iio;
pub use sysfs::SysfsDir;
