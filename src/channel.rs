use regex_lite::Regex;
use serde::Serialize;

use crate::sysfs::SysfsDir;
use crate::{IioError, Result};

/// Byte order of a channel's packed samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// One decoded channel reading: a scalar, or one value per repeat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

/// Decode plan parsed from a scan-element type descriptor such as
/// `le:s16/16>>0` or `be:u16/32X4>>8`.
///
/// `storage_size` is the number of bytes one packed instance occupies in an
/// interleaved record; `decode_size` is the number of bytes the decode step
/// actually interprets. They differ when the storage width is wider than the
/// decoded element width.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodePlan {
    pub endian: Endian,
    pub signed: bool,
    pub value_bits: u32,
    pub storage_bits: u32,
    pub repeat: usize,
    /// Right-shift from the descriptor. Captured but never applied while
    /// decoding.
    pub shift: u32,
    pub storage_size: usize,
    pub decode_size: usize,
}

impl DecodePlan {
    /// Parse a descriptor of the form
    /// `<be|le>:<s|u><value_bits>/<storage_bits>[X<repeat>]>><shift>`.
    ///
    /// Returns `None` when the grammar does not match or when the value
    /// width has no decode operation (only 16 and 32 bit elements do).
    pub fn parse(descriptor: &str) -> Option<DecodePlan> {
        let pattern =
            Regex::new(r"^(be|le):(s|u)(\d+)/(\d+)(X\d+)?>>(\d+)$").expect("descriptor pattern");
        let caps = pattern.captures(descriptor)?;

        let endian = if &caps[1] == "be" {
            Endian::Big
        } else {
            Endian::Little
        };
        let signed = &caps[2] == "s";
        let value_bits: u32 = caps[3].parse().ok()?;
        let storage_bits: u32 = caps[4].parse().ok()?;
        let repeat: usize = match caps.get(5) {
            Some(m) => m.as_str()[1..].parse().ok()?,
            None => 1,
        };
        let shift: u32 = caps[6].parse().ok()?;

        if repeat == 0 {
            return None;
        }
        let element = match value_bits {
            16 => 2,
            32 => 4,
            _ => return None,
        };

        Some(DecodePlan {
            endian,
            signed,
            value_bits,
            storage_bits,
            repeat,
            shift,
            storage_size: (storage_bits as usize / 8) * repeat,
            decode_size: element * repeat,
        })
    }

    /// Decode one packed instance from the front of `buf`.
    ///
    /// Interprets `decode_size` bytes, scales each extracted integer by
    /// `scale`, and returns the value(s) plus the number of bytes the caller
    /// should advance through the record, which is `storage_size`.
    pub fn decode(&self, buf: &[u8], scale: f64) -> Result<(Value, usize)> {
        if buf.len() < self.decode_size {
            return Err(IioError::TruncatedRecord {
                needed: self.decode_size,
                got: buf.len(),
            });
        }

        let element = self.decode_size / self.repeat;
        let mut vals = Vec::with_capacity(self.repeat);
        for n in 0..self.repeat {
            let off = n * element;
            let raw = if element == 2 {
                let bytes = [buf[off], buf[off + 1]];
                match (self.signed, self.endian) {
                    (true, Endian::Little) => i16::from_le_bytes(bytes) as f64,
                    (true, Endian::Big) => i16::from_be_bytes(bytes) as f64,
                    (false, Endian::Little) => u16::from_le_bytes(bytes) as f64,
                    (false, Endian::Big) => u16::from_be_bytes(bytes) as f64,
                }
            } else {
                let bytes = [buf[off], buf[off + 1], buf[off + 2], buf[off + 3]];
                match (self.signed, self.endian) {
                    (true, Endian::Little) => i32::from_le_bytes(bytes) as f64,
                    (true, Endian::Big) => i32::from_be_bytes(bytes) as f64,
                    (false, Endian::Little) => u32::from_le_bytes(bytes) as f64,
                    (false, Endian::Big) => u32::from_be_bytes(bytes) as f64,
                }
            };
            vals.push(raw * scale);
        }

        let value = if self.repeat == 1 {
            Value::Scalar(vals[0])
        } else {
            Value::Vector(vals)
        };
        Ok((value, self.storage_size))
    }
}

/// One named data stream of a device, discovered under `scan_elements/`.
#[derive(Debug, Clone)]
pub struct Channel {
    sysfs: SysfsDir,
    pub name: String,
    pub family: String,
    pub index: u32,
    pub enabled: bool,
    pub scale: f64,
    pub descriptor: Option<String>,
    pub plan: Option<DecodePlan>,
}

impl Channel {
    /// Channel-type family: the first two underscore-separated tokens of the
    /// name. Channels in one family share a scale factor.
    pub fn family_of(name: &str) -> String {
        name.split('_').take(2).collect::<Vec<_>>().join("_")
    }

    /// Build a channel from its `scan_elements/` attributes. The descriptor
    /// is parsed once here and never re-parsed.
    pub fn new(scan_elements: SysfsDir, name: &str, scale: f64) -> Result<Channel> {
        let index = scan_elements.read_number(&format!("{name}_index"), 0.0)? as u32;
        let descriptor = match scan_elements.read_string(&format!("{name}_type"), "")? {
            s if s.is_empty() => None,
            s => Some(s),
        };
        let plan = descriptor.as_deref().and_then(DecodePlan::parse);

        let mut channel = Channel {
            sysfs: scan_elements,
            family: Channel::family_of(name),
            name: name.to_string(),
            index,
            enabled: false,
            scale,
            descriptor,
            plan,
        };
        channel.refresh_status()?;
        Ok(channel)
    }

    /// Re-read the `_en` attribute into the cached enabled flag.
    pub fn refresh_status(&mut self) -> Result<()> {
        self.enabled = self.sysfs.read_flag(&format!("{}_en", self.name), false)?;
        Ok(())
    }

    pub fn enable(&mut self) -> Result<()> {
        if self.enabled {
            return Ok(());
        }
        self.sysfs.write_flag(&format!("{}_en", self.name), true)?;
        self.refresh_status()
    }

    pub fn disable(&mut self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.sysfs.write_flag(&format!("{}_en", self.name), false)?;
        self.refresh_status()
    }

    fn repeat(&self) -> usize {
        self.plan.as_ref().map_or(1, |p| p.repeat)
    }

    /// Decode one packed instance of this channel from the front of `buf`.
    pub fn decode(&self, buf: &[u8]) -> Result<(Value, usize)> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| IioError::UnsupportedFormat(self.name.clone()))?;
        plan.decode(buf, self.scale)
    }

    /// Parse the textual content of a `_raw` attribute: whitespace-separated
    /// numeric tokens, unscaled.
    pub fn parse_raw(&self, text: &str) -> Result<Value> {
        let num = |token: &str| -> Result<f64> {
            let parsed = if token.contains('.') {
                token.parse::<f64>().ok()
            } else {
                token.parse::<i64>().ok().map(|n| n as f64)
            };
            parsed.ok_or_else(|| IioError::BadValue(token.to_string()))
        };
        if self.repeat() == 1 {
            num(text.trim()).map(Value::Scalar)
        } else {
            let vals: Result<Vec<f64>> = text.split_whitespace().map(num).collect();
            vals.map(Value::Vector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(descriptor: &str) -> DecodePlan {
        DecodePlan::parse(descriptor).expect("descriptor should parse")
    }

    fn bare_channel(plan: Option<DecodePlan>) -> Channel {
        Channel {
            sysfs: SysfsDir::new("/nonexistent"),
            name: "in_accel_x".to_string(),
            family: "in_accel".to_string(),
            index: 0,
            enabled: false,
            scale: 1.0,
            descriptor: None,
            plan,
        }
    }

    #[test]
    fn parses_simple_descriptor() {
        let p = plan("le:u16/16>>0");
        assert_eq!(p.endian, Endian::Little);
        assert!(!p.signed);
        assert_eq!((p.value_bits, p.storage_bits), (16, 16));
        assert_eq!((p.repeat, p.shift), (1, 0));
        assert_eq!(p.storage_size, 2);
        assert_eq!(p.decode_size, 2);
    }

    #[test]
    fn parses_repeat_and_shift() {
        let p = plan("be:s32/32X2>>3");
        assert_eq!(p.endian, Endian::Big);
        assert!(p.signed);
        assert_eq!(p.repeat, 2);
        assert_eq!(p.shift, 3);
        assert_eq!(p.storage_size, 8);
        assert_eq!(p.decode_size, 8);
    }

    #[test]
    fn storage_may_exceed_decode_width() {
        let p = plan("le:u16/32>>0");
        assert_eq!(p.storage_size, 4);
        assert_eq!(p.decode_size, 2);
    }

    #[test]
    fn rejects_unknown_grammar() {
        assert!(DecodePlan::parse("le:u16/16").is_none());
        assert!(DecodePlan::parse("xx:u16/16>>0").is_none());
        assert!(DecodePlan::parse("le:q16/16>>0").is_none());
        assert!(DecodePlan::parse("").is_none());
    }

    #[test]
    fn rejects_widths_without_a_decode_operation() {
        assert!(DecodePlan::parse("le:u24/32>>0").is_none());
        assert!(DecodePlan::parse("be:s64/64>>0").is_none());
        assert!(DecodePlan::parse("le:u16/16X0>>0").is_none());
    }

    #[test]
    fn decodes_scaled_u16() {
        let p = plan("le:u16/16>>0");
        let (value, consumed) = p.decode(&[0x64, 0x00], 0.01).unwrap();
        assert_eq!(value, Value::Scalar(1.00));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn decodes_big_endian_pair() {
        let p = plan("be:s32/32X2>>0");
        let mut data = Vec::new();
        data.extend_from_slice(&(-5i32).to_be_bytes());
        data.extend_from_slice(&17i32.to_be_bytes());
        let (value, consumed) = p.decode(&data, 1.0).unwrap();
        assert_eq!(value, Value::Vector(vec![-5.0, 17.0]));
        assert_eq!(consumed, 8);
    }

    #[test]
    fn consumed_bytes_follow_storage_not_decode_width() {
        let p = plan("le:s16/32>>0");
        let data = [0x9c, 0xff, 0x00, 0x00];
        let (value, consumed) = p.decode(&data, 1.0).unwrap();
        assert_eq!(value, Value::Scalar(-100.0));
        assert_eq!(consumed, 4);
    }

    #[test]
    fn short_buffer_is_a_truncated_record() {
        let p = plan("le:u32/32>>0");
        match p.decode(&[1, 2], 1.0) {
            Err(IioError::TruncatedRecord { needed, got }) => {
                assert_eq!((needed, got), (4, 2));
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn family_is_the_first_two_name_tokens() {
        assert_eq!(Channel::family_of("in_accel_x"), "in_accel");
        assert_eq!(Channel::family_of("in_magn_z"), "in_magn");
        assert_eq!(Channel::family_of("timestamp"), "timestamp");
    }

    #[test]
    fn decode_without_a_plan_is_unsupported() {
        let channel = bare_channel(None);
        assert!(matches!(
            channel.decode(&[0, 0]),
            Err(IioError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn parse_raw_scalar() {
        let channel = bare_channel(None);
        assert_eq!(channel.parse_raw("531").unwrap(), Value::Scalar(531.0));
        assert_eq!(channel.parse_raw("-2.5").unwrap(), Value::Scalar(-2.5));
    }

    #[test]
    fn parse_raw_vector_splits_on_whitespace() {
        let channel = bare_channel(DecodePlan::parse("le:u16/16X3>>0"));
        assert_eq!(
            channel.parse_raw("1 2 3").unwrap(),
            Value::Vector(vec![1.0, 2.0, 3.0])
        );
    }

    #[test]
    fn parse_raw_rejects_junk() {
        let channel = bare_channel(None);
        assert!(channel.parse_raw("not-a-number").is_err());
    }
}
