use std::fs;
use std::path::{Path, PathBuf};

use crate::{IioError, Result};

/// Typed access to one directory of sysfs attribute files.
///
/// Each attribute is a small text file. Reads of an absent attribute fall
/// back to a caller-supplied default; a file that exists but cannot be read
/// or parsed is a real error.
#[derive(Debug, Clone)]
pub struct SysfsDir {
    base: PathBuf,
}

impl SysfsDir {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        SysfsDir { base: base.into() }
    }

    pub fn path(&self) -> &Path {
        &self.base
    }

    /// Derive a handle on a sub-directory of this one.
    pub fn join(&self, sub: &str) -> SysfsDir {
        SysfsDir {
            base: self.base.join(sub),
        }
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| IioError::io(path, e))
    }

    /// Read a boolean attribute. Content containing the digit `1` is true.
    pub fn read_flag(&self, name: &str, default: bool) -> Result<bool> {
        let path = self.base.join(name);
        if !path.exists() {
            return Ok(default);
        }
        Ok(self.read_to_string(&path)?.trim().contains('1'))
    }

    /// Read a text attribute, trimmed of surrounding whitespace.
    pub fn read_string(&self, name: &str, default: &str) -> Result<String> {
        let path = self.base.join(name);
        if !path.exists() {
            return Ok(default.to_string());
        }
        Ok(self.read_to_string(&path)?.trim().to_string())
    }

    /// Read a numeric attribute. The text is parsed as an integer unless it
    /// contains a decimal point.
    pub fn read_number(&self, name: &str, default: f64) -> Result<f64> {
        let path = self.base.join(name);
        if !path.exists() {
            return Ok(default);
        }
        let text = self.read_to_string(&path)?;
        let text = text.trim();
        let parsed = if text.contains('.') {
            text.parse::<f64>().ok()
        } else {
            text.parse::<i64>().ok().map(|n| n as f64)
        };
        parsed.ok_or_else(|| IioError::BadValue(text.to_string()))
    }

    /// Write a boolean attribute as the literal text `1` or `0`.
    pub fn write_flag(&self, name: &str, value: bool) -> Result<()> {
        let path = self.base.join(name);
        fs::write(&path, if value { "1" } else { "0" }).map_err(|e| IioError::io(&path, e))
    }

    /// Write a text attribute verbatim.
    pub fn write_string(&self, name: &str, value: &str) -> Result<()> {
        let path = self.base.join(name);
        fs::write(&path, value).map_err(|e| IioError::io(&path, e))
    }

    /// List the entry names under a sub-path, sorted.
    pub fn list(&self, sub: &str) -> Result<Vec<String>> {
        let path = self.base.join(sub);
        let mut names = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| IioError::io(&path, e))? {
            let entry = entry.map_err(|e| IioError::io(&path, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_attributes_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let sysfs = SysfsDir::new(dir.path());
        assert!(sysfs.read_flag("missing", true).unwrap());
        assert_eq!(sysfs.read_string("missing", "fallback").unwrap(), "fallback");
        assert_eq!(sysfs.read_number("missing", 2.5).unwrap(), 2.5);
    }

    #[test]
    fn flag_roundtrip() {
        let dir = TempDir::new().unwrap();
        let sysfs = SysfsDir::new(dir.path());
        sysfs.write_flag("enable", true).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("enable")).unwrap(), "1");
        assert!(sysfs.read_flag("enable", false).unwrap());
        sysfs.write_flag("enable", false).unwrap();
        assert!(!sysfs.read_flag("enable", true).unwrap());
    }

    #[test]
    fn strings_are_trimmed() {
        let dir = TempDir::new().unwrap();
        let sysfs = SysfsDir::new(dir.path());
        fs::write(dir.path().join("name"), "  lsm9ds1_accel\n").unwrap();
        assert_eq!(sysfs.read_string("name", "").unwrap(), "lsm9ds1_accel");
    }

    #[test]
    fn numbers_parse_integer_and_decimal() {
        let dir = TempDir::new().unwrap();
        let sysfs = SysfsDir::new(dir.path());
        fs::write(dir.path().join("index"), "3\n").unwrap();
        fs::write(dir.path().join("scale"), "0.017453\n").unwrap();
        fs::write(dir.path().join("junk"), "three\n").unwrap();
        assert_eq!(sysfs.read_number("index", 0.0).unwrap(), 3.0);
        assert_eq!(sysfs.read_number("scale", 1.0).unwrap(), 0.017453);
        assert!(sysfs.read_number("junk", 0.0).is_err());
    }

    #[test]
    fn lists_a_subdirectory() {
        let dir = TempDir::new().unwrap();
        let scan = dir.path().join("scan_elements");
        fs::create_dir(&scan).unwrap();
        fs::write(scan.join("in_accel_x_en"), "0").unwrap();
        fs::write(scan.join("in_accel_x_index"), "0").unwrap();
        let sysfs = SysfsDir::new(dir.path());
        let names = sysfs.list("scan_elements").unwrap();
        assert_eq!(names, vec!["in_accel_x_en", "in_accel_x_index"]);
    }
}
