//! Bridge topology: parses the colon-delimited device specification into
//! passive instances or bidirectional bridge pairs.

use crate::error::{Error, Result};

pub const MAX_INTERFACES: usize = 32;
const IFNAMSIZ: usize = libc::IF_NAMESIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Passive,
    Inline,
}

/// One parsed device entry: its name and, in in-line mode, the index of
/// its peer within the returned list (stored as indices, never as
/// reciprocal-owning back-pointers).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceEntry {
    pub name: String,
    pub peer: Option<usize>,
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::ConfigError("empty interface name".into()));
    }
    if name.len() > IFNAMSIZ - 1 {
        return Err(Error::ConfigError(format!(
            "interface name too long: {}",
            name
        )));
    }
    Ok(())
}

/// Parses the device specification.
///
/// Passive mode: a flat `:`-separated list; `::` is forbidden.
/// In-line mode: `::` separates bridge pairs, each pair is two names joined
/// by a single `:`; a trailing group that doesn't split into exactly two
/// names is a "trailing unpaired interface" error.
///
/// Leading/trailing `:` is invalid in both modes. At most
/// [`MAX_INTERFACES`] names total.
pub fn parse_device_spec(spec: &str, mode: Mode) -> Result<Vec<DeviceEntry>> {
    if spec.is_empty() {
        return Err(Error::ConfigError("empty device specification".into()));
    }
    if spec.starts_with(':') || spec.ends_with(':') {
        return Err(Error::ConfigError(
            "device specification may not start or end with ':'".into(),
        ));
    }

    let entries = match mode {
        Mode::Passive => parse_passive(spec)?,
        Mode::Inline => parse_inline(spec)?,
    };

    if entries.len() > MAX_INTERFACES {
        return Err(Error::ConfigError(format!(
            "too many interfaces: {} (max {})",
            entries.len(),
            MAX_INTERFACES
        )));
    }
    for entry in &entries {
        check_name(&entry.name)?;
    }
    Ok(entries)
}

fn parse_passive(spec: &str) -> Result<Vec<DeviceEntry>> {
    if spec.contains("::") {
        return Err(Error::ConfigError(
            "'::' bridge-pair separator is not allowed in passive mode".into(),
        ));
    }
    Ok(spec
        .split(':')
        .map(|name| DeviceEntry {
            name: name.to_string(),
            peer: None,
        })
        .collect())
}

fn parse_inline(spec: &str) -> Result<Vec<DeviceEntry>> {
    let mut entries = Vec::new();
    for group in spec.split("::") {
        let names: Vec<&str> = group.split(':').collect();
        if names.len() != 2 {
            return Err(Error::ConfigError(format!(
                "trailing unpaired interface in non-passive mode: {:?}",
                group
            )));
        }
        let a_idx = entries.len();
        let b_idx = entries.len() + 1;
        entries.push(DeviceEntry {
            name: names[0].to_string(),
            peer: Some(b_idx),
        });
        entries.push(DeviceEntry {
            name: names[1].to_string(),
            peer: Some(a_idx),
        });
    }
    Ok(entries)
}
