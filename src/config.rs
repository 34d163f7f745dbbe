//! Configuration key parsing. Plain key/value decoding only — generic
//! CLI/config plumbing is an external collaborator; this module never
//! owns an argument parser.

use crate::error::{Error, Result};
use crate::tpacket;

const DEFAULT_BUFFER_MB: u64 = 128;
const BUFFER_SIZE_ENV: &str = "AF_PACKET_BUFFER_SIZE";

/// One recognized configuration key, returned by `get_variable_descs`.
pub struct VariableDesc {
    pub name: &'static str,
    pub description: &'static str,
}

pub const VARIABLE_DESCS: &[VariableDesc] = &[
    VariableDesc {
        name: "buffer_size_mb",
        description: "Total packet buffer memory in MB, split evenly across rings, or 'max'",
    },
    VariableDesc {
        name: "debug",
        description: "Enable diagnostic logging (no argument)",
    },
    VariableDesc {
        name: "fanout_type",
        description: "PACKET_FANOUT method: hash, lb, cpu, rollover, rnd, qm",
    },
    VariableDesc {
        name: "fanout_flag",
        description: "PACKET_FANOUT flag to OR in: rollover, defrag",
    },
];

/// `get_variable_descs`: the static list of recognized config keys,
/// independent of any `Context` instance.
pub fn get_variable_descs() -> &'static [VariableDesc] {
    VARIABLE_DESCS
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FanoutConfig {
    pub method: libc::c_int,
    pub flags: libc::c_int,
}

#[derive(Clone, Debug)]
pub struct ModuleConfig {
    pub buffer_bytes_per_ring_group: u64,
    pub debug: bool,
    pub fanout: Option<FanoutConfig>,
}

impl ModuleConfig {
    /// Parses the key-value option list. Unknown keys are a
    /// `ConfigError` (the host should only ever pass keys from
    /// `get_variable_descs`).
    pub fn from_options(opts: &[(String, String)]) -> Result<ModuleConfig> {
        let mut buffer_mb: Option<String> = None;
        let mut debug = false;
        let mut fanout_type: Option<libc::c_int> = None;
        let mut fanout_flags: libc::c_int = 0;

        for (key, value) in opts {
            match key.as_str() {
                "buffer_size_mb" => buffer_mb = Some(value.clone()),
                "debug" => debug = true,
                "fanout_type" => fanout_type = Some(parse_fanout_type(value)?),
                "fanout_flag" => fanout_flags |= parse_fanout_flag(value)?,
                other => {
                    return Err(Error::ConfigError(format!(
                        "unrecognized configuration key: {}",
                        other
                    )))
                }
            }
        }

        let buffer_mb = resolve_buffer_mb(buffer_mb.as_deref())?;
        let fanout = fanout_type.map(|method| FanoutConfig {
            method,
            flags: fanout_flags,
        });

        Ok(ModuleConfig {
            buffer_bytes_per_ring_group: buffer_mb * 1024 * 1024,
            debug,
            fanout,
        })
    }
}

fn resolve_buffer_mb(value: Option<&str>) -> Result<u64> {
    match value {
        Some(v) if v != "max" => v
            .parse::<u64>()
            .map_err(|_| Error::ConfigError(format!("invalid buffer_size_mb: {}", v))),
        _ => match std::env::var(BUFFER_SIZE_ENV) {
            Ok(v) => v
                .parse::<u64>()
                .map_err(|_| Error::ConfigError(format!("invalid {}: {}", BUFFER_SIZE_ENV, v))),
            Err(_) => Ok(DEFAULT_BUFFER_MB),
        },
    }
}

fn parse_fanout_type(value: &str) -> Result<libc::c_int> {
    Ok(match value {
        "hash" => tpacket::PACKET_FANOUT_HASH,
        "lb" => tpacket::PACKET_FANOUT_LB,
        "cpu" => tpacket::PACKET_FANOUT_CPU,
        "rollover" => tpacket::PACKET_FANOUT_ROLLOVER,
        "rnd" => tpacket::PACKET_FANOUT_RND,
        "qm" => tpacket::PACKET_FANOUT_QM,
        other => {
            return Err(Error::ConfigError(format!(
                "unrecognized fanout_type: {}",
                other
            )))
        }
    })
}

fn parse_fanout_flag(value: &str) -> Result<libc::c_int> {
    Ok(match value {
        "rollover" => tpacket::PACKET_FANOUT_FLAG_ROLLOVER,
        "defrag" => tpacket::PACKET_FANOUT_FLAG_DEFRAG,
        other => {
            return Err(Error::ConfigError(format!(
                "unrecognized fanout_flag: {}",
                other
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_is_128mb_with_no_env_and_no_key() {
        std::env::remove_var(BUFFER_SIZE_ENV);
        let cfg = ModuleConfig::from_options(&[]).unwrap();
        assert_eq!(cfg.buffer_bytes_per_ring_group, 128 * 1024 * 1024);
        assert!(!cfg.debug);
        assert!(cfg.fanout.is_none());
    }

    #[test]
    fn explicit_decimal_buffer_is_used() {
        std::env::remove_var(BUFFER_SIZE_ENV);
        let cfg =
            ModuleConfig::from_options(&[("buffer_size_mb".into(), "64".into())]).unwrap();
        assert_eq!(cfg.buffer_bytes_per_ring_group, 64 * 1024 * 1024);
    }

    #[test]
    fn max_literal_falls_through_to_default() {
        std::env::remove_var(BUFFER_SIZE_ENV);
        let cfg =
            ModuleConfig::from_options(&[("buffer_size_mb".into(), "max".into())]).unwrap();
        assert_eq!(cfg.buffer_bytes_per_ring_group, 128 * 1024 * 1024);
    }

    #[test]
    fn debug_flag_needs_no_value() {
        let cfg = ModuleConfig::from_options(&[("debug".into(), String::new())]).unwrap();
        assert!(cfg.debug);
    }

    #[test]
    fn fanout_type_and_flag_combine() {
        let cfg = ModuleConfig::from_options(&[
            ("fanout_type".into(), "hash".into()),
            ("fanout_flag".into(), "rollover".into()),
            ("fanout_flag".into(), "defrag".into()),
        ])
        .unwrap();
        let fanout = cfg.fanout.unwrap();
        assert_eq!(fanout.method, tpacket::PACKET_FANOUT_HASH);
        assert_eq!(
            fanout.flags,
            tpacket::PACKET_FANOUT_FLAG_ROLLOVER | tpacket::PACKET_FANOUT_FLAG_DEFRAG
        );
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(ModuleConfig::from_options(&[("bogus".into(), "1".into())]).is_err());
    }

    #[test]
    fn variable_descs_exposes_the_four_recognized_keys() {
        let descs = get_variable_descs();
        assert_eq!(descs.len(), 4);
        for name in ["buffer_size_mb", "debug", "fanout_type", "fanout_flag"] {
            assert!(descs.iter().any(|d| d.name == name));
        }
    }
}
