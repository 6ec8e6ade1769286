//! # Application Configuration
//!
//! `AppConfig`, the internal structured form of a parsed run, assembled from
//! `cli::Args` via `TryFrom`. Mirrors the teacher's `cli::BenchmarkConfiguration`
//! / `From<&Args>` pattern, made fallible because descriptor and proto-settings
//! parsing can fail on bad user input where the teacher's conversion could not.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::{parse_descriptor, parse_port_range_list, parse_proto_settings, Args, Descriptor, PortRange};
use crate::comsettings::ComSettings;
use crate::error::ConfigError;
use crate::transport::AddrFamily;

/// Floor for `--buf-size`: below this, the socket I/O buffer can't even hold one
/// protocol frame header (see `protocol::HEADER_LEN`), so `Codec::new` would
/// panic rather than reject the input cleanly.
const MIN_BUF_SIZE: usize = 64;

/// What a run should do once arguments are parsed: open connections against a
/// descriptor, or bind listeners on a port list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Mode {
    Client { descriptor: DescriptorConfig, connections: usize },
    Server { ports: Vec<PortRange> },
}

/// The serializable subset of a [`Descriptor`] -- `TransportProps` carries a
/// `&'static str` name and is reconstructed from it rather than serialized
/// directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DescriptorConfig {
    pub proto: String,
    pub host: String,
    pub ports: Vec<PortRange>,
    pub local_addr: Option<String>,
    pub local_port: u16,
}

impl From<&Descriptor> for DescriptorConfig {
    fn from(d: &Descriptor) -> Self {
        Self {
            proto: d.transport.name.to_string(),
            host: d.host.clone(),
            ports: d.ports.clone(),
            local_addr: d.local_addr.clone(),
            local_port: d.local_port,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub mode: Mode,
    pub family: AddrFamilyConfig,
    pub interval: f64,
    pub count: Option<u64>,
    pub time_budget_secs: Option<u64>,
    pub buf_size: usize,
    pub status_interval_secs: u64,
    pub com_settings: ComSettingsConfig,
}

/// Serializable mirror of `AddrFamily` -- the original enum carries no data,
/// but deriving `Serialize`/`Deserialize` directly on a type from the
/// transport module would pull an unwanted dependency edge; this local copy
/// keeps the config layer self-contained.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum AddrFamilyConfig {
    V4,
    V6,
    Either,
}

impl From<AddrFamily> for AddrFamilyConfig {
    fn from(f: AddrFamily) -> Self {
        match f {
            AddrFamily::V4 => AddrFamilyConfig::V4,
            AddrFamily::V6 => AddrFamilyConfig::V6,
            AddrFamily::Either => AddrFamilyConfig::Either,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComSettingsConfig {
    pub request: (u32, u32, u32),
    pub response: (u32, u32, u32),
}

impl From<&ComSettings> for ComSettingsConfig {
    fn from(c: &ComSettings) -> Self {
        Self {
            request: (c.request.min, c.request.max, c.request.step),
            response: (c.response.min, c.response.max, c.response.step),
        }
    }
}

impl AppConfig {
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.map(Duration::from_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }
}

impl TryFrom<&Args> for AppConfig {
    type Error = ConfigError;

    fn try_from(args: &Args) -> Result<Self, ConfigError> {
        let family = if args.ipv4 {
            AddrFamily::V4
        } else if args.ipv6 {
            AddrFamily::V6
        } else {
            AddrFamily::Either
        };

        if args.interval < 0.0 || (args.interval > 0.0 && args.interval < 1e-6) {
            return Err(ConfigError::SubMicrosecondInterval(args.interval));
        }

        if args.buf_size < MIN_BUF_SIZE {
            return Err(ConfigError::BufferTooSmall(args.buf_size, MIN_BUF_SIZE));
        }

        let com_settings = parse_proto_settings(&args.proto_settings)?;

        let mode = match &args.listen {
            Some(portlist) => {
                let ports = parse_port_range_list(portlist)?;
                if ports.is_empty() {
                    return Err(ConfigError::InvalidPortRange(portlist.clone()));
                }
                Mode::Server { ports }
            }
            None => {
                let descriptor = parse_descriptor(&args.descriptor)?;
                Mode::Client {
                    descriptor: DescriptorConfig::from(&descriptor),
                    connections: args.connections,
                }
            }
        };

        Ok(Self {
            mode,
            family: family.into(),
            interval: args.interval,
            count: args.count,
            time_budget_secs: args.time,
            buf_size: args.buf_size,
            status_interval_secs: args.status,
            com_settings: ComSettingsConfig::from(&com_settings),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn try_from_client_descriptor_builds_client_mode() {
        let args = Args::parse_from(["babbler", "tcp://127.0.0.1:5000", "--proto-settings", "100"]);
        let config = AppConfig::try_from(&args).unwrap();
        match config.mode {
            Mode::Client { descriptor, connections } => {
                assert_eq!(descriptor.host, "127.0.0.1");
                assert_eq!(connections, 1);
            }
            Mode::Server { .. } => panic!("expected client mode"),
        }
    }

    #[test]
    fn try_from_listen_flag_builds_server_mode() {
        let args = Args::parse_from(["babbler", "-l", "55001-55002", "tcp://unused"]);
        let config = AppConfig::try_from(&args).unwrap();
        match config.mode {
            Mode::Server { ports } => assert_eq!(ports[0], PortRange { start: 55001, end: 55002 }),
            Mode::Client { .. } => panic!("expected server mode"),
        }
    }

    #[test]
    fn try_from_rejects_bad_proto_settings() {
        let args = Args::parse_from(["babbler", "tcp://127.0.0.1", "--proto-settings", "10"]);
        assert!(AppConfig::try_from(&args).is_err());
    }

    #[test]
    fn try_from_rejects_buf_size_below_the_minimum() {
        let mut args = Args::parse_from(["babbler", "tcp://127.0.0.1", "--proto-settings", "100"]);
        args.buf_size = 16;
        assert!(matches!(
            AppConfig::try_from(&args),
            Err(ConfigError::BufferTooSmall(16, 64))
        ));
    }

    #[test]
    fn try_from_rejects_sub_microsecond_interval() {
        let mut args = Args::parse_from(["babbler", "tcp://127.0.0.1", "--proto-settings", "100"]);
        args.interval = 0.0000001;
        assert!(matches!(
            AppConfig::try_from(&args),
            Err(ConfigError::SubMicrosecondInterval(_))
        ));
    }
}
