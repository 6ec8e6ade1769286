//! # Command-Line Interface
//!
//! Argument parsing via `clap`'s derive API, plus the two small grammars spec.md
//! §6 defines on top of it: the connection descriptor and the `--proto-settings`
//! size specification. Styled help mirrors the teacher's `styles()` helper.

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser,
};
use serde::{Deserialize, Serialize};

use crate::comsettings::{ComSettings, SizeRange};
use crate::error::ConfigError;
use crate::transport::TransportProps;

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const DEFAULT_PROTO_SETTINGS: &str = "1230,1400,12340,13500";

/// A bidirectional network traffic generator and throughput measurement tool.
///
/// In client mode (the default), `descriptor` names a remote host to connect `-n`
/// parallel connections to. Pass `-l`/`--listen` to run in server mode instead,
/// binding one listener per port in the given list.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Increase log verbosity (repeatable up to 4: warn, info, debug, trace, trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run in server mode, listening on this comma-separated port/range list
    #[arg(short = 'l', long = "listen", value_name = "PORTLIST")]
    pub listen: Option<String>,

    /// Restrict to IPv4
    #[arg(short = '4', conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Restrict to IPv6
    #[arg(short = '6', conflicts_with = "ipv4")]
    pub ipv6: bool,

    /// Seconds (float) to sleep between requests on each connection
    #[arg(short = 'i', long = "interval", default_value_t = 0.0)]
    pub interval: f64,

    /// Stop each connection after this many request/response exchanges
    #[arg(short = 'c', long = "count")]
    pub count: Option<u64>,

    /// Stop the whole run after this many wall-clock seconds
    #[arg(short = 't', long = "time")]
    pub time: Option<u64>,

    /// Per-socket internal I/O buffer size, in bytes (minimum 64)
    #[arg(long = "buf-size", default_value_t = 65536)]
    pub buf_size: usize,

    /// Parallel connections to open per descriptor (client mode only)
    #[arg(short = 'n', default_value_t = 1)]
    pub connections: usize,

    /// Periodic status print interval, in seconds
    #[arg(short = 's', long = "status", default_value_t = 3)]
    pub status: u64,

    /// Request/response size specification; see the descriptor grammar in the
    /// project documentation for the 1/2/3/4/5-value forms
    #[arg(long = "proto-settings", default_value = DEFAULT_PROTO_SETTINGS)]
    pub proto_settings: String,

    /// Emit the final summary as a JSON object instead of a human-readable line
    #[arg(long = "json")]
    pub json: bool,

    /// Connection descriptor: `[proto://]host[:port_range_list][:local_addr][:local_port]`
    pub descriptor: String,
}

/// A parsed `port` or `port-port` range from a `port_range_list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

/// Parses a comma-separated port/range list, as used both by the descriptor
/// grammar's `port_range_list` field and by `-l`/`--listen`'s `PORTLIST`.
pub fn parse_port_range_list(s: &str) -> Result<Vec<PortRange>, ConfigError> {
    s.split(',')
        .map(|part| {
            let part = part.trim();
            match part.split_once('-') {
                Some((a, b)) => {
                    let start: u16 = a
                        .parse()
                        .map_err(|_| ConfigError::InvalidPortRange(s.to_string()))?;
                    let end: u16 = b
                        .parse()
                        .map_err(|_| ConfigError::InvalidPortRange(s.to_string()))?;
                    if start > end {
                        return Err(ConfigError::InvalidPortRange(s.to_string()));
                    }
                    Ok(PortRange { start, end })
                }
                None => {
                    let port: u16 = part
                        .parse()
                        .map_err(|_| ConfigError::InvalidPortRange(s.to_string()))?;
                    Ok(PortRange { start: port, end: port })
                }
            }
        })
        .collect()
}

fn transport_for_proto(proto: &str) -> Result<TransportProps, ConfigError> {
    match proto {
        "tcp" => Ok(TransportProps::tcp()),
        "udp" => Ok(TransportProps::udp()),
        "sctp" => Ok(TransportProps::sctp()),
        "dccp" => Ok(TransportProps::dccp()),
        "ip" => Ok(TransportProps::raw(0)),
        other => Err(ConfigError::UnknownProtocol(other.to_string())),
    }
}

/// A fully parsed client descriptor: `[proto://]host[:port_range_list][:local_addr][:local_port]`.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub transport: TransportProps,
    pub host: String,
    pub ports: Vec<PortRange>,
    pub local_addr: Option<String>,
    pub local_port: u16,
}

/// Splits `s` on `:`, but leaves a bracketed IPv6 literal (`[::1]`) intact as the
/// first field.
fn split_descriptor_fields(s: &str) -> Vec<&str> {
    if let Some(rest) = s.strip_prefix('[') {
        if let Some(close) = rest.find(']') {
            let host = &s[0..close + 2];
            let after = &rest[close + 1..];
            let mut fields = vec![host];
            if let Some(after) = after.strip_prefix(':') {
                fields.extend(after.split(':'));
            }
            return fields;
        }
    }
    s.split(':').collect()
}

pub fn parse_descriptor(raw: &str) -> Result<Descriptor, ConfigError> {
    let (proto, remainder) = match raw.split_once("://") {
        Some((p, r)) => (p, r),
        None => ("tcp", raw),
    };
    let transport = transport_for_proto(proto)
        .map_err(|_| ConfigError::InvalidDescriptor(raw.to_string(), format!("unknown protocol '{proto}'")))?;

    let fields = split_descriptor_fields(remainder);
    if fields.is_empty() || fields[0].is_empty() {
        return Err(ConfigError::InvalidDescriptor(raw.to_string(), "missing host".into()));
    }
    let host = fields[0].trim_start_matches('[').trim_end_matches(']').to_string();

    let ports = match fields.get(1).filter(|s| !s.is_empty()) {
        Some(list) => parse_port_range_list(list)
            .map_err(|_| ConfigError::InvalidDescriptor(raw.to_string(), "bad port range".into()))?,
        None => Vec::new(),
    };
    let local_addr = fields.get(2).filter(|s| !s.is_empty()).map(|s| s.to_string());
    let local_port = match fields.get(3).filter(|s| !s.is_empty()) {
        Some(p) => p
            .parse()
            .map_err(|_| ConfigError::InvalidDescriptor(raw.to_string(), "bad local port".into()))?,
        None => 0,
    };

    Ok(Descriptor {
        transport,
        host,
        ports,
        local_addr,
        local_port,
    })
}

/// Parses `--proto-settings`, per spec.md §6: 1/2/3/4/5 comma-separated values
/// selecting fixed/random/sweep modes, independently or jointly for the request
/// and response directions.
pub fn parse_proto_settings(spec: &str) -> Result<ComSettings, ConfigError> {
    let values: Result<Vec<u32>, _> = spec.split(',').map(|v| v.trim().parse::<u32>()).collect();
    let values = values.map_err(|_| {
        ConfigError::InvalidProtoSettings(spec.to_string(), "expected comma-separated unsigned integers".into())
    })?;

    let (request, response) = match values.as_slice() {
        [fixed] => (
            SizeRange::new(*fixed, *fixed, 0),
            SizeRange::new(*fixed, *fixed, 0),
        ),
        [min, max] => (SizeRange::new(*min, *max, 0), SizeRange::new(*min, *max, 0)),
        [min, max, step] => (
            SizeRange::new(*min, *max, *step),
            SizeRange::new(*min, *max, *step),
        ),
        [req_min, req_max, resp_min, resp_max] => (
            SizeRange::new(*req_min, *req_max, 0),
            SizeRange::new(*resp_min, *resp_max, 0),
        ),
        [req_min, req_max, resp_min, resp_max, step] => (
            SizeRange::new(*req_min, *req_max, *step),
            SizeRange::new(*resp_min, *resp_max, *step),
        ),
        _ => {
            return Err(ConfigError::InvalidProtoSettings(
                spec.to_string(),
                "expected 1, 2, 3, 4, or 5 values".into(),
            ))
        }
    };

    for range in [&request, &response] {
        if range.min < crate::comsettings::MIN_FRAME_SIZE {
            return Err(ConfigError::SizeBelowMinimum(range.min, crate::comsettings::MIN_FRAME_SIZE));
        }
        if range.min > range.max {
            return Err(ConfigError::InvertedRange(range.min, range.max));
        }
    }

    Ok(ComSettings::new(request, response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_hostname() {
        let d = parse_descriptor("example.com").unwrap();
        assert_eq!(d.host, "example.com");
        assert_eq!(d.transport.name, "tcp");
        assert!(d.ports.is_empty());
        assert_eq!(d.local_port, 0);
    }

    #[test]
    fn parses_full_descriptor_with_proto_and_ports() {
        let d = parse_descriptor("udp://10.0.0.1:5000-5010:0.0.0.0:4000").unwrap();
        assert_eq!(d.transport.name, "udp");
        assert_eq!(d.host, "10.0.0.1");
        assert_eq!(d.ports.len(), 1);
        assert_eq!(d.ports[0], PortRange { start: 5000, end: 5010 });
        assert_eq!(d.local_addr.as_deref(), Some("0.0.0.0"));
        assert_eq!(d.local_port, 4000);
    }

    #[test]
    fn parses_bracketed_ipv6_host() {
        let d = parse_descriptor("tcp://[::1]:9000").unwrap();
        assert_eq!(d.host, "::1");
        assert_eq!(d.ports[0], PortRange { start: 9000, end: 9000 });
    }

    #[test]
    fn rejects_unknown_protocol() {
        assert!(parse_descriptor("carrier-pigeon://example.com").is_err());
    }

    #[test]
    fn port_range_list_parses_comma_and_dash() {
        let ranges = parse_port_range_list("80,443,8000-8010").unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[2], PortRange { start: 8000, end: 8010 });
    }

    #[test]
    fn proto_settings_one_value_is_fixed_both_directions() {
        let settings = parse_proto_settings("1400").unwrap();
        assert_eq!(settings.request.min, 1400);
        assert_eq!(settings.request.max, 1400);
        assert_eq!(settings.response.min, 1400);
    }

    #[test]
    fn proto_settings_four_values_are_independent_random_ranges() {
        let settings = parse_proto_settings("1230,1400,12340,13500").unwrap();
        assert_eq!(settings.request.min, 1230);
        assert_eq!(settings.request.max, 1400);
        assert_eq!(settings.response.min, 12340);
        assert_eq!(settings.response.max, 13500);
    }

    #[test]
    fn proto_settings_rejects_six_values() {
        let err = parse_proto_settings("1000,2000,100,3000,6000,200").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProtoSettings(_, _)));
    }

    #[test]
    fn proto_settings_rejects_sizes_below_minimum() {
        let err = parse_proto_settings("10,20").unwrap_err();
        assert!(matches!(err, ConfigError::SizeBelowMinimum(_, _)));
    }

    #[test]
    fn proto_settings_rejects_inverted_range() {
        let err = parse_proto_settings("2000,1000").unwrap_err();
        assert!(matches!(err, ConfigError::InvertedRange(_, _)));
    }
}
