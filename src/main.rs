//! # babbler -- entry point
//!
//! Parses arguments, initializes logging, assembles the client-mode or
//! server-mode configuration, and hands off to a [`Supervisor`]. Kept
//! deliberately thin: all behavior lives in the library so it can be driven
//! from integration tests without a process boundary.

use std::process::ExitCode;

use babbler::cli::{parse_descriptor, parse_proto_settings, Args};
use babbler::config::{AppConfig, Mode};
use babbler::error::ConfigError;
use babbler::supervisor::Supervisor;
use babbler::transport::AddrFamily;
use clap::Parser;
use tracing::error;

/// Fallback cap on concurrent server-side responders when nothing in the run
/// configuration constrains it otherwise. Not exposed as a flag -- the
/// command-line surface has no dedicated admission-limit option -- chosen as
/// a generous multiple of available parallelism (see DESIGN.md).
const DEFAULT_MAX_CONNECTIONS: usize = 4096;

fn family_restriction(args: &Args) -> AddrFamily {
    if args.ipv4 {
        AddrFamily::V4
    } else if args.ipv6 {
        AddrFamily::V6
    } else {
        AddrFamily::Either
    }
}

fn run(args: &Args) -> Result<(), ConfigError> {
    // Validate the full argument surface up front: `AppConfig` rejects the
    // same bad descriptors/port lists/proto-settings the execution path
    // would hit later, just before any socket is touched.
    let config = AppConfig::try_from(args)?;
    let supervisor = Supervisor::new(config.status_interval(), config.time_budget());

    match config.mode {
        Mode::Server { ports } => {
            let descriptor = parse_descriptor(&args.descriptor)?;
            let transport = descriptor.transport.with_family(family_restriction(args));
            let port_values: Vec<u16> = ports.iter().flat_map(|r| r.iter()).collect();
            supervisor.run_server(args, &[transport], &port_values, DEFAULT_MAX_CONNECTIONS);
            Ok(())
        }
        Mode::Client { .. } => {
            let descriptor = parse_descriptor(&args.descriptor)?;
            let descriptor = babbler::cli::Descriptor {
                transport: descriptor.transport.with_family(family_restriction(args)),
                ..descriptor
            };
            let com_settings = parse_proto_settings(&args.proto_settings)?;
            supervisor.run_client(args, &descriptor, com_settings)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    babbler::logging::init(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("babbler: {e}");
            ExitCode::from(254)
        }
    }
}
