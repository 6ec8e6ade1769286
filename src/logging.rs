//! # Logging
//!
//! `tracing`/`tracing-subscriber` initialization and the `-v` repeat-count to log
//! level mapping from spec.md §6 ("repeatable up to 4; bumps log level"). Ported
//! from the teacher's `logging.rs`: a custom `ColorizedFormatter` that colors the
//! whole line by severity rather than printing separate level/target/timestamp
//! columns, since this tool's log output is meant to read as plain status text,
//! not a structured log stream.

use std::fmt;

use colored::Colorize;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        writeln!(writer, "{colored_output}")
    }
}

/// Maps `-v` repeat count to a `tracing` level, per spec.md §6: 0 = warn (the
/// default, quiet baseline), 1 = info, 2 = debug, 3+ = trace. The CLI caps
/// `verbose` at 4 repeats; 4 behaves identically to 3 (there is no level beyond
/// trace to bump to).
pub fn level_for_verbosity(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initializes the global `tracing` subscriber: colorized, unstructured stdout
/// output at the level `-v` selects. There is no file sink -- spec.md names no
/// persistent logging requirement, so the teacher's `tracing-appender` rolling
/// file layer is dropped (see DESIGN.md).
pub fn init(verbose: u8) {
    use tracing_subscriber::prelude::*;

    let level = level_for_verbosity(verbose);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(ColorizedFormatter)
        .with_filter(tracing_subscriber::filter::LevelFilter::from_level(level));

    tracing_subscriber::registry().with(layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_expected_levels() {
        assert_eq!(level_for_verbosity(0), Level::WARN);
        assert_eq!(level_for_verbosity(1), Level::INFO);
        assert_eq!(level_for_verbosity(2), Level::DEBUG);
        assert_eq!(level_for_verbosity(3), Level::TRACE);
        assert_eq!(level_for_verbosity(4), Level::TRACE);
    }
}
