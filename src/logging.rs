//! Logging setup for the host binary.
//!
//! The library only emits through the `log` facade; the binary installs
//! `env_logger`. `RUST_LOG` takes precedence over the verbosity flag.

use env_logger::Builder;
use log::LevelFilter;
use std::env;

/// Map a `-v` count to a level filter
pub fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the global logger. Calling it twice is harmless.
pub fn init(verbose: u8) {
    let mut builder = Builder::new();
    if env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder
            .filter_level(level_for(verbose))
            .format_timestamp_millis();
    }
    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0), LevelFilter::Info);
        assert_eq!(level_for(1), LevelFilter::Debug);
        assert_eq!(level_for(5), LevelFilter::Trace);
    }
}
