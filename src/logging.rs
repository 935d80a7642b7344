//! Logging setup.
//!
//! All modules log through the `log` facade with a bracketed subsystem tag
//! (`[CAPTURE]`, `[HUD]`, `[ENCODER]`, ...). This module installs the
//! `env_logger` backend with local wall-clock timestamps.

use std::io::Write;

use chrono::Local;
use log::LevelFilter;

/// Install the process logger.
///
/// `RUST_LOG` overrides `default_level` when set. Safe to call more than
/// once; later calls are ignored.
pub fn init_logging(default_level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(default_level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if builder.try_init().is_err() {
        log::debug!("[RUNTIME] Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(LevelFilter::Debug);
        init_logging(LevelFilter::Info);
        log::info!("[RUNTIME] logging test line");
    }
}
