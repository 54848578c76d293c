//! `tracing-subscriber` setup for the binary.

use std::io;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    /// Let `RUST_LOG` override `level`.
    pub use_env_filter: bool,
    pub with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_env_filter: true,
            with_ansi: true,
        }
    }
}

impl LogConfig {
    /// `-q` wins over `-v`; one `-v` is debug, more is trace.
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => Level::ERROR,
            (false, 0) => Level::INFO,
            (false, 1) => Level::DEBUG,
            (false, _) => Level::TRACE,
        };
        Self {
            level,
            use_env_filter: !quiet && verbose == 0,
            ..Self::default()
        }
    }
}

pub fn build_env_filter(config: &LogConfig) -> EnvFilter {
    let level = config.level.as_str().to_lowercase();
    let fallback = || EnvFilter::new(format!("warn,qsf_fhir={level}"));
    if config.use_env_filter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback())
    } else {
        fallback()
    }
}

/// Installs the global subscriber, writing to stderr so stdout stays JSON.
pub fn init_logging(config: &LogConfig) {
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.with_ansi)
        .with_target(false)
        .without_time();
    tracing_subscriber::registry()
        .with(build_env_filter(config))
        .with(layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::LogConfig;
    use tracing::Level;

    #[test]
    fn verbosity_flags_map_to_levels() {
        assert_eq!(LogConfig::from_flags(0, false).level, Level::INFO);
        assert!(LogConfig::from_flags(0, false).use_env_filter);
        assert_eq!(LogConfig::from_flags(1, false).level, Level::DEBUG);
        assert_eq!(LogConfig::from_flags(3, false).level, Level::TRACE);
        let quiet = LogConfig::from_flags(2, true);
        assert_eq!(quiet.level, Level::ERROR);
        assert!(!quiet.use_env_filter);
    }
}
