//! Diagnostic logging to stderr

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the `-v` level, in `EnvFilter` syntax
pub const LOG_ENV: &str = "LIFE_LOG";

/// Filter directives for a `-v` count
pub fn directives(verbosity: u8) -> String {
    let level = match verbosity {
        0 => return "warn".to_string(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("warn,life={}", level)
}

/// Installs the global subscriber; later calls are ignored
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(directives(verbosity)));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(directives(0), "warn");
        assert_eq!(directives(1), "warn,life=info");
        assert_eq!(directives(2), "warn,life=debug");
        assert_eq!(directives(7), "warn,life=trace");
    }
}
