//! CLI commands

pub mod credentials;
pub mod deploy;
pub mod status;

use std::time::Duration;

/// Parse durations such as `90s`, `5m` or `1h 30m`
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}
