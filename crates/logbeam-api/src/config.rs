//! Server configuration read from the environment.

use std::path::PathBuf;

use axum::http::HeaderValue;

use logbeam_core::defaults::{SERVER_HOST, SERVER_PORT};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JSON array of notification channels. None means no channels.
    pub channels_file: Option<PathBuf>,
}

impl ServerConfig {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Bind address |
    /// | `PORT` | `3000` | Bind port |
    /// | `CHANNELS_FILE` | unset | Channel directory JSON file |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| SERVER_HOST.to_string());
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(SERVER_PORT);
        let channels_file = std::env::var("CHANNELS_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            host,
            port,
            channels_file,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Emit one JSON object per line instead of human-readable text.
    pub json: bool,
    /// Write to a daily-rolling file at this path instead of stdout.
    pub file: Option<PathBuf>,
    /// Force ANSI colors on or off. None picks per destination.
    pub ansi: Option<bool>,
}

impl LogSettings {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LOG_FORMAT` | `text` | `json` or `text` |
    /// | `LOG_FILE` | unset | Log file path (daily rotation) |
    /// | `LOG_ANSI` | auto | `true`/`1` or `false`/`0` |
    ///
    /// `RUST_LOG` is read separately as the level filter.
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var("LOG_FORMAT").ok().as_deref(),
            std::env::var("LOG_FILE").ok().as_deref(),
            std::env::var("LOG_ANSI").ok().as_deref(),
        )
    }

    fn from_values(format: Option<&str>, file: Option<&str>, ansi: Option<&str>) -> Self {
        Self {
            json: format.is_some_and(|f| f.trim().eq_ignore_ascii_case("json")),
            file: file
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(PathBuf::from),
            ansi: ansi.and_then(|v| match v.trim() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            }),
        }
    }
}

/// Parse `ALLOWED_ORIGINS` (comma-separated) into CORS origins.
pub fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str =
        std::env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_settings_defaults() {
        let settings = LogSettings::from_values(None, None, None);
        assert_eq!(
            settings,
            LogSettings {
                json: false,
                file: None,
                ansi: None,
            }
        );
    }

    #[test]
    fn test_log_settings_parsing() {
        let settings =
            LogSettings::from_values(Some("JSON"), Some("/var/log/logbeam.log"), Some("0"));
        assert!(settings.json);
        assert_eq!(settings.file, Some(PathBuf::from("/var/log/logbeam.log")));
        assert_eq!(settings.ansi, Some(false));

        let settings = LogSettings::from_values(Some("pretty"), Some("  "), Some("maybe"));
        assert!(!settings.json);
        assert_eq!(settings.file, None);
        assert_eq!(settings.ansi, None);
    }
}
