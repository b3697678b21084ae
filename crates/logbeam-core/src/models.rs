//! Domain models shared by every logbeam crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;
use crate::error::Error;

// =============================================================================
// LOG LEVEL
// =============================================================================

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            other => Err(Error::InvalidInput(format!("unknown log level: {other}"))),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// LOG RECORD
// =============================================================================

/// A log row that has already been validated and persisted by ingestion.
///
/// This is the payload relayed to viewers; its storage lives elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: Uuid,
    pub project_id: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

// =============================================================================
// NOTIFICATION JOB
// =============================================================================

/// Unit of work meaning "channel C should be told about log L".
///
/// Created by the ingestion fan-out and consumed once by a dispatcher worker.
/// Never mutated after enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub log_id: Uuid,
    pub channel_id: String,
    pub project_id: String,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationJob {
    /// Build the job telling `channel` about `log`.
    pub fn for_channel(log: &LogRecord, channel: &Channel) -> Self {
        Self {
            log_id: log.id,
            channel_id: channel.id.clone(),
            project_id: log.project_id.clone(),
            level: log.level,
            message: log.message.clone(),
            source: log.source.clone(),
            timestamp: log.timestamp,
        }
    }
}

// =============================================================================
// CHANNEL
// =============================================================================

/// A configured external notification target.
///
/// `kind` selects the sender (e.g. `"webhook"`, `"log"`); `config` is opaque
/// to the engine and interpreted only by that sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub project_id: String,
    pub kind: String,
    pub min_level: LogLevel,
    #[serde(default = "default_channel_rate_limit")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub config: JsonValue,
}

fn default_channel_rate_limit() -> u32 {
    defaults::RATE_LIMIT_CHANNEL_PER_MINUTE
}

fn default_active() -> bool {
    true
}

impl Channel {
    /// True when the channel is active and `level` meets its severity floor.
    pub fn accepts(&self, level: LogLevel) -> bool {
        self.active && level >= self.min_level
    }
}

// =============================================================================
// RATE LIMIT DECISION
// =============================================================================

/// Outcome of one fixed-window rate limit check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Counter value after this call (0 when the store was unreachable).
    pub count: i64,
    pub limit: u32,
    pub remaining: u32,
    /// Start of the next window.
    pub reset_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel(min_level: LogLevel, active: bool) -> Channel {
        Channel {
            id: "chan-1".to_string(),
            project_id: "proj-1".to_string(),
            kind: "log".to_string(),
            min_level,
            rate_limit_per_minute: 5,
            active,
            config: JsonValue::Null,
        }
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" FATAL ".parse::<LogLevel>().unwrap(), LogLevel::Fatal);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"WARN\"");
        let level: LogLevel = serde_json::from_str("\"INFO\"").unwrap();
        assert_eq!(level, LogLevel::Info);
        let level: LogLevel = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(level, LogLevel::Warn);
        assert!(serde_json::from_str::<LogLevel>("\"loud\"").is_err());
    }

    #[test]
    fn test_channel_accepts() {
        let ch = channel(LogLevel::Error, true);
        assert!(ch.accepts(LogLevel::Error));
        assert!(ch.accepts(LogLevel::Fatal));
        assert!(!ch.accepts(LogLevel::Warn));

        let inactive = channel(LogLevel::Debug, false);
        assert!(!inactive.accepts(LogLevel::Fatal));
    }

    #[test]
    fn test_channel_defaults_from_json() {
        let ch: Channel = serde_json::from_value(json!({
            "id": "c",
            "project_id": "p",
            "kind": "webhook",
            "min_level": "WARN"
        }))
        .unwrap();
        assert!(ch.active);
        assert_eq!(ch.rate_limit_per_minute, defaults::RATE_LIMIT_CHANNEL_PER_MINUTE);
        assert!(ch.config.is_null());
    }

    #[test]
    fn test_job_for_channel_copies_log_fields() {
        let log = LogRecord {
            id: Uuid::nil(),
            project_id: "proj-1".to_string(),
            level: LogLevel::Error,
            message: "disk full".to_string(),
            source: "api-7".to_string(),
            timestamp: Utc::now(),
            metadata: Some(json!({"host": "a"})),
        };
        let job = NotificationJob::for_channel(&log, &channel(LogLevel::Error, true));
        assert_eq!(job.log_id, log.id);
        assert_eq!(job.channel_id, "chan-1");
        assert_eq!(job.project_id, "proj-1");
        assert_eq!(job.level, LogLevel::Error);
        assert_eq!(job.message, "disk full");
        assert_eq!(job.source, "api-7");
        assert_eq!(job.timestamp, log.timestamp);
    }
}
