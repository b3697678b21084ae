//! Static channel directory.
//!
//! Channel storage is owned by the host application. Standalone deployments
//! load a fixed set of channels from a JSON array instead.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use logbeam_core::{Channel, ChannelDirectory, Error, Result};

/// A read-only, in-memory channel directory.
#[derive(Debug, Default, Clone)]
pub struct StaticChannelDirectory {
    channels: HashMap<String, Channel>,
}

impl StaticChannelDirectory {
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            channels: channels.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    /// Load a JSON array of channels.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let channels: Vec<Channel> = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid channels file {}: {e}", path.display())))?;
        info!(path = %path.display(), count = channels.len(), "Loaded channel directory");
        Ok(Self::new(channels))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl ChannelDirectory for StaticChannelDirectory {
    async fn channels_for_project(&self, project_id: &str) -> Result<Vec<Channel>> {
        let mut channels: Vec<Channel> = self
            .channels
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(channels)
    }

    async fn channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        Ok(self.channels.get(channel_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logbeam_core::LogLevel;
    use std::io::Write;

    fn channel(id: &str, project_id: &str) -> Channel {
        Channel {
            id: id.to_string(),
            project_id: project_id.to_string(),
            kind: "log".to_string(),
            min_level: LogLevel::Warn,
            rate_limit_per_minute: 10,
            active: true,
            config: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_project_and_id() {
        let dir = StaticChannelDirectory::new(vec![
            channel("b", "proj-1"),
            channel("a", "proj-1"),
            channel("c", "proj-2"),
        ]);

        let ids: Vec<String> = dir
            .channels_for_project("proj-1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(dir.channel("c").await.unwrap().is_some());
        assert!(dir.channel("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("logbeam-channels-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"id":"hook","project_id":"p","kind":"webhook","min_level":"ERROR","config":{{"url":"http://localhost"}}}}]"#
        )
        .unwrap();
        drop(file);

        let dir = StaticChannelDirectory::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let hook = dir.channel("hook").await.unwrap().unwrap();
        assert_eq!(hook.kind, "webhook");
        assert_eq!(hook.min_level, LogLevel::Error);
        assert!(hook.active);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = StaticChannelDirectory::from_json_file("/nonexistent/channels.json");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
