//! Channel senders.
//!
//! A sender delivers one notification job to one external channel. The
//! dispatcher picks the sender registered for the channel's `kind`.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info};

use logbeam_core::{Channel, Error, NotificationJob, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the event name on webhook deliveries.
pub const EVENT_HEADER: &str = "X-Logbeam-Event";

/// Header carrying `sha256=<hex hmac>` when the channel has a secret.
pub const SIGNATURE_HEADER: &str = "X-Logbeam-Signature";

/// Delivers notification jobs for one channel kind.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel kind this sender handles (e.g. `"webhook"`).
    fn kind(&self) -> &str;

    /// Deliver `job` to `channel`.
    async fn send(&self, channel: &Channel, job: &NotificationJob) -> Result<()>;
}

/// Writes the notification as a structured log line. Useful for development
/// and as a catch-all audit channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl ChannelSender for LogSender {
    fn kind(&self) -> &str {
        "log"
    }

    async fn send(&self, channel: &Channel, job: &NotificationJob) -> Result<()> {
        info!(
            channel_id = %channel.id,
            project_id = %job.project_id,
            log_id = %job.log_id,
            level = %job.level,
            source = %job.source,
            message = %job.message,
            "Notification"
        );
        Ok(())
    }
}

/// POSTs the job as JSON to `config.url`.
///
/// When `config.secret` is set the body is signed with HMAC-SHA256 and the
/// signature sent in [`SIGNATURE_HEADER`]. Non-2xx responses are failures.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("webhook client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    fn kind(&self) -> &str {
        "webhook"
    }

    async fn send(&self, channel: &Channel, job: &NotificationJob) -> Result<()> {
        let url = channel
            .config
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Channel(format!("channel {} has no webhook url", channel.id)))?;

        let body = serde_json::to_string(job)?;
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(EVENT_HEADER, "notification");

        if let Some(secret) = channel.config.get("secret").and_then(|v| v.as_str()) {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Channel(format!("webhook returned {status}")));
        }
        debug!(channel_id = %channel.id, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}

/// `sha256=<hex>` HMAC of `body` keyed by `secret`.
pub fn sign_payload(secret: &str, body: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("hmac key: {e}")))?;
    mac.update(body.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use logbeam_core::LogLevel;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job() -> NotificationJob {
        NotificationJob {
            log_id: Uuid::now_v7(),
            channel_id: "hook".to_string(),
            project_id: "proj-1".to_string(),
            level: LogLevel::Error,
            message: "payment failed".to_string(),
            source: "billing".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn webhook_channel(config: serde_json::Value) -> Channel {
        Channel {
            id: "hook".to_string(),
            project_id: "proj-1".to_string(),
            kind: "webhook".to_string(),
            min_level: LogLevel::Warn,
            rate_limit_per_minute: 10,
            active: true,
            config,
        }
    }

    fn sender() -> WebhookSender {
        WebhookSender::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_sign_payload_known_vector() {
        // RFC 4231 test case 2.
        let sig = sign_payload("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[tokio::test]
    async fn test_webhook_posts_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("Content-Type", "application/json"))
            .and(header(EVENT_HEADER, "notification"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = webhook_channel(json!({"url": format!("{}/hook", server.uri())}));
        sender().send(&channel, &job()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["message"], "payment failed");
        assert_eq!(body["level"], "ERROR");
        assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_webhook_signs_when_secret_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists(SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let channel = webhook_channel(json!({"url": server.uri(), "secret": "s3cret"}));
        sender().send(&channel, &job()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        let sent = requests[0].headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap();
        assert_eq!(sent, sign_payload("s3cret", &body).unwrap());
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let channel = webhook_channel(json!({"url": server.uri()}));
        let err = sender().send(&channel, &job()).await.unwrap_err();
        assert!(matches!(err, Error::Channel(_)));
    }

    #[tokio::test]
    async fn test_webhook_without_url_is_failure() {
        let channel = webhook_channel(json!({}));
        let err = sender().send(&channel, &job()).await.unwrap_err();
        assert!(matches!(err, Error::Channel(_)));
    }

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        let channel = webhook_channel(json!({}));
        LogSender.send(&channel, &job()).await.unwrap();
        assert_eq!(LogSender.kind(), "log");
    }
}
