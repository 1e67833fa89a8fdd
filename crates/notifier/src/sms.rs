//! SMS delivery.
//!
//! SMS is additive, best-effort delivery: it runs independently of push and
//! its failures are logged and recorded, never propagated to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use chit_common::config::SmsConfig;
use chit_common::types::{DeliveryChannel, DeliveryResult};

use crate::error::NotifierError;

/// Request body understood by the SMS collaborator.
///
/// Serialises as `{"type": "single_sms" | "group_sms", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SmsRequest {
    /// A direct message to one phone number
    SingleSms { to: String, message: String },
    /// An event-driven template selector; the collaborator picks recipients
    GroupSms(serde_json::Value),
}

impl SmsRequest {
    /// Human-readable target for logs and result records.
    pub fn target(&self) -> Option<String> {
        match self {
            SmsRequest::SingleSms { to, .. } => Some(to.clone()),
            SmsRequest::GroupSms(data) => data
                .get("groupId")
                .and_then(|v| v.as_str())
                .map(|id| format!("group:{id}")),
        }
    }
}

#[async_trait]
pub trait SmsClient: Send + Sync {
    /// Submit one SMS request. Returns the provider reference when it gives one.
    async fn send(&self, request: &SmsRequest) -> Result<Option<String>, NotifierError>;
}

/// SMS client for the HTTP SMS function.
pub struct HttpSmsClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpSmsClient {
    pub fn new(config: &SmsConfig) -> Result<Self, NotifierError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl SmsClient for HttpSmsClient {
    async fn send(&self, request: &SmsRequest) -> Result<Option<String>, NotifierError> {
        let mut builder = self.http.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // The body is opaque; honour an explicit `success: false` when present.
        let parsed: Option<serde_json::Value> = serde_json::from_str(&body).ok();
        if let Some(json) = &parsed
            && json.get("success").and_then(|v| v.as_bool()) == Some(false)
        {
            let reason = json
                .get("error")
                .or_else(|| json.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unspecified failure")
                .to_string();
            return Err(NotifierError::Rejected(reason));
        }

        Ok(parsed
            .as_ref()
            .and_then(|json| json.get("id").or_else(|| json.get("sid")))
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }
}

/// Best-effort SMS sender used alongside push.
#[derive(Clone)]
pub struct SmsFallbackNotifier {
    client: Option<Arc<dyn SmsClient>>,
}

impl SmsFallbackNotifier {
    pub fn new(client: Arc<dyn SmsClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// A notifier that never attempts delivery (no SMS endpoint configured).
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Send a direct SMS to one phone number.
    ///
    /// Returns `None` when SMS is disabled and nothing was attempted.
    pub async fn send_direct(&self, phone: &str, message: &str) -> Option<DeliveryResult> {
        self.attempt(SmsRequest::SingleSms {
            to: phone.to_string(),
            message: message.to_string(),
        })
        .await
    }

    /// Ask the SMS collaborator to run its template for `event` across a group.
    pub async fn send_group(
        &self,
        event: &str,
        mut template_data: serde_json::Value,
    ) -> Option<DeliveryResult> {
        if let Some(object) = template_data.as_object_mut() {
            object.insert("event".to_string(), serde_json::Value::from(event));
        } else {
            template_data = serde_json::json!({ "event": event });
        }
        self.attempt(SmsRequest::GroupSms(template_data)).await
    }

    async fn attempt(&self, request: SmsRequest) -> Option<DeliveryResult> {
        let Some(client) = &self.client else {
            tracing::debug!(sms_target = ?request.target(), "SMS disabled, skipping");
            return None;
        };

        let target = request.target();
        let result = match client.send(&request).await {
            Ok(id) => {
                tracing::info!(sms_target = ?target, "SMS sent");
                DeliveryResult::ok(DeliveryChannel::Sms, target, id)
            }
            Err(e) => {
                tracing::warn!(sms_target = ?target, error = %e, "SMS delivery failed");
                DeliveryResult::error(DeliveryChannel::Sms, target, e.to_string())
            }
        };
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chit_common::types::DeliveryStatus;

    struct RecordingSmsClient {
        requests: Mutex<Vec<SmsRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl SmsClient for RecordingSmsClient {
        async fn send(&self, request: &SmsRequest) -> Result<Option<String>, NotifierError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                Err(NotifierError::Rejected("quota exceeded".to_string()))
            } else {
                Ok(Some("sms-1".to_string()))
            }
        }
    }

    fn client(fail: bool) -> Arc<RecordingSmsClient> {
        Arc::new(RecordingSmsClient {
            requests: Mutex::new(Vec::new()),
            fail,
        })
    }

    #[test]
    fn test_request_wire_shape() {
        let single = SmsRequest::SingleSms {
            to: "+919800000000".to_string(),
            message: "Welcome".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&single).unwrap(),
            serde_json::json!({
                "type": "single_sms",
                "data": {"to": "+919800000000", "message": "Welcome"}
            })
        );

        let group = SmsRequest::GroupSms(serde_json::json!({"event": "winner_declared"}));
        assert_eq!(
            serde_json::to_value(&group).unwrap(),
            serde_json::json!({"type": "group_sms", "data": {"event": "winner_declared"}})
        );
    }

    #[tokio::test]
    async fn test_direct_sms_success() {
        let client = client(false);
        let notifier = SmsFallbackNotifier::new(client.clone());

        let result = notifier.send_direct("+919800000000", "hi").await.unwrap();

        assert_eq!(result.status, DeliveryStatus::Ok);
        assert_eq!(result.channel, DeliveryChannel::Sms);
        assert_eq!(result.recipient.as_deref(), Some("+919800000000"));
        assert_eq!(client.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_raised() {
        let notifier = SmsFallbackNotifier::new(client(true));

        let result = notifier.send_direct("+919800000000", "hi").await.unwrap();

        assert_eq!(result.status, DeliveryStatus::Error);
        assert!(result.message.unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_group_sms_injects_event_selector() {
        let client = client(false);
        let notifier = SmsFallbackNotifier::new(client.clone());

        let result = notifier
            .send_group(
                "bid_round_start",
                serde_json::json!({"groupId": "g-1", "groupName": "Office Circle"}),
            )
            .await
            .unwrap();

        assert_eq!(result.recipient.as_deref(), Some("group:g-1"));
        let requests = client.requests.lock().unwrap();
        let SmsRequest::GroupSms(data) = &requests[0] else {
            panic!("expected group sms");
        };
        assert_eq!(data["event"], "bid_round_start");
        assert_eq!(data["groupName"], "Office Circle");
    }

    #[tokio::test]
    async fn test_disabled_notifier_attempts_nothing() {
        let notifier = SmsFallbackNotifier::disabled();
        assert!(!notifier.is_enabled());
        assert!(notifier.send_direct("+91", "hi").await.is_none());
        assert!(
            notifier
                .send_group("winner_declared", serde_json::json!({}))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_http_client_honours_success_false() {
        use axum::routing::post;
        use axum::{Json, Router};

        let app = Router::new().route(
            "/sms",
            post(|| async { Json(serde_json::json!({"success": false, "error": "invalid number"})) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = HttpSmsClient::new(&SmsConfig {
            url: format!("http://{addr}/sms"),
            api_key: Some("key".to_string()),
            timeout: std::time::Duration::from_secs(5),
        })
        .unwrap();

        let err = client
            .send(&SmsRequest::SingleSms {
                to: "+91".to_string(),
                message: "hi".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NotifierError::Rejected(ref m) if m == "invalid number"));
    }
}
