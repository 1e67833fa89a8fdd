//! Event router: the fan-out pipeline.
//!
//! For every event kind the same steps run, parameterised by the event table:
//! 1. Validate the request data and fill group context from the store
//! 2. Resolve the audience (`AudienceResolver`)
//! 3. Resolve a channel per member (`ChannelResolver`)
//! 4. Compose the message once (`MessageComposer`)
//! 5. Deliver: push in provider-sized chunks, SMS alongside (`BatchDispatcher`, `SmsFallbackNotifier`)
//! 6. Merge outcomes (`DeliveryResultAggregator`)

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use chit_common::config::AppConfig;
use chit_common::error::AppError;
use chit_common::types::{Channel, ComposedMessage, DeliveryResult, EventKind};
use chit_notifier::{BatchDispatcher, HttpPushClient, HttpSmsClient, PushMessage, SmsFallbackNotifier};

use crate::aggregator::{AggregatedResult, DeliveryResultAggregator};
use crate::audience::AudienceResolver;
use crate::channel::ChannelResolver;
use crate::composer::MessageComposer;
use crate::events::{self, AudienceRule, EventDescriptor, optional_uuid};
use crate::store::{Exclusion, MembershipStore};

pub struct EventRouter {
    store: Arc<dyn MembershipStore>,
    audience: AudienceResolver,
    channels: ChannelResolver,
    push: BatchDispatcher,
    sms: SmsFallbackNotifier,
}

impl EventRouter {
    pub fn new(
        store: Arc<dyn MembershipStore>,
        push: BatchDispatcher,
        sms: SmsFallbackNotifier,
    ) -> Self {
        Self {
            audience: AudienceResolver::new(store.clone()),
            channels: ChannelResolver::new(store.clone()),
            store,
            push,
            sms,
        }
    }

    /// Wire the HTTP push and SMS collaborators from configuration.
    pub fn from_config(config: &AppConfig, store: Arc<dyn MembershipStore>) -> anyhow::Result<Self> {
        let push_config = config.push();
        let push_client = Arc::new(HttpPushClient::new(&push_config)?);

        let sms = match config.sms() {
            Some(sms_config) => SmsFallbackNotifier::new(Arc::new(HttpSmsClient::new(&sms_config)?)),
            None => {
                tracing::warn!("SMS_API_URL not set, SMS delivery disabled");
                SmsFallbackNotifier::disabled()
            }
        };

        tracing::info!(
            push_url = %push_config.url,
            batch_size = push_config.batch_size,
            max_in_flight = push_config.max_in_flight,
            sms_enabled = sms.is_enabled(),
            "Event router configured"
        );

        Ok(Self::new(
            store,
            BatchDispatcher::new(push_client, &push_config),
            sms,
        ))
    }

    pub fn sms_enabled(&self) -> bool {
        self.sms.is_enabled()
    }

    pub fn push_batch_size(&self) -> usize {
        self.push.batch_size()
    }

    /// Dispatch an inbound `{type, data}` request.
    pub async fn dispatch(&self, kind: &str, data: Value) -> Result<AggregatedResult, AppError> {
        let kind: EventKind = kind.parse()?;
        self.dispatch_event(kind, data).await
    }

    pub async fn dispatch_event(
        &self,
        kind: EventKind,
        mut data: Value,
    ) -> Result<AggregatedResult, AppError> {
        let descriptor = events::descriptor(kind);
        descriptor.validate(&data)?;

        let group_id = optional_uuid(&data, "groupId")?;
        if let Some(group_id) = group_id {
            self.enrich_with_group(kind, group_id, &mut data, Utc::now().date_naive())
                .await?;
        }

        let mut echo = Map::new();
        echo.insert("type".into(), json!(kind.as_str()));
        if let Some(group_id) = group_id {
            echo.insert("groupId".into(), json!(group_id));
        }
        if kind == EventKind::PaymentReminder
            && let Some(days) = data.get("daysUntilDue")
        {
            echo.insert("daysUntilDue".into(), days.clone());
        }

        let audience = match descriptor.audience {
            AudienceRule::GroupMembers => {
                let exclusion = descriptor.exclusion.resolve(&data)?;
                self.audience.resolve(require(group_id, "groupId")?, exclusion).await?
            }
            AudienceRule::User { field } => {
                let user_id = require(optional_uuid(&data, field)?, field)?;
                self.audience.resolve_user(group_id, user_id).await?
            }
            AudienceRule::Joiner => match optional_uuid(&data, "userId")? {
                Some(user_id) => self.audience.resolve_user(group_id, user_id).await?,
                None => {
                    self.audience
                        .resolve(
                            require(group_id, "groupId")?,
                            Exclusion::OnlyUnregisteredMostRecent,
                        )
                        .await?
                }
            },
        };
        echo.insert("recipients".into(), json!(audience.len()));

        if audience.is_empty() {
            tracing::info!(event_kind = %kind, group_id = ?group_id, "No members to notify");
            return Ok(DeliveryResultAggregator::no_op("No members to notify", echo));
        }

        if descriptor.audience == AudienceRule::Joiner
            && let Some(name) = audience[0].name.clone()
        {
            fill(&mut data, "memberName", json!(name));
        }

        let recipients = self
            .channels
            .resolve_all(audience, descriptor.sms_fallback)
            .await?;
        let message = MessageComposer::compose(descriptor.template, kind, &data);

        let mut push_messages = Vec::new();
        let mut sms_phones = Vec::new();
        let mut unreachable = 0usize;
        for recipient in &recipients {
            match &recipient.channel {
                Channel::Push(tokens) => push_messages.extend(
                    tokens
                        .iter()
                        .map(|token| PushMessage::for_device(token.clone(), &message)),
                ),
                Channel::Sms(phone) => sms_phones.push(phone.clone()),
                Channel::Unreachable => unreachable += 1,
            }
        }
        echo.insert("unreachable".into(), json!(unreachable));

        if push_messages.is_empty() && sms_phones.is_empty() && !descriptor.group_sms {
            tracing::info!(
                event_kind = %kind,
                group_id = ?group_id,
                unreachable,
                "No reachable recipients"
            );
            return Ok(DeliveryResultAggregator::no_op(
                "No reachable recipients (no registered devices)",
                echo,
            ));
        }

        // Push and SMS do not read each other's output.
        let (push_results, sms_results) = tokio::join!(
            self.push.send(&push_messages),
            self.send_sms(descriptor, &sms_phones, &message),
        );

        echo.insert("pushAttempted".into(), json!(push_results.len()));
        echo.insert("smsAttempted".into(), json!(sms_results.len()));

        // Group SMS only, with SMS disabled: nothing was attempted.
        if push_results.is_empty() && sms_results.is_empty() {
            tracing::info!(event_kind = %kind, group_id = ?group_id, "No delivery attempted");
            return Ok(DeliveryResultAggregator::no_op(
                "No reachable recipients (no registered devices, SMS disabled)",
                echo,
            ));
        }

        let result = DeliveryResultAggregator::merge(push_results, sms_results, echo);
        tracing::info!(
            event_kind = %kind,
            group_id = ?group_id,
            ok = result.counts.ok,
            failed = result.counts.error,
            unreachable,
            "Event dispatched"
        );
        Ok(result)
    }

    async fn send_sms(
        &self,
        descriptor: &EventDescriptor,
        phones: &[String],
        message: &ComposedMessage,
    ) -> Vec<DeliveryResult> {
        let mut results = Vec::new();
        for phone in phones {
            if let Some(result) = self.sms.send_direct(phone, &message.sms_text).await {
                results.push(result);
            }
        }
        if descriptor.group_sms
            && let Some(result) = self
                .sms
                .send_group(descriptor.kind.as_str(), message.data.clone())
                .await
        {
            results.push(result);
        }
        results
    }

    /// Fill template fields the caller left out from the stored group.
    ///
    /// Only hits the store when something is actually missing.
    async fn enrich_with_group(
        &self,
        kind: EventKind,
        group_id: Uuid,
        data: &mut Value,
        today: NaiveDate,
    ) -> Result<(), AppError> {
        let reminder = kind == EventKind::PaymentReminder;
        let needs_group = is_missing(data, "groupName")
            || (reminder && (is_missing(data, "amount") || is_missing(data, "daysUntilDue")));
        if !needs_group {
            return Ok(());
        }

        let group = self
            .store
            .group(group_id)
            .await
            .map_err(|e| AppError::AudienceLookup(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("Group {group_id} not found")))?;

        fill(data, "groupName", json!(group.name));
        fill(data, "memberCount", json!(group.member_count));
        if reminder {
            fill(data, "amount", json!(group.monthly_amount));
            if let Some(draw_date) = group.draw_date {
                fill(data, "drawDate", json!(draw_date.to_string()));
                fill(data, "daysUntilDue", json!((draw_date - today).num_days()));
            }
        }
        Ok(())
    }
}

fn require(value: Option<Uuid>, field: &str) -> Result<Uuid, AppError> {
    value.ok_or_else(|| AppError::Validation(format!("Missing required field: {field}")))
}

fn is_missing(data: &Value, key: &str) -> bool {
    data.get(key).is_none_or(Value::is_null)
}

fn fill(data: &mut Value, key: &str, value: Value) {
    if is_missing(data, key)
        && let Some(object) = data.as_object_mut()
    {
        object.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chit_common::types::{ContributionStatus, DeliveryStatus};
    use chit_notifier::push::{PushClient, PushTicket, TicketStatus};
    use chit_notifier::{NotifierError, SmsClient, SmsRequest};

    use crate::memory::InMemoryMembershipStore;

    #[derive(Default)]
    struct RecordingPush {
        sent: Mutex<Vec<PushMessage>>,
    }

    #[async_trait]
    impl PushClient for RecordingPush {
        async fn send_chunk(&self, chunk: &[PushMessage]) -> Result<Vec<PushTicket>, NotifierError> {
            self.sent.lock().unwrap().extend_from_slice(chunk);
            Ok(chunk
                .iter()
                .map(|_| PushTicket {
                    status: TicketStatus::Ok,
                    id: Some("t".into()),
                    message: None,
                    details: None,
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingSms {
        sent: Mutex<Vec<SmsRequest>>,
    }

    #[async_trait]
    impl SmsClient for RecordingSms {
        async fn send(&self, request: &SmsRequest) -> Result<Option<String>, NotifierError> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(None)
        }
    }

    fn router(
        store: Arc<InMemoryMembershipStore>,
    ) -> (EventRouter, Arc<RecordingPush>, Arc<RecordingSms>) {
        let push = Arc::new(RecordingPush::default());
        let sms = Arc::new(RecordingSms::default());
        let router = EventRouter::new(
            store,
            BatchDispatcher::with_limits(push.clone(), 100, 2),
            SmsFallbackNotifier::new(sms.clone()),
        );
        (router, push, sms)
    }

    #[tokio::test]
    async fn test_unknown_kind_is_rejected_before_any_lookup() {
        let store = Arc::new(InMemoryMembershipStore::new());
        store.set_failing(true);
        let (router, _, _) = router(store);

        let err = router.dispatch("birthday", json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidEventKind(_)));
    }

    #[tokio::test]
    async fn test_group_context_is_filled_for_reminders() {
        let store = Arc::new(InMemoryMembershipStore::new());
        let today = Utc::now().date_naive();
        let group_id = store.add_group("Office Circle", 5000.0, Some(today + chrono::Duration::days(1)));
        let user = store.add_member(group_id, "Ravi", ContributionStatus::Pending);
        store.add_push_token(user, "tok-ravi");
        let (router, push, _) = router(store);

        let result = router
            .dispatch("payment_reminder", json!({"groupId": group_id}))
            .await
            .unwrap();

        assert_eq!(result.echo["daysUntilDue"], 1);
        let sent = push.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("₹5,000"));
        assert!(sent[0].body.contains("Office Circle"));
        assert!(sent[0].title.contains("Tomorrow"));
    }

    #[tokio::test]
    async fn test_unknown_group_is_not_found() {
        let (router, _, _) = router(Arc::new(InMemoryMembershipStore::new()));

        let err = router
            .dispatch("lucky_draw", json!({"groupId": Uuid::new_v4()}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_single_notification_without_device_is_a_no_op() {
        let (router, push, sms) = router(Arc::new(InMemoryMembershipStore::new()));

        let result = router
            .dispatch(
                "single_notification",
                json!({"userId": Uuid::new_v4(), "title": "Hi", "body": "There"}),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.results.is_empty());
        assert_eq!(result.echo["unreachable"], 1);
        assert!(push.sent.lock().unwrap().is_empty());
        assert!(sms.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_sms_goes_out_with_push() {
        let store = Arc::new(InMemoryMembershipStore::new());
        let group_id = store.add_group("Family Fund", 2000.0, None);
        let user = store.add_member(group_id, "Meena", ContributionStatus::Paid);
        store.add_push_token(user, "tok-meena");
        let (router, push, sms) = router(store);

        let result = router
            .dispatch("winner_declared", json!({"groupId": group_id, "winnerName": "Meena"}))
            .await
            .unwrap();

        assert_eq!(result.results.len(), 2);
        assert!(result.results.iter().all(|r| r.status == DeliveryStatus::Ok));
        assert_eq!(push.sent.lock().unwrap().len(), 1);
        let sms = sms.sent.lock().unwrap();
        let SmsRequest::GroupSms(data) = &sms[0] else {
            panic!("expected group sms");
        };
        assert_eq!(data["event"], "winner_declared");
        assert_eq!(data["groupName"], "Family Fund");
    }

    #[tokio::test]
    async fn test_store_failure_is_audience_error() {
        let store = Arc::new(InMemoryMembershipStore::new());
        store.set_failing(true);
        let (router, _, _) = router(store);

        let err = router
            .dispatch(
                "draw_completed",
                json!({"groupId": Uuid::new_v4(), "groupName": "Known"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AudienceLookup(_)));
    }

    #[tokio::test]
    async fn test_group_sms_kind_with_sms_disabled_and_no_devices_is_a_no_op() {
        let store = Arc::new(InMemoryMembershipStore::new());
        let group_id = store.add_group("Family Fund", 2000.0, None);
        store.add_member(group_id, "Meena", ContributionStatus::Paid);
        let push = Arc::new(RecordingPush::default());
        let router = EventRouter::new(
            store,
            BatchDispatcher::with_limits(push.clone(), 100, 2),
            SmsFallbackNotifier::disabled(),
        );

        for kind in ["bid_round_start", "winner_declared"] {
            let result = router
                .dispatch(kind, json!({"groupId": group_id}))
                .await
                .unwrap();

            assert!(result.success);
            assert!(result.results.is_empty());
            assert!(result.message.starts_with("No reachable recipients"));
        }
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fill_keeps_caller_values() {
        let mut data = json!({"groupName": "Caller", "amount": null});
        fill(&mut data, "groupName", json!("Stored"));
        fill(&mut data, "amount", json!(100));
        assert_eq!(data["groupName"], "Caller");
        assert_eq!(data["amount"], 100);
    }
}
