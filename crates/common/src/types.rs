use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// The closed set of notification events this service fans out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PaymentReminder,
    SingleNotification,
    GroupNotification,
    LuckyDraw,
    LuckyDrawStarted,
    PaymentMarkedDone,
    DrawCompleted,
    GroupJoined,
    BidRoundStart,
    BidPlaced,
    BidUpdated,
    WinnerDeclared,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::PaymentReminder,
        EventKind::SingleNotification,
        EventKind::GroupNotification,
        EventKind::LuckyDraw,
        EventKind::LuckyDrawStarted,
        EventKind::PaymentMarkedDone,
        EventKind::DrawCompleted,
        EventKind::GroupJoined,
        EventKind::BidRoundStart,
        EventKind::BidPlaced,
        EventKind::BidUpdated,
        EventKind::WinnerDeclared,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PaymentReminder => "payment_reminder",
            EventKind::SingleNotification => "single_notification",
            EventKind::GroupNotification => "group_notification",
            EventKind::LuckyDraw => "lucky_draw",
            EventKind::LuckyDrawStarted => "lucky_draw_started",
            EventKind::PaymentMarkedDone => "payment_marked_done",
            EventKind::DrawCompleted => "draw_completed",
            EventKind::GroupJoined => "group_joined",
            EventKind::BidRoundStart => "bid_round_start",
            EventKind::BidPlaced => "bid_placed",
            EventKind::BidUpdated => "bid_updated",
            EventKind::WinnerDeclared => "winner_declared",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::InvalidEventKind(s.to_string()))
    }
}

/// Whether a member has paid the current round's contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContributionStatus {
    Pending,
    Paid,
}

impl std::fmt::Display for ContributionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContributionStatus::Pending => write!(f, "pending"),
            ContributionStatus::Paid => write!(f, "paid"),
        }
    }
}

/// A savings circle.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub monthly_amount: f64,
    pub draw_date: Option<NaiveDate>,
    pub member_count: i32,
}

/// A participant or invitee of a group. Invitees have no `user_id` yet.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub invited_phone: Option<String>,
    pub contribution_status: ContributionStatus,
    pub created_at: DateTime<Utc>,
}

/// A registered device push token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushAddress {
    pub user_id: Uuid,
    pub token: String,
}

/// Who an event is addressed to, before a channel is picked.
///
/// Built either from a group membership row or from a bare user id
/// (events that target one user outside a group context).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberIdentity {
    pub member_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub invited_phone: Option<String>,
}

impl MemberIdentity {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            member_id: None,
            user_id: Some(user_id),
            name: None,
            phone: None,
            invited_phone: None,
        }
    }

    /// Dedup key: registered members collapse on user id, invitees on their row id.
    pub fn key(&self) -> Option<Uuid> {
        self.user_id.or(self.member_id)
    }
}

impl From<Member> for MemberIdentity {
    fn from(member: Member) -> Self {
        Self {
            member_id: Some(member.id),
            user_id: member.user_id,
            name: member.name,
            phone: member.phone,
            invited_phone: member.invited_phone,
        }
    }
}

/// The delivery mechanism resolved for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    /// Every registered device of the member
    Push(Vec<String>),
    Sms(String),
    Unreachable,
}

/// A member paired with the channel it will be reached on.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub identity: MemberIdentity,
    pub channel: Channel,
}

/// How loudly a message should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Urgent,
    Routine,
}

/// Rendered content for one event, shared by every recipient of the fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedMessage {
    pub title: String,
    pub body: String,
    /// Structured payload delivered alongside the notification
    pub data: serde_json::Value,
    pub urgency: Urgency,
    /// Short plain-text variant used when the message goes out by SMS
    pub sms_text: String,
}

/// Which channel a delivery attempt went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Push,
    Sms,
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Ok,
    Error,
}

/// Result record for one attempted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub channel: DeliveryChannel,
    pub status: DeliveryStatus,
    /// Push token or phone number the attempt targeted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Provider message id on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Provider or transport error detail on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DeliveryResult {
    pub fn ok(channel: DeliveryChannel, recipient: Option<String>, id: Option<String>) -> Self {
        Self {
            channel,
            status: DeliveryStatus::Ok,
            recipient,
            id,
            message: None,
        }
    }

    pub fn error(
        channel: DeliveryChannel,
        recipient: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            status: DeliveryStatus::Error,
            recipient,
            id: None,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == DeliveryStatus::Ok
    }
}
