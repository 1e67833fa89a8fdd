//! Event table: one static descriptor per event kind.
//!
//! The router runs the same pipeline for every kind; everything that differs
//! between kinds (who hears about it, how it is worded, whether SMS is
//! involved) lives in `EVENT_TABLE`.

use serde_json::Value;
use uuid::Uuid;

use chit_common::error::AppError;
use chit_common::types::EventKind;

use crate::composer::Template;
use crate::store::Exclusion;

/// Who an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudienceRule {
    /// Members of the event's group, after the exclusion rule
    GroupMembers,
    /// The single user named by this data field
    User { field: &'static str },
    /// The member who just joined: `userId` when registered, otherwise the
    /// most recently invited unregistered member of the group
    Joiner,
}

/// How the audience is narrowed, before request data is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionRule {
    None,
    OnlyPending,
    /// Exclude the user whose id is in this data field, when present
    ExcludeField(&'static str),
}

impl ExclusionRule {
    /// Bind the rule to a concrete request.
    pub fn resolve(&self, data: &Value) -> Result<Exclusion, AppError> {
        match self {
            ExclusionRule::None => Ok(Exclusion::None),
            ExclusionRule::OnlyPending => Ok(Exclusion::OnlyPending),
            ExclusionRule::ExcludeField(field) => Ok(match optional_uuid(data, field)? {
                Some(user_id) => Exclusion::ExcludeUser(user_id),
                None => Exclusion::None,
            }),
        }
    }
}

/// Everything the pipeline needs to know about one event kind.
#[derive(Debug, Clone, Copy)]
pub struct EventDescriptor {
    pub kind: EventKind,
    pub audience: AudienceRule,
    pub exclusion: ExclusionRule,
    pub template: Template,
    /// Members without a push device fall back to SMS
    pub sms_fallback: bool,
    /// Also send one group-wide SMS through the SMS collaborator
    pub group_sms: bool,
    /// Data fields that must be present
    pub required: &'static [&'static str],
}

/// Indexed by `EventKind` discriminant.
static EVENT_TABLE: [EventDescriptor; 12] = [
    EventDescriptor {
        kind: EventKind::PaymentReminder,
        audience: AudienceRule::GroupMembers,
        exclusion: ExclusionRule::OnlyPending,
        template: Template::PaymentReminder,
        sms_fallback: false,
        group_sms: false,
        required: &["groupId"],
    },
    EventDescriptor {
        kind: EventKind::SingleNotification,
        audience: AudienceRule::User { field: "userId" },
        exclusion: ExclusionRule::None,
        template: Template::Direct,
        sms_fallback: false,
        group_sms: false,
        required: &["userId", "title", "body"],
    },
    EventDescriptor {
        kind: EventKind::GroupNotification,
        audience: AudienceRule::GroupMembers,
        exclusion: ExclusionRule::ExcludeField("excludeUserId"),
        template: Template::Direct,
        sms_fallback: false,
        group_sms: false,
        required: &["groupId", "title", "body"],
    },
    EventDescriptor {
        kind: EventKind::LuckyDraw,
        audience: AudienceRule::GroupMembers,
        exclusion: ExclusionRule::None,
        template: Template::LuckyDraw,
        sms_fallback: false,
        group_sms: false,
        required: &["groupId"],
    },
    EventDescriptor {
        kind: EventKind::LuckyDrawStarted,
        audience: AudienceRule::GroupMembers,
        exclusion: ExclusionRule::None,
        template: Template::LuckyDrawStarted,
        sms_fallback: false,
        group_sms: false,
        required: &["groupId"],
    },
    EventDescriptor {
        kind: EventKind::PaymentMarkedDone,
        audience: AudienceRule::User { field: "userId" },
        exclusion: ExclusionRule::None,
        template: Template::PaymentMarkedDone,
        sms_fallback: false,
        group_sms: false,
        required: &["groupId", "userId"],
    },
    EventDescriptor {
        kind: EventKind::DrawCompleted,
        audience: AudienceRule::GroupMembers,
        exclusion: ExclusionRule::None,
        template: Template::DrawCompleted,
        sms_fallback: false,
        group_sms: false,
        required: &["groupId"],
    },
    EventDescriptor {
        kind: EventKind::GroupJoined,
        audience: AudienceRule::Joiner,
        exclusion: ExclusionRule::None,
        template: Template::Welcome,
        sms_fallback: true,
        group_sms: false,
        required: &["groupId"],
    },
    EventDescriptor {
        kind: EventKind::BidRoundStart,
        audience: AudienceRule::GroupMembers,
        exclusion: ExclusionRule::None,
        template: Template::BidRoundStart,
        sms_fallback: false,
        group_sms: true,
        required: &["groupId"],
    },
    EventDescriptor {
        kind: EventKind::BidPlaced,
        audience: AudienceRule::GroupMembers,
        exclusion: ExclusionRule::ExcludeField("bidderId"),
        template: Template::BidPlaced,
        sms_fallback: false,
        group_sms: false,
        required: &["groupId", "bidderId"],
    },
    EventDescriptor {
        kind: EventKind::BidUpdated,
        audience: AudienceRule::GroupMembers,
        exclusion: ExclusionRule::ExcludeField("bidderId"),
        template: Template::BidUpdated,
        sms_fallback: false,
        group_sms: false,
        required: &["groupId", "bidderId"],
    },
    EventDescriptor {
        kind: EventKind::WinnerDeclared,
        audience: AudienceRule::GroupMembers,
        exclusion: ExclusionRule::None,
        template: Template::WinnerDeclared,
        sms_fallback: false,
        group_sms: true,
        required: &["groupId"],
    },
];

/// Look up the descriptor for an event kind.
pub fn descriptor(kind: EventKind) -> &'static EventDescriptor {
    &EVENT_TABLE[kind as usize]
}

impl EventDescriptor {
    /// Reject requests whose data is not an object or lacks a required field.
    pub fn validate(&self, data: &Value) -> Result<(), AppError> {
        let Some(object) = data.as_object() else {
            return Err(AppError::Validation(format!(
                "'data' for {} must be an object",
                self.kind
            )));
        };

        let missing: Vec<&str> = self
            .required
            .iter()
            .copied()
            .filter(|field| object.get(*field).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Missing required field(s) for {}: {}",
                self.kind,
                missing.join(", ")
            )));
        }

        // Id fields must parse even when optional.
        for field in ["groupId", "userId", "bidderId", "excludeUserId"] {
            optional_uuid(data, field)?;
        }
        Ok(())
    }
}

/// Parse an optional UUID field; present-but-malformed is a validation error.
pub fn optional_uuid(data: &Value, field: &str) -> Result<Option<Uuid>, AppError> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Uuid::parse_str(s)
            .map(Some)
            .map_err(|_| AppError::Validation(format!("'{field}' must be a UUID, got '{s}'"))),
        Some(other) => Err(AppError::Validation(format!(
            "'{field}' must be a UUID string, got {other}"
        ))),
    }
}
