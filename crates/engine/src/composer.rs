//! Message templates.
//!
//! Every template is a pure function of the event data. Values are only ever
//! interpolated into fixed English / Hinglish phrasing; missing fields render
//! as placeholders, so composition cannot fail.

use serde_json::{Map, Value, json};

use chit_common::format::format_inr;
use chit_common::types::{ComposedMessage, EventKind, Urgency};

const GROUP_PLACEHOLDER: &str = "your group";
const MEMBER_PLACEHOLDER: &str = "A member";
const ADMIN_PLACEHOLDER: &str = "Admin";
const TBD: &str = "TBD";

/// Template ids referenced from the event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    PaymentReminder,
    /// Caller-supplied title and body
    Direct,
    LuckyDraw,
    LuckyDrawStarted,
    PaymentMarkedDone,
    DrawCompleted,
    Welcome,
    BidRoundStart,
    BidPlaced,
    BidUpdated,
    WinnerDeclared,
}

/// Renders event data into the content every recipient receives.
pub struct MessageComposer;

impl MessageComposer {
    pub fn compose(template: Template, kind: EventKind, data: &Value) -> ComposedMessage {
        let group = text(data, "groupName", GROUP_PLACEHOLDER);

        let (title, body, urgency, sms_text) = match template {
            Template::PaymentReminder => {
                let amount = money(data, "amount");
                match integer(data, "daysUntilDue") {
                    Some(0) => (
                        "⏰ Payment Due Today | Aaj Payment Ka Din".to_string(),
                        format!(
                            "Your contribution of {amount} for {group} is due today. Kripya aaj hi payment karein."
                        ),
                        Urgency::Urgent,
                        format!("Reminder: {amount} for {group} is due TODAY."),
                    ),
                    Some(1) => (
                        "⏰ Payment Due Tomorrow | Kal Payment Hai".to_string(),
                        format!(
                            "Your contribution of {amount} for {group} is due tomorrow. Kal tak payment kar dijiye."
                        ),
                        Urgency::Urgent,
                        format!("Reminder: {amount} for {group} is due tomorrow."),
                    ),
                    Some(days) if days >= 2 => (
                        "📅 Payment Reminder | Payment Yaad Dilana".to_string(),
                        format!(
                            "Your contribution of {amount} for {group} is due in {days} days. {days} din mein payment karna hai."
                        ),
                        Urgency::Routine,
                        format!("Reminder: {amount} for {group} is due in {days} days."),
                    ),
                    _ => (
                        "📅 Payment Reminder | Payment Yaad Dilana".to_string(),
                        format!(
                            "Your contribution of {amount} for {group} is due soon. Jaldi payment karein."
                        ),
                        Urgency::Routine,
                        format!("Reminder: {amount} for {group} is due soon."),
                    ),
                }
            }
            Template::Direct => {
                let title = text(data, "title", "");
                let body = text(data, "body", "");
                let sms = if title.is_empty() {
                    body.clone()
                } else {
                    format!("{title}: {body}")
                };
                (title, body, Urgency::Routine, sms)
            }
            Template::LuckyDraw => {
                let winner = text(data, "winnerName", MEMBER_PLACEHOLDER);
                let amount = money(data, "amount");
                let round = round(data);
                (
                    "🎉 Lucky Draw Winner | Lucky Draw Ka Vijeta".to_string(),
                    format!(
                        "{winner} won the lucky draw for {round} of {group} and receives {amount}. Badhai ho!"
                    ),
                    Urgency::Routine,
                    format!("{winner} won the lucky draw for {round} of {group} ({amount})."),
                )
            }
            Template::LuckyDrawStarted => {
                let round = round(data);
                let when = text(data, "drawDate", "now");
                (
                    "🎲 Lucky Draw Starting | Lucky Draw Shuru".to_string(),
                    format!(
                        "The lucky draw for {round} of {group} is starting {}. Abhi app kholiye!",
                        if when == "now" { "now".to_string() } else { format!("on {when}") }
                    ),
                    Urgency::Urgent,
                    format!("The lucky draw for {round} of {group} is starting."),
                )
            }
            Template::PaymentMarkedDone => {
                let amount = money(data, "amount");
                let by = text(data, "markedBy", ADMIN_PLACEHOLDER);
                (
                    "✅ Payment Received | Payment Mil Gaya".to_string(),
                    format!(
                        "{by} marked your payment of {amount} for {group} as done. Dhanyavaad!"
                    ),
                    Urgency::Routine,
                    format!("Your payment of {amount} for {group} was marked done."),
                )
            }
            Template::DrawCompleted => {
                let winner = text(data, "winnerName", MEMBER_PLACEHOLDER);
                let amount = money(data, "amount");
                let round = round(data);
                (
                    "🏆 Draw Completed | Draw Poora Hua".to_string(),
                    format!(
                        "{winner} won {round} of {group} and receives {amount}. Agle round ka intezaar karein."
                    ),
                    Urgency::Routine,
                    format!("{winner} won {round} of {group} ({amount})."),
                )
            }
            Template::Welcome => {
                let member = text(data, "memberName", "there");
                (
                    format!("👋 Welcome to {group} | Swagat Hai"),
                    format!("Hi {member}, you have joined {group}. Aapka swagat hai!"),
                    Urgency::Routine,
                    format!(
                        "Hi {member}, you have been added to the chit group {group}. Install the app to track payments and draws."
                    ),
                )
            }
            Template::BidRoundStart => {
                let round = round(data);
                let minimum = money(data, "minimumBid");
                let ends = data
                    .get("endsAt")
                    .and_then(Value::as_str)
                    .map(|at| format!(" Bidding closes at {at}."))
                    .unwrap_or_default();
                (
                    "🔔 Bidding Open | Boli Shuru".to_string(),
                    format!(
                        "Bidding for {round} of {group} is now open. Minimum bid: {minimum}.{ends} Jaldi boli lagaiye!"
                    ),
                    Urgency::Urgent,
                    format!("Bidding for {round} of {group} is open now. Minimum bid: {minimum}."),
                )
            }
            Template::BidPlaced => {
                let bidder = text(data, "bidderName", MEMBER_PLACEHOLDER);
                let bid = money(data, "bidAmount");
                let round = round(data);
                (
                    "💰 New Bid | Nayi Boli".to_string(),
                    format!(
                        "{bidder} bid {bid} in {round} of {group}. Kya aap behtar boli lagayenge?"
                    ),
                    Urgency::Urgent,
                    format!("{bidder} bid {bid} in {round} of {group}."),
                )
            }
            Template::BidUpdated => {
                let bidder = text(data, "bidderName", MEMBER_PLACEHOLDER);
                let bid = money(data, "bidAmount");
                let round = round(data);
                (
                    "✏️ Bid Updated | Boli Badli".to_string(),
                    format!(
                        "{bidder} changed their bid to {bid} in {round} of {group}. Boli abhi bhi khuli hai."
                    ),
                    Urgency::Urgent,
                    format!("{bidder} changed their bid to {bid} in {round} of {group}."),
                )
            }
            Template::WinnerDeclared => {
                let winner = text(data, "winnerName", MEMBER_PLACEHOLDER);
                let bid = money(data, "winningBid");
                let payout = money(data, "payoutAmount");
                let round = round(data);
                (
                    "🏆 Winner Declared | Vijeta Ghoshit".to_string(),
                    format!(
                        "{winner} won {round} of {group} with a bid of {bid}. Payout: {payout}. Badhai ho!"
                    ),
                    Urgency::Routine,
                    format!("{winner} won {round} of {group}. Payout: {payout}."),
                )
            }
        };

        ComposedMessage {
            title,
            body,
            data: payload(kind, data),
            urgency,
            sms_text,
        }
    }
}

/// Structured payload: every scalar request field plus the event type.
///
/// Caller-provided `data` objects (direct notifications) are merged in;
/// `title`/`body` are left out since they travel as the notification itself.
fn payload(kind: EventKind, data: &Value) -> Value {
    let mut out = Map::new();
    if let Some(object) = data.as_object() {
        for (key, value) in object {
            match key.as_str() {
                "title" | "body" => {}
                "data" => {
                    if let Some(extra) = value.as_object() {
                        for (k, v) in extra {
                            out.entry(k.clone()).or_insert_with(|| v.clone());
                        }
                    }
                }
                _ if value.is_object() || value.is_array() => {}
                _ => {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
    }
    out.insert("type".to_string(), json!(kind.as_str()));
    Value::Object(out)
}

/// String or number field rendered as text, with a fallback for absent / blank values.
fn text(data: &Value, key: &str, default: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

/// Numeric field, accepting numbers sent as strings.
fn number(data: &Value, key: &str) -> Option<f64> {
    match data.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer(data: &Value, key: &str) -> Option<i64> {
    number(data, key).filter(|n| n.fract() == 0.0).map(|n| n as i64)
}

fn money(data: &Value, key: &str) -> String {
    number(data, key)
        .map(format_inr)
        .unwrap_or_else(|| TBD.to_string())
}

fn round(data: &Value) -> String {
    match integer(data, "roundNumber") {
        Some(n) => format!("Round {n}"),
        None => format!("Round {TBD}"),
    }
}
