//! Delivery collaborators for fanned-out notifications.
//!
//! - `push`: provider-sized batching onto the push HTTP API
//! - `sms`: best-effort SMS requests that never fail a dispatch

pub mod error;
pub mod push;
pub mod sms;

pub use error::NotifierError;
pub use push::{BatchDispatcher, HttpPushClient, PushClient, PushMessage, PushTicket};
pub use sms::{HttpSmsClient, SmsClient, SmsFallbackNotifier, SmsRequest};
