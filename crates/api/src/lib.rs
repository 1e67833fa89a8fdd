//! HTTP surface for the notification dispatcher.
//!
//! - `POST /api/notifications`: fan out one `{type, data}` event
//! - `POST /api/reminders/run`: run the payment-reminder pass once
//! - `GET  /health`

pub mod routes;
pub mod state;
