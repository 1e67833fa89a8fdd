//! Merges push and SMS outcomes into the response returned for one dispatch.

use serde::Serialize;
use serde_json::{Map, Value};

use chit_common::types::DeliveryResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryCounts {
    pub ok: usize,
    pub error: usize,
}

/// Outcome of a dispatch that ran end-to-end.
///
/// `success` means the pipeline executed; individual delivery failures are
/// reported in `counts` and `results`.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResult {
    pub success: bool,
    pub message: String,
    pub counts: DeliveryCounts,
    pub results: Vec<DeliveryResult>,
    /// Event-specific fields flattened into the response
    #[serde(flatten)]
    pub echo: Map<String, Value>,
}

pub struct DeliveryResultAggregator;

impl DeliveryResultAggregator {
    /// Push results first, then SMS results, nothing dropped.
    pub fn merge(
        push: Vec<DeliveryResult>,
        sms: Vec<DeliveryResult>,
        echo: Map<String, Value>,
    ) -> AggregatedResult {
        let mut results = push;
        results.extend(sms);

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let counts = DeliveryCounts {
            ok,
            error: results.len() - ok,
        };

        let message = if counts.error == 0 {
            format!("Sent {} notification(s)", counts.ok)
        } else {
            format!(
                "Attempted {} notification(s): {} delivered, {} failed",
                results.len(),
                counts.ok,
                counts.error
            )
        };

        AggregatedResult {
            success: true,
            message,
            counts,
            results,
            echo,
        }
    }

    /// A successful dispatch with nobody to deliver to.
    pub fn no_op(message: impl Into<String>, echo: Map<String, Value>) -> AggregatedResult {
        AggregatedResult {
            success: true,
            message: message.into(),
            counts: DeliveryCounts::default(),
            results: Vec::new(),
            echo,
        }
    }
}
