//! Channel trait shared by the delivery channels.

use async_trait::async_trait;

use crate::pipeline::types::{DispatchSummary, PreparedMessage};
use crate::settings::DeliveryMethod;

/// A way of getting prepared messages in front of recipients.
///
/// Implementations work through the batch strictly in order, one message at a
/// time. A failure on one message is recorded in the summary and never stops
/// the rest of the batch, so `success + failed` always equals the batch size.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Which configured method this channel serves.
    fn method(&self) -> DeliveryMethod;

    /// Whether bodies must be plain text before reaching this channel.
    fn requires_plain_text(&self) -> bool {
        false
    }

    /// Deliver every message and report per-message outcomes.
    async fn dispatch(&self, messages: Vec<PreparedMessage>) -> DispatchSummary;
}
