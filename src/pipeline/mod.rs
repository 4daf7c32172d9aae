//! Credential delivery pipeline.
//!
//! Every batch flows through:
//! 1. `types::RenderContext::for_request()` — per-recipient token values
//! 2. `template::render_template()` — `{{token}}` substitution
//! 3. `content::is_html()` / `content::strip_html()` — body classification
//! 4. `orchestrator::DeliveryOrchestrator` — channel routing and result aggregation

pub mod content;
pub mod orchestrator;
pub mod template;
pub mod types;

pub use orchestrator::DeliveryOrchestrator;
pub use types::{DeliveryRequest, DeliveryResult, PreparedMessage, Recipient};
