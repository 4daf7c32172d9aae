//! Delivery channels: desktop mail drafts and Microsoft Graph.

pub mod channel;
pub mod desktop;
pub mod graph;

pub use channel::*;
pub use desktop::{DesktopDraftDispatcher, DraftLauncher, SystemLauncher, mailto_uri};
pub use graph::GraphDispatcher;
