//! Credential delivery — renders PIN/OTP notifications and sends them as
//! desktop mail drafts or through Microsoft Graph.

pub mod channels;
pub mod config;
pub mod error;
pub mod oauth;
pub mod pipeline;
pub mod settings;
