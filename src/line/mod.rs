mod client;
pub mod signature;
pub mod types;

pub use client::LineClient;

use crate::line::types::{EventSource, MemberProfile, OutgoingMessage};
use anyhow::Result;
use async_trait::async_trait;

/// Outbound half of the chat platform, as used by the event dispatcher.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Sends up to five messages with a one-time reply token.
    async fn reply(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<()>;

    /// Looks up a member of the group or room the event came from.
    async fn member_profile(&self, source: &EventSource, user_id: &str) -> Result<MemberProfile>;
}
