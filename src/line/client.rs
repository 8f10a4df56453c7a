use crate::config::LineConfig;
use crate::line::types::{
    EventSource, MemberProfile, OutgoingMessage, ReplyRequest, MAX_REPLY_MESSAGES,
};
use crate::line::ChatPlatform;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

const LINE_API_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct LineClient {
    client: Client,
    api_base: String,
    channel_access_token: String,
}
impl LineClient {
    pub fn new(config: &LineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(LINE_API_TIMEOUT)
            .build()
            .with_context(|| "Failed to build LINE API Reqwest client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            channel_access_token: config.channel_access_token.clone(),
        })
    }

    fn profile_url(&self, source: &EventSource, user_id: &str) -> Result<String> {
        match source {
            EventSource::Group { group_id, .. } => Ok(format!(
                "{}/v2/bot/group/{group_id}/member/{user_id}",
                self.api_base
            )),
            EventSource::Room { room_id, .. } => Ok(format!(
                "{}/v2/bot/room/{room_id}/member/{user_id}",
                self.api_base
            )),
            EventSource::User { .. } => {
                Err(anyhow!("Member profiles require a group or room source"))
            }
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        bail!("LINE API returned {status}: {body}")
    }
}

#[async_trait]
impl ChatPlatform for LineClient {
    async fn reply(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<()> {
        if messages.is_empty() || messages.len() > MAX_REPLY_MESSAGES {
            bail!(
                "A reply must carry between 1 and {MAX_REPLY_MESSAGES} messages, got {}",
                messages.len()
            );
        }

        let request = ReplyRequest {
            reply_token,
            messages,
        };
        let response = self
            .client
            .post(format!("{}/v2/bot/message/reply", self.api_base))
            .bearer_auth(&self.channel_access_token)
            .json(&request)
            .send()
            .await
            .with_context(|| "Network error")?;

        Self::check_status(response).await?;
        debug!("Sent {} reply message(s)", messages.len());
        Ok(())
    }

    async fn member_profile(&self, source: &EventSource, user_id: &str) -> Result<MemberProfile> {
        let response = self
            .client
            .get(self.profile_url(source, user_id)?)
            .bearer_auth(&self.channel_access_token)
            .send()
            .await
            .with_context(|| "Network error")?;

        Self::check_status(response)
            .await?
            .json::<MemberProfile>()
            .await
            .with_context(|| "Failed to parse member profile")
    }
}
