use crate::completion::Completer;
use crate::line::types::{
    MemberJoinedEvent, MessageContent, MessageEvent, OutgoingMessage, PostbackEvent, WebhookEvent,
    MAX_REPLY_MESSAGES,
};
use crate::line::ChatPlatform;
use futures::{stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const CONCURRENCY_LIMIT: usize = 10;

pub fn welcome_message(display_name: &str) -> String {
    format!("{display_name} 歡迎加入本群組！")
}

/// Routes decoded webhook events to their handlers. Handlers absorb every
/// failure, so dispatching never fails once a payload has been accepted.
#[derive(Clone)]
pub struct EventDispatcher {
    platform: Arc<dyn ChatPlatform>,
    completer: Arc<dyn Completer>,
}
impl EventDispatcher {
    pub fn new(platform: Arc<dyn ChatPlatform>, completer: Arc<dyn Completer>) -> Self {
        Self {
            platform,
            completer,
        }
    }

    pub async fn dispatch_all(&self, events: Vec<WebhookEvent>) {
        stream::iter(events)
            .for_each_concurrent(CONCURRENCY_LIMIT, |event| self.dispatch(event))
            .await;
    }

    pub async fn dispatch(&self, event: WebhookEvent) {
        debug!(
            "Dispatching {} event (has reply token: {})",
            event.kind(),
            event.reply_token().is_some()
        );
        match event {
            WebhookEvent::Message(event) => self.handle_message(event).await,
            WebhookEvent::Postback(event) => Self::handle_postback(event),
            WebhookEvent::MemberJoined(event) => self.handle_member_joined(event).await,
            WebhookEvent::Unsupported => debug!("Ignoring unsupported event"),
        }
    }

    async fn handle_message(&self, event: MessageEvent) {
        let Some(reply_token) = event.reply_token else {
            info!("Skipping message without a reply token (standby mode)");
            return;
        };
        let text = match event.message {
            MessageContent::Text { text, .. } => text,
            MessageContent::Other => {
                debug!("Ignoring non-text message");
                return;
            }
        };

        let reply = self.completer.complete(&text).await;
        self.send_reply(&reply_token, vec![OutgoingMessage::text(reply)])
            .await;
    }

    fn handle_postback(event: PostbackEvent) {
        info!("Postback data: {}", event.postback.data);
    }

    async fn handle_member_joined(&self, event: MemberJoinedEvent) {
        let Some(reply_token) = event.reply_token else {
            info!("Skipping memberJoined without a reply token (standby mode)");
            return;
        };
        let Some(source) = event.source else {
            warn!("memberJoined event without a source, skipping welcome");
            return;
        };

        let mut greetings = Vec::new();
        for member in &event.joined.members {
            if greetings.len() == MAX_REPLY_MESSAGES {
                warn!(
                    "More than {MAX_REPLY_MESSAGES} members joined at once, not welcoming the rest"
                );
                break;
            }

            match self.platform.member_profile(&source, &member.user_id).await {
                Ok(profile) => greetings.push(OutgoingMessage::text(welcome_message(
                    &profile.display_name,
                ))),
                Err(e) => warn!(
                    "Failed to look up profile for member {}, skipping welcome: {e:?}",
                    member.user_id
                ),
            }
        }

        if greetings.is_empty() {
            debug!("No welcome messages to send");
            return;
        }
        self.send_reply(&reply_token, greetings).await;
    }

    /// Reply tokens are single use, so a failed send is only logged.
    async fn send_reply(&self, reply_token: &str, messages: Vec<OutgoingMessage>) {
        if let Err(e) = self.platform.reply(reply_token, &messages).await {
            error!("Failed to send reply: {e:?}");
        }
    }
}
