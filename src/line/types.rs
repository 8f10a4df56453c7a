use serde::{Deserialize, Serialize};

/// Maximum number of messages accepted by a single reply call.
pub const MAX_REPLY_MESSAGES: usize = 5;

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,

    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WebhookEvent {
    Message(MessageEvent),
    Postback(PostbackEvent),
    MemberJoined(MemberJoinedEvent),

    /// follow, unfollow, join, leave, memberLeft, unsend etc.
    #[serde(other)]
    Unsupported,
}
impl WebhookEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::Message(_) => "message",
            WebhookEvent::Postback(_) => "postback",
            WebhookEvent::MemberJoined(_) => "memberJoined",
            WebhookEvent::Unsupported => "unsupported",
        }
    }

    pub fn reply_token(&self) -> Option<&str> {
        match self {
            WebhookEvent::Message(event) => event.reply_token.as_deref(),
            WebhookEvent::Postback(event) => event.reply_token.as_deref(),
            WebhookEvent::MemberJoined(event) => event.reply_token.as_deref(),
            WebhookEvent::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Absent on events delivered while the channel is in standby mode.
    #[serde(default)]
    pub reply_token: Option<String>,
    pub message: MessageContent,

    #[serde(default)]
    pub source: Option<EventSource>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    Text {
        #[serde(default)]
        id: Option<String>,
        text: String,
    },

    /// image, video, audio, file, location, sticker.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostbackEvent {
    #[serde(default)]
    pub reply_token: Option<String>,
    pub postback: Postback,

    #[serde(default)]
    pub source: Option<EventSource>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Postback {
    pub data: String,

    /// Date/time picker selections, passed through untouched.
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberJoinedEvent {
    #[serde(default)]
    pub reply_token: Option<String>,
    pub joined: JoinedMembers,

    #[serde(default)]
    pub source: Option<EventSource>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinedMembers {
    #[serde(default)]
    pub members: Vec<JoinedMember>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedMember {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EventSource {
    User {
        user_id: String,
    },
    Group {
        group_id: String,

        #[serde(default)]
        user_id: Option<String>,
    },
    Room {
        room_id: String,

        #[serde(default)]
        user_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage {
    Text { text: String },
}
impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutgoingMessage::Text { text: text.into() }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest<'a> {
    pub reply_token: &'a str,
    pub messages: &'a [OutgoingMessage],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    pub display_name: String,
}
