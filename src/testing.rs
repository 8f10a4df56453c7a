use crate::completion::{CompletionError, Completer};
use crate::line::types::{EventSource, MemberProfile, OutgoingMessage};
use crate::line::ChatPlatform;
use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::Router;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::net::TcpListener;

/// Serves the router on an ephemeral local port, returning its base URL.
pub async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{address}")
}

/// Records replies and profile lookups instead of calling LINE.
#[derive(Default)]
pub struct FakePlatform {
    pub replies: Mutex<Vec<(String, Vec<OutgoingMessage>)>>,
    pub profile_lookups: Mutex<Vec<(EventSource, String)>>,
    pub display_names: HashMap<String, String>,
    pub fail_replies: bool,
}
impl FakePlatform {
    pub fn with_members(members: &[(&str, &str)]) -> Self {
        Self {
            display_names: members
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing_replies() -> Self {
        Self {
            fail_replies: true,
            ..Default::default()
        }
    }

    pub fn replies(&self) -> Vec<(String, Vec<OutgoingMessage>)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn reply(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<()> {
        self.replies
            .lock()
            .unwrap()
            .push((reply_token.to_string(), messages.to_vec()));

        if self.fail_replies {
            bail!("connection reset by peer");
        }
        Ok(())
    }

    async fn member_profile(&self, source: &EventSource, user_id: &str) -> Result<MemberProfile> {
        self.profile_lookups
            .lock()
            .unwrap()
            .push((source.clone(), user_id.to_string()));

        match self.display_names.get(user_id) {
            Some(name) => Ok(MemberProfile {
                display_name: name.clone(),
            }),
            None => bail!("LINE API returned 404 Not Found: {{\"message\":\"Not found\"}}"),
        }
    }
}

/// Echoes prompts back, or fails every call when `fail` is set.
#[derive(Default)]
pub struct FakeCompleter {
    pub prompts: Mutex<Vec<String>>,
    pub fail: bool,
}
impl FakeCompleter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completer for FakeCompleter {
    async fn try_complete(&self, text: &str) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(format!("echo: {text}"))
    }
}
