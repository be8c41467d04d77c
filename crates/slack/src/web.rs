use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use bogbot_core::domain::user::UserId;
use bogbot_core::errors::ApplicationError;

use crate::blocks::MessageTemplate;
use crate::events::ReplyTarget;
use crate::handlers::MembershipLookup;
use crate::socket::ReplySink;

const MEMBERS_PAGE_SIZE: u32 = 200;

/// Slack Web API calls made with the bot token.
#[derive(Clone)]
pub struct SlackWebClient {
    http: Client,
    base_url: String,
    bot_token: SecretString,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocks: Option<&'a [crate::blocks::Block]>,
}

impl<'a> PostMessageRequest<'a> {
    fn new(target: &'a ReplyTarget, message: &'a MessageTemplate) -> Self {
        Self {
            channel: &target.channel_id,
            text: &message.fallback_text,
            thread_ts: target.thread_ts.as_deref(),
            blocks: (!message.is_plain()).then_some(message.blocks.as_slice()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct MembersPage {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

impl SlackWebClient {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString) -> Self {
        Self::with_client(Client::new(), base_url, bot_token)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, bot_token: SecretString) -> Self {
        Self { http, base_url: base_url.into().trim_end_matches('/').to_owned(), bot_token }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    /// Exchanges an app-level token for a Socket Mode websocket URL.
    pub async fn open_socket_url(&self, app_token: &SecretString) -> Result<String, ApplicationError> {
        let body: Value = self
            .http
            .post(self.endpoint("apps.connections.open"))
            .bearer_auth(app_token.expose_secret())
            .send()
            .await
            .map_err(integration)?
            .json()
            .await
            .map_err(integration)?;

        check_ok("apps.connections.open", &body)?;
        body.get("url").and_then(Value::as_str).map(str::to_owned).ok_or_else(|| {
            ApplicationError::Integration("apps.connections.open returned no url".to_owned())
        })
    }
}

fn integration(error: reqwest::Error) -> ApplicationError {
    ApplicationError::Integration(error.to_string())
}

fn check_ok(method: &str, body: &Value) -> Result<(), ApplicationError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
    Err(ApplicationError::Integration(format!("{method} failed: {error}")))
}

#[async_trait]
impl ReplySink for SlackWebClient {
    async fn post(
        &self,
        target: &ReplyTarget,
        message: &MessageTemplate,
    ) -> Result<(), ApplicationError> {
        let body: Value = self
            .http
            .post(self.endpoint("chat.postMessage"))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&PostMessageRequest::new(target, message))
            .send()
            .await
            .map_err(integration)?
            .json()
            .await
            .map_err(integration)?;

        check_ok("chat.postMessage", &body)
    }
}

#[async_trait]
impl MembershipLookup for SlackWebClient {
    async fn channel_members(&self, channel_id: &str) -> Result<Vec<UserId>, ApplicationError> {
        let mut members = Vec::new();
        let mut cursor = String::new();

        loop {
            let limit = MEMBERS_PAGE_SIZE.to_string();
            let mut query = vec![("channel", channel_id), ("limit", limit.as_str())];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }

            let page: MembersPage = self
                .http
                .get(self.endpoint("conversations.members"))
                .bearer_auth(self.bot_token.expose_secret())
                .query(&query)
                .send()
                .await
                .map_err(integration)?
                .json()
                .await
                .map_err(integration)?;

            if !page.ok {
                return Err(ApplicationError::Integration(format!(
                    "conversations.members failed: {}",
                    page.error.as_deref().unwrap_or("unknown_error")
                )));
            }
            members.extend(page.members.into_iter().map(UserId::new));

            if page.response_metadata.next_cursor.is_empty() {
                break;
            }
            cursor = page.response_metadata.next_cursor;
        }

        debug!(channel_id, members = members.len(), "resolved channel members");
        Ok(members)
    }
}
