use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use bogbot_core::errors::ApplicationError;

use crate::blocks::{internal_error_message, MessageTemplate};
use crate::events::{
    BlockActionEvent, EventContext, EventDispatcher, HandlerResult, MessageEvent,
    ReplyTarget, SlackEnvelope, SlackEvent,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not open the socket: {0}")]
    Connect(String),
    #[error("socket read failed: {0}")]
    Receive(String),
    #[error("could not acknowledge envelope: {0}")]
    Acknowledge(String),
    #[error("socket close failed: {0}")]
    Disconnect(String),
}

/// Exponential backoff between reconnects, doubling from `first_delay` up to
/// `delay_cap`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub first_delay: Duration,
    pub delay_cap: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            first_delay: Duration::from_millis(250),
            delay_cap: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_before(&self, retry: u32) -> Duration {
        self.first_delay.saturating_mul(1 << retry.min(16)).min(self.delay_cap)
    }
}

/// One Socket Mode connection. Envelopes must be acknowledged before Slack's
/// three second redelivery window closes.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the server closed the stream cleanly.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Delivers reply payloads back to the conversation.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn post(
        &self,
        target: &ReplyTarget,
        message: &MessageTemplate,
    ) -> Result<(), ApplicationError>;
}

enum SessionEnd {
    Closed,
    /// Never connected; counts against the retry budget.
    Refused(TransportError),
    /// Connected, then broke; the retry budget starts over.
    Dropped(TransportError),
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    replies: Arc<dyn ReplySink>,
    policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        replies: Arc<dyn ReplySink>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, replies, policy }
    }

    /// Runs sessions until the server closes one cleanly or the retry budget
    /// runs out. Neither case is an error; the process keeps serving health
    /// checks.
    pub async fn start(&self) -> Result<()> {
        let mut retries = 0;
        loop {
            let error = match self.run_session(retries).await {
                SessionEnd::Closed => return Ok(()),
                SessionEnd::Refused(error) => error,
                SessionEnd::Dropped(error) => {
                    retries = 0;
                    error
                }
            };
            warn!(
                event_name = "ingress.slack.session_lost",
                retries,
                max_retries = self.policy.max_retries,
                error = %error,
                "slack socket session lost"
            );

            if retries >= self.policy.max_retries {
                error!(
                    event_name = "ingress.slack.retries_exhausted",
                    max_retries = self.policy.max_retries,
                    "giving up on the slack socket"
                );
                return Ok(());
            }
            let delay = self.policy.delay_before(retries);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            retries += 1;
        }
    }

    async fn run_session(&self, retries: u32) -> SessionEnd {
        debug!(retries, "connecting slack socket");
        if let Err(error) = self.transport.connect().await {
            return SessionEnd::Refused(error);
        }
        info!(event_name = "ingress.slack.connected", retries, "slack socket connected");

        loop {
            match self.transport.next_envelope().await {
                Ok(Some(envelope)) => self.process(&envelope).await,
                Ok(None) => {
                    info!(event_name = "ingress.slack.closed", "slack socket closed by server");
                    return match self.transport.disconnect().await {
                        Ok(()) => SessionEnd::Closed,
                        Err(error) => SessionEnd::Dropped(error),
                    };
                }
                Err(error) => return SessionEnd::Dropped(error),
            }
        }
    }

    async fn process(&self, envelope: &SlackEnvelope) {
        let id = envelope.envelope_id.as_str();
        info!(
            event_name = "ingress.slack.envelope_received",
            correlation_id = %id,
            event_type = ?envelope.event.event_type(),
            "slack envelope received"
        );
        match self.transport.acknowledge(id).await {
            Ok(()) => debug!(event_name = "ingress.slack.ack_sent", correlation_id = %id, "envelope acknowledged"),
            Err(error) => warn!(
                event_name = "ingress.slack.ack_failed",
                correlation_id = %id,
                error = %error,
                "envelope acknowledgement failed"
            ),
        }

        let messages = self.replies_for(envelope).await;
        if let Some(target) = envelope.event.reply_target() {
            self.deliver(&target, &messages, id).await;
        }
    }

    async fn replies_for(&self, envelope: &SlackEnvelope) -> Vec<MessageTemplate> {
        let context = EventContext { correlation_id: envelope.envelope_id.clone() };
        match self.dispatcher.dispatch(envelope, &context).await {
            Ok(HandlerResult::Responded(messages)) => messages,
            Ok(HandlerResult::Ignored) => Vec::new(),
            Err(error) => {
                error!(
                    event_name = "command.failed",
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "event dispatch failed"
                );
                vec![internal_error_message(&error.into_interface(&envelope.envelope_id))]
            }
        }
    }

    /// Posts in order and stops at the first failure so later messages never
    /// arrive without the earlier ones.
    async fn deliver(&self, target: &ReplyTarget, messages: &[MessageTemplate], id: &str) {
        for message in messages {
            if let Err(error) = self.replies.post(target, message).await {
                warn!(
                    event_name = "egress.slack.reply_failed",
                    correlation_id = %id,
                    channel_id = %target.channel_id,
                    error = %error,
                    "failed to post reply"
                );
                return;
            }
        }
    }
}

/// Decodes one Socket Mode frame. Control frames (`hello`, `disconnect`)
/// carry no envelope id and yield `None`.
pub fn decode_envelope(frame: &Value) -> Option<SlackEnvelope> {
    let envelope_id = frame.get("envelope_id")?.as_str()?.to_owned();
    let frame_type = str_at(frame, &["type"]).unwrap_or_default();
    let payload = frame.get("payload").unwrap_or(&Value::Null);

    let event = match frame_type.as_str() {
        "events_api" => decode_events_api(payload),
        "interactive" => decode_interactive(payload),
        other => SlackEvent::Unsupported { event_type: other.to_owned() },
    };

    Some(SlackEnvelope { envelope_id, event })
}

fn decode_events_api(payload: &Value) -> SlackEvent {
    let Some(event) = payload.get("event") else {
        return SlackEvent::Unsupported { event_type: "events_api".to_owned() };
    };
    let event_type = str_at(event, &["type"]).unwrap_or_default();
    if event_type != "message" {
        return SlackEvent::Unsupported { event_type };
    }

    SlackEvent::Message(MessageEvent {
        channel_id: str_at(event, &["channel"]).unwrap_or_default(),
        channel_type: str_at(event, &["channel_type"]),
        user_id: str_at(event, &["user"]),
        text: str_at(event, &["text"]).unwrap_or_default(),
        ts: str_at(event, &["ts"]).unwrap_or_default(),
        thread_ts: str_at(event, &["thread_ts"]),
        bot_id: str_at(event, &["bot_id"]),
        subtype: str_at(event, &["subtype"]),
    })
}

fn decode_interactive(payload: &Value) -> SlackEvent {
    let payload_type = str_at(payload, &["type"]).unwrap_or_default();
    if payload_type != "block_actions" {
        return SlackEvent::Unsupported { event_type: payload_type };
    }
    let Some(action) = payload.get("actions").and_then(|actions| actions.get(0)) else {
        return SlackEvent::Unsupported { event_type: payload_type };
    };

    SlackEvent::BlockAction(BlockActionEvent {
        channel_id: str_at(payload, &["channel", "id"])
            .or_else(|| str_at(payload, &["container", "channel_id"]))
            .unwrap_or_default(),
        message_ts: str_at(payload, &["container", "message_ts"])
            .or_else(|| str_at(payload, &["message", "ts"]))
            .unwrap_or_default(),
        thread_ts: str_at(payload, &["container", "thread_ts"])
            .or_else(|| str_at(payload, &["message", "thread_ts"])),
        user_id: str_at(payload, &["user", "id"]).unwrap_or_default(),
        action_id: str_at(action, &["action_id"]).unwrap_or_default(),
        selected_value: str_at(action, &["selected_option", "value"])
            .or_else(|| str_at(action, &["value"])),
    })
}

fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use bogbot_core::domain::user::UserId;
    use bogbot_core::errors::ApplicationError;

    use super::{
        decode_envelope, ReconnectPolicy, ReplySink, SocketModeRunner, SocketTransport,
        TransportError,
    };
    use crate::blocks::MessageTemplate;
    use crate::events::{
        command_dispatcher, EventContext, EventDispatcher, MessageEvent, ReplyTarget,
        SlackEnvelope, SlackEvent,
    };
    use crate::handlers::{ChatCommandService, CommandInvocation};

    /// Plays back scripted connect outcomes and reads, logging every call.
    struct FakeSocket {
        connects: Mutex<VecDeque<Result<(), TransportError>>>,
        reads: Mutex<VecDeque<Result<Option<SlackEnvelope>, TransportError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSocket {
        fn scripted(
            connects: impl IntoIterator<Item = Result<(), TransportError>>,
            reads: impl IntoIterator<Item = Result<Option<SlackEnvelope>, TransportError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                connects: Mutex::new(connects.into_iter().collect()),
                reads: Mutex::new(reads.into_iter().collect()),
                calls: Mutex::default(),
            })
        }

        async fn calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl SocketTransport for FakeSocket {
        async fn connect(&self) -> Result<(), TransportError> {
            self.calls.lock().await.push("connect".to_owned());
            self.connects.lock().await.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            self.reads.lock().await.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            self.calls.lock().await.push(format!("ack {envelope_id}"));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.calls.lock().await.push("disconnect".to_owned());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        posted: Mutex<Vec<(ReplyTarget, MessageTemplate)>>,
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn post(
            &self,
            target: &ReplyTarget,
            message: &MessageTemplate,
        ) -> Result<(), ApplicationError> {
            self.posted.lock().await.push((target.clone(), message.clone()));
            Ok(())
        }
    }

    struct FailingService;

    #[async_trait]
    impl ChatCommandService for FailingService {
        async fn execute(
            &self,
            _invocation: &CommandInvocation,
            _ctx: &EventContext,
        ) -> Result<Vec<MessageTemplate>, ApplicationError> {
            Err(ApplicationError::Persistence("database is locked".to_owned()))
        }

        async fn select_team(
            &self,
            _user_id: &UserId,
            _team: &str,
            _ctx: &EventContext,
        ) -> Result<Vec<MessageTemplate>, ApplicationError> {
            Ok(Vec::new())
        }
    }

    fn ignored(id: &str) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(Some(SlackEnvelope {
            envelope_id: id.to_owned(),
            event: SlackEvent::Unsupported { event_type: "reaction_added".to_owned() },
        }))
    }

    fn refused() -> Result<(), TransportError> {
        Err(TransportError::Connect("network down".to_owned()))
    }

    fn reset() -> Result<Option<SlackEnvelope>, TransportError> {
        Err(TransportError::Receive("connection reset".to_owned()))
    }

    async fn run(socket: &Arc<FakeSocket>, max_retries: u32) {
        let policy =
            ReconnectPolicy { max_retries, first_delay: Duration::ZERO, delay_cap: Duration::ZERO };
        let runner = SocketModeRunner::new(
            socket.clone(),
            EventDispatcher::default(),
            Arc::new(RecordingSink::default()),
            policy,
        );
        runner.start().await.expect("runner never fails");
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (0..7).map(|retry| policy.delay_before(retry).as_millis()).collect();
        assert_eq!(delays, vec![250, 500, 1_000, 2_000, 4_000, 5_000, 5_000]);
        assert_eq!(policy.delay_before(u32::MAX), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn refused_connection_is_retried() {
        let socket = FakeSocket::scripted([refused(), Ok(())], [ignored("env-1"), Ok(None)]);

        run(&socket, 2).await;

        assert_eq!(socket.calls().await, ["connect", "connect", "ack env-1", "disconnect"]);
    }

    #[tokio::test]
    async fn gives_up_after_the_retry_budget() {
        let socket = FakeSocket::scripted([refused(), refused(), refused(), refused()], []);

        run(&socket, 2).await;

        assert_eq!(socket.calls().await, ["connect", "connect", "connect"]);
    }

    #[tokio::test]
    async fn a_dropped_session_restores_the_budget() {
        let socket = FakeSocket::scripted([], [reset(), reset(), ignored("env-3"), Ok(None)]);

        run(&socket, 1).await;

        assert_eq!(
            socket.calls().await,
            ["connect", "connect", "connect", "ack env-3", "disconnect"]
        );
    }

    #[tokio::test]
    async fn store_failure_is_answered_with_a_generic_reply_in_thread() {
        let event = MessageEvent {
            channel_id: "C1".to_owned(),
            user_id: Some("U1".to_owned()),
            text: "bits".to_owned(),
            ts: "1730000000.1000".to_owned(),
            ..MessageEvent::default()
        };
        let socket = FakeSocket::scripted(
            [],
            [Ok(Some(SlackEnvelope { envelope_id: "env-9".to_owned(), event: SlackEvent::Message(event) }))],
        );
        let sink = Arc::new(RecordingSink::default());
        let runner = SocketModeRunner::new(
            socket.clone(),
            command_dispatcher(Arc::new(FailingService)),
            sink.clone(),
            ReconnectPolicy { max_retries: 0, ..ReconnectPolicy::default() },
        );

        runner.start().await.expect("runner");

        assert_eq!(socket.calls().await, ["connect", "ack env-9", "disconnect"]);
        let posted = sink.posted.lock().await;
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0.thread_ts.as_deref(), Some("1730000000.1000"));
        assert_eq!(
            posted[0].1.fallback_text,
            "Something went wrong while saving that. Please try again shortly."
        );
    }

    #[test]
    fn decodes_message_events() {
        let frame = json!({
            "envelope_id": "env-1",
            "type": "events_api",
            "payload": {
                "event": {
                    "type": "message",
                    "channel": "C1",
                    "channel_type": "im",
                    "user": "U1",
                    "text": "bits",
                    "ts": "1730000000.1000"
                }
            }
        });

        let envelope = decode_envelope(&frame).expect("envelope");
        let SlackEvent::Message(event) = envelope.event else {
            panic!("expected message event");
        };
        assert_eq!(event.user_id.as_deref(), Some("U1"));
        assert!(event.is_direct_message());
        assert_eq!(event.reply_target().thread_ts, None);
    }

    #[test]
    fn decodes_team_picker_actions() {
        let frame = json!({
            "envelope_id": "env-2",
            "type": "interactive",
            "payload": {
                "type": "block_actions",
                "user": { "id": "U2" },
                "channel": { "id": "C1" },
                "container": { "message_ts": "1730000000.2000", "thread_ts": "1730000000.1000" },
                "actions": [{
                    "action_id": "change_team",
                    "selected_option": { "value": "Red", "text": { "type": "plain_text", "text": "Red" } }
                }]
            }
        });

        let envelope = decode_envelope(&frame).expect("envelope");
        let SlackEvent::BlockAction(action) = envelope.event else {
            panic!("expected block action");
        };
        assert_eq!(action.user_id, "U2");
        assert_eq!(action.selected_value.as_deref(), Some("Red"));
        assert_eq!(action.thread_ts.as_deref(), Some("1730000000.1000"));
    }

    #[test]
    fn control_frames_are_not_envelopes() {
        assert_eq!(decode_envelope(&json!({ "type": "hello" })), None);
        assert!(matches!(
            decode_envelope(&json!({ "envelope_id": "e", "type": "slash_commands" }))
                .map(|envelope| envelope.event),
            Some(SlackEvent::Unsupported { .. })
        ));
    }

    #[test]
    fn mentions_are_not_treated_as_messages() {
        let frame = json!({
            "envelope_id": "env-3",
            "type": "events_api",
            "payload": {
                "event": { "type": "app_mention", "channel": "C1", "user": "U1", "text": "<@UBOT> bits" }
            }
        });

        let event = decode_envelope(&frame).expect("envelope").event;
        assert_eq!(event, SlackEvent::Unsupported { event_type: "app_mention".to_owned() });
    }
}
