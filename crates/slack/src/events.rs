use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use bogbot_core::domain::user::UserId;
use bogbot_core::errors::{ApplicationError, FailureClass, InterfaceError};

use crate::blocks::{MessageTemplate, CHANGE_TEAM_ACTION_ID};
use crate::commands::classify;
use crate::handlers::{ChatCommandService, CommandInvocation};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    BlockAction(BlockActionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Where replies to this event go, if anywhere.
    pub fn reply_target(&self) -> Option<ReplyTarget> {
        match self {
            Self::Message(event) => Some(event.reply_target()),
            Self::BlockAction(event) => Some(ReplyTarget {
                channel_id: event.channel_id.clone(),
                thread_ts: event.thread_ts.clone(),
            }),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    BlockAction,
    Unsupported,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub channel_type: Option<String>,
    pub user_id: Option<String>,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

impl MessageEvent {
    pub fn is_direct_message(&self) -> bool {
        self.channel_type.as_deref() == Some("im")
    }

    /// Bot posts, edits, joins and other subtypes never carry commands.
    pub fn is_human_message(&self) -> bool {
        self.bot_id.is_none() && self.subtype.is_none() && self.user_id.is_some()
    }

    /// Threads onto the originating thread, or onto the message itself when
    /// it is top level. Direct messages are answered unthreaded.
    pub fn reply_target(&self) -> ReplyTarget {
        let thread_ts = if self.is_direct_message() {
            None
        } else {
            Some(self.thread_ts.clone().unwrap_or_else(|| self.ts.clone()))
        };
        ReplyTarget { channel_id: self.channel_id.clone(), thread_ts }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub channel_id: String,
    pub message_ts: String,
    pub thread_ts: Option<String>,
    pub user_id: String,
    pub action_id: String,
    pub selected_value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyTarget {
    pub channel_id: String,
    pub thread_ts: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Vec<MessageTemplate>),
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Command(#[from] ApplicationError),
    #[error("block action `{0}` carried no selection")]
    MissingSelection(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

impl DispatchError {
    /// User-facing classification of the failure, tagged with the envelope id.
    pub fn into_interface(self, correlation_id: &str) -> InterfaceError {
        match self {
            Self::Handler(EventHandlerError::Command(error)) => error.into_interface(correlation_id),
            Self::Handler(error @ EventHandlerError::MissingSelection(_)) => {
                InterfaceError::new(FailureClass::Rejected, error.to_string(), correlation_id)
            }
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Routes chat messages and team-picker selections to `service`.
pub fn command_dispatcher<S>(service: Arc<S>) -> EventDispatcher
where
    S: ChatCommandService + ?Sized + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageCommandHandler::new(service.clone()));
    dispatcher.register(TeamPickerHandler::new(service));
    dispatcher
}

pub struct MessageCommandHandler<S> {
    service: S,
}

impl<S> MessageCommandHandler<S>
where
    S: ChatCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageCommandHandler<S>
where
    S: ChatCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let (true, Some(user_id)) = (event.is_human_message(), event.user_id.as_ref()) else {
            debug!(
                event_name = "ingress.slack.message_skipped",
                correlation_id = %ctx.correlation_id,
                subtype = event.subtype.as_deref().unwrap_or("none"),
                "skipping non-human message"
            );
            return Ok(HandlerResult::Ignored);
        };
        let Some(command) = classify(&event.text) else {
            return Ok(HandlerResult::Ignored);
        };

        let invocation = CommandInvocation {
            user_id: UserId::new(user_id.clone()),
            channel_id: event.channel_id.clone(),
            command,
        };
        let replies = self.service.execute(&invocation, ctx).await?;
        Ok(HandlerResult::Responded(replies))
    }
}

pub struct TeamPickerHandler<S> {
    service: S,
}

impl<S> TeamPickerHandler<S>
where
    S: ChatCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for TeamPickerHandler<S>
where
    S: ChatCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.action_id != CHANGE_TEAM_ACTION_ID {
            return Ok(HandlerResult::Ignored);
        }
        let Some(team) = event.selected_value.as_deref() else {
            return Err(EventHandlerError::MissingSelection(event.action_id.clone()));
        };

        let replies =
            self.service.select_team(&UserId::new(event.user_id.clone()), team, ctx).await?;
        Ok(HandlerResult::Responded(replies))
    }
}
