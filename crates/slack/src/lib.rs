//! Slack interface for bogbot.
//!
//! - **Socket Mode** (`socket`, `transport`) - websocket event loop with reconnection
//! - **Grammar** (`commands`) - turns message text into a command and its arguments
//! - **Handlers** (`handlers`) - authorization and per-command store transitions
//! - **Events** (`events`) - typed Slack events and the dispatcher
//! - **Block Kit** (`blocks`) - reply payloads, including the team picker
//! - **Web API** (`web`) - `chat.postMessage` and `conversations.members`
//!
//! ```text
//! Slack → SocketModeRunner (ack) → EventDispatcher → StoreCommandService → stores
//!                ↓
//!            ReplySink ← replies
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod socket;
pub mod transport;
pub mod web;
