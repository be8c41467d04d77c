use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::events::SlackEnvelope;
use crate::socket::{decode_envelope, SocketTransport, TransportError};
use crate::web::SlackWebClient;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a websocket opened with `apps.connections.open`.
pub struct WebSocketTransport {
    web: SlackWebClient,
    app_token: SecretString,
    socket: Mutex<Option<Socket>>,
}

impl WebSocketTransport {
    pub fn new(web: SlackWebClient, app_token: SecretString) -> Self {
        Self { web, app_token, socket: Mutex::new(None) }
    }
}

enum Frame {
    Envelope(SlackEnvelope),
    Skip,
    Reconnect(String),
}

fn classify_frame(text: &str) -> Frame {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(error) => {
            warn!(error = %error, "failed to parse socket mode frame");
            return Frame::Skip;
        }
    };

    if value.get("type").and_then(Value::as_str) == Some("disconnect") {
        let reason = value.get("reason").and_then(Value::as_str).unwrap_or("unspecified");
        return Frame::Reconnect(reason.to_owned());
    }

    match decode_envelope(&value) {
        Some(envelope) => Frame::Envelope(envelope),
        None => Frame::Skip,
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .web
            .open_socket_url(&self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (socket, _) =
            connect_async(url.as_str()).await.map_err(|error| TransportError::Connect(error.to_string()))?;

        *self.socket.lock().await = Some(socket);
        info!(event_name = "ingress.slack.socket_opened", "socket mode websocket opened");
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.socket.lock().await;
        let Some(socket) = guard.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".to_owned()));
        };

        while let Some(frame) = socket.next().await {
            match frame.map_err(|error| TransportError::Receive(error.to_string()))? {
                Message::Text(text) => match classify_frame(text.as_str()) {
                    Frame::Envelope(envelope) => return Ok(Some(envelope)),
                    Frame::Skip => continue,
                    Frame::Reconnect(reason) => {
                        *guard = None;
                        return Err(TransportError::Receive(format!(
                            "slack requested reconnect: {reason}"
                        )));
                    }
                },
                Message::Ping(payload) => {
                    socket
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|error| TransportError::Receive(error.to_string()))?;
                }
                Message::Close(_) => {
                    debug!("socket mode websocket closed by peer");
                    *guard = None;
                    return Err(TransportError::Receive("websocket closed by peer".to_owned()));
                }
                _ => {}
            }
        }

        *guard = None;
        Err(TransportError::Receive("websocket stream ended".to_owned()))
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.socket.lock().await;
        let Some(socket) = guard.as_mut() else {
            return Err(TransportError::Acknowledge("socket is not connected".to_owned()));
        };

        let ack = json!({ "envelope_id": envelope_id }).to_string();
        socket
            .send(Message::Text(ack.into()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut socket) = self.socket.lock().await.take() else {
            return Ok(());
        };
        socket.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_frame, Frame};

    #[test]
    fn hello_frames_are_skipped() {
        assert!(matches!(classify_frame(r#"{"type":"hello","num_connections":1}"#), Frame::Skip));
        assert!(matches!(classify_frame("not json"), Frame::Skip));
    }

    #[test]
    fn disconnect_frames_request_reconnect() {
        let frame = classify_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#);
        assert!(matches!(frame, Frame::Reconnect(reason) if reason == "refresh_requested"));
    }

    #[test]
    fn event_frames_become_envelopes() {
        let frame = classify_frame(
            r#"{"envelope_id":"e1","type":"events_api","payload":{"event":{"type":"message","channel":"C1","user":"U1","text":"bits","ts":"1.0"}}}"#,
        );
        assert!(matches!(frame, Frame::Envelope(envelope) if envelope.envelope_id == "e1"));
    }
}
