//! WebSocket-Transport (JSON-Text-Frames, natives Format des Relays)

use async_trait::async_trait;
use bingo_protocol::{Decoded, Envelope};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use super::{Connector, Transport};
use crate::error::{SessionError, SessionResult};

/// Verbindet zu einer `ws://` oder `wss://` URL
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn neu(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> SessionResult<Box<dyn Transport>> {
        let (stream, antwort) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SessionError::transport(format!("WebSocket-Handshake: {e}")))?;
        tracing::debug!(url = %self.url, status = %antwort.status(), "WebSocket verbunden");
        Ok(Box::new(WebSocketTransport { stream }))
    }

    fn ziel(&self) -> String {
        self.url.clone()
    }
}

struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, envelope: Envelope) -> SessionResult<()> {
        let text = envelope.to_json()?;
        self.stream
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| SessionError::transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<SessionResult<Decoded>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(Envelope::decode_bytes(text.as_bytes()))),
                Ok(WsMessage::Binary(daten)) => return Some(Ok(Envelope::decode_bytes(&daten))),
                Ok(WsMessage::Close(grund)) => {
                    tracing::debug!(?grund, "WebSocket vom Relay geschlossen");
                    return None;
                }
                // Ping/Pong beantwortet tungstenite selbst
                Ok(_) => continue,
                Err(e) => return Some(Err(SessionError::transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(fehler = %e, "Fehler beim Schliessen des WebSockets");
        }
    }
}
