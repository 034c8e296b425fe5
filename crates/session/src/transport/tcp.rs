//! TCP-Transport mit Length-Prefix-Frames (u32 BE + JSON)

use async_trait::async_trait;
use bingo_protocol::{wire::DEFAULT_MAX_FRAME_SIZE, Decoded, Envelope, FrameCodec};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use super::{Connector, Transport};
use crate::error::{SessionError, SessionResult};

/// Verbindet per TCP zu `host:port`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    max_frame_size: usize,
}

impl TcpConnector {
    pub fn neu(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn mit_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> SessionResult<Box<dyn Transport>> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        tracing::debug!(ziel = %self.addr, "TCP-Verbindung hergestellt");
        Ok(Box::new(TcpTransport {
            framed: Framed::new(stream, FrameCodec::with_max_size(self.max_frame_size)),
        }))
    }

    fn ziel(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

struct TcpTransport {
    framed: Framed<TcpStream, FrameCodec>,
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, envelope: Envelope) -> SessionResult<()> {
        self.framed.send(envelope).await.map_err(SessionError::from)
    }

    async fn recv(&mut self) -> Option<SessionResult<Decoded>> {
        self.framed
            .next()
            .await
            .map(|frame| frame.map_err(SessionError::from))
    }

    async fn close(&mut self) {
        if let Err(e) = self.framed.close().await {
            tracing::debug!(fehler = %e, "Fehler beim Schliessen der TCP-Verbindung");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bingo_protocol::{Message, NumberCalled};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn sendet_und_empfaengt_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, FrameCodec::new());
            let eingang = framed.next().await.unwrap().unwrap();
            let antwort = Envelope::mit_zeitstempel(
                Message::NumberCalled(NumberCalled { number: 17 }),
                5,
            );
            framed.send(antwort).await.unwrap();
            eingang
        });

        let connector = TcpConnector::neu(addr.to_string());
        assert_eq!(connector.ziel(), format!("tcp://{addr}"));
        let mut transport = connector.connect().await.unwrap();
        transport
            .send(Envelope::mit_zeitstempel(Message::user_leave(&"me".into()), 1))
            .await
            .unwrap();

        let empfangen = transport.recv().await.unwrap().unwrap();
        assert_eq!(
            empfangen,
            Decoded::Envelope(Envelope::mit_zeitstempel(
                Message::NumberCalled(NumberCalled { number: 17 }),
                5
            ))
        );

        let beim_server = server.await.unwrap();
        assert!(matches!(beim_server, Decoded::Envelope(e) if e.kind() == "user_leave"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn verbindung_abgelehnt_ist_fehler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ergebnis = TcpConnector::neu(addr.to_string()).connect().await;
        assert!(ergebnis.is_err());
    }
}
