//! In-Memory-Transport
//!
//! Verbindet den Control Channel mit einem `MemoryRelay` im selben Prozess.
//! Das Relay entscheidet pro Verbindungsversuch, ob es annimmt oder ablehnt,
//! und steuert danach die Gegenstelle ueber einen `RelayPeer`.

use async_trait::async_trait;
use bingo_protocol::{Decoded, Envelope, Message};
use tokio::sync::{mpsc, oneshot};

use super::{Connector, Transport};
use crate::error::{SessionError, SessionResult};

struct Verbindungsanfrage {
    antwort: oneshot::Sender<MemoryTransport>,
}

/// Erzeugt ein verbundenes Paar aus Connector und Relay
pub fn memory_relay() -> (MemoryConnector, MemoryRelay) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryConnector { anfragen: tx },
        MemoryRelay { anfragen: rx },
    )
}

/// Client-Seite: jeder `connect()` wird dem Relay als Anfrage vorgelegt
#[derive(Clone)]
pub struct MemoryConnector {
    anfragen: mpsc::UnboundedSender<Verbindungsanfrage>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> SessionResult<Box<dyn Transport>> {
        let (tx, rx) = oneshot::channel();
        self.anfragen
            .send(Verbindungsanfrage { antwort: tx })
            .map_err(|_| SessionError::transport("Relay nicht erreichbar"))?;
        let transport = rx
            .await
            .map_err(|_| SessionError::transport("Verbindung vom Relay abgelehnt"))?;
        Ok(Box::new(transport))
    }

    fn ziel(&self) -> String {
        "memory://relay".to_string()
    }
}

/// Relay-Seite
pub struct MemoryRelay {
    anfragen: mpsc::UnboundedReceiver<Verbindungsanfrage>,
}

impl MemoryRelay {
    /// Nimmt den naechsten Verbindungsversuch an.
    /// `None` wenn kein Connector mehr existiert.
    pub async fn annehmen(&mut self) -> Option<RelayPeer> {
        loop {
            let anfrage = self.anfragen.recv().await?;
            let (zum_client, client_eingang) = mpsc::unbounded_channel();
            let (client_ausgang, vom_client) = mpsc::unbounded_channel();
            let transport = MemoryTransport {
                ausgang: Some(client_ausgang),
                eingang: client_eingang,
            };
            // Versuch bereits abgebrochen (z.B. Timeout): naechste Anfrage
            if anfrage.antwort.send(transport).is_ok() {
                return Some(RelayPeer {
                    eingang: vom_client,
                    ausgang: zum_client,
                });
            }
        }
    }

    /// Lehnt den naechsten Verbindungsversuch ab
    pub async fn ablehnen(&mut self) -> bool {
        self.anfragen.recv().await.is_some()
    }
}

/// Gegenstelle einer angenommenen Verbindung
pub struct RelayPeer {
    eingang: mpsc::UnboundedReceiver<Envelope>,
    ausgang: mpsc::UnboundedSender<Decoded>,
}

impl RelayPeer {
    /// Naechstes vom Client gesendetes Envelope; `None` nach Verbindungsende
    pub async fn empfangen(&mut self) -> Option<Envelope> {
        self.eingang.recv().await
    }

    pub fn try_empfangen(&mut self) -> Option<Envelope> {
        self.eingang.try_recv().ok()
    }

    /// Sendet eine Nachricht mit aktuellem Zeitstempel an den Client
    pub fn senden(&self, message: Message) -> bool {
        self.ausgang
            .send(Decoded::Envelope(Envelope::neu(message)))
            .is_ok()
    }

    /// Sendet rohen Text, der wie ein empfangener Frame dekodiert wird
    pub fn senden_roh(&self, payload: &str) -> bool {
        self.ausgang
            .send(Envelope::decode_bytes(payload.as_bytes()))
            .is_ok()
    }

    /// Schliesst die Verbindung von Relay-Seite
    pub fn trennen(self) {}
}

struct MemoryTransport {
    ausgang: Option<mpsc::UnboundedSender<Envelope>>,
    eingang: mpsc::UnboundedReceiver<Decoded>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, envelope: Envelope) -> SessionResult<()> {
        let ausgang = self.ausgang.as_ref().ok_or(SessionError::NichtVerbunden)?;
        ausgang
            .send(envelope)
            .map_err(|_| SessionError::transport("Relay hat die Verbindung geschlossen"))
    }

    async fn recv(&mut self) -> Option<SessionResult<Decoded>> {
        self.eingang.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.ausgang = None;
        self.eingang.close();
    }
}
