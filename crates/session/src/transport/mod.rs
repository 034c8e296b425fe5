//! Transporte fuer den Control Channel
//!
//! Der Channel kennt nur die beiden Traits: ein `Connector` baut pro
//! Verbindungsversuch einen frischen `Transport` auf. Jeder Transport
//! liefert bereits dekodierte Envelopes; unbrauchbare Frames kommen als
//! `Decoded::Malformed` und beenden die Verbindung nicht.

use async_trait::async_trait;
use bingo_protocol::{Decoded, Envelope};

use crate::error::SessionResult;

pub mod memory;
pub mod tcp;
pub mod websocket;

pub use memory::{memory_relay, MemoryConnector, MemoryRelay, RelayPeer};
pub use tcp::TcpConnector;
pub use websocket::WebSocketConnector;

/// Baut Verbindungen zum Relay auf
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> SessionResult<Box<dyn Transport>>;

    /// Ziel fuer Log-Ausgaben
    fn ziel(&self) -> String;
}

/// Eine offene Verbindung zum Relay
///
/// `recv` muss abbruchsicher sein: der Channel bricht es ab, sobald ein
/// Befehl zum Senden eintrifft.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, envelope: Envelope) -> SessionResult<()>;

    /// `None` wenn die Gegenstelle die Verbindung geschlossen hat
    async fn recv(&mut self) -> Option<SessionResult<Decoded>>;

    async fn close(&mut self);
}
