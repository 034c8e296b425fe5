//! Schnittstelle zum Media-Stack
//!
//! Die Sitzungsschicht erzeugt selbst keine Medien. Aufnahmegeraete,
//! Peer-Verbindungen und ICE liefert ein `MediaBackend` des Hosts; die
//! Negotiation Engine treibt es nur in der richtigen Reihenfolge an.

use async_trait::async_trait;
use bingo_core::UserId;
use bingo_protocol::{IceCandidate, SessionDescription};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Fehler des Media-Backends
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("Zugriff auf Aufnahmegeraet verweigert: {0}")]
    ZugriffVerweigert(String),

    #[error("Kein Aufnahmegeraet gefunden")]
    GeraetNichtGefunden,

    #[error("Session-Description ungueltig: {0}")]
    Beschreibung(String),

    #[error("ICE-Kandidat abgelehnt: {0}")]
    Kandidat(String),

    #[error("Media-Transport-Fehler: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Welche lokalen Spuren angefordert werden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Handle auf erfasste lokale Medien
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMedia {
    pub id: String,
    pub tracks: Vec<TrackKind>,
}

/// Handle auf einen eingehenden Stream eines Peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMedia {
    pub id: String,
    pub tracks: Vec<TrackKind>,
}

/// Zustand der darunterliegenden Peer-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Ereignisse, die eine Peer-Verbindung von sich aus meldet
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    ConnectionState(PeerConnectionState),
    RemoteMedia(RemoteMedia),
}

/// Media-Stack des Hosts
#[async_trait]
pub trait MediaBackend: Send + Sync + 'static {
    /// Fordert Aufnahmegeraete an. Darf beliebig lange dauern.
    async fn acquire_local_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMedia, MediaError>;

    /// Gibt Aufnahmegeraete frei
    async fn release_local_media(&self, media: LocalMedia);

    /// Erstellt eine Peer-Verbindung. Kandidaten, Zustandswechsel und
    /// Remote-Streams meldet sie ueber `events`.
    async fn create_connection(
        &self,
        peer: &UserId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>, MediaError>;
}

/// Eine Peer-Verbindung
///
/// Ohne lokale Medien muss ein Angebot trotzdem Empfangs-Spuren
/// aushandeln, damit die Sitzung empfangsfaehig bleibt.
#[async_trait]
pub trait PeerTransport: Send {
    async fn add_local_media(&mut self, media: &LocalMedia) -> Result<(), MediaError>;

    async fn create_offer(&mut self) -> Result<SessionDescription, MediaError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, MediaError>;

    async fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), MediaError>;

    async fn set_remote_description(&mut self, desc: SessionDescription)
        -> Result<(), MediaError>;

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), MediaError>;

    async fn close(&mut self);
}
