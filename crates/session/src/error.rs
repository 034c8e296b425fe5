//! Fehlertypen fuer die Sitzungsschicht

use bingo_core::UserId;
use thiserror::Error;

use crate::media::MediaError;

/// Fehlertyp fuer Control Channel, Signaling und Auth
#[derive(Debug, Error)]
pub enum SessionError {
    /// IO-Fehler (TCP, Datei)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-Fehler (Verbindungsaufbau, Frame-Fehler, WebSocket)
    #[error("Transport-Fehler: {0}")]
    Transport(String),

    /// Aktion erfordert eine bestehende Verbindung
    #[error("Nicht verbunden")]
    NichtVerbunden,

    /// JSON-(De)Serialisierung
    #[error("Serialisierungsfehler: {0}")]
    Serialisierung(#[from] serde_json::Error),

    /// Fehler aus dem Media-Backend
    #[error("Media-Fehler: {0}")]
    Medien(#[from] MediaError),

    /// Verhandlung mit einem Peer gescheitert
    #[error("Verhandlung mit {peer} gescheitert: {grund}")]
    Negotiation { peer: UserId, grund: String },

    /// Keine Sitzung fuer diesen Peer
    #[error("Unbekannter Peer: {0}")]
    PeerUnbekannt(UserId),

    /// Es existiert bereits eine Sitzung fuer diesen Peer
    #[error("Peer-Sitzung existiert bereits: {0}")]
    PeerExistiert(UserId),

    /// Zustandsuebergang nicht erlaubt
    #[error("Ungueltiger Zustand: {0}")]
    UngueltigerZustand(String),

    /// Privilegierte Aktion ohne gueltigen Token
    #[error("Nicht autorisiert")]
    NichtAutorisiert,

    /// Sitzung wurde beendet
    #[error("Sitzung beendet")]
    Beendet,
}

impl SessionError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn zustand(msg: impl Into<String>) -> Self {
        Self::UngueltigerZustand(msg.into())
    }

    pub fn negotiation(peer: &UserId, grund: impl Into<String>) -> Self {
        Self::Negotiation {
            peer: peer.clone(),
            grund: grund.into(),
        }
    }
}

impl From<bingo_protocol::WireError> for SessionError {
    fn from(e: bingo_protocol::WireError) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Result-Typ fuer die Sitzungsschicht
pub type SessionResult<T> = Result<T, SessionError>;
