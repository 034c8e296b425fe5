//! Media-Backend ohne Aufnahmegeraete
//!
//! Handelt Session-Descriptions ohne Medien-Sektionen aus. Damit laesst
//! sich der Signaling-Ablauf gegen einen echten Relay pruefen, ohne dass
//! Kamera oder Mikrofon benoetigt werden.

use async_trait::async_trait;
use bingo_core::UserId;
use bingo_protocol::{IceCandidate, SessionDescription};
use bingo_session::{
    LocalMedia, MediaBackend, MediaConstraints, MediaError, PeerTransport, TransportEvent,
};
use tokio::sync::mpsc;

const LEERE_SDP: &str = "v=0\r\no=- 0 0 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n";

#[derive(Debug, Default)]
pub struct SignalisierungsMedien;

#[async_trait]
impl MediaBackend for SignalisierungsMedien {
    async fn acquire_local_media(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<LocalMedia, MediaError> {
        Err(MediaError::GeraetNichtGefunden)
    }

    async fn release_local_media(&self, _media: LocalMedia) {}

    async fn create_connection(
        &self,
        peer: &UserId,
        _events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>, MediaError> {
        tracing::debug!(peer = %peer, "Signalisierungs-Verbindung erstellt");
        Ok(Box::new(SignalisierungsVerbindung {
            peer: peer.clone(),
            kandidaten: 0,
        }))
    }
}

struct SignalisierungsVerbindung {
    peer: UserId,
    kandidaten: usize,
}

#[async_trait]
impl PeerTransport for SignalisierungsVerbindung {
    async fn add_local_media(&mut self, _media: &LocalMedia) -> Result<(), MediaError> {
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, MediaError> {
        Ok(SessionDescription::offer(LEERE_SDP))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, MediaError> {
        Ok(SessionDescription::answer(LEERE_SDP))
    }

    async fn set_local_description(&mut self, _desc: SessionDescription) -> Result<(), MediaError> {
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), MediaError> {
        if !desc.sdp.starts_with("v=0") {
            return Err(MediaError::Beschreibung("SDP ohne Versionszeile".into()));
        }
        tracing::debug!(peer = %self.peer, typ = ?desc.kind, "Remote-Description uebernommen");
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), MediaError> {
        self.kandidaten += 1;
        tracing::debug!(
            peer = %self.peer,
            anzahl = self.kandidaten,
            kandidat = %candidate.candidate,
            "ICE-Kandidat empfangen"
        );
        Ok(())
    }

    async fn close(&mut self) {
        tracing::debug!(peer = %self.peer, kandidaten = self.kandidaten, "Signalisierungs-Verbindung geschlossen");
    }
}
