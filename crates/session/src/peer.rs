//! Peer-Sitzungen
//!
//! `PeerSession` ist der reine Verhandlungszustand eines Peers,
//! `PeerTable` die Tabelle der laufenden Verhandlungs-Tasks.
//!
//! ## Verhandlungszustand
//! ```text
//! Idle --> OfferSent ------+
//!                          +--> AnswerExchanged --> Established
//! OfferReceived -----------+
//!
//! jeder Zustand --> Closed
//! ```

use std::collections::{HashMap, VecDeque};

use bingo_core::UserId;
use bingo_protocol::IceCandidate;

use crate::error::{SessionError, SessionResult};
use crate::media::LocalMedia;
use crate::negotiation::PeerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Caller,
    Callee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    OfferSent,
    OfferReceived,
    AnswerExchanged,
    Established,
    Closed,
}

impl NegotiationState {
    fn erlaubt(self, ziel: NegotiationState) -> bool {
        use NegotiationState::*;
        matches!(
            (self, ziel),
            (Idle, OfferSent)
                | (OfferSent, AnswerExchanged)
                | (OfferReceived, AnswerExchanged)
                | (AnswerExchanged, Established)
        ) || (ziel == Closed)
    }
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NegotiationState::Idle => "idle",
            NegotiationState::OfferSent => "offer_sent",
            NegotiationState::OfferReceived => "offer_received",
            NegotiationState::AnswerExchanged => "answer_exchanged",
            NegotiationState::Established => "established",
            NegotiationState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Was mit einem eingehenden Kandidaten geschehen soll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Remote-Description gesetzt: sofort anwenden
    ApplyNow(IceCandidate),
    /// In `pending_remote_candidates` eingereiht
    Buffered,
    /// Sitzung bereits geschlossen
    Discarded,
}

/// Verhandlungszustand eines Peers
#[derive(Debug)]
pub struct PeerSession {
    peer_id: UserId,
    role: Role,
    state: NegotiationState,
    pending_remote_candidates: VecDeque<IceCandidate>,
    remote_description_set: bool,
    local_media: Option<LocalMedia>,
}

impl PeerSession {
    fn neu(peer_id: UserId, role: Role, state: NegotiationState) -> Self {
        Self {
            peer_id,
            role,
            state,
            pending_remote_candidates: VecDeque::new(),
            remote_description_set: false,
            local_media: None,
        }
    }

    /// Ausgehender Anruf, beginnt in `Idle`
    pub fn caller(peer_id: UserId) -> Self {
        Self::neu(peer_id, Role::Caller, NegotiationState::Idle)
    }

    /// Eingehendes Angebot, beginnt in `OfferReceived`
    pub fn callee(peer_id: UserId) -> Self {
        Self::neu(peer_id, Role::Callee, NegotiationState::OfferReceived)
    }

    pub fn peer_id(&self) -> &UserId {
        &self.peer_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == NegotiationState::Closed
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_remote_candidates.len()
    }

    /// Gibt den vorherigen Zustand zurueck
    pub fn transition(&mut self, ziel: NegotiationState) -> SessionResult<NegotiationState> {
        if !self.state.erlaubt(ziel) {
            return Err(SessionError::zustand(format!(
                "Peer {}: {} -> {} nicht erlaubt",
                self.peer_id, self.state, ziel
            )));
        }
        let vorher = self.state;
        self.state = ziel;
        Ok(vorher)
    }

    pub fn accept_candidate(&mut self, candidate: IceCandidate) -> CandidateDisposition {
        if self.is_closed() {
            return CandidateDisposition::Discarded;
        }
        if self.remote_description_set {
            return CandidateDisposition::ApplyNow(candidate);
        }
        self.pending_remote_candidates.push_back(candidate);
        CandidateDisposition::Buffered
    }

    /// Markiert die Remote-Description als gesetzt und liefert alle
    /// gepufferten Kandidaten in Ankunftsreihenfolge
    pub fn mark_remote_description_applied(&mut self) -> Vec<IceCandidate> {
        self.remote_description_set = true;
        self.pending_remote_candidates.drain(..).collect()
    }

    pub fn set_local_media(&mut self, media: LocalMedia) {
        self.local_media = Some(media);
    }

    /// Schliesst die Sitzung; liefert die freizugebenden lokalen Medien
    pub fn close(&mut self) -> Option<LocalMedia> {
        self.state = NegotiationState::Closed;
        self.pending_remote_candidates.clear();
        self.local_media.take()
    }
}

// ---------------------------------------------------------------------------
// PeerTable
// ---------------------------------------------------------------------------

/// Hoechstens eine laufende Verhandlung pro Peer
#[derive(Default)]
pub struct PeerTable {
    peers: HashMap<UserId, PeerHandle>,
}

impl PeerTable {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fuegt einen Peer ein; ein bereits bekannter Peer bleibt unveraendert
    pub fn insert(&mut self, handle: PeerHandle) -> SessionResult<()> {
        let peer = handle.peer_id().clone();
        if self.peers.contains_key(&peer) {
            return Err(SessionError::PeerExistiert(peer));
        }
        self.peers.insert(peer, handle);
        Ok(())
    }

    pub fn get(&self, peer: &UserId) -> Option<&PeerHandle> {
        self.peers.get(peer)
    }

    pub fn contains(&self, peer: &UserId) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn remove(&mut self, peer: &UserId) -> Option<PeerHandle> {
        self.peers.remove(peer)
    }

    /// Entfernt den Peer nur, wenn der Eintrag noch zur Generation gehoert
    pub fn remove_if_generation(&mut self, peer: &UserId, generation: u64) -> Option<PeerHandle> {
        if !self.is_current(peer, generation) {
            return None;
        }
        self.peers.remove(peer)
    }

    /// Prueft ob ein Ereignis zum aktuellen Eintrag gehoert
    pub fn is_current(&self, peer: &UserId, generation: u64) -> bool {
        self.peers
            .get(peer)
            .is_some_and(|h| h.generation() == generation)
    }

    pub fn drain(&mut self) -> Vec<PeerHandle> {
        self.peers.drain().map(|(_, h)| h).collect()
    }

    pub fn ids(&self) -> Vec<UserId> {
        self.peers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Sortierte Momentaufnahme aller Peers
    pub fn snapshot(&self) -> Vec<(UserId, NegotiationState)> {
        let mut liste: Vec<_> = self
            .peers
            .iter()
            .map(|(id, h)| (id.clone(), h.state()))
            .collect();
        liste.sort_by(|a, b| a.0.cmp(&b.0));
        liste
    }
}
