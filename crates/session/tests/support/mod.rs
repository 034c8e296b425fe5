//! Gemeinsame Hilfen fuer die Integration-Tests: skriptbares Media-Backend,
//! protokollierender Observer und Relay-Helfer.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bingo_core::{ConnectionState, Identity, UserId};
use bingo_protocol::{
    Envelope, IceCandidate, RosterEntry, SdpKind, SessionDescription, UserJoin, Winner,
};
use bingo_session::transport::{memory_relay, MemoryRelay, RelayPeer};
use bingo_session::{
    AuthConfig, AuthState, ChannelConfig, LocalMedia, MediaBackend, MediaConstraints, MediaError,
    PeerTransport, ReconnectConfig, RemoteMedia, SessionConfig, SessionManager, SessionObserver,
    SessionParts, TrackKind, TransportEvent,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};

/// Obergrenze fuer jedes Warten in den Tests
pub const WARTEZEIT: Duration = Duration::from_secs(2);

/// Remote-SDP, die `set_remote_description` ablehnt
pub const KAPUTTE_SDP: &str = "kaputt";

// ---------------------------------------------------------------------------
// Media-Backend
// ---------------------------------------------------------------------------

/// Aufruf an eine Test-Peer-Verbindung
#[derive(Debug, Clone, PartialEq)]
pub enum Aufruf {
    LokaleMedien(String),
    Offer,
    Answer,
    LokaleDescription(SdpKind),
    RemoteDescription(SdpKind),
    Kandidat(String),
    Geschlossen,
}

#[derive(Default)]
pub struct Skript {
    aufrufe: Mutex<Vec<(UserId, Aufruf)>>,
    events: Mutex<HashMap<UserId, mpsc::UnboundedSender<TransportEvent>>>,
    angefordert: AtomicUsize,
    freigegeben: AtomicUsize,
}

impl Skript {
    pub fn aufrufe(&self, peer: &UserId) -> Vec<Aufruf> {
        self.aufrufe
            .lock()
            .iter()
            .filter(|(id, _)| id == peer)
            .map(|(_, aufruf)| aufruf.clone())
            .collect()
    }

    pub fn kandidaten(&self, peer: &UserId) -> Vec<String> {
        self.aufrufe(peer)
            .into_iter()
            .filter_map(|aufruf| match aufruf {
                Aufruf::Kandidat(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Meldet ein Ereignis der Peer-Verbindung an die Engine
    pub fn melden(&self, peer: &UserId, event: TransportEvent) -> bool {
        match self.events.lock().get(peer) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn verbindungen(&self) -> usize {
        self.events.lock().len()
    }

    pub fn angefordert(&self) -> usize {
        self.angefordert.load(Ordering::SeqCst)
    }

    pub fn freigegeben(&self) -> usize {
        self.freigegeben.load(Ordering::SeqCst)
    }

    fn protokollieren(&self, peer: &UserId, aufruf: Aufruf) {
        self.aufrufe.lock().push((peer.clone(), aufruf));
    }
}

/// Verhalten bei der Medienanforderung
pub enum Erfassung {
    Sofort,
    /// Wartet, bis `sperre` eine Erlaubnis bekommt
    Gesperrt(Arc<Semaphore>),
    Verweigert,
}

pub struct TestMedia {
    pub skript: Arc<Skript>,
    erfassung: Erfassung,
}

impl TestMedia {
    pub fn neu(erfassung: Erfassung) -> Self {
        Self {
            skript: Arc::new(Skript::default()),
            erfassung,
        }
    }
}

#[async_trait]
impl MediaBackend for TestMedia {
    async fn acquire_local_media(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<LocalMedia, MediaError> {
        let nummer = self.skript.angefordert.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.erfassung {
            Erfassung::Sofort => {}
            Erfassung::Gesperrt(sperre) => {
                sperre
                    .acquire()
                    .await
                    .map_err(|_| MediaError::GeraetNichtGefunden)?
                    .forget();
            }
            Erfassung::Verweigert => {
                return Err(MediaError::ZugriffVerweigert("Kamera gesperrt".into()))
            }
        }
        Ok(LocalMedia {
            id: format!("lokal-{nummer}"),
            tracks: vec![TrackKind::Audio, TrackKind::Video],
        })
    }

    async fn release_local_media(&self, _media: LocalMedia) {
        self.skript.freigegeben.fetch_add(1, Ordering::SeqCst);
    }

    async fn create_connection(
        &self,
        peer: &UserId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>, MediaError> {
        self.skript.events.lock().insert(peer.clone(), events);
        Ok(Box::new(TestTransport {
            peer: peer.clone(),
            skript: Arc::clone(&self.skript),
        }))
    }
}

struct TestTransport {
    peer: UserId,
    skript: Arc<Skript>,
}

#[async_trait]
impl PeerTransport for TestTransport {
    async fn add_local_media(&mut self, media: &LocalMedia) -> Result<(), MediaError> {
        self.skript
            .protokollieren(&self.peer, Aufruf::LokaleMedien(media.id.clone()));
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, MediaError> {
        self.skript.protokollieren(&self.peer, Aufruf::Offer);
        Ok(SessionDescription::offer(format!("offer-an-{}", self.peer)))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, MediaError> {
        self.skript.protokollieren(&self.peer, Aufruf::Answer);
        Ok(SessionDescription::answer(format!("answer-an-{}", self.peer)))
    }

    async fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), MediaError> {
        self.skript
            .protokollieren(&self.peer, Aufruf::LokaleDescription(desc.kind));
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), MediaError> {
        self.skript
            .protokollieren(&self.peer, Aufruf::RemoteDescription(desc.kind));
        if desc.sdp == KAPUTTE_SDP {
            return Err(MediaError::Beschreibung("nicht parsebar".into()));
        }
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), MediaError> {
        self.skript
            .protokollieren(&self.peer, Aufruf::Kandidat(candidate.candidate));
        Ok(())
    }

    async fn close(&mut self) {
        self.skript.protokollieren(&self.peer, Aufruf::Geschlossen);
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Beobachtung {
    Verbindung(ConnectionState),
    Erschoepft,
    Roster(Vec<UserId>),
    Beigetreten(UserId),
    Verlassen(UserId),
    Spielstand(serde_json::Value),
    Zahl(u32),
    Gewinner(Winner),
    Durchsage(String),
    Auth(AuthState),
    PeerHergestellt(UserId),
    RemoteStream(UserId, String),
    MedienWarnung(UserId, MediaError),
    PeerGeschlossen(UserId, String),
}

pub struct ProtokollObserver {
    tx: mpsc::UnboundedSender<Beobachtung>,
}

impl ProtokollObserver {
    pub fn neu() -> (Arc<Self>, mpsc::UnboundedReceiver<Beobachtung>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn melden(&self, beobachtung: Beobachtung) {
        let _ = self.tx.send(beobachtung);
    }
}

impl SessionObserver for ProtokollObserver {
    fn on_connection_state(&self, state: ConnectionState) {
        self.melden(Beobachtung::Verbindung(state));
    }

    fn on_channel_exhausted(&self) {
        self.melden(Beobachtung::Erschoepft);
    }

    fn on_roster(&self, users: &[RosterEntry]) {
        self.melden(Beobachtung::Roster(
            users.iter().map(|u| u.id.clone()).collect(),
        ));
    }

    fn on_user_joined(&self, user: &UserJoin) {
        self.melden(Beobachtung::Beigetreten(user.user_id.clone()));
    }

    fn on_user_left(&self, user: &UserId) {
        self.melden(Beobachtung::Verlassen(user.clone()));
    }

    fn on_game_state(&self, state: &serde_json::Value) {
        self.melden(Beobachtung::Spielstand(state.clone()));
    }

    fn on_number_called(&self, number: u32) {
        self.melden(Beobachtung::Zahl(number));
    }

    fn on_winner(&self, winner: &Winner) {
        self.melden(Beobachtung::Gewinner(winner.clone()));
    }

    fn on_broadcast(&self, message: &str) {
        self.melden(Beobachtung::Durchsage(message.to_string()));
    }

    fn on_auth_result(&self, state: &AuthState) {
        self.melden(Beobachtung::Auth(state.clone()));
    }

    fn on_peer_established(&self, peer: &UserId) {
        self.melden(Beobachtung::PeerHergestellt(peer.clone()));
    }

    fn on_remote_stream(&self, peer: &UserId, media: &RemoteMedia) {
        self.melden(Beobachtung::RemoteStream(peer.clone(), media.id.clone()));
    }

    fn on_media_warning(&self, peer: &UserId, fehler: &MediaError) {
        self.melden(Beobachtung::MedienWarnung(peer.clone(), fehler.clone()));
    }

    fn on_peer_closed(&self, peer: &UserId, grund: &str) {
        self.melden(Beobachtung::PeerGeschlossen(peer.clone(), grund.to_string()));
    }
}

/// Wartet auf die erste Beobachtung, die `passt` erfuellt
pub async fn erwarten(
    rx: &mut mpsc::UnboundedReceiver<Beobachtung>,
    passt: impl Fn(&Beobachtung) -> bool,
) -> Beobachtung {
    tokio::time::timeout(WARTEZEIT, async {
        loop {
            match rx.recv().await {
                Some(b) if passt(&b) => return b,
                Some(_) => continue,
                None => panic!("Observer-Kanal geschlossen"),
            }
        }
    })
    .await
    .expect("Beobachtung nicht rechtzeitig eingetroffen")
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Wartet auf das naechste Envelope vom Typ `typ` und ueberspringt andere
pub async fn nachricht(peer: &mut RelayPeer, typ: &str) -> Envelope {
    tokio::time::timeout(WARTEZEIT, async {
        loop {
            let envelope = peer.empfangen().await.expect("Verbindung unerwartet beendet");
            if envelope.kind() == typ {
                return envelope;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Keine Nachricht vom Typ {typ} erhalten"))
}

/// Wartet, bis `bedingung` erfuellt ist
pub async fn warten_bis(bedingung: impl Fn() -> bool) {
    tokio::time::timeout(WARTEZEIT, async {
        while !bedingung() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Bedingung nicht rechtzeitig erfuellt");
}

// ---------------------------------------------------------------------------
// Aufbau
// ---------------------------------------------------------------------------

pub fn test_config() -> SessionConfig {
    SessionConfig {
        channel: ChannelConfig {
            resend_delay_ms: 100,
            connect_timeout_ms: 500,
            reconnect: ReconnectConfig {
                base_delay_ms: 100,
                cap_delay_ms: 1000,
                max_attempts: 3,
            },
        },
        auth: AuthConfig {
            timeout_ms: 1000,
            ..AuthConfig::default()
        },
        media: MediaConstraints::default(),
    }
}

pub struct Aufbau {
    pub manager: SessionManager,
    pub relay: MemoryRelay,
    pub skript: Arc<Skript>,
    pub beobachtungen: mpsc::UnboundedReceiver<Beobachtung>,
}

pub fn aufbauen(name: &str, erfassung: Erfassung) -> Aufbau {
    aufbauen_mit(name, erfassung, test_config())
}

pub fn aufbauen_mit(name: &str, erfassung: Erfassung, config: SessionConfig) -> Aufbau {
    let (connector, relay) = memory_relay();
    let media = TestMedia::neu(erfassung);
    let skript = Arc::clone(&media.skript);
    let (observer, beobachtungen) = ProtokollObserver::neu();
    let manager = SessionManager::starten(
        Identity::mit_id(UserId::from(name), name),
        config,
        SessionParts {
            connector: Arc::new(connector),
            media: Arc::new(media),
            observer,
            metrics: None,
        },
    );
    Aufbau {
        manager,
        relay,
        skript,
        beobachtungen,
    }
}

/// Verbindet und liefert die Relay-Seite nach dem `user_join`
pub async fn verbinden(aufbau: &mut Aufbau) -> RelayPeer {
    aufbau.manager.connect().expect("connect fehlgeschlagen");
    let mut peer = tokio::time::timeout(WARTEZEIT, aufbau.relay.annehmen())
        .await
        .expect("Kein Verbindungsversuch")
        .expect("Connector verworfen");
    nachricht(&mut peer, "user_join").await;
    erwarten(&mut aufbau.beobachtungen, |b| {
        *b == Beobachtung::Verbindung(ConnectionState::Connected)
    })
    .await;
    peer
}
