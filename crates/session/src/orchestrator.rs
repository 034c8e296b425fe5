//! SessionManager – setzt Control Channel, Router, Peer-Tabelle,
//! Negotiation Engine und Auth Session zusammen.
//!
//! Der Manager wird explizit erzeugt und besessen. Intern laeuft ein
//! einzelner Task, der Befehle der UI, Channel-Events, Meldungen der
//! Peer-Tasks und den Auth-Timer nacheinander verarbeitet. Zustand wird
//! nur in diesem Task veraendert.

use std::collections::HashSet;
use std::sync::Arc;

use bingo_core::{ConnectionState, Identity, UserId};
use bingo_observability::SessionMetrics;
use bingo_protocol::{AdminCommandKind, Message, SessionDescription};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::auth::{AuthConfig, AuthSession, AuthState, Credential};
use crate::channel::{spawn_channel, ChannelConfig, ChannelEvent, ChannelHandle};
use crate::error::{SessionError, SessionResult};
use crate::media::{MediaBackend, MediaConstraints};
use crate::negotiation::{self, EngineNotice, NegotiationContext, PeerCommand, PeerHandle};
use crate::observer::SessionObserver;
use crate::peer::{NegotiationState, PeerTable};
use crate::router::{self, GameEvent, PeerSignal, Route};
use crate::transport::Connector;

// ---------------------------------------------------------------------------
// Konfiguration und Kollaborateure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub channel: ChannelConfig,
    pub auth: AuthConfig,
    pub media: MediaConstraints,
}

/// Vom Host bereitgestellte Abhaengigkeiten
pub struct SessionParts {
    pub connector: Arc<dyn Connector>,
    pub media: Arc<dyn MediaBackend>,
    pub observer: Arc<dyn SessionObserver>,
    pub metrics: Option<SessionMetrics>,
}

// ---------------------------------------------------------------------------
// Befehle
// ---------------------------------------------------------------------------

type Antwort<T> = oneshot::Sender<SessionResult<T>>;

enum Befehl {
    Verbinden,
    Senden(Message),
    AdminKommando {
        kind: AdminCommandKind,
        data: Option<serde_json::Value>,
        antwort: Antwort<()>,
    },
    Anrufen {
        peer: UserId,
        antwort: Antwort<()>,
    },
    Auflegen {
        peer: UserId,
        antwort: Antwort<()>,
    },
    AlleAuflegen {
        antwort: Antwort<()>,
    },
    Anmelden {
        credential: Credential,
        antwort: Antwort<()>,
    },
    Abmelden {
        antwort: Antwort<()>,
    },
    AuthZustand {
        antwort: oneshot::Sender<AuthState>,
    },
    Peers {
        antwort: oneshot::Sender<Vec<(UserId, NegotiationState)>>,
    },
    Beenden {
        antwort: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Oeffentliche Schnittstelle fuer die UI-Schicht
pub struct SessionManager {
    identity: Identity,
    befehle: mpsc::UnboundedSender<Befehl>,
    channel: ChannelHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Startet Channel und Orchestrator-Task. Die Verbindung wird erst mit
    /// `connect()` aufgebaut.
    pub fn starten(identity: Identity, config: SessionConfig, parts: SessionParts) -> Self {
        let (channel, channel_events) = spawn_channel(
            parts.connector,
            identity.clone(),
            config.channel.clone(),
            parts.metrics.clone(),
        );
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(NegotiationContext {
            local_id: identity.local_id().clone(),
            channel: channel.clone(),
            media: parts.media,
            constraints: config.media,
            notices: notices_tx,
        });

        let (befehle_tx, befehle_rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator {
            local_id: identity.local_id().clone(),
            channel: channel.clone(),
            channel_events,
            befehle: befehle_rx,
            notices: notices_rx,
            ctx,
            peers: PeerTable::neu(),
            auth: AuthSession::neu(&config.auth),
            observer: parts.observer,
            metrics: parts.metrics,
            naechste_generation: 0,
        };

        tracing::info!(
            user = %identity.local_id(),
            name = %identity.display_name(),
            "SessionManager gestartet"
        );
        let task = tokio::spawn(orchestrator.run());

        Self {
            identity,
            befehle: befehle_tx,
            channel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.channel.subscribe()
    }

    /// Baut die Verbindung auf (auch nach ausgeschoepften Versuchen)
    pub fn connect(&self) -> SessionResult<()> {
        self.befehl(Befehl::Verbinden)
    }

    /// Sendet eine Anwendungsnachricht ueber den Control Channel
    pub fn send(&self, message: Message) -> SessionResult<()> {
        self.befehl(Befehl::Senden(message))
    }

    /// Privilegierte Aktion; erfordert `Authenticated`
    pub async fn admin_command(
        &self,
        kind: AdminCommandKind,
        data: Option<serde_json::Value>,
    ) -> SessionResult<()> {
        self.anfrage(|antwort| Befehl::AdminKommando { kind, data, antwort })
            .await?
    }

    /// Startet einen Anruf zu `peer`
    pub async fn call(&self, peer: UserId) -> SessionResult<()> {
        self.anfrage(|antwort| Befehl::Anrufen { peer, antwort })
            .await?
    }

    pub async fn hang_up(&self, peer: UserId) -> SessionResult<()> {
        self.anfrage(|antwort| Befehl::Auflegen { peer, antwort })
            .await?
    }

    pub async fn hang_up_all(&self) -> SessionResult<()> {
        self.anfrage(|antwort| Befehl::AlleAuflegen { antwort })
            .await?
    }

    /// Startet den Admin-Handshake; das Ergebnis kommt ueber `on_auth_result`
    pub async fn authenticate(&self, credential: Credential) -> SessionResult<()> {
        self.anfrage(|antwort| Befehl::Anmelden { credential, antwort })
            .await?
    }

    pub async fn logout(&self) -> SessionResult<()> {
        self.anfrage(|antwort| Befehl::Abmelden { antwort }).await?
    }

    pub async fn auth_state(&self) -> SessionResult<AuthState> {
        self.anfrage(|antwort| Befehl::AuthZustand { antwort }).await
    }

    /// Momentaufnahme aller Peers, nach ID sortiert
    pub async fn peers(&self) -> SessionResult<Vec<(UserId, NegotiationState)>> {
        self.anfrage(|antwort| Befehl::Peers { antwort }).await
    }

    pub async fn peer_state(&self, peer: &UserId) -> SessionResult<Option<NegotiationState>> {
        let peers = self.peers().await?;
        Ok(peers
            .into_iter()
            .find(|(id, _)| id == peer)
            .map(|(_, state)| state))
    }

    /// Legt alle Peers auf, sendet `user_leave` und beendet den Task.
    /// Weitere Aufrufe sind wirkungslos.
    pub async fn shutdown(&self) -> SessionResult<()> {
        if self.anfrage(|antwort| Befehl::Beenden { antwort }).await.is_err() {
            tracing::debug!("SessionManager bereits beendet");
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(fehler = %e, "Orchestrator-Task abgebrochen");
            }
        }
        Ok(())
    }

    fn befehl(&self, befehl: Befehl) -> SessionResult<()> {
        self.befehle.send(befehl).map_err(|_| SessionError::Beendet)
    }

    async fn anfrage<T>(&self, befehl: impl FnOnce(oneshot::Sender<T>) -> Befehl) -> SessionResult<T> {
        let (tx, rx) = oneshot::channel();
        self.befehl(befehl(tx))?;
        rx.await.map_err(|_| SessionError::Beendet)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator-Task
// ---------------------------------------------------------------------------

struct Orchestrator {
    local_id: UserId,
    channel: ChannelHandle,
    channel_events: mpsc::Receiver<ChannelEvent>,
    befehle: mpsc::UnboundedReceiver<Befehl>,
    notices: mpsc::UnboundedReceiver<EngineNotice>,
    ctx: Arc<NegotiationContext>,
    peers: PeerTable,
    auth: AuthSession,
    observer: Arc<dyn SessionObserver>,
    metrics: Option<SessionMetrics>,
    naechste_generation: u64,
}

async fn auth_frist(frist: Option<Instant>) {
    match frist {
        Some(frist) => tokio::time::sleep_until(frist).await,
        None => std::future::pending().await,
    }
}

impl Orchestrator {
    async fn run(mut self) {
        loop {
            let frist = self.auth.deadline();
            tokio::select! {
                befehl = self.befehle.recv() => match befehl {
                    None => {
                        self.herunterfahren().await;
                        break;
                    }
                    Some(Befehl::Beenden { antwort }) => {
                        self.herunterfahren().await;
                        let _ = antwort.send(());
                        break;
                    }
                    Some(befehl) => self.befehl(befehl),
                },
                Some(event) = self.channel_events.recv() => self.channel_event(event),
                Some(notice) = self.notices.recv() => self.notice(notice),
                _ = auth_frist(frist) => self.auth_timeout(),
            }
        }
        tracing::info!("SessionManager beendet");
    }

    fn befehl(&mut self, befehl: Befehl) {
        match befehl {
            Befehl::Verbinden => {
                if let Err(e) = self.channel.open() {
                    tracing::warn!(fehler = %e, "Verbindungsaufbau nicht moeglich");
                }
            }
            Befehl::Senden(message) => {
                if let Err(e) = self.channel.send(message) {
                    tracing::warn!(fehler = %e, "Nachricht nicht gesendet");
                }
            }
            Befehl::AdminKommando { kind, data, antwort } => {
                let ergebnis = self
                    .auth
                    .command(kind, data)
                    .and_then(|message| self.channel.send(message));
                let _ = antwort.send(ergebnis);
            }
            Befehl::Anrufen { peer, antwort } => {
                let _ = antwort.send(self.anrufen(peer));
            }
            Befehl::Auflegen { peer, antwort } => {
                let ergebnis = if self.abbauen(&peer, "aufgelegt") {
                    Ok(())
                } else {
                    Err(SessionError::PeerUnbekannt(peer))
                };
                let _ = antwort.send(ergebnis);
            }
            Befehl::AlleAuflegen { antwort } => {
                self.alle_abbauen("aufgelegt");
                let _ = antwort.send(Ok(()));
            }
            Befehl::Anmelden { credential, antwort } => {
                let ergebnis = self
                    .auth
                    .begin(credential)
                    .and_then(|message| self.channel.send(message));
                if ergebnis.is_ok() {
                    self.observer.on_auth_result(self.auth.state());
                }
                let _ = antwort.send(ergebnis);
            }
            Befehl::Abmelden { antwort } => {
                self.auth.logout();
                self.observer.on_auth_result(self.auth.state());
                let _ = antwort.send(Ok(()));
            }
            Befehl::AuthZustand { antwort } => {
                let _ = antwort.send(self.auth.state().clone());
            }
            Befehl::Peers { antwort } => {
                let _ = antwort.send(self.peers.snapshot());
            }
            // wird in `run` behandelt
            Befehl::Beenden { antwort } => {
                let _ = antwort.send(());
            }
        }
    }

    fn anrufen(&mut self, peer: UserId) -> SessionResult<()> {
        if peer == self.local_id {
            return Err(SessionError::zustand("Anruf an sich selbst"));
        }
        if self.peers.contains(&peer) {
            return Err(SessionError::PeerExistiert(peer));
        }
        if self.channel.state() != ConnectionState::Connected {
            return Err(SessionError::NichtVerbunden);
        }
        let generation = self.generation();
        tracing::info!(peer = %peer, "Anruf gestartet");
        let handle = negotiation::initiate(Arc::clone(&self.ctx), peer, generation);
        self.aufnehmen(handle)
    }

    fn angebot(&mut self, peer: UserId, offer: SessionDescription) {
        if self.peers.contains(&peer) {
            tracing::warn!(peer = %peer, "Weiteres Offer fuer bestehende Sitzung verworfen");
            return;
        }
        let generation = self.generation();
        tracing::info!(peer = %peer, "Eingehender Anruf");
        let handle = negotiation::accept_offer(Arc::clone(&self.ctx), peer, generation, offer);
        if let Err(e) = self.aufnehmen(handle) {
            tracing::warn!(fehler = %e, "Peer-Sitzung nicht aufgenommen");
        }
    }

    fn aufnehmen(&mut self, handle: PeerHandle) -> SessionResult<()> {
        self.peers.insert(handle)?;
        if let Some(m) = &self.metrics {
            m.peer_sessions_active.set(self.peers.len() as i64);
        }
        Ok(())
    }

    fn generation(&mut self) -> u64 {
        self.naechste_generation += 1;
        self.naechste_generation
    }

    /// Entfernt und bricht einen Peer ab. `false` wenn unbekannt.
    fn abbauen(&mut self, peer: &UserId, grund: &str) -> bool {
        let Some(handle) = self.peers.remove(peer) else {
            return false;
        };
        handle.abbrechen();
        tracing::info!(peer = %peer, rolle = ?handle.role(), grund, "Peer-Sitzung abgebaut");
        self.peer_entfernt(peer, grund);
        true
    }

    fn alle_abbauen(&mut self, grund: &str) -> Vec<PeerHandle> {
        let handles = self.peers.drain();
        for handle in &handles {
            handle.abbrechen();
            tracing::info!(
                peer = %handle.peer_id(),
                rolle = ?handle.role(),
                grund,
                "Peer-Sitzung abgebaut"
            );
            self.peer_entfernt(handle.peer_id(), grund);
        }
        handles
    }

    fn peer_entfernt(&self, peer: &UserId, grund: &str) {
        if let Some(m) = &self.metrics {
            m.peer_sessions_active.set(self.peers.len() as i64);
        }
        self.observer.on_peer_closed(peer, grund);
    }

    // -----------------------------------------------------------------------
    // Channel-Events
    // -----------------------------------------------------------------------

    fn channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::StateChanged(state) => {
                self.observer.on_connection_state(state);
                match state {
                    ConnectionState::Disconnected => {
                        if self.auth.connection_lost() {
                            let state = self.auth.state();
                            tracing::info!(
                                zustand = state.outcome(),
                                "Admin-Zustand mit der Verbindung verloren"
                            );
                            if let (AuthState::Denied { .. }, Some(m)) = (state, &self.metrics) {
                                m.auth_results.with_label_values(&[state.outcome()]).inc();
                            }
                            self.observer.on_auth_result(state);
                        }
                    }
                    ConnectionState::Connected => {
                        if let Some(message) = self.auth.resume() {
                            tracing::info!("Erneute Admin-Anmeldung mit gespeichertem Token");
                            if let Err(e) = self.channel.send(message) {
                                tracing::warn!(fehler = %e, "Erneute Anmeldung nicht gesendet");
                            }
                            self.observer.on_auth_result(self.auth.state());
                        }
                    }
                    ConnectionState::Connecting => {}
                }
            }
            ChannelEvent::Envelope(envelope) => self.envelope(envelope),
            ChannelEvent::Exhausted => {
                self.alle_abbauen("Control Channel endgueltig getrennt");
                self.observer.on_channel_exhausted();
            }
        }
    }

    fn envelope(&mut self, envelope: bingo_protocol::Envelope) {
        match router::route(envelope, &self.local_id) {
            Route::Roster(liste) => {
                let anwesend: HashSet<&UserId> = liste.users.iter().map(|u| &u.id).collect();
                let gegangen: Vec<UserId> = self
                    .peers
                    .ids()
                    .into_iter()
                    .filter(|id| !anwesend.contains(id))
                    .collect();
                for peer in gegangen {
                    self.abbauen(&peer, "Peer nicht mehr im Spiel");
                }
                self.observer.on_roster(&liste.users);
            }
            Route::UserJoined(join) => self.observer.on_user_joined(&join),
            Route::UserLeft(peer) => {
                self.abbauen(&peer, "Peer hat das Spiel verlassen");
                self.observer.on_user_left(&peer);
            }
            Route::Game(GameEvent::State(state)) => self.observer.on_game_state(&state),
            Route::Game(GameEvent::NumberCalled(number)) => self.observer.on_number_called(number),
            Route::Game(GameEvent::Winner(winner)) => self.observer.on_winner(&winner),
            Route::Game(GameEvent::Broadcast(text)) => self.observer.on_broadcast(&text),
            Route::Auth(antwort) => {
                if let Some(state) = self.auth.on_response(antwort) {
                    if let Some(m) = &self.metrics {
                        m.auth_results.with_label_values(&[state.outcome()]).inc();
                    }
                    self.observer.on_auth_result(state);
                }
            }
            Route::Signal { from, signal } => self.signal(from, signal),
            Route::Ignore(_) => {}
        }
    }

    fn signal(&mut self, from: UserId, signal: PeerSignal) {
        let befehl = match signal {
            PeerSignal::Offer(offer) => return self.angebot(from, offer),
            PeerSignal::Answer(answer) => PeerCommand::RemoteAnswer(answer),
            PeerSignal::Candidate(candidate) => PeerCommand::RemoteCandidate(candidate),
        };
        match self.peers.get(&from) {
            Some(handle) => {
                if !handle.befehl(befehl) {
                    tracing::debug!(peer = %from, "Peer-Task bereits beendet");
                }
            }
            None => tracing::debug!(peer = %from, "Signaling fuer unbekannten Peer ignoriert"),
        }
    }

    // -----------------------------------------------------------------------
    // Meldungen der Peer-Tasks
    // -----------------------------------------------------------------------

    fn notice(&mut self, notice: EngineNotice) {
        match notice {
            EngineNotice::Established { peer, generation } => {
                let Some(handle) = self.peers.get(&peer).filter(|h| h.generation() == generation)
                else {
                    return;
                };
                if let Some(m) = &self.metrics {
                    m.peer_negotiation_seconds.observe(handle.dauer().as_secs_f64());
                }
                self.observer.on_peer_established(&peer);
            }
            EngineNotice::RemoteStream { peer, generation, media } => {
                if self.peers.is_current(&peer, generation) {
                    self.observer.on_remote_stream(&peer, &media);
                }
            }
            EngineNotice::MediaWarning { peer, generation, fehler } => {
                if self.peers.is_current(&peer, generation) {
                    self.observer.on_media_warning(&peer, &fehler);
                }
            }
            EngineNotice::Closed { peer, generation, grund } => {
                if self.peers.remove_if_generation(&peer, generation).is_some() {
                    self.peer_entfernt(&peer, &grund);
                }
            }
        }
    }

    fn auth_timeout(&mut self) {
        if let Some(state) = self.auth.on_timeout(Instant::now()) {
            if let Some(m) = &self.metrics {
                m.auth_results.with_label_values(&[state.outcome()]).inc();
            }
            self.observer.on_auth_result(state);
        }
    }

    async fn herunterfahren(&mut self) {
        tracing::info!(peers = self.peers.len(), "SessionManager wird heruntergefahren");
        let handles = self.alle_abbauen("Sitzung beendet");
        futures_util::future::join_all(handles.into_iter().map(PeerHandle::abbauen)).await;

        // Events weiter abnehmen, sonst blockiert der Channel bei voller Queue
        let schliessen = self.channel.close();
        tokio::pin!(schliessen);
        loop {
            tokio::select! {
                ergebnis = &mut schliessen => {
                    if let Err(e) = ergebnis {
                        tracing::debug!(fehler = %e, "Control Channel bereits beendet");
                    }
                    break;
                }
                Some(event) = self.channel_events.recv() => {
                    if let ChannelEvent::StateChanged(state) = event {
                        self.observer.on_connection_state(state);
                    }
                }
            }
        }
    }
}
