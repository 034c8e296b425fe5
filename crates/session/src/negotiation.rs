//! Media Negotiation Engine
//!
//! Jede Peer-Sitzung laeuft in einem eigenen Task, der die `PeerSession`
//! exklusiv besitzt. Befehle fuer denselben Peer werden dadurch strikt in
//! Ankunftsreihenfolge verarbeitet, verschiedene Peers blockieren sich nie
//! gegenseitig.
//!
//! Abbau erfolgt ueber ein `CancellationToken`: der gerade laufende Schritt
//! (Medienanforderung, Offer, Answer, ...) wird verworfen, danach werden
//! lokale Medien freigegeben und die Peer-Verbindung geschlossen. Ein
//! abgebrochener Schritt kann die Sitzung nicht wiederbeleben.

use std::sync::Arc;
use std::time::Duration;

use bingo_core::UserId;
use bingo_protocol::{
    IceCandidate, IceCandidateRelay, Message, RtcAnswer, RtcOffer, SessionDescription,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelHandle;
use crate::error::{SessionError, SessionResult};
use crate::media::{
    MediaBackend, MediaConstraints, MediaError, PeerConnectionState, PeerTransport, RemoteMedia,
    TransportEvent,
};
use crate::peer::{CandidateDisposition, NegotiationState, PeerSession, Role};

/// Obergrenze fuer das Aufraeumen eines Peers beim Herunterfahren
const AUFRAEUM_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Nachrichten zwischen Orchestrator und Peer-Task
// ---------------------------------------------------------------------------

/// Signaling-Nachrichten des Remote-Peers
#[derive(Debug, Clone)]
pub enum PeerCommand {
    RemoteAnswer(SessionDescription),
    RemoteCandidate(IceCandidate),
}

/// Meldungen eines Peer-Tasks an den Orchestrator
///
/// `generation` identifiziert die Sitzung; Meldungen einer bereits
/// ersetzten oder entfernten Sitzung werden verworfen.
#[derive(Debug, Clone)]
pub enum EngineNotice {
    Established {
        peer: UserId,
        generation: u64,
    },
    RemoteStream {
        peer: UserId,
        generation: u64,
        media: RemoteMedia,
    },
    MediaWarning {
        peer: UserId,
        generation: u64,
        fehler: MediaError,
    },
    Closed {
        peer: UserId,
        generation: u64,
        grund: String,
    },
}

/// Gemeinsame Abhaengigkeiten aller Peer-Tasks
pub struct NegotiationContext {
    pub local_id: UserId,
    pub channel: ChannelHandle,
    pub media: Arc<dyn MediaBackend>,
    pub constraints: MediaConstraints,
    pub notices: mpsc::UnboundedSender<EngineNotice>,
}

// ---------------------------------------------------------------------------
// PeerHandle
// ---------------------------------------------------------------------------

/// Zugriff des Orchestrators auf einen laufenden Peer-Task
pub struct PeerHandle {
    peer_id: UserId,
    role: Role,
    generation: u64,
    gestartet: Instant,
    befehle: mpsc::UnboundedSender<PeerCommand>,
    zustand: watch::Receiver<NegotiationState>,
    abbruch: CancellationToken,
    task: JoinHandle<()>,
}

impl PeerHandle {
    pub fn peer_id(&self) -> &UserId {
        &self.peer_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> NegotiationState {
        *self.zustand.borrow()
    }

    /// Zeit seit Start der Verhandlung
    pub fn dauer(&self) -> Duration {
        self.gestartet.elapsed()
    }

    /// `false` wenn der Task bereits beendet ist
    pub fn befehl(&self, befehl: PeerCommand) -> bool {
        self.befehle.send(befehl).is_ok()
    }

    /// Bricht die Sitzung ab. Idempotent.
    pub fn abbrechen(&self) {
        self.abbruch.cancel();
    }

    /// Bricht ab und wartet, bis Medien und Verbindung freigegeben sind
    pub async fn abbauen(self) {
        self.abbruch.cancel();
        if tokio::time::timeout(AUFRAEUM_TIMEOUT, self.task).await.is_err() {
            tracing::warn!(peer = %self.peer_id, "Peer-Task hat nicht rechtzeitig aufgeraeumt");
        }
    }
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

enum Start {
    Anrufen,
    Angebot(SessionDescription),
}

/// Startet eine ausgehende Verhandlung (Caller)
pub fn initiate(ctx: Arc<NegotiationContext>, peer: UserId, generation: u64) -> PeerHandle {
    spawn_peer(ctx, PeerSession::caller(peer), generation, Start::Anrufen)
}

/// Beantwortet ein eingehendes Angebot (Callee)
pub fn accept_offer(
    ctx: Arc<NegotiationContext>,
    peer: UserId,
    generation: u64,
    offer: SessionDescription,
) -> PeerHandle {
    spawn_peer(ctx, PeerSession::callee(peer), generation, Start::Angebot(offer))
}

fn spawn_peer(
    ctx: Arc<NegotiationContext>,
    session: PeerSession,
    generation: u64,
    start: Start,
) -> PeerHandle {
    let peer_id = session.peer_id().clone();
    let role = session.role();
    let (befehle_tx, befehle_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (zustand_tx, zustand_rx) = watch::channel(session.state());
    let abbruch = CancellationToken::new();

    let worker = PeerWorker {
        ctx,
        session,
        generation,
        transport: None,
        befehle: befehle_rx,
        transport_events: events_rx,
        transport_events_tx: events_tx,
        zustand: zustand_tx,
    };
    let task = tokio::spawn(worker.run(start, abbruch.clone()));

    PeerHandle {
        peer_id,
        role,
        generation,
        gestartet: Instant::now(),
        befehle: befehle_tx,
        zustand: zustand_rx,
        abbruch,
        task,
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

enum Ende {
    Abgebrochen,
    Verlassen,
    Fehler(SessionError),
}

struct PeerWorker {
    ctx: Arc<NegotiationContext>,
    session: PeerSession,
    generation: u64,
    transport: Option<Box<dyn PeerTransport>>,
    befehle: mpsc::UnboundedReceiver<PeerCommand>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    transport_events_tx: mpsc::UnboundedSender<TransportEvent>,
    zustand: watch::Sender<NegotiationState>,
}

impl PeerWorker {
    async fn run(mut self, start: Start, abbruch: CancellationToken) {
        let ende = tokio::select! {
            biased;
            _ = abbruch.cancelled() => Ende::Abgebrochen,
            ergebnis = self.ablauf(start) => match ergebnis {
                Ok(()) => Ende::Verlassen,
                Err(e) => Ende::Fehler(e),
            },
        };

        let grund = match ende {
            Ende::Abgebrochen => {
                tracing::debug!(peer = %self.session.peer_id(), "Peer-Sitzung abgebrochen");
                None
            }
            Ende::Verlassen => Some("Sitzung verlassen".to_string()),
            Ende::Fehler(e) => {
                tracing::warn!(
                    peer = %self.session.peer_id(),
                    zustand = %self.session.state(),
                    fehler = %e,
                    "Peer-Sitzung wegen Fehler geschlossen"
                );
                Some(e.to_string())
            }
        };

        self.aufraeumen().await;

        if let Some(grund) = grund {
            let _ = self.ctx.notices.send(EngineNotice::Closed {
                peer: self.session.peer_id().clone(),
                generation: self.generation,
                grund,
            });
        }
    }

    async fn ablauf(&mut self, start: Start) -> SessionResult<()> {
        match start {
            Start::Anrufen => self.angebot_senden().await?,
            Start::Angebot(offer) => self.angebot_beantworten(offer).await?,
        }

        loop {
            tokio::select! {
                befehl = self.befehle.recv() => match befehl {
                    Some(befehl) => self.befehl(befehl).await?,
                    None => return Ok(()),
                },
                Some(event) = self.transport_events.recv() => self.transport_event(event).await?,
            }
        }
    }

    /// Caller: Verbindung, Medien, Offer
    async fn angebot_senden(&mut self) -> SessionResult<()> {
        self.verbindung_herstellen().await?;
        self.lokale_medien().await;

        let transport = self.transport()?;
        let offer = transport.create_offer().await.map_err(|e| self.fehler("Offer erstellen", e))?;
        let transport = self.transport()?;
        transport
            .set_local_description(offer.clone())
            .await
            .map_err(|e| self.fehler("Lokale Description setzen", e))?;

        self.uebergang(NegotiationState::OfferSent)?;
        self.ctx.channel.send(Message::RtcOffer(RtcOffer {
            target_user_id: self.session.peer_id().clone(),
            from_user_id: self.ctx.local_id.clone(),
            offer,
        }))?;
        tracing::info!(peer = %self.session.peer_id(), "Offer gesendet");
        Ok(())
    }

    /// Callee: Remote-Description, Medien, Answer
    async fn angebot_beantworten(&mut self, offer: SessionDescription) -> SessionResult<()> {
        self.verbindung_herstellen().await?;

        let transport = self.transport()?;
        transport
            .set_remote_description(offer)
            .await
            .map_err(|e| self.fehler("Remote-Offer anwenden", e))?;
        self.remote_description_angewendet().await;

        self.lokale_medien().await;

        let transport = self.transport()?;
        let answer = transport
            .create_answer()
            .await
            .map_err(|e| self.fehler("Answer erstellen", e))?;
        let transport = self.transport()?;
        transport
            .set_local_description(answer.clone())
            .await
            .map_err(|e| self.fehler("Lokale Description setzen", e))?;

        self.uebergang(NegotiationState::AnswerExchanged)?;
        self.ctx.channel.send(Message::RtcAnswer(RtcAnswer {
            target_user_id: self.session.peer_id().clone(),
            from_user_id: self.ctx.local_id.clone(),
            answer,
        }))?;
        tracing::info!(peer = %self.session.peer_id(), "Answer gesendet");
        Ok(())
    }

    async fn befehl(&mut self, befehl: PeerCommand) -> SessionResult<()> {
        match befehl {
            PeerCommand::RemoteAnswer(answer) => {
                if self.session.state() != NegotiationState::OfferSent {
                    tracing::warn!(
                        peer = %self.session.peer_id(),
                        zustand = %self.session.state(),
                        "Answer ausserhalb von OfferSent ignoriert"
                    );
                    return Ok(());
                }
                let transport = self.transport()?;
                transport
                    .set_remote_description(answer)
                    .await
                    .map_err(|e| self.fehler("Remote-Answer anwenden", e))?;
                self.remote_description_angewendet().await;
                self.uebergang(NegotiationState::AnswerExchanged)?;
            }
            PeerCommand::RemoteCandidate(candidate) => match self.session.accept_candidate(candidate) {
                CandidateDisposition::ApplyNow(candidate) => self.kandidat_anwenden(candidate).await,
                CandidateDisposition::Buffered => tracing::debug!(
                    peer = %self.session.peer_id(),
                    gepuffert = self.session.pending_candidates(),
                    "ICE-Kandidat vor Remote-Description gepuffert"
                ),
                CandidateDisposition::Discarded => {}
            },
        }
        Ok(())
    }

    async fn transport_event(&mut self, event: TransportEvent) -> SessionResult<()> {
        let peer = self.session.peer_id().clone();
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                self.ctx.channel.send(Message::IceCandidate(IceCandidateRelay {
                    target_user_id: peer,
                    from_user_id: self.ctx.local_id.clone(),
                    candidate,
                }))?;
            }
            TransportEvent::ConnectionState(PeerConnectionState::Connected) => {
                if self.session.state() == NegotiationState::AnswerExchanged {
                    self.uebergang(NegotiationState::Established)?;
                    tracing::info!(peer = %peer, "Peer-Verbindung hergestellt");
                    self.melden(EngineNotice::Established {
                        peer,
                        generation: self.generation,
                    });
                }
            }
            TransportEvent::ConnectionState(PeerConnectionState::Failed) => {
                return Err(SessionError::negotiation(&peer, "ICE-Verbindung fehlgeschlagen"));
            }
            TransportEvent::ConnectionState(PeerConnectionState::Closed) => {
                return Err(SessionError::negotiation(&peer, "Peer-Verbindung geschlossen"));
            }
            TransportEvent::ConnectionState(PeerConnectionState::Disconnected) => {
                tracing::info!(peer = %peer, "Peer-Verbindung unterbrochen");
            }
            TransportEvent::ConnectionState(zustand) => {
                tracing::debug!(peer = %peer, ?zustand, "Peer-Verbindungszustand");
            }
            TransportEvent::RemoteMedia(media) => {
                tracing::info!(peer = %peer, stream = %media.id, "Remote-Stream verfuegbar");
                self.melden(EngineNotice::RemoteStream {
                    peer,
                    generation: self.generation,
                    media,
                });
            }
        }
        Ok(())
    }

    async fn verbindung_herstellen(&mut self) -> SessionResult<()> {
        let transport = self
            .ctx
            .media
            .create_connection(self.session.peer_id(), self.transport_events_tx.clone())
            .await
            .map_err(|e| self.fehler("Peer-Verbindung erstellen", e))?;
        self.transport = Some(transport);
        Ok(())
    }

    /// Fehler beim Erfassen fuehren nur zu einer einseitigen Sitzung
    async fn lokale_medien(&mut self) {
        let peer = self.session.peer_id().clone();
        let media = match self.ctx.media.acquire_local_media(&self.ctx.constraints).await {
            Ok(media) => media,
            Err(fehler) => {
                tracing::warn!(peer = %peer, fehler = %fehler, "Keine lokalen Medien, Sitzung nur empfangend");
                self.melden(EngineNotice::MediaWarning {
                    peer,
                    generation: self.generation,
                    fehler,
                });
                return;
            }
        };

        let hinzufuegen = match self.transport.as_mut() {
            Some(transport) => transport.add_local_media(&media).await,
            None => Ok(()),
        };
        if let Err(fehler) = hinzufuegen {
            tracing::warn!(peer = %peer, fehler = %fehler, "Lokale Medien konnten nicht angehaengt werden");
            self.melden(EngineNotice::MediaWarning {
                peer,
                generation: self.generation,
                fehler,
            });
        }
        self.session.set_local_media(media);
    }

    async fn remote_description_angewendet(&mut self) {
        let gepuffert = self.session.mark_remote_description_applied();
        if !gepuffert.is_empty() {
            tracing::debug!(
                peer = %self.session.peer_id(),
                anzahl = gepuffert.len(),
                "Gepufferte ICE-Kandidaten werden angewendet"
            );
        }
        for candidate in gepuffert {
            self.kandidat_anwenden(candidate).await;
        }
    }

    async fn kandidat_anwenden(&mut self, candidate: IceCandidate) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if let Err(e) = transport.add_ice_candidate(candidate).await {
            tracing::warn!(peer = %self.session.peer_id(), fehler = %e, "ICE-Kandidat nicht anwendbar");
        }
    }

    async fn aufraeumen(&mut self) {
        if let Some(media) = self.session.close() {
            self.ctx.media.release_local_media(media).await;
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.zustand.send_replace(NegotiationState::Closed);
    }

    fn uebergang(&mut self, ziel: NegotiationState) -> SessionResult<()> {
        let vorher = self.session.transition(ziel)?;
        self.zustand.send_replace(ziel);
        tracing::debug!(peer = %self.session.peer_id(), von = %vorher, nach = %ziel, "Verhandlungszustand");
        Ok(())
    }

    fn transport(&mut self) -> SessionResult<&mut Box<dyn PeerTransport>> {
        let peer = self.session.peer_id();
        self.transport
            .as_mut()
            .ok_or_else(|| SessionError::negotiation(peer, "Keine Peer-Verbindung"))
    }

    fn fehler(&self, schritt: &str, e: MediaError) -> SessionError {
        SessionError::negotiation(self.session.peer_id(), format!("{schritt}: {e}"))
    }

    fn melden(&self, notice: EngineNotice) {
        let _ = self.ctx.notices.send(notice);
    }
}
