//! Control Channel
//!
//! Besitzt die eine Verbindung zum Relay und laeuft als eigener Task.
//! Alle Zustandswechsel und eingehenden Envelopes werden als
//! `ChannelEvent` gemeldet, der aktuelle Zustand ist zusaetzlich ueber
//! einen `watch`-Kanal lesbar.
//!
//! ## Zustaende
//! ```text
//! Disconnected --open()--> Connecting --ok--> Connected
//!      ^                       |                  |
//!      |                   Fehler            Verlust
//!      |                       v                  v
//!      +---- GiveUp <---- Reconnect Policy <------+
//!                              |
//!                          Retry(delay) --> Connecting
//! ```
//!
//! ## Senden ohne Verbindung
//! Es wird genau die zuletzt gesendete Nachricht vorgemerkt und nach
//! `resend_delay_ms` ein einziges Mal erneut versucht. Ist der Channel
//! dann nicht verbunden, wird sie verworfen.

use std::sync::Arc;
use std::time::Duration;

use bingo_core::{ConnectionState, Identity};
use bingo_observability::SessionMetrics;
use bingo_protocol::{Decoded, Envelope, Message};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::error::{SessionError, SessionResult};
use crate::reconnect::{ReconnectConfig, ReconnectDecision, ReconnectPolicy};
use crate::transport::{Connector, Transport};

/// Kapazitaet der Event-Queue zum Besitzer des Channels
const EVENT_QUEUE: usize = 256;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Wartezeit vor dem einmaligen Wiederholungsversuch einer Nachricht
    pub resend_delay_ms: u64,
    /// Obergrenze fuer einen einzelnen Verbindungsaufbau
    pub connect_timeout_ms: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            resend_delay_ms: 1000,
            connect_timeout_ms: 10_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Oeffentliche Schnittstelle
// ---------------------------------------------------------------------------

/// Meldungen des Channels an seinen Besitzer
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    StateChanged(ConnectionState),
    Envelope(Envelope),
    /// Reconnect Policy ausgeschoepft, Channel bleibt bis `open()` getrennt
    Exhausted,
}

enum ChannelCommand {
    Open,
    Send(Message),
    Close { fertig: oneshot::Sender<()> },
}

/// Klonbarer Zugriff auf den Channel-Task
#[derive(Clone)]
pub struct ChannelHandle {
    befehle: mpsc::UnboundedSender<ChannelCommand>,
    zustand: watch::Receiver<ConnectionState>,
}

impl ChannelHandle {
    /// Startet den Verbindungsaufbau (auch nach `Exhausted`)
    pub fn open(&self) -> SessionResult<()> {
        self.befehl(ChannelCommand::Open)
    }

    /// Sendet eine Nachricht; der Zeitstempel wird beim Uebertragen gesetzt
    pub fn send(&self, message: Message) -> SessionResult<()> {
        self.befehl(ChannelCommand::Send(message))
    }

    /// Sendet `user_leave` (falls verbunden) und schliesst die Verbindung
    pub async fn close(&self) -> SessionResult<()> {
        let (tx, rx) = oneshot::channel();
        self.befehl(ChannelCommand::Close { fertig: tx })?;
        rx.await.map_err(|_| SessionError::Beendet)
    }

    pub fn state(&self) -> ConnectionState {
        *self.zustand.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.zustand.clone()
    }

    fn befehl(&self, befehl: ChannelCommand) -> SessionResult<()> {
        self.befehle.send(befehl).map_err(|_| SessionError::Beendet)
    }
}

/// Startet den Channel-Task. Er endet, wenn alle Handles verworfen sind.
pub fn spawn_channel(
    connector: Arc<dyn Connector>,
    identity: Identity,
    config: ChannelConfig,
    metrics: Option<SessionMetrics>,
) -> (ChannelHandle, mpsc::Receiver<ChannelEvent>) {
    let (befehle_tx, befehle_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
    let (zustand_tx, zustand_rx) = watch::channel(ConnectionState::Disconnected);

    let worker = ChannelWorker {
        connector,
        identity,
        policy: ReconnectPolicy::neu(config.reconnect.clone()),
        config,
        befehle: befehle_rx,
        events: events_tx,
        zustand: zustand_tx,
        vorgemerkt: None,
        metrics,
    };
    tokio::spawn(worker.run());

    (
        ChannelHandle {
            befehle: befehle_tx,
            zustand: zustand_rx,
        },
        events_rx,
    )
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Vorgemerkt {
    message: Message,
    faellig: Instant,
}

enum Phase {
    Leerlauf,
    Verbinden,
    Warten(Duration),
    Ende,
}

struct ChannelWorker {
    connector: Arc<dyn Connector>,
    identity: Identity,
    config: ChannelConfig,
    policy: ReconnectPolicy,
    befehle: mpsc::UnboundedReceiver<ChannelCommand>,
    events: mpsc::Sender<ChannelEvent>,
    zustand: watch::Sender<ConnectionState>,
    vorgemerkt: Option<Vorgemerkt>,
    metrics: Option<SessionMetrics>,
}

/// Wartet bis die vorgemerkte Nachricht faellig ist, sonst fuer immer
async fn vormerkung_faellig(vorgemerkt: &Option<Vorgemerkt>) {
    match vorgemerkt {
        Some(v) => tokio::time::sleep_until(v.faellig).await,
        None => std::future::pending().await,
    }
}

impl ChannelWorker {
    async fn run(mut self) {
        let mut phase = Phase::Leerlauf;
        loop {
            phase = match phase {
                Phase::Leerlauf => self.leerlauf().await,
                Phase::Verbinden => self.verbinden().await,
                Phase::Warten(verzoegerung) => self.warten(verzoegerung).await,
                Phase::Ende => break,
            };
        }
        tracing::debug!("Control Channel beendet");
    }

    /// Getrennt, wartet auf `open()`
    async fn leerlauf(&mut self) -> Phase {
        loop {
            tokio::select! {
                befehl = self.befehle.recv() => match befehl {
                    None => return Phase::Ende,
                    Some(ChannelCommand::Open) => {
                        self.policy.reset();
                        return Phase::Verbinden;
                    }
                    Some(ChannelCommand::Send(message)) => self.vormerken(message),
                    Some(ChannelCommand::Close { fertig }) => {
                        self.vorgemerkt = None;
                        let _ = fertig.send(());
                    }
                },
                _ = vormerkung_faellig(&self.vorgemerkt) => self.verfallen_lassen(),
            }
        }
    }

    /// Wartezeit der Reconnect Policy
    async fn warten(&mut self, verzoegerung: Duration) -> Phase {
        let schlaf = tokio::time::sleep(verzoegerung);
        tokio::pin!(schlaf);

        loop {
            tokio::select! {
                _ = &mut schlaf => return Phase::Verbinden,
                befehl = self.befehle.recv() => match befehl {
                    None => return Phase::Ende,
                    Some(ChannelCommand::Open) => return Phase::Verbinden,
                    Some(ChannelCommand::Send(message)) => self.vormerken(message),
                    Some(ChannelCommand::Close { fertig }) => {
                        self.vorgemerkt = None;
                        let _ = fertig.send(());
                        return Phase::Leerlauf;
                    }
                },
                _ = vormerkung_faellig(&self.vorgemerkt) => self.verfallen_lassen(),
            }
        }
    }

    async fn verbinden(&mut self) -> Phase {
        self.zustand_setzen(ConnectionState::Connecting).await;
        tracing::info!(
            ziel = %self.connector.ziel(),
            versuch = self.policy.attempt(),
            "Verbinde mit Relay"
        );

        let connector = Arc::clone(&self.connector);
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let aufbau = tokio::time::timeout(timeout, async move { connector.connect().await });
        tokio::pin!(aufbau);

        let ergebnis = loop {
            tokio::select! {
                ergebnis = &mut aufbau => break ergebnis,
                befehl = self.befehle.recv() => match befehl {
                    None => return Phase::Ende,
                    Some(ChannelCommand::Open) => {}
                    Some(ChannelCommand::Send(message)) => self.vormerken(message),
                    Some(ChannelCommand::Close { fertig }) => {
                        self.vorgemerkt = None;
                        self.zustand_setzen(ConnectionState::Disconnected).await;
                        let _ = fertig.send(());
                        return Phase::Leerlauf;
                    }
                },
                _ = vormerkung_faellig(&self.vorgemerkt) => self.verfallen_lassen(),
            }
        };

        match ergebnis {
            Ok(Ok(transport)) => self.verbunden(transport).await,
            Ok(Err(e)) => {
                tracing::warn!(fehler = %e, "Verbindungsaufbau fehlgeschlagen");
                self.verlust().await
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.connect_timeout_ms,
                    "Verbindungsaufbau: Zeitueberschreitung"
                );
                self.verlust().await
            }
        }
    }

    async fn verbunden(&mut self, mut transport: Box<dyn Transport>) -> Phase {
        self.policy.reset();
        self.zustand_setzen(ConnectionState::Connected).await;
        tracing::info!(
            user = %self.identity.local_id(),
            name = %self.identity.display_name(),
            "Mit Relay verbunden"
        );

        let join = Message::user_join(&self.identity);
        if let Err(e) = self.uebertragen(transport.as_mut(), join).await {
            tracing::warn!(fehler = %e, "user_join konnte nicht gesendet werden");
            transport.close().await;
            return self.verlust().await;
        }

        loop {
            tokio::select! {
                eingang = transport.recv() => match eingang {
                    Some(Ok(Decoded::Envelope(envelope))) => {
                        tracing::trace!(typ = envelope.kind(), "Envelope empfangen");
                        if let Some(m) = &self.metrics {
                            m.envelopes_received.with_label_values(&[envelope.kind()]).inc();
                        }
                        self.melden(ChannelEvent::Envelope(envelope)).await;
                    }
                    Some(Ok(Decoded::Malformed { reason })) => {
                        tracing::warn!(grund = %reason, "Unbrauchbares Envelope verworfen");
                        if let Some(m) = &self.metrics {
                            m.envelopes_malformed.inc();
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(fehler = %e, "Lesefehler auf dem Control Channel");
                        transport.close().await;
                        return self.verlust().await;
                    }
                    None => {
                        tracing::info!("Verbindung vom Relay getrennt");
                        return self.verlust().await;
                    }
                },
                befehl = self.befehle.recv() => match befehl {
                    None => {
                        transport.close().await;
                        self.zustand_setzen(ConnectionState::Disconnected).await;
                        return Phase::Ende;
                    }
                    Some(ChannelCommand::Open) => {}
                    Some(ChannelCommand::Send(message)) => {
                        if let Err(e) = self.uebertragen(transport.as_mut(), message).await {
                            tracing::warn!(fehler = %e, "Senden fehlgeschlagen");
                            transport.close().await;
                            return self.verlust().await;
                        }
                    }
                    Some(ChannelCommand::Close { fertig }) => {
                        let leave = Message::user_leave(self.identity.local_id());
                        if let Err(e) = self.uebertragen(transport.as_mut(), leave).await {
                            tracing::debug!(fehler = %e, "user_leave nicht zugestellt");
                        }
                        transport.close().await;
                        self.vorgemerkt = None;
                        self.zustand_setzen(ConnectionState::Disconnected).await;
                        tracing::info!("Control Channel geschlossen");
                        let _ = fertig.send(());
                        return Phase::Leerlauf;
                    }
                },
                _ = vormerkung_faellig(&self.vorgemerkt) => {
                    if let Some(v) = self.vorgemerkt.take() {
                        tracing::debug!(typ = v.message.kind(), "Vorgemerkte Nachricht wird erneut gesendet");
                        if let Err(e) = self.uebertragen(transport.as_mut(), v.message).await {
                            tracing::warn!(fehler = %e, "Wiederholtes Senden fehlgeschlagen");
                            transport.close().await;
                            return self.verlust().await;
                        }
                    }
                }
            }
        }
    }

    /// Verbindung verloren oder Aufbau gescheitert
    async fn verlust(&mut self) -> Phase {
        self.zustand_setzen(ConnectionState::Disconnected).await;

        match self.policy.decide() {
            ReconnectDecision::Retry { attempt, delay } => {
                tracing::info!(
                    versuch = attempt,
                    maximum = self.policy.config().max_attempts,
                    verzoegerung_ms = delay.as_millis() as u64,
                    "Neuer Verbindungsversuch geplant"
                );
                if let Some(m) = &self.metrics {
                    m.reconnect_attempts.inc();
                }
                Phase::Warten(delay)
            }
            ReconnectDecision::GiveUp => {
                tracing::error!(
                    versuche = self.policy.config().max_attempts,
                    "Reconnect-Versuche ausgeschoepft, Control Channel bleibt getrennt"
                );
                if let Some(m) = &self.metrics {
                    m.channel_exhausted.inc();
                }
                self.melden(ChannelEvent::Exhausted).await;
                Phase::Leerlauf
            }
        }
    }

    async fn uebertragen(&self, transport: &mut dyn Transport, message: Message) -> SessionResult<()> {
        let envelope = Envelope::neu(message);
        let typ = envelope.kind();
        transport.send(envelope).await?;
        tracing::trace!(typ, "Envelope gesendet");
        if let Some(m) = &self.metrics {
            m.envelopes_sent.with_label_values(&[typ]).inc();
        }
        Ok(())
    }

    fn vormerken(&mut self, message: Message) {
        let faellig = Instant::now() + Duration::from_millis(self.config.resend_delay_ms);
        tracing::debug!(typ = message.kind(), "Nicht verbunden, Nachricht vorgemerkt");
        if let Some(alt) = self.vorgemerkt.replace(Vorgemerkt { message, faellig }) {
            tracing::debug!(typ = alt.message.kind(), "Aeltere vorgemerkte Nachricht ersetzt");
        }
    }

    fn verfallen_lassen(&mut self) {
        if let Some(v) = self.vorgemerkt.take() {
            tracing::warn!(typ = v.message.kind(), "Nachricht verworfen: weiterhin nicht verbunden");
        }
    }

    async fn zustand_setzen(&self, neu: ConnectionState) {
        let alt = self.zustand.send_replace(neu);
        if alt != neu {
            tracing::debug!(von = %alt, nach = %neu, "Verbindungszustand");
            self.melden(ChannelEvent::StateChanged(neu)).await;
        }
    }

    async fn melden(&self, event: ChannelEvent) {
        // Besitzer bereits beendet: Events verfallen
        let _ = self.events.send(event).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
