//! Prometheus-kompatible Metriken fuer eine Client-Sitzung
//!
//! Registrierte Metriken:
//! - `bingo_envelopes_received_total` – Counter: Empfangene Envelopes (type)
//! - `bingo_envelopes_sent_total` – Counter: Gesendete Envelopes (type)
//! - `bingo_envelopes_malformed_total` – Counter: Verworfene Frames
//! - `bingo_reconnect_attempts_total` – Counter: Wiederverbindungsversuche
//! - `bingo_channel_exhausted_total` – Counter: Aufgegebene Verbindungen
//! - `bingo_peer_sessions_active` – Gauge: Aktive Peer-Sessions
//! - `bingo_peer_negotiation_seconds` – Histogram: Dauer bis Established
//! - `bingo_auth_results_total` – Counter: Auth-Ergebnisse (outcome)
//!
//! Es gibt keinen HTTP-Endpunkt; der Textexport wird vom Host abgefragt.

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Sitzungs-Metriken mit eigener Registry
#[derive(Clone)]
pub struct SessionMetrics {
    pub registry: Arc<Registry>,

    // Control Channel
    pub envelopes_received: IntCounterVec,
    pub envelopes_sent: IntCounterVec,
    pub envelopes_malformed: IntCounter,
    pub reconnect_attempts: IntCounter,
    pub channel_exhausted: IntCounter,

    // Peers
    pub peer_sessions_active: IntGauge,
    pub peer_negotiation_seconds: Histogram,

    // Auth
    pub auth_results: IntCounterVec,
}

impl SessionMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let envelopes_received = IntCounterVec::new(
            Opts::new(
                "bingo_envelopes_received_total",
                "Anzahl empfangener Envelopes nach Typ",
            ),
            &["type"],
        )?;
        registry.register(Box::new(envelopes_received.clone()))?;

        let envelopes_sent = IntCounterVec::new(
            Opts::new(
                "bingo_envelopes_sent_total",
                "Anzahl gesendeter Envelopes nach Typ",
            ),
            &["type"],
        )?;
        registry.register(Box::new(envelopes_sent.clone()))?;

        let envelopes_malformed = IntCounter::with_opts(Opts::new(
            "bingo_envelopes_malformed_total",
            "Anzahl verworfener, nicht dekodierbarer Frames",
        ))?;
        registry.register(Box::new(envelopes_malformed.clone()))?;

        let reconnect_attempts = IntCounter::with_opts(Opts::new(
            "bingo_reconnect_attempts_total",
            "Anzahl geplanter Wiederverbindungsversuche",
        ))?;
        registry.register(Box::new(reconnect_attempts.clone()))?;

        let channel_exhausted = IntCounter::with_opts(Opts::new(
            "bingo_channel_exhausted_total",
            "Anzahl aufgegebener Verbindungen nach Erreichen des Versuchslimits",
        ))?;
        registry.register(Box::new(channel_exhausted.clone()))?;

        let peer_sessions_active = IntGauge::with_opts(Opts::new(
            "bingo_peer_sessions_active",
            "Anzahl aktiver Peer-Sessions",
        ))?;
        registry.register(Box::new(peer_sessions_active.clone()))?;

        let peer_negotiation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "bingo_peer_negotiation_seconds",
                "Dauer vom Start der Verhandlung bis Established in Sekunden",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(peer_negotiation_seconds.clone()))?;

        let auth_results = IntCounterVec::new(
            Opts::new("bingo_auth_results_total", "Auth-Ergebnisse nach Ausgang"),
            &["outcome"],
        )?;
        registry.register(Box::new(auth_results.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            envelopes_received,
            envelopes_sent,
            envelopes_malformed,
            reconnect_attempts,
            channel_exhausted,
            peer_sessions_active,
            peer_negotiation_seconds,
            auth_results,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
