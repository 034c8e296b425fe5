//! Reconnect Policy
//!
//! Reine Zustandsmaschine ohne IO: berechnet die Wartezeit vor dem
//! naechsten Verbindungsversuch und entscheidet, wann aufgegeben wird.
//!
//! ```text
//! next_delay(n) = min(base * 2^n, cap)
//! exhausted     = attempt > max_attempts
//! ```

use serde::Deserialize;
use std::time::Duration;

/// Parameter der exponentiellen Backoff-Strategie
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub cap_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            cap_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

/// Wartezeit vor Versuch `attempt` (0-basiert)
pub fn next_delay(config: &ReconnectConfig, attempt: u32) -> Duration {
    let faktor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let ms = config
        .base_delay_ms
        .saturating_mul(faktor)
        .min(config.cap_delay_ms);
    Duration::from_millis(ms)
}

/// Entscheidung nach einem Verbindungsverlust
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Nach `delay` erneut verbinden; `attempt` ist 1-basiert
    Retry { attempt: u32, delay: Duration },
    /// Limit erreicht, bis zum naechsten expliziten `open()` getrennt bleiben
    GiveUp,
}

/// Zaehlt fehlgeschlagene Versuche seit der letzten erfolgreichen Verbindung
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn neu(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        self.attempt > self.config.max_attempts
    }

    /// Nach erfolgreicher Verbindung
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Verbuchung eines Verlusts oder fehlgeschlagenen Versuchs
    pub fn decide(&mut self) -> ReconnectDecision {
        self.attempt = self.attempt.saturating_add(1);
        if self.exhausted() {
            return ReconnectDecision::GiveUp;
        }
        ReconnectDecision::Retry {
            attempt: self.attempt,
            delay: next_delay(&self.config, self.attempt - 1),
        }
    }
}
