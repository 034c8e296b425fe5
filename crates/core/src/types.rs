//! Gemeinsame Identifikations- und Zustandstypen
//!
//! IDs verwenden das Newtype-Pattern. Anders als serverseitige IDs sind
//! Benutzer-IDs hier opake Strings, weil das Relay sie unveraendert
//! zwischen Teilnehmern weiterreicht.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opake Benutzer-ID eines Teilnehmers (lokal oder remote)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Erzeugt eine neue zufaellige lokale ID (`user_<hex>`)
    pub fn generieren() -> Self {
        let roh = Uuid::new_v4().simple().to_string();
        Self(format!("user_{}", &roh[..12]))
    }

    /// Gibt die ID als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lokale Identitaet, einmal pro Prozess erzeugt und danach unveraenderlich
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    local_id: UserId,
    display_name: String,
}

impl Identity {
    /// Erstellt eine Identitaet mit frisch generierter ID.
    /// Leere Anzeigenamen werden durch `Player-<suffix>` ersetzt.
    pub fn neu(display_name: impl Into<String>) -> Self {
        let local_id = UserId::generieren();
        let mut display_name = display_name.into().trim().to_string();
        if display_name.is_empty() {
            let suffix = &local_id.as_str()[local_id.as_str().len() - 4..];
            display_name = format!("Player-{suffix}");
        }
        Self {
            local_id,
            display_name,
        }
    }

    /// Erstellt eine Identitaet mit vorgegebener ID (Tests, Wiederaufnahme)
    pub fn mit_id(local_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            local_id,
            display_name: display_name.into(),
        }
    }

    pub fn local_id(&self) -> &UserId {
        &self.local_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Zustand des Control Channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Aktuelle Wall-Clock-Zeit in Millisekunden seit Unix-Epoche
pub fn jetzt_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
