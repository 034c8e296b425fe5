//! Cache fuer den kurzlebigen Admin-Token
//!
//! Der Token wird mit Ablaufzeit im Speicher gehalten und optional als
//! JSON-Datei (`{"token": ..., "expiresAt": ...}`) abgelegt, damit ein
//! neu gestarteter Client den Passwort-Dialog ueberspringen kann.
//! Abgelaufene Eintraege werden beim Laden verworfen.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard-Lebensdauer eines Tokens: 1 Stunde
pub const TOKEN_TTL_SEKUNDEN: u64 = 60 * 60;

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Eintrag {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Eintrag {
    fn ist_gueltig(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

pub struct TokenCache {
    eintrag: Option<Eintrag>,
    ttl: chrono::Duration,
    datei: Option<PathBuf>,
}

impl TokenCache {
    /// Nur im Speicher
    pub fn neu(ttl: Duration) -> Self {
        Self {
            eintrag: None,
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(TOKEN_TTL_SEKUNDEN as i64)),
            datei: None,
        }
    }

    /// Mit Datei; ein gueltiger Token aus der Datei wird uebernommen
    pub fn mit_datei(ttl: Duration, datei: impl Into<PathBuf>) -> Self {
        let mut cache = Self::neu(ttl);
        let datei = datei.into();
        cache.eintrag = laden(&datei);
        cache.datei = Some(datei);
        if cache.eintrag.is_none() {
            cache.datei_entfernen();
        }
        cache
    }

    /// Speichert einen neuen Token mit `jetzt + ttl` als Ablaufzeit
    pub fn speichern(&mut self, token: String) {
        let eintrag = Eintrag {
            token,
            expires_at: Utc::now() + self.ttl,
        };
        if let Some(datei) = &self.datei {
            schreiben(datei, &eintrag);
        }
        self.eintrag = Some(eintrag);
    }

    /// Token, falls vorhanden und nicht abgelaufen
    pub fn gueltiger_token(&self) -> Option<&str> {
        self.eintrag
            .as_ref()
            .filter(|e| e.ist_gueltig())
            .map(|e| e.token.as_str())
    }

    pub fn ist_gueltig(&self) -> bool {
        self.gueltiger_token().is_some()
    }

    pub fn laeuft_ab_am(&self) -> Option<DateTime<Utc>> {
        self.eintrag.as_ref().map(|e| e.expires_at)
    }

    pub fn leeren(&mut self) {
        self.eintrag = None;
        self.datei_entfernen();
    }

    fn datei_entfernen(&self) {
        let Some(datei) = &self.datei else {
            return;
        };
        match std::fs::remove_file(datei) {
            Ok(()) => tracing::debug!(pfad = %datei.display(), "Token-Datei entfernt"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(pfad = %datei.display(), fehler = %e, "Token-Datei konnte nicht entfernt werden"),
        }
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("gueltig", &self.ist_gueltig())
            .field("laeuft_ab_am", &self.laeuft_ab_am())
            .field("datei", &self.datei)
            .finish()
    }
}

fn laden(pfad: &Path) -> Option<Eintrag> {
    let inhalt = match std::fs::read_to_string(pfad) {
        Ok(inhalt) => inhalt,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(pfad = %pfad.display(), fehler = %e, "Token-Datei nicht lesbar");
            return None;
        }
    };
    match serde_json::from_str::<Eintrag>(&inhalt) {
        Ok(eintrag) if eintrag.ist_gueltig() => {
            tracing::info!(laeuft_ab_am = %eintrag.expires_at, "Gespeicherter Admin-Token geladen");
            Some(eintrag)
        }
        Ok(_) => {
            tracing::info!("Gespeicherter Admin-Token abgelaufen");
            None
        }
        Err(e) => {
            tracing::warn!(pfad = %pfad.display(), fehler = %e, "Token-Datei ungueltig");
            None
        }
    }
}

fn schreiben(pfad: &Path, eintrag: &Eintrag) {
    let json = match serde_json::to_string(eintrag) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(fehler = %e, "Token konnte nicht serialisiert werden");
            return;
        }
    };
    if let Err(e) = std::fs::write(pfad, json) {
        tracing::warn!(pfad = %pfad.display(), fehler = %e, "Token-Datei konnte nicht geschrieben werden");
    }
}
