//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! lauffaehig ist.

use std::sync::Arc;

use bingo_core::{Identity, UserId};
use bingo_observability::logging::{log_filter_gueltig, log_format_gueltig};
use bingo_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use bingo_session::transport::{Connector, TcpConnector, WebSocketConnector};
use bingo_session::{AuthConfig, ChannelConfig, MediaConstraints, ReconnectConfig, SessionConfig};
use serde::Deserialize;

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Verbindung zum Relay
    pub verbindung: VerbindungsEinstellungen,
    /// Lokale Identitaet
    pub identitaet: IdentitaetEinstellungen,
    /// Backoff fuer Verbindungsversuche
    pub reconnect: ReconnectConfig,
    /// Admin-Anmeldung
    pub auth: AuthConfig,
    /// Angeforderte Aufnahmegeraete
    pub medien: MediaConstraints,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Prometheus-Metriken
    pub metriken: MetrikenEinstellungen,
}

/// Art des Transports zum Relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportArt {
    /// JSON-Text-Frames ueber WebSocket
    #[default]
    Websocket,
    /// Laengenpraefixierte JSON-Frames ueber TCP
    Tcp,
}

/// Verbindungs-Einstellungen
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// WebSocket-URL bzw. `host:port` bei TCP
    pub url: String,
    pub transport: TransportArt,
    /// Wartezeit bis zum einmaligen erneuten Senden
    pub resend_delay_ms: u64,
    /// Obergrenze fuer einen einzelnen Verbindungsaufbau
    pub connect_timeout_ms: u64,
    /// Maximale Frame-Groesse beim TCP-Transport
    pub max_frame_bytes: usize,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        let channel = ChannelConfig::default();
        Self {
            url: "ws://127.0.0.1:8080/ws".into(),
            transport: TransportArt::Websocket,
            resend_delay_ms: channel.resend_delay_ms,
            connect_timeout_ms: channel.connect_timeout_ms,
            max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Identitaets-Einstellungen
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentitaetEinstellungen {
    /// Anzeigename (leer = `Player-XXXX`)
    pub name: String,
    /// Feste ID statt einer zufaellig generierten
    pub id: Option<String>,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Filter-Ausdruck, z.B. "info" oder "bingo_session=debug"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Metriken-Einstellungen
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetrikenEinstellungen {
    /// Gibt die Prometheus-Textdarstellung beim Beenden aus
    pub beim_beenden_ausgeben: bool,
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config
                    .validieren()
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !log_filter_gueltig(&self.logging.level) {
            anyhow::bail!("ungueltiger Log-Filter '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!(
                "ungueltiges Log-Format '{}' (erlaubt: text, json)",
                self.logging.format
            );
        }
        if self.verbindung.max_frame_bytes == 0 {
            anyhow::bail!("verbindung.max_frame_bytes muss groesser als 0 sein");
        }
        Ok(())
    }

    /// Konfiguration des SessionManagers
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            channel: ChannelConfig {
                resend_delay_ms: self.verbindung.resend_delay_ms,
                connect_timeout_ms: self.verbindung.connect_timeout_ms,
                reconnect: self.reconnect.clone(),
            },
            auth: self.auth.clone(),
            media: self.medien,
        }
    }

    /// Connector fuer den konfigurierten Transport
    pub fn connector(&self) -> Arc<dyn Connector> {
        match self.verbindung.transport {
            TransportArt::Websocket => Arc::new(WebSocketConnector::neu(&self.verbindung.url)),
            TransportArt::Tcp => Arc::new(
                TcpConnector::neu(&self.verbindung.url)
                    .mit_max_frame_size(self.verbindung.max_frame_bytes),
            ),
        }
    }

    /// Lokale Identitaet; einmal pro Prozess erzeugt
    pub fn identity(&self) -> Identity {
        match &self.identitaet.id {
            Some(id) if !id.trim().is_empty() => {
                let name = match self.identitaet.name.trim() {
                    "" => id.trim(),
                    name => name,
                };
                Identity::mit_id(UserId::from(id.trim()), name)
            }
            _ => Identity::neu(self.identitaet.name.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.verbindung.transport, TransportArt::Websocket);
        assert_eq!(cfg.verbindung.resend_delay_ms, 1000);
        assert_eq!(cfg.reconnect.max_attempts, 5);
        assert_eq!(cfg.auth.timeout_ms, 10_000);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.metriken.beim_beenden_ausgeben);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [verbindung]
            url = "127.0.0.1:9000"
            transport = "tcp"

            [identitaet]
            name = "Alice"

            [reconnect]
            max_attempts = 8

            [auth]
            token_datei = "/tmp/bingo-token.json"
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.verbindung.transport, TransportArt::Tcp);
        assert_eq!(cfg.verbindung.url, "127.0.0.1:9000");
        assert_eq!(cfg.reconnect.max_attempts, 8);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.reconnect.base_delay_ms, 1000);
        assert_eq!(cfg.verbindung.connect_timeout_ms, 10_000);
        assert!(cfg.auth.token_datei.is_some());
        assert!(cfg.medien.audio && cfg.medien.video);
    }

    #[test]
    fn session_config_uebernimmt_werte() {
        let toml = r#"
            [verbindung]
            resend_delay_ms = 250

            [reconnect]
            base_delay_ms = 50
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        let session = cfg.session_config();
        assert_eq!(session.channel.resend_delay_ms, 250);
        assert_eq!(session.channel.reconnect.base_delay_ms, 50);
        assert_eq!(session.auth, AuthConfig::default());
    }

    #[test]
    fn identitaet_aus_config() {
        let mut cfg = ClientConfig::default();
        let zufaellig = cfg.identity();
        assert!(zufaellig.display_name().starts_with("Player-"));

        cfg.identitaet.id = Some("spieler-7".into());
        let fest = cfg.identity();
        assert_eq!(fest.local_id().as_str(), "spieler-7");
        assert_eq!(fest.display_name(), "spieler-7");

        cfg.identitaet.name = "Bob".into();
        assert_eq!(cfg.identity().display_name(), "Bob");
    }

    #[test]
    fn unbekannter_transport_wird_abgelehnt() {
        let toml = r#"
            [verbindung]
            transport = "carrier-pigeon"
        "#;
        assert!(toml::from_str::<ClientConfig>(toml).is_err());
    }

    #[test]
    fn logging_werte_werden_geprueft() {
        let mut cfg = ClientConfig::default();
        assert!(cfg.validieren().is_ok());

        cfg.logging.level = "warn,bingo_session=debug".into();
        assert!(cfg.validieren().is_ok());

        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());

        cfg.logging.format = "json".into();
        cfg.logging.level = "bingo_session=lautstark".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn ungueltige_datei_wird_abgelehnt() {
        let mut datei = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut datei,
            b"[logging]\nformat = \"yaml\"\n\n[verbindung]\nmax_frame_bytes = 4096\n",
        )
        .unwrap();
        let pfad = datei.path().to_string_lossy().to_string();
        let err = ClientConfig::laden(&pfad).unwrap_err();
        assert!(err.to_string().contains("Log-Format"), "{err}");
    }

    #[test]
    fn tcp_frame_groesse_aus_toml() {
        let toml = r#"
            [verbindung]
            transport = "tcp"
            url = "127.0.0.1:9000"
            max_frame_bytes = 4096
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.verbindung.max_frame_bytes, 4096);
        assert_eq!(cfg.connector().ziel(), "tcp://127.0.0.1:9000");
        assert_eq!(
            ClientConfig::default().verbindung.max_frame_bytes,
            DEFAULT_MAX_FRAME_SIZE
        );
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let cfg = ClientConfig::laden("/nicht/vorhanden/bingo.toml").unwrap();
        assert_eq!(cfg.verbindung.url, "ws://127.0.0.1:8080/ws");
    }
}
