//! bingo-cli – Bibliotheks-Root
//!
//! Deklariert die Module des Konsolen-Clients und stellt den
//! Einstiegspunkt fuer Tests bereit.

pub mod config;
pub mod console;
pub mod media;
pub mod observer;

use std::sync::Arc;

use anyhow::{Context, Result};
use bingo_observability::SessionMetrics;
use bingo_session::{Credential, SessionManager, SessionParts};
use config::ClientConfig;
use console::{parse_line, Eingabe, EingabeFehler, HILFE};
use media::SignalisierungsMedien;
use observer::KonsolenObserver;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Haelt den laufenden Client zusammen
pub struct Client {
    pub config: ClientConfig,
}

impl Client {
    /// Erstellt einen neuen Client aus der gegebenen Konfiguration
    pub fn neu(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Verbindet mit dem Relay und verarbeitet Konsolenzeilen bis `/quit`,
    /// Ende der Eingabe oder Ctrl-C.
    pub async fn starten(self) -> Result<()> {
        let identity = self.config.identity();
        let metrics = SessionMetrics::neu().context("Metriken konnten nicht registriert werden")?;

        tracing::info!(
            ziel = %self.config.verbindung.url,
            transport = ?self.config.verbindung.transport,
            user = %identity.local_id(),
            name = %identity.display_name(),
            "Client startet"
        );

        let manager = SessionManager::starten(
            identity,
            self.config.session_config(),
            SessionParts {
                connector: self.config.connector(),
                media: Arc::new(SignalisierungsMedien),
                observer: Arc::new(KonsolenObserver),
                metrics: Some(metrics.clone()),
            },
        );
        manager.connect()?;
        println!("{HILFE}");

        let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                zeile = zeilen.next_line() => match zeile? {
                    Some(zeile) => {
                        if !ausfuehren(&manager, &zeile).await {
                            break;
                        }
                    }
                    None => break,
                },
                ergebnis = tokio::signal::ctrl_c() => {
                    ergebnis?;
                    tracing::info!("Shutdown-Signal empfangen");
                    break;
                }
            }
        }

        manager.shutdown().await?;
        if self.config.metriken.beim_beenden_ausgeben {
            print!("{}", metrics.exportieren()?);
        }
        tracing::info!("Client beendet");
        Ok(())
    }
}

/// Fuehrt eine Konsolenzeile aus. `false` beendet den Client.
async fn ausfuehren(manager: &SessionManager, zeile: &str) -> bool {
    let eingabe = match parse_line(zeile) {
        Ok(eingabe) => eingabe,
        Err(EingabeFehler::Leer) => return true,
        Err(e) => {
            println!("! {e}");
            return true;
        }
    };

    let ergebnis = match eingabe {
        Eingabe::Anrufen(peer) => manager.call(peer).await,
        Eingabe::Auflegen(Some(peer)) => manager.hang_up(peer).await,
        Eingabe::Auflegen(None) => manager.hang_up_all().await,
        Eingabe::Anmelden(passwort) => manager.authenticate(Credential::Password(passwort)).await,
        Eingabe::Token => manager.authenticate(Credential::CachedToken).await,
        Eingabe::Abmelden => manager.logout().await,
        Eingabe::Admin { kind, data } => manager.admin_command(kind, data).await,
        Eingabe::Peers => manager.peers().await.map(|peers| {
            if peers.is_empty() {
                println!("  keine Anrufe");
            }
            for (peer, zustand) in peers {
                println!("  {peer}: {zustand}");
            }
        }),
        Eingabe::Status => manager.auth_state().await.map(|auth| {
            println!(
                "  {} als {} | Verbindung: {} | Admin: {}",
                manager.identity().display_name(),
                manager.identity().local_id(),
                manager.connection_state(),
                auth.outcome()
            );
        }),
        Eingabe::Hilfe => {
            println!("{HILFE}");
            Ok(())
        }
        Eingabe::Beenden => return false,
    };

    if let Err(e) = ergebnis {
        println!("! {e}");
    }
    true
}
