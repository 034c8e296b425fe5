//! Zeilenparser fuer die Konsole
//!
//! Format: `/befehl [argumente]`. Das letzte Argument eines Befehls
//! (Passwort, JSON-Daten) darf Leerzeichen enthalten.

use std::str::FromStr;

use bingo_core::UserId;
use bingo_protocol::AdminCommandKind;
use thiserror::Error;

/// Eine geparste Konsolenzeile
#[derive(Clone, PartialEq)]
pub enum Eingabe {
    Anrufen(UserId),
    /// Ohne Peer: alle Anrufe beenden
    Auflegen(Option<UserId>),
    Anmelden(String),
    /// Anmeldung mit gespeichertem Token
    Token,
    Abmelden,
    Admin {
        kind: AdminCommandKind,
        data: Option<serde_json::Value>,
    },
    Peers,
    Status,
    Hilfe,
    Beenden,
}

// Passwort nicht im Debug-Output
impl std::fmt::Debug for Eingabe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eingabe::Anrufen(peer) => f.debug_tuple("Anrufen").field(peer).finish(),
            Eingabe::Auflegen(peer) => f.debug_tuple("Auflegen").field(peer).finish(),
            Eingabe::Anmelden(_) => f.debug_tuple("Anmelden").field(&"<redacted>").finish(),
            Eingabe::Token => f.write_str("Token"),
            Eingabe::Abmelden => f.write_str("Abmelden"),
            Eingabe::Admin { kind, data } => f
                .debug_struct("Admin")
                .field("kind", kind)
                .field("data", data)
                .finish(),
            Eingabe::Peers => f.write_str("Peers"),
            Eingabe::Status => f.write_str("Status"),
            Eingabe::Hilfe => f.write_str("Hilfe"),
            Eingabe::Beenden => f.write_str("Beenden"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EingabeFehler {
    #[error("Leere Eingabe")]
    Leer,

    #[error("Befehle beginnen mit '/', siehe /help")]
    KeinBefehl,

    #[error("Unbekannter Befehl: /{0}")]
    Unbekannt(String),

    #[error("Argument fehlt: {0}")]
    ArgumentFehlt(&'static str),

    #[error("Unbekanntes Admin-Kommando: {0}")]
    AdminKommando(String),

    #[error("Ungueltige JSON-Daten: {0}")]
    Json(String),
}

pub const HILFE: &str = "\
/call <peer>             Anruf starten
/hangup [peer]           Anruf beenden (ohne Peer: alle)
/auth <passwort>         Als Admin anmelden
/token                   Mit gespeichertem Token anmelden
/logout                  Admin-Abmeldung
/admin <kommando> [json] start_game, call_number, reset_game, broadcast, kick_user
/peers                   Peer-Sitzungen anzeigen
/status                  Verbindungs- und Auth-Zustand
/quit                    Beenden";

/// Parst eine Konsolenzeile
pub fn parse_line(line: &str) -> Result<Eingabe, EingabeFehler> {
    let line = line.trim();
    if line.is_empty() {
        return Err(EingabeFehler::Leer);
    }
    let Some(befehl) = line.strip_prefix('/') else {
        return Err(EingabeFehler::KeinBefehl);
    };

    let (name, rest) = match befehl.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (befehl, ""),
    };

    match name.to_lowercase().as_str() {
        "call" => Ok(Eingabe::Anrufen(peer_argument(rest)?)),
        "hangup" => {
            if rest.is_empty() {
                Ok(Eingabe::Auflegen(None))
            } else {
                Ok(Eingabe::Auflegen(Some(peer_argument(rest)?)))
            }
        }
        "auth" => {
            if rest.is_empty() {
                return Err(EingabeFehler::ArgumentFehlt("passwort"));
            }
            Ok(Eingabe::Anmelden(rest.to_string()))
        }
        "token" => Ok(Eingabe::Token),
        "logout" => Ok(Eingabe::Abmelden),
        "admin" => admin(rest),
        "peers" => Ok(Eingabe::Peers),
        "status" => Ok(Eingabe::Status),
        "help" | "?" => Ok(Eingabe::Hilfe),
        "quit" | "exit" => Ok(Eingabe::Beenden),
        other => Err(EingabeFehler::Unbekannt(other.to_string())),
    }
}

fn peer_argument(rest: &str) -> Result<UserId, EingabeFehler> {
    match rest.split_whitespace().next() {
        Some(peer) => Ok(UserId::from(peer)),
        None => Err(EingabeFehler::ArgumentFehlt("peer")),
    }
}

fn admin(rest: &str) -> Result<Eingabe, EingabeFehler> {
    if rest.is_empty() {
        return Err(EingabeFehler::ArgumentFehlt("kommando"));
    }
    let (kommando, daten) = match rest.split_once(char::is_whitespace) {
        Some((kommando, daten)) => (kommando, daten.trim()),
        None => (rest, ""),
    };
    let kind = AdminCommandKind::from_str(kommando).map_err(EingabeFehler::AdminKommando)?;
    let data = if daten.is_empty() {
        None
    } else {
        Some(serde_json::from_str(daten).map_err(|e| EingabeFehler::Json(e.to_string()))?)
    };
    Ok(Eingabe::Admin { kind, data })
}
