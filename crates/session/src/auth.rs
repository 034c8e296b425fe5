//! Auth Session
//!
//! Zustandsmaschine fuer den Admin-Handshake. Die Pruefung des
//! Credentials uebernimmt ausschliesslich das Relay.
//!
//! ```text
//! Anonymous --begin--> Authenticating --ok--> Authenticated --logout--> Anonymous
//!     ^                      |
//!     |         Ablehnung/Timeout/Verbindungsverlust
//!     |                      v
//!     +----- (logout) ---- Denied --begin--> Authenticating
//! ```
//!
//! Ein Passwort wird direkt in die ausgehende Nachricht verschoben und in
//! keinem Feld gehalten.

use std::path::PathBuf;
use std::time::Duration;

use bingo_protocol::{AdminAuth, AdminCommand, AdminCommandKind, AuthResponse, Message};
use serde::Deserialize;
use tokio::time::Instant;

use crate::error::{SessionError, SessionResult};
use crate::token_cache::{TokenCache, TOKEN_TTL_SEKUNDEN};

/// Grund bei ausbleibender Antwort
pub const TIMEOUT_GRUND: &str = "Zeitueberschreitung: keine Antwort vom Server";

/// Grund wenn die Verbindung waehrend der Anmeldung abreisst
pub const VERBINDUNG_VERLOREN_GRUND: &str = "Verbindung verloren";

/// Grund bei Ablehnung ohne Servernachricht
const ABGELEHNT_GRUND: &str = "Anmeldung abgelehnt";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub timeout_ms: u64,
    pub token_ttl_sek: u64,
    /// Optionaler Ablageort fuer den Token
    pub token_datei: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            token_ttl_sek: TOKEN_TTL_SEKUNDEN,
            token_datei: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticating,
    Authenticated,
    Denied { reason: String },
}

impl AuthState {
    /// Label fuer Metriken
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthState::Anonymous => "anonymous",
            AuthState::Authenticating => "authenticating",
            AuthState::Authenticated => "granted",
            AuthState::Denied { .. } => "denied",
        }
    }
}

/// Credential fuer `begin`
pub enum Credential {
    Password(String),
    /// Den gecachten, nicht abgelaufenen Token verwenden
    CachedToken,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::CachedToken => f.write_str("CachedToken"),
        }
    }
}

#[derive(Debug)]
pub struct AuthSession {
    state: AuthState,
    cache: TokenCache,
    timeout: Duration,
    deadline: Option<Instant>,
    mit_token: bool,
    /// Nach Verbindungsverlust erneut mit Token anmelden
    wiederherstellen: bool,
}

impl AuthSession {
    pub fn neu(config: &AuthConfig) -> Self {
        let ttl = Duration::from_secs(config.token_ttl_sek);
        let cache = match &config.token_datei {
            Some(datei) => TokenCache::mit_datei(ttl, datei),
            None => TokenCache::neu(ttl),
        };
        Self::mit_cache(cache, Duration::from_millis(config.timeout_ms))
    }

    pub fn mit_cache(cache: TokenCache, timeout: Duration) -> Self {
        Self {
            state: AuthState::Anonymous,
            cache,
            timeout,
            deadline: None,
            mit_token: false,
            wiederherstellen: false,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Ablauf des Antwort-Timers, solange `Authenticating`
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_cached_token(&self) -> bool {
        self.cache.ist_gueltig()
    }

    /// Beginnt den Handshake und liefert die zu sendende `admin_auth`-Nachricht
    pub fn begin(&mut self, credential: Credential) -> SessionResult<Message> {
        match self.state {
            AuthState::Anonymous | AuthState::Denied { .. } => {}
            AuthState::Authenticating => {
                return Err(SessionError::zustand("Anmeldung laeuft bereits"))
            }
            AuthState::Authenticated => return Err(SessionError::zustand("Bereits angemeldet")),
        }

        let auth = match credential {
            Credential::Password(passwort) => AdminAuth::mit_passwort(passwort),
            Credential::CachedToken => {
                let token = self
                    .cache
                    .gueltiger_token()
                    .ok_or(SessionError::NichtAutorisiert)?;
                AdminAuth::mit_token(token.to_string())
            }
        };

        self.state = AuthState::Authenticating;
        self.deadline = Some(Instant::now() + self.timeout);
        self.mit_token = auth.ist_token();
        tracing::info!(mit_token = self.mit_token, "Admin-Anmeldung gestartet");
        Ok(Message::AdminAuth(auth))
    }

    /// Verarbeitet `auth_response`. `None` wenn keine Anmeldung lief.
    pub fn on_response(&mut self, antwort: AuthResponse) -> Option<&AuthState> {
        if self.state != AuthState::Authenticating {
            tracing::warn!(erfolg = antwort.success, "Unerwartete auth_response ignoriert");
            return None;
        }
        self.deadline = None;

        if antwort.success {
            match antwort.token {
                Some(token) => self.cache.speichern(token),
                None if self.mit_token => {}
                None => tracing::warn!("Anmeldung erfolgreich, aber ohne Token"),
            }
            self.state = AuthState::Authenticated;
            tracing::info!("Admin-Anmeldung erfolgreich");
        } else {
            if self.mit_token {
                self.cache.leeren();
            }
            let reason = antwort.message.unwrap_or_else(|| ABGELEHNT_GRUND.to_string());
            tracing::info!(grund = %reason, "Admin-Anmeldung abgelehnt");
            self.state = AuthState::Denied { reason };
        }
        Some(&self.state)
    }

    /// Prueft den Antwort-Timer. `Some` wenn er gerade abgelaufen ist.
    pub fn on_timeout(&mut self, jetzt: Instant) -> Option<&AuthState> {
        match self.deadline {
            Some(frist) if frist <= jetzt && self.state == AuthState::Authenticating => {
                self.deadline = None;
                tracing::warn!("Admin-Anmeldung: keine Antwort vom Server");
                self.state = AuthState::Denied {
                    reason: TIMEOUT_GRUND.to_string(),
                };
                Some(&self.state)
            }
            _ => None,
        }
    }

    pub fn logout(&mut self) {
        self.cache.leeren();
        self.deadline = None;
        self.wiederherstellen = false;
        self.state = AuthState::Anonymous;
        tracing::info!("Admin-Abmeldung");
    }

    /// Rechte sind an die Verbindung gebunden. `true` wenn sich der Zustand aendert.
    ///
    /// Eine laufende Anmeldung endet als `Denied`; eine Antwort auf der neuen
    /// Verbindung wird nicht mehr zugeordnet.
    pub fn connection_lost(&mut self) -> bool {
        match self.state {
            AuthState::Authenticated => {
                self.wiederherstellen = true;
                self.state = AuthState::Anonymous;
                true
            }
            AuthState::Authenticating => {
                self.deadline = None;
                self.wiederherstellen = false;
                tracing::info!("Admin-Anmeldung durch Verbindungsverlust abgebrochen");
                self.state = AuthState::Denied {
                    reason: VERBINDUNG_VERLOREN_GRUND.to_string(),
                };
                true
            }
            _ => false,
        }
    }

    /// Nach erneuter Verbindung: Anmeldung mit gecachtem Token, falls vorher angemeldet
    pub fn resume(&mut self) -> Option<Message> {
        if !std::mem::take(&mut self.wiederherstellen) || !self.cache.ist_gueltig() {
            return None;
        }
        match self.begin(Credential::CachedToken) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!(fehler = %e, "Erneute Anmeldung nicht moeglich");
                None
            }
        }
    }

    /// Baut ein `admin_command` mit dem gecachten Token
    pub fn command(
        &self,
        kind: AdminCommandKind,
        data: Option<serde_json::Value>,
    ) -> SessionResult<Message> {
        if self.state != AuthState::Authenticated {
            return Err(SessionError::NichtAutorisiert);
        }
        let token = self
            .cache
            .gueltiger_token()
            .ok_or(SessionError::NichtAutorisiert)?;
        Ok(Message::AdminCommand(AdminCommand {
            command: kind,
            token: token.to_string(),
            data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AuthSession {
        AuthSession::mit_cache(TokenCache::neu(Duration::from_secs(3600)), Duration::from_secs(10))
    }

    fn erfolg(token: &str) -> AuthResponse {
        AuthResponse {
            success: true,
            token: Some(token.into()),
            message: None,
        }
    }

    fn ablehnung(msg: &str) -> AuthResponse {
        AuthResponse {
            success: false,
            token: None,
            message: Some(msg.into()),
        }
    }

    #[tokio::test]
    async fn passwort_erfolgreich() {
        let mut auth = session();
        let msg = auth.begin(Credential::Password("richtig".into())).unwrap();
        assert_eq!(
            msg,
            Message::AdminAuth(AdminAuth::mit_passwort("richtig".into()))
        );
        assert_eq!(auth.state(), &AuthState::Authenticating);
        assert!(auth.deadline().is_some());

        assert_eq!(auth.on_response(erfolg("tok")), Some(&AuthState::Authenticated));
        assert!(auth.deadline().is_none());
        assert!(auth.has_cached_token());
    }

    #[tokio::test]
    async fn falsches_passwort_wird_denied_mit_servernachricht() {
        let mut auth = session();
        auth.begin(Credential::Password("wrong".into())).unwrap();
        auth.on_response(ablehnung("Invalid password"));
        assert_eq!(
            auth.state(),
            &AuthState::Denied {
                reason: "Invalid password".into()
            }
        );

        // Erneuter Versuch aus Denied erlaubt
        assert!(auth.begin(Credential::Password("neu".into())).is_ok());
    }

    #[tokio::test]
    async fn passwort_wird_nicht_gehalten() {
        let mut auth = session();
        auth.begin(Credential::Password("streng-geheim".into())).unwrap();
        assert!(!format!("{auth:?}").contains("streng-geheim"));
    }

    #[tokio::test]
    async fn gecachter_token_ueberspringt_passwort() {
        let mut auth = session();
        assert!(matches!(
            auth.begin(Credential::CachedToken),
            Err(SessionError::NichtAutorisiert)
        ));
        assert_eq!(auth.state(), &AuthState::Anonymous);

        auth.begin(Credential::Password("pw".into())).unwrap();
        auth.on_response(erfolg("tok-1"));
        auth.connection_lost();
        assert_eq!(auth.state(), &AuthState::Anonymous);

        let msg = auth.begin(Credential::CachedToken).unwrap();
        assert_eq!(msg, Message::AdminAuth(AdminAuth::mit_token("tok-1".into())));
        assert_eq!(auth.state(), &AuthState::Authenticating);
    }

    #[tokio::test]
    async fn abgelehnter_token_wird_verworfen() {
        let mut auth = session();
        auth.begin(Credential::Password("pw".into())).unwrap();
        auth.on_response(erfolg("tok-1"));
        auth.connection_lost();

        auth.begin(Credential::CachedToken).unwrap();
        auth.on_response(ablehnung("Token expired"));
        assert!(!auth.has_cached_token());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fuehrt_zu_denied() {
        let mut auth = session();
        auth.begin(Credential::Password("pw".into())).unwrap();
        assert!(auth.on_timeout(Instant::now()).is_none());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(
            auth.on_timeout(Instant::now()),
            Some(&AuthState::Denied {
                reason: TIMEOUT_GRUND.into()
            })
        );
        // Spaete Antwort aendert nichts mehr
        assert!(auth.on_response(erfolg("spaet")).is_none());
        assert!(!auth.has_cached_token());
    }

    #[tokio::test]
    async fn doppelter_start_abgelehnt() {
        let mut auth = session();
        auth.begin(Credential::Password("pw".into())).unwrap();
        assert!(auth.begin(Credential::Password("pw".into())).is_err());
        auth.on_response(erfolg("tok"));
        assert!(auth.begin(Credential::Password("pw".into())).is_err());
    }

    #[tokio::test]
    async fn logout_leert_cache() {
        let mut auth = session();
        auth.begin(Credential::Password("pw".into())).unwrap();
        auth.on_response(erfolg("tok"));
        auth.logout();
        assert_eq!(auth.state(), &AuthState::Anonymous);
        assert!(!auth.has_cached_token());
        assert!(auth.resume().is_none());
    }

    #[tokio::test]
    async fn kommando_braucht_anmeldung() {
        let mut auth = session();
        assert!(matches!(
            auth.command(AdminCommandKind::StartGame, None),
            Err(SessionError::NichtAutorisiert)
        ));

        auth.begin(Credential::Password("pw".into())).unwrap();
        auth.on_response(erfolg("tok"));
        let msg = auth
            .command(AdminCommandKind::CallNumber, Some(serde_json::json!({"number": 7})))
            .unwrap();
        match msg {
            Message::AdminCommand(cmd) => {
                assert_eq!(cmd.command, AdminCommandKind::CallNumber);
                assert_eq!(cmd.token, "tok");
            }
            other => panic!("Erwartet AdminCommand, erhalten {other:?}"),
        }
    }

    #[tokio::test]
    async fn resume_nach_verbindungsverlust() {
        let mut auth = session();
        auth.begin(Credential::Password("pw".into())).unwrap();
        auth.on_response(erfolg("tok"));

        assert!(auth.connection_lost());
        assert!(!auth.connection_lost(), "Zweiter Verlust aendert nichts");
        let msg = auth.resume().unwrap();
        assert_eq!(msg, Message::AdminAuth(AdminAuth::mit_token("tok".into())));
        assert!(auth.resume().is_none(), "Nur einmal");
    }

    #[tokio::test]
    async fn verbindungsverlust_waehrend_anmeldung_wird_denied() {
        let mut auth = session();
        auth.begin(Credential::Password("pw".into())).unwrap();

        assert!(auth.connection_lost());
        assert_eq!(
            auth.state(),
            &AuthState::Denied {
                reason: VERBINDUNG_VERLOREN_GRUND.into()
            }
        );
        assert!(auth.deadline().is_none());
        assert!(auth.resume().is_none(), "Keine Wiederaufnahme ohne Anmeldung");
        assert!(auth.on_response(erfolg("spaet")).is_none());
        assert!(!auth.has_cached_token());

        // Neuer Versuch aus Denied
        assert!(auth.begin(Credential::Password("pw".into())).is_ok());
    }
}
