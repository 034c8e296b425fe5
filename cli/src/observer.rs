//! Gibt Sitzungsereignisse auf der Konsole aus

use bingo_core::{ConnectionState, UserId};
use bingo_protocol::{RosterEntry, UserJoin, Winner};
use bingo_session::{AuthState, MediaError, RemoteMedia, SessionObserver};

#[derive(Debug, Default)]
pub struct KonsolenObserver;

impl SessionObserver for KonsolenObserver {
    fn on_connection_state(&self, state: ConnectionState) {
        println!("* Verbindung: {state}");
    }

    fn on_channel_exhausted(&self) {
        println!("* Relay nicht erreichbar. Mit /status pruefen, Neustart verbindet erneut.");
    }

    fn on_roster(&self, users: &[RosterEntry]) {
        let namen: Vec<String> = users
            .iter()
            .map(|u| format!("{} ({})", u.username, u.id))
            .collect();
        println!("* Im Spiel: {}", namen.join(", "));
    }

    fn on_user_joined(&self, user: &UserJoin) {
        println!("* {} ist beigetreten ({})", user.username, user.user_id);
    }

    fn on_user_left(&self, user: &UserId) {
        println!("* {user} hat das Spiel verlassen");
    }

    fn on_game_state(&self, state: &serde_json::Value) {
        println!("* Spielstand: {state}");
    }

    fn on_number_called(&self, number: u32) {
        println!("* Zahl gezogen: {number}");
    }

    fn on_winner(&self, winner: &Winner) {
        println!("* BINGO! {} gewinnt mit {}", winner.name, winner.pattern);
    }

    fn on_broadcast(&self, message: &str) {
        println!("* Durchsage: {message}");
    }

    fn on_auth_result(&self, state: &AuthState) {
        match state {
            AuthState::Anonymous => println!("* Admin: abgemeldet"),
            AuthState::Authenticating => println!("* Admin: Anmeldung laeuft"),
            AuthState::Authenticated => println!("* Admin: angemeldet"),
            AuthState::Denied { reason } => println!("* Admin: abgelehnt ({reason})"),
        }
    }

    fn on_peer_established(&self, peer: &UserId) {
        println!("* Verbindung zu {peer} hergestellt");
    }

    fn on_remote_stream(&self, peer: &UserId, media: &RemoteMedia) {
        println!("* Stream von {peer}: {} Spur(en)", media.tracks.len());
    }

    fn on_media_warning(&self, peer: &UserId, fehler: &MediaError) {
        println!("* Anruf mit {peer} ohne eigene Medien: {fehler}");
    }

    fn on_peer_closed(&self, peer: &UserId, grund: &str) {
        println!("* Anruf mit {peer} beendet: {grund}");
    }
}
