//! Ereignis-Schnittstelle zur UI-Schicht
//!
//! Der Host uebergibt beim Start eine Implementierung; alle Methoden haben
//! leere Standard-Implementierungen. Aufrufe erfolgen aus dem Task des
//! `SessionManager` und duerfen nicht blockieren.

use bingo_core::{ConnectionState, UserId};
use bingo_protocol::{RosterEntry, UserJoin, Winner};

use crate::auth::AuthState;
use crate::media::{MediaError, RemoteMedia};

#[allow(unused_variables)]
pub trait SessionObserver: Send + Sync + 'static {
    fn on_connection_state(&self, state: ConnectionState) {}

    /// Reconnect-Versuche ausgeschoepft; erst `connect()` versucht es erneut
    fn on_channel_exhausted(&self) {}

    fn on_roster(&self, users: &[RosterEntry]) {}

    fn on_user_joined(&self, user: &UserJoin) {}

    fn on_user_left(&self, user: &UserId) {}

    fn on_game_state(&self, state: &serde_json::Value) {}

    fn on_number_called(&self, number: u32) {}

    fn on_winner(&self, winner: &Winner) {}

    fn on_broadcast(&self, message: &str) {}

    fn on_auth_result(&self, state: &AuthState) {}

    fn on_peer_established(&self, peer: &UserId) {}

    fn on_remote_stream(&self, peer: &UserId, media: &RemoteMedia) {}

    /// Lokale Medien fehlen, die Sitzung laeuft nur empfangend weiter
    fn on_media_warning(&self, peer: &UserId, fehler: &MediaError) {}

    fn on_peer_closed(&self, peer: &UserId, grund: &str) {}
}

/// Observer ohne Reaktion
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}
