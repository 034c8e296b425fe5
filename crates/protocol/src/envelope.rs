//! Envelope-Protokoll des Control Channels
//!
//! Definiert alle Nachrichten die ueber die eine persistente Verbindung
//! zwischen Client und Relay ausgetauscht werden.
//!
//! ## Design
//! - Flaches JSON: `{"type": "...", <payload-felder>, "timestamp": <ms>}`
//! - Tagged Enum ueber eine geschlossene Menge von Nachrichtentypen;
//!   unbekannte Typen landen in `Message::Unknown`
//! - Payload-Felder in camelCase (Wire-Format des Relays)
//! - Der `timestamp` ist Sender-Wall-Clock und sagt nichts ueber die
//!   Reihenfolge aus

use bingo_core::{jetzt_ms, Identity, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Roster- und Identitaets-Nachrichten
// ---------------------------------------------------------------------------

/// Identitaets-Ankuendigung, direkt nach dem Oeffnen des Transports gesendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoin {
    pub user_id: UserId,
    pub username: String,
}

/// Abmeldung beim geordneten Abbau (ausgehend) bzw. Abgang eines Peers (eingehend)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeave {
    pub user_id: UserId,
}

/// Ein Eintrag im Roster-Snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// Vollstaendiger Roster-Snapshot vom Relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserList {
    #[serde(default)]
    pub users: Vec<RosterEntry>,
}

// ---------------------------------------------------------------------------
// Spiel-Nachrichten (werden nur an die externe Spiellogik weitergereicht)
// ---------------------------------------------------------------------------

/// Partielles Spielzustands-Update (Merge erfolgt in der Spiellogik)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub state: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberCalled {
    pub number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerAnnounced {
    pub winner: Winner,
}

/// Operator-Durchsage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Auth-Nachrichten
// ---------------------------------------------------------------------------

/// Credential-Praesentation: entweder Passwort oder gecachter Token.
///
/// `Debug` gibt keine Geheimnisse aus.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl AdminAuth {
    pub fn mit_passwort(password: String) -> Self {
        Self {
            password: Some(password),
            token: None,
        }
    }

    pub fn mit_token(token: String) -> Self {
        Self {
            password: None,
            token: Some(token),
        }
    }

    /// `true` wenn ein Token statt eines Passworts praesentiert wird
    pub fn ist_token(&self) -> bool {
        self.token.is_some()
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Antwort des Relays auf `admin_auth`
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("success", &self.success)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("message", &self.message)
            .finish()
    }
}

/// Privilegierte Aktionen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminCommandKind {
    StartGame,
    CallNumber,
    ResetGame,
    Broadcast,
    KickUser,
}

impl AdminCommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminCommandKind::StartGame => "start_game",
            AdminCommandKind::CallNumber => "call_number",
            AdminCommandKind::ResetGame => "reset_game",
            AdminCommandKind::Broadcast => "broadcast",
            AdminCommandKind::KickUser => "kick_user",
        }
    }
}

impl std::str::FromStr for AdminCommandKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_game" => Ok(Self::StartGame),
            "call_number" => Ok(Self::CallNumber),
            "reset_game" => Ok(Self::ResetGame),
            "broadcast" => Ok(Self::Broadcast),
            "kick_user" => Ok(Self::KickUser),
            andere => Err(format!("Unbekanntes Admin-Kommando: {andere}")),
        }
    }
}

/// Privilegierte Aktion, nur mit gueltigem Token
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminCommand {
    pub command: AdminCommandKind,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl std::fmt::Debug for AdminCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCommand")
            .field("command", &self.command)
            .field("token", &"<redacted>")
            .field("data", &self.data)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Signaling (Offer/Answer/ICE)
// ---------------------------------------------------------------------------

/// Typ einer Session-Description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session-Description im Format `{type, sdp}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Verbindungskandidat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn neu(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcOffer {
    pub target_user_id: UserId,
    pub from_user_id: UserId,
    pub offer: SessionDescription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcAnswer {
    pub target_user_id: UserId,
    pub from_user_id: UserId,
    pub answer: SessionDescription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateRelay {
    pub target_user_id: UserId,
    pub from_user_id: UserId,
    pub candidate: IceCandidate,
}

// ---------------------------------------------------------------------------
// Haupt-Enum: Message
// ---------------------------------------------------------------------------

/// Alle Nachrichtentypen des Control Channels (typsicher via Tagged Enum)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // Roster
    UserJoin(UserJoin),
    UserLeave(UserLeave),
    UserList(UserList),

    // Spiel
    GameState(GameState),
    NumberCalled(NumberCalled),
    WinnerAnnounced(WinnerAnnounced),
    Broadcast(Broadcast),

    // Auth
    AdminAuth(AdminAuth),
    AuthResponse(AuthResponse),
    AdminCommand(AdminCommand),

    // Signaling
    RtcOffer(RtcOffer),
    RtcAnswer(RtcAnswer),
    IceCandidate(IceCandidateRelay),

    /// Jeder nicht bekannte `type`
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Identitaets-Ankuendigung fuer die lokale Identitaet
    pub fn user_join(identity: &Identity) -> Self {
        Message::UserJoin(UserJoin {
            user_id: identity.local_id().clone(),
            username: identity.display_name().to_string(),
        })
    }

    pub fn user_leave(user_id: &UserId) -> Self {
        Message::UserLeave(UserLeave {
            user_id: user_id.clone(),
        })
    }

    /// Wire-Name des Typs (fuer Logging und Metriken)
    pub fn kind(&self) -> &'static str {
        match self {
            Message::UserJoin(_) => "user_join",
            Message::UserLeave(_) => "user_leave",
            Message::UserList(_) => "user_list",
            Message::GameState(_) => "game_state",
            Message::NumberCalled(_) => "number_called",
            Message::WinnerAnnounced(_) => "winner_announced",
            Message::Broadcast(_) => "broadcast",
            Message::AdminAuth(_) => "admin_auth",
            Message::AuthResponse(_) => "auth_response",
            Message::AdminCommand(_) => "admin_command",
            Message::RtcOffer(_) => "rtc_offer",
            Message::RtcAnswer(_) => "rtc_answer",
            Message::IceCandidate(_) => "ice_candidate",
            Message::Unknown => "unknown",
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope (Umschlag fuer alle Nachrichten)
// ---------------------------------------------------------------------------

/// Nachricht plus Sende-Zeitstempel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub message: Message,
    /// Sender-Wall-Clock in Millisekunden, beim Senden gestempelt
    #[serde(default)]
    pub timestamp: i64,
}

/// Ergebnis der Dekodierung eines einzelnen Frames
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Envelope(Envelope),
    /// Frame-Grenze intakt, Inhalt unbrauchbar – wird verworfen
    Malformed { reason: String },
}

impl Envelope {
    /// Erstellt ein Envelope mit aktuellem Zeitstempel
    pub fn neu(message: Message) -> Self {
        Self::mit_zeitstempel(message, jetzt_ms())
    }

    pub fn mit_zeitstempel(message: Message, timestamp: i64) -> Self {
        Self { message, timestamp }
    }

    pub fn kind(&self) -> &'static str {
        self.message.kind()
    }

    /// Serialisiert das Envelope als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert ein Envelope aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Dekodiert einen Text-Frame; Parse-Fehler werden zu `Decoded::Malformed`
    pub fn decode_bytes(payload: &[u8]) -> Decoded {
        match serde_json::from_slice::<Envelope>(payload) {
            Ok(envelope) => Decoded::Envelope(envelope),
            Err(e) => Decoded::Malformed {
                reason: e.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_join_wire_format() {
        let ident = Identity::mit_id(UserId::from("u1"), "Alice");
        let env = Envelope::mit_zeitstempel(Message::user_join(&ident), 1700);
        let wert: serde_json::Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(
            wert,
            json!({"type": "user_join", "userId": "u1", "username": "Alice", "timestamp": 1700})
        );
    }

    #[test]
    fn user_list_mit_optionalen_feldern() {
        let roh = r#"{"type":"user_list","users":[
            {"id":"a","username":"Alice","status":"online","isAdmin":true},
            {"id":"b","username":"Bob","status":"online","ip":"10.0.0.2"}
        ],"timestamp":5}"#;
        let env = Envelope::from_json(roh).unwrap();
        let Message::UserList(liste) = env.message else {
            panic!("Erwartet UserList");
        };
        assert_eq!(liste.users.len(), 2);
        assert_eq!(liste.users[0].is_admin, Some(true));
        assert_eq!(liste.users[1].ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(env.timestamp, 5);
    }

    #[test]
    fn rtc_offer_verschachtelte_description() {
        let roh = r#"{"type":"rtc_offer","targetUserId":"me","fromUserId":"p1",
            "offer":{"type":"offer","sdp":"v=0"},"timestamp":1}"#;
        let env = Envelope::from_json(roh).unwrap();
        match env.message {
            Message::RtcOffer(o) => {
                assert_eq!(o.from_user_id, UserId::from("p1"));
                assert_eq!(o.offer.kind, SdpKind::Offer);
                assert_eq!(o.offer.sdp, "v=0");
            }
            other => panic!("Erwartet RtcOffer, erhalten {other:?}"),
        }
    }

    #[test]
    fn ice_candidate_feldnamen() {
        let mut kandidat = IceCandidate::neu("candidate:1 1 udp 1 10.0.0.1 5000 typ host");
        kandidat.sdp_mid = Some("0".into());
        kandidat.sdp_m_line_index = Some(0);
        let msg = Message::IceCandidate(IceCandidateRelay {
            target_user_id: "p1".into(),
            from_user_id: "me".into(),
            candidate: kandidat,
        });
        let wert = serde_json::to_value(Envelope::mit_zeitstempel(msg, 0)).unwrap();
        assert_eq!(wert["type"], "ice_candidate");
        assert_eq!(wert["candidate"]["sdpMid"], "0");
        assert_eq!(wert["candidate"]["sdpMLineIndex"], 0);
        assert!(wert["candidate"].get("usernameFragment").is_none());
    }

    #[test]
    fn admin_auth_sendet_nur_ein_credential() {
        let env = Envelope::mit_zeitstempel(
            Message::AdminAuth(AdminAuth::mit_token("tok".into())),
            0,
        );
        let wert = serde_json::to_value(&env).unwrap();
        assert_eq!(wert["token"], "tok");
        assert!(wert.get("password").is_none());
    }

    #[test]
    fn debug_verraet_keine_geheimnisse() {
        let msg = Message::AdminAuth(AdminAuth::mit_passwort("geheim".into()));
        let ausgabe = format!("{msg:?}");
        assert!(!ausgabe.contains("geheim"));
        assert!(ausgabe.contains("<redacted>"));
    }

    #[test]
    fn unbekannter_typ_wird_unknown() {
        let env = Envelope::from_json(r#"{"type":"chat","text":"hi","timestamp":9}"#).unwrap();
        assert_eq!(env.message, Message::Unknown);
        assert_eq!(env.timestamp, 9);
    }

    #[test]
    fn fehlender_typ_ist_malformed() {
        let decoded = Envelope::decode_bytes(br#"{"number":3}"#);
        assert!(matches!(decoded, Decoded::Malformed { .. }));
    }

    #[test]
    fn fehlender_zeitstempel_ist_null() {
        let env = Envelope::from_json(r#"{"type":"number_called","number":42}"#).unwrap();
        assert_eq!(env.timestamp, 0);
        assert_eq!(env.message, Message::NumberCalled(NumberCalled { number: 42 }));
    }

    #[test]
    fn admin_command_kind_parsen() {
        assert_eq!(
            "call_number".parse::<AdminCommandKind>(),
            Ok(AdminCommandKind::CallNumber)
        );
        assert!("launch".parse::<AdminCommandKind>().is_err());
        assert_eq!(AdminCommandKind::KickUser.as_str(), "kick_user");
    }
}
