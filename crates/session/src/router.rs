//! Signaling Router
//!
//! Ordnet jedes eingehende Envelope genau einem Ziel zu. Die Funktion ist
//! rein: sie veraendert keinen Zustand und loggt nur verworfene Envelopes.
//! Die Reihenfolge innerhalb eines Peers bleibt erhalten, weil der Aufrufer
//! die Envelopes in Transportreihenfolge einspeist.

use bingo_core::UserId;
use bingo_protocol::{
    AuthResponse, Envelope, IceCandidate, Message, SessionDescription, UserJoin, UserList, Winner,
};

/// Ereignisse fuer die externe Spiellogik
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    State(serde_json::Value),
    NumberCalled(u32),
    Winner(Winner),
    Broadcast(String),
}

/// Signaling-Nachricht eines bestimmten Peers
#[derive(Debug, Clone, PartialEq)]
pub enum PeerSignal {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

impl PeerSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            PeerSignal::Offer(_) => "offer",
            PeerSignal::Answer(_) => "answer",
            PeerSignal::Candidate(_) => "candidate",
        }
    }
}

/// Warum ein Envelope nicht weitergereicht wird
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verworfen {
    /// Unbekannter `type`
    Unbekannt,
    /// Typ, den nur der Client sendet
    NurAusgehend(&'static str),
    /// Signaling fuer einen anderen Teilnehmer
    FremdesZiel,
    /// Echo der eigenen Identitaet
    Eigen,
}

/// Ziel eines eingehenden Envelopes
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Roster(UserList),
    UserJoined(UserJoin),
    UserLeft(UserId),
    Game(GameEvent),
    Auth(AuthResponse),
    Signal { from: UserId, signal: PeerSignal },
    Ignore(Verworfen),
}

/// Bestimmt das Ziel eines Envelopes fuer den lokalen Teilnehmer `local_id`
pub fn route(envelope: Envelope, local_id: &UserId) -> Route {
    let signal = |target: UserId, from: UserId, signal: PeerSignal| {
        if &target != local_id {
            tracing::debug!(ziel = %target, typ = signal.kind(), "Signaling fuer fremden Teilnehmer ignoriert");
            return Route::Ignore(Verworfen::FremdesZiel);
        }
        Route::Signal { from, signal }
    };

    match envelope.message {
        Message::UserList(liste) => Route::Roster(liste),
        Message::UserJoin(join) => {
            if &join.user_id == local_id {
                return Route::Ignore(Verworfen::Eigen);
            }
            Route::UserJoined(join)
        }
        Message::UserLeave(leave) => {
            if &leave.user_id == local_id {
                return Route::Ignore(Verworfen::Eigen);
            }
            Route::UserLeft(leave.user_id)
        }

        Message::GameState(g) => Route::Game(GameEvent::State(g.state)),
        Message::NumberCalled(n) => Route::Game(GameEvent::NumberCalled(n.number)),
        Message::WinnerAnnounced(w) => Route::Game(GameEvent::Winner(w.winner)),
        Message::Broadcast(b) => Route::Game(GameEvent::Broadcast(b.message)),

        Message::AuthResponse(antwort) => Route::Auth(antwort),

        Message::RtcOffer(o) => signal(o.target_user_id, o.from_user_id, PeerSignal::Offer(o.offer)),
        Message::RtcAnswer(a) => signal(a.target_user_id, a.from_user_id, PeerSignal::Answer(a.answer)),
        Message::IceCandidate(c) => signal(
            c.target_user_id,
            c.from_user_id,
            PeerSignal::Candidate(c.candidate),
        ),

        Message::AdminAuth(_) => nur_ausgehend("admin_auth"),
        Message::AdminCommand(_) => nur_ausgehend("admin_command"),
        Message::Unknown => {
            tracing::warn!(zeitstempel = envelope.timestamp, "Unbekannter Nachrichtentyp ignoriert");
            Route::Ignore(Verworfen::Unbekannt)
        }
    }
}

fn nur_ausgehend(typ: &'static str) -> Route {
    tracing::warn!(typ, "Ausgehender Nachrichtentyp vom Relay empfangen, ignoriert");
    Route::Ignore(Verworfen::NurAusgehend(typ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bingo_protocol::{
        AdminAuth, Broadcast, IceCandidateRelay, NumberCalled, RtcAnswer, RtcOffer, UserLeave,
    };

    fn me() -> UserId {
        UserId::from("me")
    }

    fn env(message: Message) -> Envelope {
        Envelope::mit_zeitstempel(message, 1)
    }

    #[test]
    fn spiel_nachrichten() {
        assert_eq!(
            route(env(Message::NumberCalled(NumberCalled { number: 12 })), &me()),
            Route::Game(GameEvent::NumberCalled(12))
        );
        assert_eq!(
            route(env(Message::Broadcast(Broadcast { message: "Pause".into() })), &me()),
            Route::Game(GameEvent::Broadcast("Pause".into()))
        );
    }

    #[test]
    fn offer_an_mich_wird_signal() {
        let offer = SessionDescription::offer("v=0");
        let r = route(
            env(Message::RtcOffer(RtcOffer {
                target_user_id: me(),
                from_user_id: "p1".into(),
                offer: offer.clone(),
            })),
            &me(),
        );
        assert_eq!(
            r,
            Route::Signal {
                from: "p1".into(),
                signal: PeerSignal::Offer(offer)
            }
        );
    }

    #[test]
    fn signal_fuer_andere_wird_ignoriert() {
        let r = route(
            env(Message::RtcAnswer(RtcAnswer {
                target_user_id: "p2".into(),
                from_user_id: "p1".into(),
                answer: SessionDescription::answer("v=0"),
            })),
            &me(),
        );
        assert_eq!(r, Route::Ignore(Verworfen::FremdesZiel));
    }

    #[test]
    fn kandidat_wird_signal() {
        let r = route(
            env(Message::IceCandidate(IceCandidateRelay {
                target_user_id: me(),
                from_user_id: "p1".into(),
                candidate: IceCandidate::neu("candidate:1"),
            })),
            &me(),
        );
        assert!(matches!(r, Route::Signal { signal: PeerSignal::Candidate(_), .. }));
    }

    #[test]
    fn eigene_roster_echos_werden_ignoriert() {
        let r = route(env(Message::user_leave(&me())), &me());
        assert_eq!(r, Route::Ignore(Verworfen::Eigen));

        let r = route(
            env(Message::UserLeave(UserLeave { user_id: "p1".into() })),
            &me(),
        );
        assert_eq!(r, Route::UserLeft("p1".into()));
    }

    #[test]
    fn ausgehende_und_unbekannte_typen() {
        let r = route(env(Message::AdminAuth(AdminAuth::mit_passwort("x".into()))), &me());
        assert_eq!(r, Route::Ignore(Verworfen::NurAusgehend("admin_auth")));
        assert_eq!(route(env(Message::Unknown), &me()), Route::Ignore(Verworfen::Unbekannt));
    }
}
