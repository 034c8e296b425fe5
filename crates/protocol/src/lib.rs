//! bingo-protocol – Nachrichten des Control Channels
//!
//! Definiert das Envelope-Format zwischen Client und Relay sowie den
//! Frame-Codec fuer den TCP-Transport. Der WebSocket-Transport nutzt
//! dieselben Envelopes als Text-Frames.

pub mod envelope;
pub mod wire;

pub use envelope::{
    AdminAuth, AdminCommand, AdminCommandKind, AuthResponse, Broadcast, Decoded, Envelope,
    GameState, IceCandidate, IceCandidateRelay, Message, NumberCalled, RosterEntry, RtcAnswer,
    RtcOffer, SdpKind, SessionDescription, UserJoin, UserLeave, UserList, Winner,
    WinnerAnnounced,
};
pub use wire::{FrameCodec, WireError};
