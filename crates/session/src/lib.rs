//! bingo-session – Client-seitige Echtzeit-Sitzung
//!
//! Dieser Crate haelt die Verbindung eines Bingo-Clients zum Relay-Server
//! am Leben, verteilt eingehende Nachrichten und handelt Peer-to-Peer
//! Video-Verbindungen ueber den Relay aus.
//!
//! ## Architektur
//!
//! ```text
//! SessionManager (ein Orchestrator-Task)
//!     |
//!     +-- ControlChannel   (Verbindung, Reconnect-Backoff, Resend-Slot)
//!     |       |
//!     |       +-- Connector (WebSocket, TCP, In-Memory)
//!     |
//!     +-- Router           (Envelope -> Roster / Spiel / Auth / Signaling)
//!     |
//!     +-- PeerTable        (pro Peer ein Negotiation-Task)
//!     |       |
//!     |       +-- MediaBackend / PeerTransport
//!     |
//!     +-- AuthSession      (Admin-Handshake, Token-Cache)
//!     |
//!     +-- SessionObserver  (Callbacks an die UI-Schicht)
//! ```

pub mod auth;
pub mod channel;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod observer;
pub mod orchestrator;
pub mod peer;
pub mod reconnect;
pub mod router;
pub mod token_cache;
pub mod transport;

// Bequeme Re-Exporte
pub use auth::{AuthConfig, AuthSession, AuthState, Credential};
pub use channel::{spawn_channel, ChannelConfig, ChannelEvent, ChannelHandle};
pub use error::{SessionError, SessionResult};
pub use media::{
    LocalMedia, MediaBackend, MediaConstraints, MediaError, PeerConnectionState, PeerTransport,
    RemoteMedia, TrackKind, TransportEvent,
};
pub use negotiation::{EngineNotice, NegotiationContext, PeerCommand, PeerHandle};
pub use observer::{NullObserver, SessionObserver};
pub use orchestrator::{SessionConfig, SessionManager, SessionParts};
pub use peer::{CandidateDisposition, NegotiationState, PeerSession, PeerTable, Role};
pub use reconnect::{next_delay, ReconnectConfig, ReconnectDecision, ReconnectPolicy};
pub use router::{route, GameEvent, PeerSignal, Route, Verworfen};
pub use token_cache::TokenCache;
pub use transport::{Connector, Transport};
