//! bingo-core – Gemeinsame Typen
//!
//! Dieses Crate stellt die Identitaets- und Zustandstypen bereit, die von
//! allen anderen Bingo-Live-Crates gemeinsam genutzt werden.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{jetzt_ms, ConnectionState, Identity, UserId};
