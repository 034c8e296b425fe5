//! # bingo-observability
//!
//! Observability-Crate fuer den Bingo-Live-Client:
//! - Structured Logging via tracing-subscriber (text oder JSON)
//! - Prometheus-kompatible Sitzungs-Metriken mit Textexport

pub mod logging;
pub mod metrics;

pub use logging::logging_initialisieren;
pub use metrics::SessionMetrics;
