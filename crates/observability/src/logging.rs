//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `BINGO_LOG_LEVEL`: Filter-Ausdruck (z.B. `info` oder `bingo_session=debug`), Standard: info
//! - `BINGO_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Umgebungsvariablen haben Vorrang vor den Werten aus der Konfigurationsdatei.

use tracing_subscriber::{fmt, EnvFilter};

/// Name der Umgebungsvariable fuer den Log-Filter
pub const ENV_LOG_LEVEL: &str = "BINGO_LOG_LEVEL";

/// Name der Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "BINGO_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Gibt `false` zurueck wenn bereits ein globaler Subscriber gesetzt war
/// (z.B. in Tests, die mehrfach initialisieren).
pub fn logging_initialisieren(level: &str, format: &str) -> bool {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| format.to_string());

    let ergebnis = match format_env.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    ergebnis.is_ok()
}

/// Prueft ob ein Filter-Ausdruck (z.B. `info` oder `bingo_session=debug`)
/// von `EnvFilter` akzeptiert wird.
pub fn log_filter_gueltig(filter: &str) -> bool {
    EnvFilter::try_new(filter).is_ok()
}

/// Prueft ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
