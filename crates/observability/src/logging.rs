//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `VR_LOG_LEVEL`: Log-Level oder Filter-Direktive, Standard: info
//! - `VR_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Die Umgebung hat Vorrang vor den uebergebenen Werten aus der Konfiguration.
//! Die Pruefungen `log_level_gueltig` und `log_format_gueltig` nutzt auch die
//! Konfigurations-Validierung.

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Level
pub const LOG_LEVEL_ENV: &str = "VR_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const LOG_FORMAT_ENV: &str = "VR_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Liest `VR_LOG_LEVEL` und `VR_LOG_FORMAT` aus der Umgebung, sonst `level`
/// und `format`. Schlaegt fehl bei unbekanntem Format oder wenn bereits ein
/// globaler Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> anyhow::Result<()> {
    let format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| format.to_string());
    if !log_format_gueltig(&format) {
        anyhow::bail!("Unbekanntes Log-Format: {format}");
    }

    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let ergebnis = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    ergebnis.map_err(|e| anyhow::anyhow!("Logging konnte nicht initialisiert werden: {e}"))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
