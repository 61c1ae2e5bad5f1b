//! Fehlertypen fuer voicerecv
//!
//! Paketverlust ist kein Fehler: Luecken werden in der Pipeline verdeckt und
//! nur gezaehlt. Als Fehler propagiert werden nur echte Codec-Verletzungen und
//! Lebenszyklus-Fehler (Zugriff auf einen zerstoerten Decoder).

use thiserror::Error;

/// Globaler Result-Alias fuer voicerecv
pub type Result<T> = std::result::Result<T, VoiceRecvError>;

/// Alle moeglichen Fehler der Empfangs-Pipeline
#[derive(Debug, Error)]
pub enum VoiceRecvError {
    // --- Codec ---
    #[error("Dekodierung fehlgeschlagen (ssrc={ssrc}, sequence={sequence}): {grund}")]
    Dekodierung {
        ssrc: u32,
        sequence: u16,
        grund: String,
    },

    #[error("Codec-Fehler: {0}")]
    Codec(String),

    // --- Lebenszyklus ---
    #[error("Decoder fuer ssrc={0} wurde bereits zerstoert")]
    DecoderZerstoert(u32),

    #[error("Keine Quelle mit ssrc={0} bekannt")]
    QuelleUnbekannt(u32),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl VoiceRecvError {
    /// Erstellt einen Codec-Fehler aus einer beliebigen Nachricht
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler nur eine einzelne Audio-Einheit betrifft
    ///
    /// Die Quelle bleibt in diesem Fall nutzbar, der naechste Pull-Zyklus
    /// kann normal fortfahren.
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::Dekodierung { .. } | Self::Codec(_))
    }
}
