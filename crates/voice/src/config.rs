//! Konfiguration der Empfangs-Pipeline
//!
//! Wird aus einer TOML-Datei geladen. Alle Felder haben sinnvolle
//! Standardwerte, sodass die Pipeline ohne Konfigurationsdatei lauffaehig ist.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use voicerecv_core::{Result, VoiceRecvError};
use voicerecv_observability::logging::{log_format_gueltig, log_level_gueltig};

use crate::jitter_buffer::{JitterBufferConfig, BUFFER_TIMEOUT};

/// Vollstaendige Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceRecvConfig {
    /// Jitter-Buffer- und Decoder-Einstellungen
    pub voice: VoiceEinstellungen,
    /// Opus-Parameter
    pub codec: CodecEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Jitter-Buffer- und Decoder-Einstellungen pro Quelle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceEinstellungen {
    /// Maximale Wartezeit auf ein fehlendes Paket in ms
    pub buffer_timeout_ms: u64,
    /// Codec-Ticks pro Frame (Zeitstempel-Abstand fuer Fake-Pakete)
    pub frame_dauer: u32,
    /// PCM dekodieren (`true`) oder nur Opus-Bytes durchreichen (`false`)
    pub dekodiert: bool,
    /// Maximale Anzahl gepufferter Pakete pro Quelle
    pub max_pakete: usize,
    /// Aufeinanderfolgende Dekodierfehler, nach denen der Decoder ersetzt wird
    pub max_dekodier_fehler: u32,
    /// Fuer jede neue Quelle automatisch einen Consumer-Task starten
    pub auto_consumer: bool,
}

impl Default for VoiceEinstellungen {
    fn default() -> Self {
        Self {
            buffer_timeout_ms: BUFFER_TIMEOUT.as_millis() as u64,
            frame_dauer: 960,
            dekodiert: true,
            max_pakete: 50,
            max_dekodier_fehler: 3,
            auto_consumer: true,
        }
    }
}

impl VoiceEinstellungen {
    /// Wartezeit als `Duration`
    pub fn buffer_timeout(&self) -> Duration {
        Duration::from_millis(self.buffer_timeout_ms)
    }

    /// Abgeleitete Jitter-Buffer-Konfiguration
    pub fn jitter_buffer(&self) -> JitterBufferConfig {
        JitterBufferConfig {
            max_pakete: self.max_pakete,
        }
    }
}

/// Opus-Parameter des Decoders
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecEinstellungen {
    /// Abtastrate in Hz (8000, 12000, 16000, 24000, 48000)
    pub sample_rate: u32,
    /// Kanalanzahl (1 oder 2)
    pub kanaele: u8,
}

impl Default for CodecEinstellungen {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            kanaele: 2,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl VoiceRecvConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft die Werte auf Plausibilitaet
    pub fn validieren(&self) -> Result<()> {
        if self.voice.buffer_timeout_ms == 0 {
            return Err(VoiceRecvError::Konfiguration(
                "buffer_timeout_ms muss groesser als 0 sein".into(),
            ));
        }
        if self.voice.frame_dauer == 0 {
            return Err(VoiceRecvError::Konfiguration(
                "frame_dauer muss groesser als 0 sein".into(),
            ));
        }
        if self.voice.max_pakete < 2 {
            return Err(VoiceRecvError::Konfiguration(
                "max_pakete muss mindestens 2 sein (Lookahead fuer FEC)".into(),
            ));
        }
        if self.voice.max_dekodier_fehler == 0 {
            return Err(VoiceRecvError::Konfiguration(
                "max_dekodier_fehler muss mindestens 1 sein".into(),
            ));
        }
        if !matches!(self.codec.sample_rate, 8000 | 12000 | 16000 | 24000 | 48000) {
            return Err(VoiceRecvError::Konfiguration(format!(
                "Ungueltige Abtastrate: {}",
                self.codec.sample_rate
            )));
        }
        if !matches!(self.codec.kanaele, 1 | 2) {
            return Err(VoiceRecvError::Konfiguration(format!(
                "Ungueltige Kanalanzahl: {}",
                self.codec.kanaele
            )));
        }
        if !log_level_gueltig(&self.logging.level) {
            return Err(VoiceRecvError::Konfiguration(format!(
                "Ungueltiger Log-Level: {}",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(VoiceRecvError::Konfiguration(format!(
                "Ungueltiges Log-Format: {}",
                self.logging.format
            )));
        }
        Ok(())
    }
}
