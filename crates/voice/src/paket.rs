//! Paket- und Einheiten-Modell der Empfangs-Pipeline
//!
//! Ein [`Paket`] ist entweder ein echtes, bereits entschluesseltes Opus-Paket
//! oder ein synthetisiertes Fake-Paket (ohne Nutzdaten), das eine Luecke im
//! Sequenzraum fuellt. Eine [`AudioEinheit`] ist das, was am Ende an den Sink
//! geht.

use bytes::Bytes;
use voicerecv_core::UserId;

// ---------------------------------------------------------------------------
// Paket
// ---------------------------------------------------------------------------

/// Empfangenes oder synthetisiertes Audio-Paket einer Quelle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paket {
    /// Synchronisation Source – Transport-Kennung des Sprechers
    pub ssrc: u32,
    /// Sequenznummer (16 Bit, zyklisch)
    pub sequence: u16,
    /// Zeitstempel in Codec-Ticks (32 Bit, zyklisch)
    pub timestamp: u32,
    /// Entschluesselte Opus-Bytes; `None` bei Fake-Paketen
    pub payload: Option<Bytes>,
}

impl Paket {
    /// Erstellt ein echtes Paket mit Nutzdaten
    pub fn neu(ssrc: u32, sequence: u16, timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            ssrc,
            sequence,
            timestamp,
            payload: Some(payload.into()),
        }
    }

    /// Erstellt ein Fake-Paket fuer eine Luecke
    pub fn fake(ssrc: u32, sequence: u16, timestamp: u32) -> Self {
        Self {
            ssrc,
            sequence,
            timestamp,
            payload: None,
        }
    }

    /// Prueft ob das Paket synthetisiert wurde (nie wirklich angekommen)
    pub fn ist_fake(&self) -> bool {
        self.payload.is_none()
    }

    /// Opus-Nutzdaten, falls vorhanden
    pub fn opus(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }
}

// ---------------------------------------------------------------------------
// AudioEinheit
// ---------------------------------------------------------------------------

/// Wie der PCM-Inhalt einer Einheit zustande kam
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdeckung {
    /// Regulaer dekodiertes Original-Paket
    Original,
    /// Verlorenes Paket aus den FEC-Daten des Nachfolgers rekonstruiert
    Fec {
        /// Sequenznummer des Nachfolgers, dessen Daten verwendet wurden
        aus_sequence: u16,
    },
    /// Kein Nachfolger verfuegbar – Decoder-PLC ohne Eingabe
    Stille,
    /// Passthrough-Modus: keine Dekodierung, nur Opus-Bytes
    Durchgereicht,
}

/// Fertige Einheit fuer den Sink
#[derive(Debug, Clone)]
pub struct AudioEinheit {
    /// Das erzeugte Paket (echt oder Fake)
    pub paket: Paket,
    /// Aufgeloeste Sprecher-Identitaet, `None` wenn der Lookup fehlschlug
    pub quelle: Option<UserId>,
    /// Interleaved f32-PCM; leer im Passthrough-Modus
    pub pcm: Vec<f32>,
    /// Herkunft des PCM-Inhalts
    pub art: Verdeckung,
}

impl AudioEinheit {
    /// Opus-Bytes des zugrundeliegenden Pakets
    pub fn opus(&self) -> Option<&[u8]> {
        self.paket.opus()
    }

    /// Prueft ob diese Einheit einen Verlust verdeckt
    pub fn ist_verdeckt(&self) -> bool {
        matches!(self.art, Verdeckung::Fec { .. } | Verdeckung::Stille)
    }
}
