//! Zustandsbehafteter Decoder – Trait und Opus-Implementierung
//!
//! Der Paket-Decoder kennt nur das [`StatefulDecoder`]-Trait. Die konkrete
//! Opus-Anbindung kapselt audiopus und liefert interleaved f32-PCM.
//!
//! Ein Decoder-Zustand wird nie zurueckgesetzt, sondern ueber die
//! [`DecoderFabrik`] komplett ersetzt, wenn er als veraltet gilt.

use audiopus::{coder::Decoder, Channels, SampleRate};
use tracing::debug;
use voicerecv_core::{Result, VoiceRecvError};

use crate::config::CodecEinstellungen;

/// Zustandsbehafteter Decode-Baustein einer einzelnen Quelle
///
/// `Send`, damit der Decoder zusammen mit seinem Consumer-Task zwischen
/// Worker-Threads wandern kann.
pub trait StatefulDecoder: Send {
    /// Dekodiert einen Frame
    ///
    /// - `Some(payload), fec = false`: regulaere Dekodierung
    /// - `Some(naechster), fec = true`: Rekonstruktion des *vorherigen*,
    ///   verlorenen Frames aus den FEC-Daten des Nachfolgers
    /// - `None`: Verdeckung ohne Eingabe (Decoder-PLC)
    fn decode(&mut self, payload: Option<&[u8]>, fec: bool) -> Result<Vec<f32>>;

    /// Anzahl interleaved Samples pro Frame (alle Kanaele)
    fn frame_laenge(&self) -> usize;
}

/// Erzeugt frische Decoder-Instanzen fuer neue oder zurueckgesetzte Quellen
pub trait DecoderFabrik: Send + Sync {
    /// Erstellt einen neuen Decoder ohne Vorgeschichte
    fn erstellen(&self) -> Result<Box<dyn StatefulDecoder>>;
}

// ---------------------------------------------------------------------------
// Opus
// ---------------------------------------------------------------------------

/// Opus-Decoder: dekodiert Opus-Bytes zu interleaved f32-PCM
pub struct OpusDecoder {
    decoder: Decoder,
    kanaele: usize,
    frame_size: usize,
}

impl OpusDecoder {
    /// Erstellt einen neuen Decoder
    ///
    /// `frame_size` ist die Frame-Dauer in Samples pro Kanal (960 = 20ms bei 48kHz).
    pub fn new(sample_rate: u32, kanaele: u8, frame_size: usize) -> Result<Self> {
        let sr = sample_rate_zu_audiopus(sample_rate)?;
        let ch = kanaele_zu_audiopus(kanaele)?;

        let decoder = Decoder::new(sr, ch).map_err(|e| VoiceRecvError::codec(e.to_string()))?;

        debug!(sample_rate, kanaele, frame_size, "OpusDecoder erstellt");

        Ok(Self {
            decoder,
            kanaele: kanaele as usize,
            frame_size,
        })
    }

    /// Erstellt einen Decoder aus den Codec-Einstellungen
    pub fn from_config(config: &CodecEinstellungen, frame_dauer: u32) -> Result<Self> {
        Self::new(config.sample_rate, config.kanaele, frame_dauer as usize)
    }

    /// Gibt die Kanalanzahl zurueck
    pub fn kanaele(&self) -> usize {
        self.kanaele
    }
}

impl StatefulDecoder for OpusDecoder {
    fn decode(&mut self, payload: Option<&[u8]>, fec: bool) -> Result<Vec<f32>> {
        let mut output = vec![0.0f32; self.frame_size * self.kanaele];
        let decoded = self
            .decoder
            .decode_float(payload, &mut output, fec)
            .map_err(|e| VoiceRecvError::codec(e.to_string()))?;

        output.truncate(decoded * self.kanaele);
        Ok(output)
    }

    fn frame_laenge(&self) -> usize {
        self.frame_size * self.kanaele
    }
}

/// Fabrik fuer Opus-Decoder mit fester Konfiguration
#[derive(Debug, Clone)]
pub struct OpusDecoderFabrik {
    config: CodecEinstellungen,
    frame_dauer: u32,
}

impl OpusDecoderFabrik {
    /// Erstellt eine Fabrik; `frame_dauer` in Samples pro Kanal
    pub fn neu(config: CodecEinstellungen, frame_dauer: u32) -> Self {
        Self {
            config,
            frame_dauer,
        }
    }
}

impl DecoderFabrik for OpusDecoderFabrik {
    fn erstellen(&self) -> Result<Box<dyn StatefulDecoder>> {
        Ok(Box::new(OpusDecoder::from_config(
            &self.config,
            self.frame_dauer,
        )?))
    }
}

// ---------------------------------------------------------------------------
// Konvertierungs-Hilfsfunktionen
// ---------------------------------------------------------------------------

fn sample_rate_zu_audiopus(rate: u32) -> Result<SampleRate> {
    match rate {
        8000 => Ok(SampleRate::Hz8000),
        12000 => Ok(SampleRate::Hz12000),
        16000 => Ok(SampleRate::Hz16000),
        24000 => Ok(SampleRate::Hz24000),
        48000 => Ok(SampleRate::Hz48000),
        andere => Err(VoiceRecvError::Konfiguration(format!(
            "Opus unterstuetzt keine Abtastrate von {andere} Hz"
        ))),
    }
}

fn kanaele_zu_audiopus(kanaele: u8) -> Result<Channels> {
    match kanaele {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        andere => Err(VoiceRecvError::Konfiguration(format!(
            "Opus unterstuetzt {andere} Kanaele nicht"
        ))),
    }
}
