//! voicerecv-voice – Empfangs-Pipeline fuer Sprach-Pakete
//!
//! Pro entfernter Quelle (SSRC) ein Jitter Buffer und ein zustandsbehafteter
//! Decoder. Verlorene Pakete werden per FEC oder Decoder-PLC verdeckt, damit
//! der Audio-Strom lueckenlos bleibt.
//!
//! ## Module
//! - [`paket`] – Empfangene Pakete und fertige Audio-Einheiten
//! - [`jitter_buffer`] – Umordnung nach Sequenz mit begrenzter Wartezeit
//! - [`codec`] – Decoder-Trait und Opus-Anbindung
//! - [`decoder`] – Paket-Decoder einer Quelle (Verlustverdeckung)
//! - [`router`] – Verteilung auf Quellen und Lebenszyklus
//! - [`sink`] – Schnittstellen zu Sink und Identitaets-Aufloeser
//! - [`verzeichnis`] – SSRC-Verzeichnis
//! - [`config`] – TOML-Konfiguration

pub mod codec;
pub mod config;
pub mod decoder;
pub mod jitter_buffer;
pub mod paket;
pub mod router;
pub mod sink;
pub mod verzeichnis;

pub use codec::{DecoderFabrik, OpusDecoder, OpusDecoderFabrik, StatefulDecoder};
pub use config::VoiceRecvConfig;
pub use decoder::PacketDecoder;
pub use jitter_buffer::JitterBuffer;
pub use paket::{AudioEinheit, Paket, Verdeckung};
pub use router::PacketRouter;
pub use sink::{AudioSink, IdentitaetsAufloeser, KanalSink, SinkEreignis};
pub use verzeichnis::SsrcVerzeichnis;
