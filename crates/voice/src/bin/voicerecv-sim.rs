//! voicerecv-sim – Simulierter Empfang mit Paketverlust
//!
//! Laedt die Konfiguration, initialisiert das Logging, kodiert einen Testton
//! mit Opus und speist ihn mit Verlust und Umordnung in den Router ein.
//! Am Ende werden die Prometheus-Metriken ausgegeben.
//!
//! Umgebung:
//! - `VOICERECV_CONFIG`: Pfad zur TOML-Konfiguration (Standard: voicerecv.toml)
//! - `VOICERECV_VERLUST`: jedes n-te Paket verwerfen (Standard: 7)

use anyhow::{Context, Result};
use audiopus::{coder::Encoder, Application, Channels, SampleRate};
use std::sync::Arc;
use voicerecv_core::UserId;
use voicerecv_observability::{logging_initialisieren, VoiceRecvMetrics};
use voicerecv_voice::{
    sink::SINK_QUEUE_GROESSE, KanalSink, OpusDecoderFabrik, Paket, PacketRouter, SinkEreignis,
    SsrcVerzeichnis, VoiceRecvConfig,
};

const SSRC: u32 = 0x5EED;
const FRAMES: usize = 100;
/// Pakete pro Einspeise-Block (gerade, damit vertauschte Paare zusammenbleiben)
const BLOCK: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad =
        std::env::var("VOICERECV_CONFIG").unwrap_or_else(|_| "voicerecv.toml".into());
    let mut config = VoiceRecvConfig::laden(&config_pfad)?;
    // Der Simulator leert die Quelle selbst
    config.voice.auto_consumer = false;

    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    let verlust_alle: usize = std::env::var("VOICERECV_VERLUST")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(7);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        verlust_alle,
        "voicerecv-sim startet"
    );

    let metriken = VoiceRecvMetrics::neu()?;
    let verzeichnis = SsrcVerzeichnis::neu();
    verzeichnis.registrieren(SSRC, UserId::new());
    let (sink, mut rx) = KanalSink::neu(SINK_QUEUE_GROESSE);

    let router = PacketRouter::mit_metriken(
        config.voice.clone(),
        Arc::new(OpusDecoderFabrik::neu(
            config.codec.clone(),
            config.voice.frame_dauer,
        )),
        Arc::new(verzeichnis),
        Arc::new(sink),
        metriken.clone(),
    );

    let frames = testton_kodieren(&config)?;

    // Paare vertauschen und jedes n-te Paket verwerfen
    let mut reihenfolge: Vec<usize> = (0..frames.len()).collect();
    for paar in reihenfolge.chunks_mut(2).step_by(5) {
        paar.reverse();
    }
    // Blockweise einspeisen, damit der Buffer nicht ueberlaeuft
    for block in reihenfolge.chunks(BLOCK) {
        for &i in block {
            if verlust_alle > 0 && i % verlust_alle == verlust_alle - 1 {
                continue;
            }
            let seq = i as u16;
            let ts = (i as u32).wrapping_mul(config.voice.frame_dauer);
            router.on_packet(SSRC, Paket::neu(SSRC, seq, ts, frames[i].clone()))?;
        }
        while router.drain(SSRC).await? {}
    }
    router.on_source_gone(SSRC).await;

    let mut samples = 0usize;
    let mut verdeckt = 0usize;
    while let Ok(ereignis) = rx.try_recv() {
        if let SinkEreignis::Audio(einheit) = ereignis {
            samples += einheit.pcm.len();
            if einheit.ist_verdeckt() {
                verdeckt += 1;
            }
        }
    }

    tracing::info!(samples, verdeckt, "Simulation beendet");
    println!("{}", metriken.exportieren()?);
    Ok(())
}

/// Kodiert einen 440-Hz-Ton in Opus-Frames
fn testton_kodieren(config: &VoiceRecvConfig) -> Result<Vec<Vec<u8>>> {
    let kanaele = config.codec.kanaele as usize;
    let frame = config.voice.frame_dauer as usize;
    let rate = match config.codec.sample_rate {
        8000 => SampleRate::Hz8000,
        12000 => SampleRate::Hz12000,
        16000 => SampleRate::Hz16000,
        24000 => SampleRate::Hz24000,
        _ => SampleRate::Hz48000,
    };
    let channels = if kanaele == 1 {
        Channels::Mono
    } else {
        Channels::Stereo
    };

    let mut encoder =
        Encoder::new(rate, channels, Application::Voip).context("Opus-Encoder")?;
    encoder.set_inband_fec(true).context("FEC aktivieren")?;
    // OPUS_SET_PACKET_LOSS_PERC_REQUEST
    encoder
        .set_encoder_ctl_request(4014, 15)
        .context("Verlustrate setzen")?;

    let schritt = 440.0 * std::f32::consts::TAU / config.codec.sample_rate as f32;
    let mut frames = Vec::with_capacity(FRAMES);
    for n in 0..FRAMES {
        let pcm: Vec<f32> = (0..frame * kanaele)
            .map(|i| ((n * frame + i / kanaele) as f32 * schritt).sin() * 0.3)
            .collect();
        let mut ausgabe = vec![0u8; 4000];
        let laenge = encoder
            .encode_float(&pcm, &mut ausgabe)
            .context("Opus-Kodierung")?;
        ausgabe.truncate(laenge);
        frames.push(ausgabe);
    }
    Ok(frames)
}
