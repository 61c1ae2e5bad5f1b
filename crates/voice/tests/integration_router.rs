//! Integrationstests fuer den PacketRouter
//!
//! Nebenlaeufigkeit zwischen Quellen, Consumer-Lebenszyklus und eine
//! vollstaendige Opus-Strecke mit FEC.

use audiopus::{coder::Encoder, Application, Channels, SampleRate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voicerecv_core::{Result, UserId};
use voicerecv_voice::config::VoiceEinstellungen;
use voicerecv_voice::{
    AudioEinheit, AudioSink, DecoderFabrik, IdentitaetsAufloeser, KanalSink, Paket, PacketRouter,
    SinkEreignis, SsrcVerzeichnis, StatefulDecoder, Verdeckung, VoiceRecvConfig,
};

// ---------------------------------------------------------------------------
// Hilfen
// ---------------------------------------------------------------------------

struct NullDecoder;

impl StatefulDecoder for NullDecoder {
    fn decode(&mut self, _payload: Option<&[u8]>, _fec: bool) -> Result<Vec<f32>> {
        Ok(vec![0.0; 4])
    }

    fn frame_laenge(&self) -> usize {
        4
    }
}

struct NullFabrik;

impl DecoderFabrik for NullFabrik {
    fn erstellen(&self) -> Result<Box<dyn StatefulDecoder>> {
        Ok(Box::new(NullDecoder))
    }
}

fn router(
    config: VoiceEinstellungen,
) -> (PacketRouter, SsrcVerzeichnis, mpsc::Receiver<SinkEreignis>) {
    let verzeichnis = SsrcVerzeichnis::neu();
    let (sink, rx) = KanalSink::neu(256);
    let router = PacketRouter::neu(
        config,
        Arc::new(NullFabrik) as Arc<dyn DecoderFabrik>,
        Arc::new(verzeichnis.clone()) as Arc<dyn IdentitaetsAufloeser>,
        Arc::new(sink) as Arc<dyn AudioSink>,
    );
    (router, verzeichnis, rx)
}

fn manuell(timeout_ms: u64) -> VoiceEinstellungen {
    VoiceEinstellungen {
        buffer_timeout_ms: timeout_ms,
        auto_consumer: false,
        ..VoiceEinstellungen::default()
    }
}

fn paket(ssrc: u32, seq: u16) -> Paket {
    Paket::neu(ssrc, seq, seq as u32 * 960, vec![0x42; 16])
}

async fn audio_sammeln(rx: &mut mpsc::Receiver<SinkEreignis>, anzahl: usize) -> Vec<AudioEinheit> {
    let mut einheiten = Vec::with_capacity(anzahl);
    while einheiten.len() < anzahl {
        match rx.recv().await {
            Some(SinkEreignis::Audio(e)) => einheiten.push(e),
            Some(_) => {}
            None => break,
        }
    }
    einheiten
}

// ---------------------------------------------------------------------------
// Nebenlaeufigkeit
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wartende_quelle_blockiert_andere_nicht() {
    let (router, _, mut rx) = router(manuell(500));

    // Beide Quellen laufen an, der Vorlauf liegt danach hinter ihnen
    router.on_packet(0xA, paket(0xA, 1)).unwrap();
    router.on_packet(0xB, paket(0xB, 1)).unwrap();
    let (a, b) = tokio::join!(router.drain(0xA), router.drain(0xB));
    assert!(a.unwrap() && b.unwrap());

    // Quelle A: 2 fehlt, 3 wartet -> drain haengt bis zum Timeout
    router.on_packet(0xA, paket(0xA, 3)).unwrap();

    let router_a = router.clone();
    let wartend = tokio::spawn(async move { router_a.drain(0xA).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Quelle B wird waehrenddessen sofort bedient
    router.on_packet(0xB, paket(0xB, 2)).unwrap();
    let b = tokio::time::timeout(Duration::from_millis(200), router.drain(0xB))
        .await
        .expect("Quelle B darf nicht auf Quelle A warten")
        .unwrap();
    assert!(b);
    assert!(!wartend.is_finished(), "Quelle A wartet noch auf Sequenz 2");

    // A liefert nach Ablauf die Verdeckung fuer Sequenz 2
    assert!(wartend.await.unwrap().unwrap());
    let einheiten = audio_sammeln(&mut rx, 4).await;
    let a_luecke = einheiten
        .iter()
        .find(|e| e.paket.ssrc == 0xA && e.paket.ist_fake())
        .expect("Verdeckung fuer Quelle A");
    assert_eq!(a_luecke.paket.sequence, 2);
    assert_eq!(a_luecke.art, Verdeckung::Fec { aus_sequence: 3 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn push_wartet_nicht_auf_laufendes_drain() {
    let (router, _, mut rx) = router(manuell(300));
    router.on_packet(0xC, paket(0xC, 10)).unwrap();
    assert!(router.drain(0xC).await.unwrap());

    // Leerer Buffer: drain haelt den Decoder und wartet
    let router_c = router.clone();
    let wartend = tokio::spawn(async move { router_c.drain(0xC).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Das Paket landet trotzdem sofort im Buffer und weckt den Consumer
    router.on_packet(0xC, paket(0xC, 11)).unwrap();
    let geliefert = tokio::time::timeout(Duration::from_millis(200), wartend)
        .await
        .expect("drain muss durch das neue Paket geweckt werden")
        .unwrap()
        .unwrap();
    assert!(geliefert);

    let einheiten = audio_sammeln(&mut rx, 2).await;
    assert_eq!(einheiten[1].paket.sequence, 11);
    assert!(!einheiten[1].paket.ist_fake());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn viele_quellen_parallel() {
    let (router, _, mut rx) = router(VoiceEinstellungen {
        buffer_timeout_ms: 200,
        ..VoiceEinstellungen::default()
    });

    let mut producer = Vec::new();
    for ssrc in 1..=8u32 {
        let r = router.clone();
        producer.push(tokio::spawn(async move {
            for seq in 0..20u16 {
                r.on_packet(ssrc, paket(ssrc, seq)).unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for p in producer {
        p.await.unwrap();
    }

    let einheiten = tokio::time::timeout(Duration::from_secs(5), audio_sammeln(&mut rx, 160))
        .await
        .expect("alle Einheiten muessen geliefert werden");

    // Pro Quelle streng aufsteigend und ohne Verdeckung
    for ssrc in 1..=8u32 {
        let seqs: Vec<u16> = einheiten
            .iter()
            .filter(|e| e.paket.ssrc == ssrc)
            .map(|e| e.paket.sequence)
            .collect();
        assert_eq!(seqs, (0..20).collect::<Vec<u16>>(), "Quelle {ssrc}");
    }

    for ssrc in router.quellen() {
        router.on_source_gone(ssrc).await;
    }
    assert_eq!(router.anzahl_quellen(), 0);
}

// ---------------------------------------------------------------------------
// Lebenszyklus
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn consumer_endet_mit_der_quelle() {
    let (router, verzeichnis, mut rx) = router(manuell(50));
    let uid = UserId::new();
    verzeichnis.registrieren(0xD, uid);

    router.on_packet(0xD, paket(0xD, 1)).unwrap();
    let consumer = router.consumer_starten(0xD).unwrap();

    let einheiten = audio_sammeln(&mut rx, 1).await;
    assert_eq!(einheiten[0].quelle, Some(uid));

    assert!(router.on_source_gone(0xD).await);
    tokio::time::timeout(Duration::from_secs(1), consumer)
        .await
        .expect("Consumer muss nach dem Entfernen enden")
        .unwrap();

    assert!(matches!(
        rx.recv().await,
        Some(SinkEreignis::QuelleEntfernt { ssrc: 0xD, handle: Some(h) }) if h == uid
    ));
    assert!(router.consumer_starten(0xD).is_err());
}

#[tokio::test(start_paused = true)]
async fn identitaet_wird_einmal_pro_quelle_aufgeloest() {
    struct Zaehler {
        uid: UserId,
        anfragen: std::sync::atomic::AtomicUsize,
    }

    impl IdentitaetsAufloeser for Zaehler {
        fn aufloesen(&self, _ssrc: u32) -> Option<UserId> {
            self.anfragen
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Some(self.uid)
        }
    }

    let zaehler = Arc::new(Zaehler {
        uid: UserId::new(),
        anfragen: Default::default(),
    });
    let (sink, mut rx) = KanalSink::neu(64);
    let router = PacketRouter::neu(
        manuell(50),
        Arc::new(NullFabrik),
        Arc::clone(&zaehler) as Arc<dyn IdentitaetsAufloeser>,
        Arc::new(sink),
    );

    for seq in 0..10u16 {
        router.on_packet(0xE, paket(0xE, seq)).unwrap();
    }
    for _ in 0..10 {
        router.drain(0xE).await.unwrap();
    }

    let einheiten = audio_sammeln(&mut rx, 10).await;
    assert!(einheiten.iter().all(|e| e.quelle == Some(zaehler.uid)));
    assert_eq!(
        zaehler.anfragen.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

// ---------------------------------------------------------------------------
// Opus-Strecke
// ---------------------------------------------------------------------------

fn opus_frames(anzahl: usize) -> Vec<Vec<u8>> {
    let mut encoder =
        Encoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Voip).unwrap();
    encoder.set_inband_fec(true).unwrap();
    // OPUS_SET_PACKET_LOSS_PERC_REQUEST, damit FEC-Daten mitkodiert werden
    encoder.set_encoder_ctl_request(4014, 20).unwrap();

    (0..anzahl)
        .map(|n| {
            let pcm: Vec<f32> = (0..1920)
                .map(|i| ((n * 1920 + i) as f32 * 0.01).sin() * 0.3)
                .collect();
            let mut ausgabe = vec![0u8; 4000];
            let laenge = encoder.encode_float(&pcm, &mut ausgabe).unwrap();
            ausgabe.truncate(laenge);
            ausgabe
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn opus_strecke_mit_verlust() {
    let mut config = VoiceRecvConfig::default();
    config.voice.auto_consumer = false;

    let (sink, mut rx) = KanalSink::neu(64);
    let router = PacketRouter::opus(
        &config,
        Arc::new(SsrcVerzeichnis::neu()),
        Arc::new(sink),
    );

    let frames = opus_frames(6);
    for (i, frame) in frames.iter().enumerate() {
        if i == 2 || i == 5 {
            continue; // Sequenz 2 geht verloren, 5 kommt nie
        }
        let seq = i as u16;
        router
            .on_packet(0xF, Paket::neu(0xF, seq, seq as u32 * 960, frame.clone()))
            .unwrap();
    }

    for _ in 0..5 {
        assert!(router.drain(0xF).await.unwrap());
    }
    // Danach ist nichts mehr gepuffert
    assert!(!router.drain(0xF).await.unwrap());

    let einheiten = audio_sammeln(&mut rx, 4).await;
    let arten: Vec<(u16, Verdeckung)> = einheiten
        .iter()
        .map(|e| (e.paket.sequence, e.art))
        .collect();
    assert_eq!(
        arten,
        vec![
            (0, Verdeckung::Original),
            (1, Verdeckung::Original),
            (2, Verdeckung::Fec { aus_sequence: 3 }),
            (3, Verdeckung::Original),
            (4, Verdeckung::Original),
        ]
    );
    assert!(einheiten.iter().all(|e| e.pcm.len() == 1920));
    assert_eq!(einheiten[2].paket.timestamp, 2 * 960);

    let statistik = router.statistik(0xF).await.unwrap();
    assert_eq!(statistik.fec_rekonstruiert, 1);
    assert_eq!(statistik.originale, 4);
}
