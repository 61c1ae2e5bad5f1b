//! Paket-Router – Verteilung empfangener Pakete auf Quellen
//!
//! Der `PacketRouter` haelt pro SSRC einen [`PacketDecoder`] und liefert die
//! fertigen Einheiten an den [`AudioSink`].
//!
//! ## Nebenlaeufigkeit
//! - DashMap fuer die Quellen-Tabelle; Slots werden als `Arc` herausgeklont,
//!   ueber ein `await` wird nie ein Shard-Lock gehalten
//! - `on_packet` schreibt direkt in den geteilten Jitter Buffer und wartet nie
//!   auf den Consumer der Quelle
//! - Der Decoder jeder Quelle liegt hinter einem eigenen async Mutex; eine
//!   wartende Quelle blockiert keine andere
//! - Einheiten werden unter diesem Mutex an den Sink gegeben, damit die
//!   Reihenfolge pro Quelle erhalten bleibt

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use voicerecv_core::{Result, UserId, VoiceRecvError};
use voicerecv_observability::VoiceRecvMetrics;

use crate::codec::{DecoderFabrik, OpusDecoderFabrik};
use crate::config::{VoiceEinstellungen, VoiceRecvConfig};
use crate::decoder::{DecoderStatistik, PacketDecoder};
use crate::jitter_buffer::{JitterBuffer, JitterBufferStatistik, PushErgebnis};
use crate::paket::{AudioEinheit, Paket, Verdeckung};
use crate::sink::{AudioSink, IdentitaetsAufloeser};

// ---------------------------------------------------------------------------
// Quellen-Slot
// ---------------------------------------------------------------------------

/// Zustand einer Quelle: geteilter Buffer + exklusiv genutzter Decoder
struct QuellenSlot {
    /// Producer-Seite, ohne den Decoder-Mutex erreichbar
    puffer: Arc<JitterBuffer>,
    decoder: Mutex<PacketDecoder>,
}

// ---------------------------------------------------------------------------
// PacketRouter
// ---------------------------------------------------------------------------

/// Zentraler Router fuer alle empfangenen Quellen
///
/// Thread-safe und `Clone`-faehig (innerer Arc).
#[derive(Clone)]
pub struct PacketRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    /// Aktive Quellen, indexiert nach SSRC
    quellen: DashMap<u32, Arc<QuellenSlot>>,
    config: VoiceEinstellungen,
    fabrik: Arc<dyn DecoderFabrik>,
    aufloeser: Arc<dyn IdentitaetsAufloeser>,
    sink: Arc<dyn AudioSink>,
    metriken: Option<VoiceRecvMetrics>,
}

impl PacketRouter {
    /// Erstellt einen neuen Router ohne Metriken
    pub fn neu(
        config: VoiceEinstellungen,
        fabrik: Arc<dyn DecoderFabrik>,
        aufloeser: Arc<dyn IdentitaetsAufloeser>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self::erstellen(config, fabrik, aufloeser, sink, None)
    }

    /// Erstellt einen Router, der die uebergebenen Metriken fortschreibt
    pub fn mit_metriken(
        config: VoiceEinstellungen,
        fabrik: Arc<dyn DecoderFabrik>,
        aufloeser: Arc<dyn IdentitaetsAufloeser>,
        sink: Arc<dyn AudioSink>,
        metriken: VoiceRecvMetrics,
    ) -> Self {
        Self::erstellen(config, fabrik, aufloeser, sink, Some(metriken))
    }

    /// Erstellt einen Router mit Opus-Decodern aus der Gesamtkonfiguration
    pub fn opus(
        config: &VoiceRecvConfig,
        aufloeser: Arc<dyn IdentitaetsAufloeser>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        let fabrik = OpusDecoderFabrik::neu(config.codec.clone(), config.voice.frame_dauer);
        Self::neu(config.voice.clone(), Arc::new(fabrik), aufloeser, sink)
    }

    fn erstellen(
        config: VoiceEinstellungen,
        fabrik: Arc<dyn DecoderFabrik>,
        aufloeser: Arc<dyn IdentitaetsAufloeser>,
        sink: Arc<dyn AudioSink>,
        metriken: Option<VoiceRecvMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                quellen: DashMap::new(),
                config,
                fabrik,
                aufloeser,
                sink,
                metriken,
            }),
        }
    }

    /// Nimmt ein empfangenes Paket entgegen
    ///
    /// Legt die Quelle bei Bedarf an. Blockiert nie: das Paket landet direkt
    /// im Jitter Buffer, auch wenn gerade ein Consumer auf die Quelle wartet.
    /// Massgeblich fuer die Zuordnung ist `ssrc`, nicht `paket.ssrc`.
    /// Bei vollem Buffer verdraengte Pakete zaehlen als verloren.
    pub fn on_packet(&self, ssrc: u32, paket: Paket) -> Result<()> {
        let slot = self.slot_holen_oder_erstellen(ssrc)?;
        if let PushErgebnis::Ueberlauf { verloren } = slot.puffer.push(paket) {
            if let Some(m) = &self.inner.metriken {
                m.verloren_total.inc_by(verloren);
            }
        }
        Ok(())
    }

    /// Holt die naechste Einheit einer Quelle und gibt sie an den Sink
    ///
    /// Gibt `Ok(true)` zurueck wenn eine Einheit geliefert wurde, `Ok(false)`
    /// wenn nichts gepuffert war. Dekodierfehler werden gezaehlt und an den
    /// Aufrufer weitergegeben; die Quelle bleibt nutzbar.
    pub async fn drain(&self, ssrc: u32) -> Result<bool> {
        let slot = self
            .slot(ssrc)
            .ok_or(VoiceRecvError::QuelleUnbekannt(ssrc))?;
        self.slot_leeren(&slot).await
    }

    /// Entfernt eine Quelle endgueltig
    ///
    /// Restliche Pakete werden noch dekodiert und geliefert, danach wird der
    /// Decoder zerstoert und der Sink benachrichtigt. Mehrfacher Aufruf ist
    /// unschaedlich. Gibt zurueck ob die Quelle bekannt war.
    pub async fn on_source_gone(&self, ssrc: u32) -> bool {
        let Some((_, slot)) = self.inner.quellen.remove(&ssrc) else {
            tracing::debug!(ssrc, "Quelle bereits entfernt");
            return false;
        };

        // Wartet hoechstens bis ein laufendes pop des Consumers endet
        let mut decoder = slot.decoder.lock().await;
        match decoder.flush() {
            Ok(abschluss) => {
                if let Some(m) = &self.inner.metriken {
                    m.verloren_total.inc_by(abschluss.verloren);
                    m.dekodierfehler_total.inc_by(abschluss.fehler.len() as u64);
                }
                for fehler in &abschluss.fehler {
                    tracing::warn!(ssrc, fehler = %fehler, "Dekodierfehler beim Abschluss");
                }
                for einheit in abschluss.einheiten {
                    self.ausliefern(einheit);
                }
            }
            Err(e) => {
                tracing::warn!(ssrc, fehler = %e, "Abschluss der Quelle fehlgeschlagen");
            }
        }
        let handle = decoder.handle();
        let statistik = decoder.statistik().clone();
        decoder.zerstoeren();
        drop(decoder);

        if let Some(m) = &self.inner.metriken {
            m.aktive_quellen.dec();
            m.verlust_rate.observe(statistik.verlust_rate());
        }
        self.inner.sink.quelle_entfernt(ssrc, handle);

        tracing::info!(
            ssrc,
            originale = statistik.originale,
            verdeckt = statistik.fake_pakete,
            "Quelle entfernt"
        );
        true
    }

    /// Ein Sprecher beginnt ein neues Segment
    ///
    /// Legt die Quelle an, hinterlegt die Identitaet und reicht das Ereignis
    /// an den Sink weiter. Zurueckgesetzt wird nur, wenn die Quelle schon
    /// Einheiten geliefert hat; vorher gepufferte Pakete gehoeren bereits zum
    /// neuen Segment.
    pub async fn sprechen_start(&self, ssrc: u32, handle: UserId) -> Result<()> {
        let (slot, neu) = self.slot_anlegen(ssrc)?;
        {
            let mut decoder = slot.decoder.lock().await;
            if !neu && decoder.segment_begonnen() {
                decoder.reset()?;
            }
            decoder.handle_setzen(handle);
        }
        tracing::debug!(ssrc, user_id = %handle, "Sprechen gestartet");
        self.inner.sink.sprechen_start(handle);
        Ok(())
    }

    /// Ein Sprecher beendet sein Segment
    ///
    /// Ohne bekannte Identitaet wird das Ereignis nicht weitergereicht.
    pub async fn sprechen_stopp(&self, ssrc: u32) {
        let zwischengespeichert = match self.slot(ssrc) {
            Some(slot) => slot.decoder.lock().await.handle(),
            None => None,
        };
        match zwischengespeichert.or_else(|| self.inner.aufloeser.aufloesen(ssrc)) {
            Some(handle) => {
                tracing::debug!(ssrc, user_id = %handle, "Sprechen beendet");
                self.inner.sink.sprechen_stopp(handle);
            }
            None => tracing::debug!(ssrc, "Sprech-Ende fuer unbekannte Quelle"),
        }
    }

    /// Startet einen Consumer-Task fuer eine Quelle
    ///
    /// Der Task leert die Quelle fortlaufend und endet, sobald sie entfernt
    /// wurde. Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn consumer_starten(&self, ssrc: u32) -> Result<JoinHandle<()>> {
        let slot = self
            .slot(ssrc)
            .ok_or(VoiceRecvError::QuelleUnbekannt(ssrc))?;
        Ok(tokio::spawn(self.clone().consumer(ssrc, slot)))
    }

    /// Momentaufnahme aller aktiven SSRCs
    pub fn quellen(&self) -> Vec<u32> {
        self.inner.quellen.iter().map(|e| *e.key()).collect()
    }

    /// Prueft ob eine Quelle aktiv ist
    pub fn quelle_aktiv(&self, ssrc: u32) -> bool {
        self.inner.quellen.contains_key(&ssrc)
    }

    /// Anzahl aktiver Quellen
    pub fn anzahl_quellen(&self) -> usize {
        self.inner.quellen.len()
    }

    /// Decoder-Statistiken einer Quelle
    pub async fn statistik(&self, ssrc: u32) -> Option<DecoderStatistik> {
        let slot = self.slot(ssrc)?;
        let decoder = slot.decoder.lock().await;
        Some(decoder.statistik().clone())
    }

    /// Jitter-Buffer-Statistiken einer Quelle (ohne auf den Decoder zu warten)
    pub fn puffer_statistik(&self, ssrc: u32) -> Option<JitterBufferStatistik> {
        self.slot(ssrc).map(|s| s.puffer.statistik())
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn slot(&self, ssrc: u32) -> Option<Arc<QuellenSlot>> {
        self.inner.quellen.get(&ssrc).map(|r| Arc::clone(r.value()))
    }

    fn slot_holen_oder_erstellen(&self, ssrc: u32) -> Result<Arc<QuellenSlot>> {
        match self.slot(ssrc) {
            Some(slot) => Ok(slot),
            None => self.slot_anlegen(ssrc).map(|(slot, _)| slot),
        }
    }

    /// Legt die Quelle an, falls sie fehlt; `true` wenn neu angelegt
    fn slot_anlegen(&self, ssrc: u32) -> Result<(Arc<QuellenSlot>, bool)> {
        if let Some(slot) = self.slot(ssrc) {
            return Ok((slot, false));
        }

        let decoder = PacketDecoder::neu(
            ssrc,
            &self.inner.config,
            Arc::clone(&self.inner.fabrik),
            Arc::clone(&self.inner.aufloeser),
        )?;
        let neuer_slot = Arc::new(QuellenSlot {
            puffer: decoder.puffer(),
            decoder: Mutex::new(decoder),
        });

        let slot = match self.inner.quellen.entry(ssrc) {
            // Gleichzeitig von einem anderen Producer angelegt
            Entry::Occupied(e) => return Ok((Arc::clone(e.get()), false)),
            Entry::Vacant(e) => Arc::clone(e.insert(neuer_slot).value()),
        };

        if let Some(m) = &self.inner.metriken {
            m.aktive_quellen.inc();
        }
        tracing::info!(ssrc, "Neue Quelle");

        if self.inner.config.auto_consumer {
            match tokio::runtime::Handle::try_current() {
                Ok(rt) => {
                    rt.spawn(self.clone().consumer(ssrc, Arc::clone(&slot)));
                }
                Err(_) => {
                    tracing::warn!(ssrc, "Keine tokio-Runtime, Consumer nicht gestartet");
                }
            }
        }

        Ok((slot, true))
    }

    async fn consumer(self, ssrc: u32, slot: Arc<QuellenSlot>) {
        tracing::debug!(ssrc, "Consumer gestartet");
        loop {
            match self.slot_leeren(&slot).await {
                Ok(_) => {}
                Err(VoiceRecvError::DecoderZerstoert(_)) => break,
                Err(e) if e.ist_wiederholbar() => {}
                Err(e) => {
                    tracing::error!(ssrc, fehler = %e, "Consumer abgebrochen");
                    break;
                }
            }
        }
        tracing::debug!(ssrc, "Consumer beendet");
    }

    async fn slot_leeren(&self, slot: &QuellenSlot) -> Result<bool> {
        let mut decoder = slot.decoder.lock().await;
        match decoder.pop_daten(self.inner.config.buffer_timeout()).await {
            Ok(Some(einheit)) => {
                self.ausliefern(einheit);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                if let (VoiceRecvError::Dekodierung { .. }, Some(m)) = (&e, &self.inner.metriken) {
                    m.dekodierfehler_total.inc();
                }
                Err(e)
            }
        }
    }

    fn ausliefern(&self, einheit: AudioEinheit) {
        if let Some(m) = &self.inner.metriken {
            m.einheiten_total.inc();
            match einheit.art {
                Verdeckung::Fec { .. } => m.fec_total.inc(),
                Verdeckung::Stille => m.stille_total.inc(),
                Verdeckung::Original | Verdeckung::Durchgereicht => {}
            }
            if einheit.paket.ist_fake() {
                m.verloren_total.inc();
            }
        }
        self.inner.sink.schreiben(einheit);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StatefulDecoder;
    use crate::sink::{KanalSink, SinkEreignis};
    use crate::verzeichnis::SsrcVerzeichnis;
    use tokio::sync::mpsc;

    /// Decoder, der die Payload-Laenge als einzelnes Sample liefert
    struct LaengenDecoder;

    impl StatefulDecoder for LaengenDecoder {
        fn decode(&mut self, payload: Option<&[u8]>, _fec: bool) -> Result<Vec<f32>> {
            Ok(vec![payload.map(|p| p.len()).unwrap_or(0) as f32])
        }

        fn frame_laenge(&self) -> usize {
            1
        }
    }

    struct LaengenFabrik;

    impl DecoderFabrik for LaengenFabrik {
        fn erstellen(&self) -> Result<Box<dyn StatefulDecoder>> {
            Ok(Box::new(LaengenDecoder))
        }
    }

    fn manuell() -> VoiceEinstellungen {
        VoiceEinstellungen {
            auto_consumer: false,
            ..VoiceEinstellungen::default()
        }
    }

    fn router_mit(
        config: VoiceEinstellungen,
        metriken: Option<VoiceRecvMetrics>,
    ) -> (PacketRouter, SsrcVerzeichnis, mpsc::Receiver<SinkEreignis>) {
        let verzeichnis = SsrcVerzeichnis::neu();
        let (sink, rx) = KanalSink::neu(64);
        let fabrik: Arc<dyn DecoderFabrik> = Arc::new(LaengenFabrik);
        let aufloeser: Arc<dyn IdentitaetsAufloeser> = Arc::new(verzeichnis.clone());
        let sink: Arc<dyn AudioSink> = Arc::new(sink);
        let router = match metriken {
            Some(m) => PacketRouter::mit_metriken(config, fabrik, aufloeser, sink, m),
            None => PacketRouter::neu(config, fabrik, aufloeser, sink),
        };
        (router, verzeichnis, rx)
    }

    fn paket(ssrc: u32, seq: u16) -> Paket {
        Paket::neu(ssrc, seq, seq as u32 * 960, vec![0xAB; 10])
    }

    fn audio(rx: &mut mpsc::Receiver<SinkEreignis>) -> AudioEinheit {
        match rx.try_recv() {
            Ok(SinkEreignis::Audio(einheit)) => einheit,
            anderes => panic!("Audio erwartet, erhalten: {anderes:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn paket_legt_quelle_an_und_wird_geliefert() {
        let (router, verzeichnis, mut rx) = router_mit(manuell(), None);
        let uid = UserId::new();
        verzeichnis.registrieren(0x1111, uid);

        router.on_packet(0x1111, paket(0x1111, 1)).unwrap();
        assert!(router.quelle_aktiv(0x1111));
        assert_eq!(router.anzahl_quellen(), 1);

        assert!(router.drain(0x1111).await.unwrap());
        let einheit = audio(&mut rx);
        assert_eq!(einheit.paket.sequence, 1);
        assert_eq!(einheit.quelle, Some(uid));
        assert_eq!(einheit.pcm, vec![10.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_ohne_daten_liefert_false() {
        let (router, _, mut rx) = router_mit(manuell(), None);
        router.on_packet(7, paket(7, 1)).unwrap();
        assert!(router.drain(7).await.unwrap());
        audio(&mut rx);

        assert!(!router.drain(7).await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_unbekannte_quelle() {
        let (router, _, _rx) = router_mit(manuell(), None);
        assert!(matches!(
            router.drain(99).await,
            Err(VoiceRecvError::QuelleUnbekannt(99))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn quelle_entfernen_liefert_rest_und_ist_idempotent() {
        let (router, verzeichnis, mut rx) = router_mit(manuell(), None);
        let uid = UserId::new();
        verzeichnis.registrieren(5, uid);

        for seq in [5u16, 9, 7] {
            router.on_packet(5, paket(5, seq)).unwrap();
        }
        assert!(router.on_source_gone(5).await);
        assert!(!router.on_source_gone(5).await);

        let seqs: Vec<u16> = (0..3).map(|_| audio(&mut rx).paket.sequence).collect();
        assert_eq!(seqs, vec![5, 7, 9]);
        assert!(matches!(
            rx.try_recv(),
            Ok(SinkEreignis::QuelleEntfernt { ssrc: 5, handle: Some(h) }) if h == uid
        ));
        assert!(rx.try_recv().is_err(), "Nur eine Entfernungs-Meldung");
        assert!(!router.quelle_aktiv(5));
        assert!(router.drain(5).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn sprechen_start_setzt_quelle_zurueck() {
        let (router, _, mut rx) = router_mit(manuell(), None);
        let uid = UserId::new();

        router.on_packet(3, paket(3, 400)).unwrap();
        router.drain(3).await.unwrap();
        audio(&mut rx);
        router.on_packet(3, paket(3, 402)).unwrap();

        router.sprechen_start(3, uid).await.unwrap();
        assert!(matches!(rx.try_recv(), Ok(SinkEreignis::SprechenStart(h)) if h == uid));

        let statistik = router.puffer_statistik(3).unwrap();
        assert_eq!(statistik.fuellstand, 0, "Reset leert den Buffer");

        // Neues Segment beginnt bei 0; die Identitaet kommt aus dem Speaking-Event
        router.on_packet(3, paket(3, 0)).unwrap();
        router.drain(3).await.unwrap();
        let einheit = audio(&mut rx);
        assert_eq!(einheit.paket.sequence, 0);
        assert_eq!(einheit.quelle, Some(uid));

        router.sprechen_stopp(3).await;
        assert!(matches!(rx.try_recv(), Ok(SinkEreignis::SprechenStopp(h)) if h == uid));
    }

    #[tokio::test(start_paused = true)]
    async fn sprechen_start_behaelt_gepufferte_pakete() {
        let (router, _, mut rx) = router_mit(manuell(), None);
        let uid = UserId::new();

        // Pakete ueberholen das Speaking-Event
        router.on_packet(6, paket(6, 0)).unwrap();
        router.on_packet(6, paket(6, 1)).unwrap();
        router.sprechen_start(6, uid).await.unwrap();
        assert!(matches!(rx.try_recv(), Ok(SinkEreignis::SprechenStart(h)) if h == uid));
        assert_eq!(router.puffer_statistik(6).unwrap().fuellstand, 2);

        for erwartet in [0u16, 1] {
            assert!(router.drain(6).await.unwrap());
            let einheit = audio(&mut rx);
            assert_eq!(einheit.paket.sequence, erwartet);
            assert!(!einheit.paket.ist_fake());
            assert_eq!(einheit.quelle, Some(uid));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ueberlauf_zaehlt_als_verlust() {
        let metriken = VoiceRecvMetrics::neu().unwrap();
        let config = VoiceEinstellungen {
            max_pakete: 2,
            ..manuell()
        };
        let (router, _, _rx) = router_mit(config, Some(metriken.clone()));

        for seq in 1..=3u16 {
            router.on_packet(2, paket(2, seq)).unwrap();
        }
        assert_eq!(metriken.verloren_total.get(), 1);
        assert_eq!(router.puffer_statistik(2).unwrap().fuellstand, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sprechen_start_legt_neue_quelle_an() {
        let (router, _, mut rx) = router_mit(manuell(), None);
        let uid = UserId::new();

        router.sprechen_start(42, uid).await.unwrap();
        assert!(router.quelle_aktiv(42));
        assert!(matches!(rx.try_recv(), Ok(SinkEreignis::SprechenStart(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn sprechen_stopp_unbekannt_wird_nicht_weitergereicht() {
        let (router, _, mut rx) = router_mit(manuell(), None);
        router.sprechen_stopp(77).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn metriken_werden_fortgeschrieben() {
        let metriken = VoiceRecvMetrics::neu().unwrap();
        let (router, _, mut rx) = router_mit(manuell(), Some(metriken.clone()));

        router.on_packet(1, paket(1, 1)).unwrap();
        router.drain(1).await.unwrap();
        // 2 fehlt, 3 ist da -> FEC
        router.on_packet(1, paket(1, 3)).unwrap();
        router.drain(1).await.unwrap();
        router.drain(1).await.unwrap();
        assert_eq!(metriken.aktive_quellen.get(), 1);

        router.on_source_gone(1).await;
        while rx.try_recv().is_ok() {}

        assert_eq!(metriken.einheiten_total.get(), 3);
        assert_eq!(metriken.fec_total.get(), 1);
        assert_eq!(metriken.verloren_total.get(), 1);
        assert_eq!(metriken.aktive_quellen.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_consumer_liefert_selbststaendig() {
        let (router, _, mut rx) = router_mit(VoiceEinstellungen::default(), None);

        for seq in 1..=3u16 {
            router.on_packet(8, paket(8, seq)).unwrap();
        }
        let mut seqs = Vec::new();
        while seqs.len() < 3 {
            if let Some(SinkEreignis::Audio(e)) = rx.recv().await {
                seqs.push(e.paket.sequence);
            }
        }
        assert_eq!(seqs, vec![1, 2, 3]);
        router.on_source_gone(8).await;
    }

    #[test]
    fn quellen_momentaufnahme() {
        let (router, _, _rx) = router_mit(manuell(), None);
        router.on_packet(1, paket(1, 1)).unwrap();
        router.on_packet(2, paket(2, 1)).unwrap();
        router.on_packet(1, paket(1, 2)).unwrap();

        let mut quellen = router.quellen();
        quellen.sort_unstable();
        assert_eq!(quellen, vec![1, 2]);
    }

    #[test]
    fn router_clone_teilt_state() {
        let (router1, _, _rx) = router_mit(manuell(), None);
        let router2 = router1.clone();
        router1.on_packet(9, paket(9, 1)).unwrap();
        assert!(router2.quelle_aktiv(9));
    }

    #[test]
    fn ohne_runtime_wird_kein_consumer_gestartet() {
        // auto_consumer aktiv, aber keine Runtime: darf nicht paniken
        let (router, _, _rx) = router_mit(VoiceEinstellungen::default(), None);
        router.on_packet(4, paket(4, 1)).unwrap();
        assert!(router.quelle_aktiv(4));
    }
}
