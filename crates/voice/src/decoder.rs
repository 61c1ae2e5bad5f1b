//! Paket-Decoder – Jitter Buffer + zustandsbehafteter Decoder einer Quelle
//!
//! Pro Pull-Zyklus:
//!
//! ```text
//! Warten ─┬─ Geliefert ──────► Dekodieren (fec = false)
//!         ├─ Zeit abgelaufen ─► Fake-Paket ─┬─ Nachfolger da  ─► FEC  (fec = true)
//!         │                                 └─ kein Nachfolger ─► PLC  (None)
//!         └─ Leer ───────────► keine Einheit
//! ```
//!
//! Luecken sind nie ein Fehler. Nur ein echtes Paket, das nicht dekodiert
//! werden kann, wird als [`VoiceRecvError::Dekodierung`] gemeldet.

use std::sync::Arc;
use std::time::Duration;
use voicerecv_core::{Result, UserId, VoiceRecvError};

use crate::codec::{DecoderFabrik, StatefulDecoder};
use crate::config::VoiceEinstellungen;
use crate::jitter_buffer::{FlushErgebnis, JitterBuffer, PopErgebnis, PushErgebnis};
use crate::paket::{AudioEinheit, Paket, Verdeckung};
use crate::sink::IdentitaetsAufloeser;

// ---------------------------------------------------------------------------
// Statistiken & Ergebnisse
// ---------------------------------------------------------------------------

/// Decoder-Statistiken einer Quelle
#[derive(Debug, Clone, Default)]
pub struct DecoderStatistik {
    /// Erfolgreich dekodierte (oder durchgereichte) echte Pakete
    pub originale: u64,
    /// Synthetisierte Fake-Pakete
    pub fake_pakete: u64,
    /// Per FEC rekonstruierte Frames
    pub fec_rekonstruiert: u64,
    /// Frames aus Decoder-PLC ohne Eingabe
    pub stille_eingefuegt: u64,
    /// Fehlgeschlagene Dekodierungen echter Pakete
    pub dekodier_fehler: u64,
    /// Ersetzte Decoder nach wiederholten Fehlern
    pub decoder_ersetzt: u64,
    /// Beim Flush festgestellte Luecken
    pub flush_verloren: u64,
    /// Anfragen an den Identitaets-Aufloeser
    pub aufloesungen: u64,
}

impl DecoderStatistik {
    /// Anteil verdeckter Frames an allen erzeugten Frames (0.0–1.0)
    pub fn verlust_rate(&self) -> f64 {
        let gesamt = self.originale + self.fake_pakete;
        if gesamt == 0 {
            0.0
        } else {
            self.fake_pakete as f64 / gesamt as f64
        }
    }
}

/// Ergebnis von [`PacketDecoder::flush`]
#[derive(Debug, Default)]
pub struct Abschluss {
    /// Einheiten aller verbliebenen echten Pakete in Reihenfolge
    pub einheiten: Vec<AudioEinheit>,
    /// Dekodierfehler einzelner Pakete (die uebrigen wurden trotzdem geliefert)
    pub fehler: Vec<VoiceRecvError>,
    /// Uebersprungene Sequenznummern
    pub verloren: u64,
}

/// Zustand eines Pull-Zyklus nach dem Warten auf den Buffer
enum PullZustand {
    /// Ein echtes Paket liegt vor
    Geliefert(Paket),
    /// Das erwartete Paket kam nicht rechtzeitig – Fake-Paket als Ersatz
    ZeitAbgelaufen(Paket),
    /// Nichts zu tun
    Leer,
}

// ---------------------------------------------------------------------------
// PacketDecoder
// ---------------------------------------------------------------------------

/// Paket-Decoder einer einzelnen Quelle
///
/// Besitzt genau einen Jitter Buffer und einen Decoder. Der Buffer wird per
/// `Arc` mit dem Producer geteilt ([`PacketDecoder::puffer`]); alles andere
/// gehoert exklusiv dem Consumer, der `pop_daten` aufruft.
pub struct PacketDecoder {
    ssrc: u32,
    puffer: Arc<JitterBuffer>,
    fabrik: Arc<dyn DecoderFabrik>,
    aufloeser: Arc<dyn IdentitaetsAufloeser>,
    /// `None` im Passthrough-Modus oder nach `zerstoeren`
    decoder: Option<Box<dyn StatefulDecoder>>,
    dekodiert: bool,
    frame_dauer: u32,
    max_dekodier_fehler: u32,
    letzte_seq: u16,
    letzter_ts: u32,
    /// Zwischengespeicherte Sprecher-Identitaet
    handle: Option<UserId>,
    fehler_in_folge: u32,
    /// Seit dem letzten Reset wurde mindestens ein Paket verarbeitet
    segment_begonnen: bool,
    zerstoert: bool,
    statistik: DecoderStatistik,
}

impl PacketDecoder {
    /// Erstellt einen Decoder fuer eine neu beobachtete Quelle
    pub fn neu(
        ssrc: u32,
        config: &VoiceEinstellungen,
        fabrik: Arc<dyn DecoderFabrik>,
        aufloeser: Arc<dyn IdentitaetsAufloeser>,
    ) -> Result<Self> {
        let decoder = if config.dekodiert {
            Some(fabrik.erstellen()?)
        } else {
            None
        };

        tracing::debug!(ssrc, dekodiert = config.dekodiert, "PacketDecoder erstellt");

        Ok(Self {
            ssrc,
            puffer: Arc::new(JitterBuffer::neu(config.jitter_buffer())),
            fabrik,
            aufloeser,
            decoder,
            dekodiert: config.dekodiert,
            frame_dauer: config.frame_dauer,
            max_dekodier_fehler: config.max_dekodier_fehler,
            letzte_seq: 0,
            letzter_ts: 0,
            handle: None,
            fehler_in_folge: 0,
            segment_begonnen: false,
            zerstoert: false,
            statistik: DecoderStatistik::default(),
        })
    }

    /// Legt ein empfangenes Paket in den Buffer (nicht-blockierend)
    pub fn push_paket(&self, paket: Paket) -> PushErgebnis {
        self.puffer.push(paket)
    }

    /// Holt die naechste Einheit
    ///
    /// Wartet hoechstens `timeout` auf das erwartete Paket. `Ok(None)` wenn
    /// nichts gepuffert ist.
    pub async fn pop_daten(&mut self, timeout: Duration) -> Result<Option<AudioEinheit>> {
        self.lebendig()?;

        let zustand = match self.puffer.pop(timeout).await {
            PopErgebnis::Paket(paket) => PullZustand::Geliefert(paket),
            PopErgebnis::Luecke { sequence } => {
                let fake = self.fake_paket();
                tracing::trace!(
                    ssrc = self.ssrc,
                    luecke = sequence,
                    fake = fake.sequence,
                    "Paket nicht rechtzeitig angekommen"
                );
                PullZustand::ZeitAbgelaufen(fake)
            }
            PopErgebnis::Leer => PullZustand::Leer,
        };

        match zustand {
            PullZustand::Geliefert(paket) | PullZustand::ZeitAbgelaufen(paket) => {
                self.verarbeiten(paket).map(Some)
            }
            PullZustand::Leer => Ok(None),
        }
    }

    /// Entnimmt alle verbliebenen Pakete sofort und dekodiert sie
    ///
    /// Fuer Luecken werden hier keine Fake-Pakete erzeugt; der Abschluss endet
    /// beim letzten echten Paket und meldet nur die Anzahl der Luecken.
    pub fn flush(&mut self) -> Result<Abschluss> {
        self.lebendig()?;

        let FlushErgebnis { pakete, verloren } = self.puffer.flush();
        if verloren > 1 {
            tracing::warn!(ssrc = self.ssrc, verloren, "Pakete beim Flush verloren");
        } else if verloren == 1 {
            tracing::debug!(ssrc = self.ssrc, "Ein Paket beim Flush verloren");
        }
        self.statistik.flush_verloren += verloren;

        let mut abschluss = Abschluss {
            verloren,
            ..Abschluss::default()
        };
        for paket in pakete {
            match self.verarbeiten(paket) {
                Ok(einheit) => abschluss.einheiten.push(einheit),
                Err(e) if e.ist_wiederholbar() => abschluss.fehler.push(e),
                Err(e) => return Err(e),
            }
        }
        Ok(abschluss)
    }

    /// Setzt den Decoder fuer ein neues Sprech-Segment zurueck
    ///
    /// Leert den Buffer, ersetzt den Codec-Zustand und nullt die Zaehler fuer
    /// Sequenz und Zeitstempel. Die zwischengespeicherte Identitaet bleibt.
    pub fn reset(&mut self) -> Result<()> {
        self.lebendig()?;

        self.puffer.reset();
        self.decoder = if self.dekodiert {
            Some(self.fabrik.erstellen()?)
        } else {
            None
        };
        self.letzte_seq = 0;
        self.letzter_ts = 0;
        self.fehler_in_folge = 0;
        self.segment_begonnen = false;

        tracing::debug!(ssrc = self.ssrc, "PacketDecoder zurueckgesetzt");
        Ok(())
    }

    /// Gibt Buffer und Decoder endgueltig frei
    ///
    /// Ein laufendes `pop` auf dem geteilten Buffer wird geweckt. Jeder weitere
    /// Aufruf von `pop_daten`, `flush` oder `reset` schlaegt fehl.
    pub fn zerstoeren(&mut self) {
        if self.zerstoert {
            return;
        }
        self.puffer.schliessen();
        self.decoder = None;
        self.zerstoert = true;
        tracing::debug!(ssrc = self.ssrc, "PacketDecoder zerstoert");
    }

    /// Setzt die Sprecher-Identitaet direkt (z.B. aus einem Speaking-Event)
    pub fn handle_setzen(&mut self, handle: UserId) {
        self.handle = Some(handle);
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Geteilter Buffer fuer den Producer
    pub fn puffer(&self) -> Arc<JitterBuffer> {
        Arc::clone(&self.puffer)
    }

    pub fn letzte_sequence(&self) -> u16 {
        self.letzte_seq
    }

    pub fn letzter_timestamp(&self) -> u32 {
        self.letzter_ts
    }

    pub fn handle(&self) -> Option<UserId> {
        self.handle
    }

    /// Prueft ob seit dem letzten Reset schon Pakete verarbeitet wurden
    pub fn segment_begonnen(&self) -> bool {
        self.segment_begonnen
    }

    pub fn ist_zerstoert(&self) -> bool {
        self.zerstoert
    }

    pub fn statistik(&self) -> &DecoderStatistik {
        &self.statistik
    }

    // -----------------------------------------------------------------------
    // Interne Zustandsuebergaenge
    // -----------------------------------------------------------------------

    fn lebendig(&self) -> Result<()> {
        if self.zerstoert {
            return Err(VoiceRecvError::DecoderZerstoert(self.ssrc));
        }
        Ok(())
    }

    fn fake_paket(&self) -> Paket {
        Paket::fake(
            self.ssrc,
            self.letzte_seq.wrapping_add(1),
            self.letzter_ts.wrapping_add(self.frame_dauer),
        )
    }

    fn verarbeiten(&mut self, paket: Paket) -> Result<AudioEinheit> {
        let dekodiert = if self.dekodiert {
            self.dekodieren(&paket)
        } else {
            Ok((Vec::new(), Verdeckung::Durchgereicht))
        };

        // Auch bei Fehlern weiterzaehlen, damit die naechste Luecke im Takt bleibt
        self.letzte_seq = paket.sequence;
        self.letzter_ts = paket.timestamp;
        self.segment_begonnen = true;

        let (pcm, art) = dekodiert?;
        if paket.ist_fake() {
            self.statistik.fake_pakete += 1;
        } else {
            self.statistik.originale += 1;
        }
        let quelle = self.quelle_aufloesen();

        Ok(AudioEinheit {
            paket,
            quelle,
            pcm,
            art,
        })
    }

    fn dekodieren(&mut self, paket: &Paket) -> Result<(Vec<f32>, Verdeckung)> {
        match paket.opus() {
            Some(payload) => self.original_dekodieren(paket.sequence, payload),
            None => self.verdecken(paket.sequence),
        }
    }

    fn original_dekodieren(
        &mut self,
        sequence: u16,
        payload: &[u8],
    ) -> Result<(Vec<f32>, Verdeckung)> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or(VoiceRecvError::DecoderZerstoert(self.ssrc))?;

        match decoder.decode(Some(payload), false) {
            Ok(pcm) => {
                self.fehler_in_folge = 0;
                Ok((pcm, Verdeckung::Original))
            }
            Err(e) => {
                self.fehler_in_folge += 1;
                self.statistik.dekodier_fehler += 1;
                tracing::warn!(
                    ssrc = self.ssrc,
                    sequence,
                    in_folge = self.fehler_in_folge,
                    fehler = %e,
                    "Dekodierung fehlgeschlagen"
                );
                if self.fehler_in_folge >= self.max_dekodier_fehler {
                    self.decoder_ersetzen()?;
                }
                Err(VoiceRecvError::Dekodierung {
                    ssrc: self.ssrc,
                    sequence,
                    grund: e.to_string(),
                })
            }
        }
    }

    fn verdecken(&mut self, sequence: u16) -> Result<(Vec<f32>, Verdeckung)> {
        let naechstes = self.puffer.peek_next().filter(|p| !p.ist_fake());
        let decoder = self
            .decoder
            .as_mut()
            .ok_or(VoiceRecvError::DecoderZerstoert(self.ssrc))?;

        let (ergebnis, art) = match &naechstes {
            Some(naechstes) => {
                tracing::debug!(
                    ssrc = self.ssrc,
                    fake = sequence,
                    fec = naechstes.sequence,
                    "FEC-Paket wird erzeugt"
                );
                (
                    decoder.decode(naechstes.opus(), true),
                    Verdeckung::Fec {
                        aus_sequence: naechstes.sequence,
                    },
                )
            }
            None => (decoder.decode(None, false), Verdeckung::Stille),
        };
        let frame_laenge = decoder.frame_laenge();

        match art {
            Verdeckung::Fec { .. } => self.statistik.fec_rekonstruiert += 1,
            _ => self.statistik.stille_eingefuegt += 1,
        }

        // Verlust ist nie ein Fehler – notfalls echte Stille liefern
        let pcm = ergebnis.unwrap_or_else(|e| {
            tracing::warn!(ssrc = self.ssrc, sequence, fehler = %e, "Verdeckung fehlgeschlagen");
            vec![0.0; frame_laenge]
        });
        Ok((pcm, art))
    }

    fn decoder_ersetzen(&mut self) -> Result<()> {
        self.decoder = Some(self.fabrik.erstellen()?);
        self.fehler_in_folge = 0;
        self.statistik.decoder_ersetzt += 1;
        tracing::warn!(ssrc = self.ssrc, "Decoder nach wiederholten Fehlern ersetzt");
        Ok(())
    }

    fn quelle_aufloesen(&mut self) -> Option<UserId> {
        if self.handle.is_none() {
            self.statistik.aufloesungen += 1;
            self.handle = self.aufloeser.aufloesen(self.ssrc);
            if self.handle.is_none() {
                tracing::trace!(ssrc = self.ssrc, "Keine Identitaet fuer SSRC");
            }
        }
        self.handle
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
