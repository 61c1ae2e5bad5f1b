//! Jitter Buffer fuer die Empfangsseite einer Quelle
//!
//! Ordnet eingehende Pakete nach Sequenznummer und gibt sie in
//! Sequenz-Reihenfolge frei. Fehlt das erwartete Paket, wird hoechstens
//! `timeout` gewartet; danach meldet `pop` eine Luecke, damit der Decoder
//! verdecken kann statt unbegrenzt zu blockieren.
//!
//! ## Eigenschaften
//! - O(log n) Einfuegen (BTreeMap nach erweiterter Sequenz sortiert)
//! - 16-Bit-Sequenznummern werden auf einen 64-Bit-Zaehler erweitert,
//!   Wrap-Around ist damit fuer die Sortierung unsichtbar
//! - Bereits freigegebene Sequenzen werden nie erneut angenommen
//! - Vorlauf: vor der ersten Freigabe (Start oder nach `reset`) wird ab der
//!   ersten Ankunft `timeout` gewartet, damit vertauschte Anfangspakete noch
//!   einsortiert werden
//! - Producer (`push`) und Consumer (`pop`) teilen sich nur einen kurzen
//!   Mutex-Abschnitt; gewartet wird ausserhalb davon ueber `Notify`

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::paket::Paket;

/// Standard-Wartezeit auf ein fehlendes Paket
pub const BUFFER_TIMEOUT: Duration = Duration::from_millis(50);

/// Startwert des erweiterten Sequenzraums (Vielfaches von 2^16)
const SEQ_BASIS: u64 = 1 << 20;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration fuer den Jitter Buffer
#[derive(Debug, Clone)]
pub struct JitterBufferConfig {
    /// Maximale Anzahl gepufferter Pakete, danach wird das aelteste verworfen
    pub max_pakete: usize,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self { max_pakete: 50 }
    }
}

// ---------------------------------------------------------------------------
// Ergebnisse & Statistiken
// ---------------------------------------------------------------------------

/// Ergebnis eines `pop`-Aufrufs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopErgebnis {
    /// Das naechste Paket in Sequenz-Reihenfolge
    Paket(Paket),
    /// Das erwartete Paket kam nicht rechtzeitig; die Sequenz ist aufgegeben
    Luecke {
        /// Aufgegebene Sequenznummer
        sequence: u16,
    },
    /// Nichts gepuffert (oder Buffer geschlossen)
    Leer,
}

/// Ergebnis eines `push`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushErgebnis {
    /// Paket wurde gepuffert
    Angenommen,
    /// Veraltet, Duplikat oder Buffer geschlossen
    Verworfen,
    /// Gepuffert, dafuer wurde das aelteste Paket aufgegeben
    Ueberlauf {
        /// Aufgegebene Sequenzen (verworfenes Paket plus davor liegende Luecke)
        verloren: u64,
    },
}

/// Ergebnis eines `flush`
#[derive(Debug, Clone, Default)]
pub struct FlushErgebnis {
    /// Alle verbliebenen Pakete in Sequenz-Reihenfolge
    pub pakete: Vec<Paket>,
    /// Anzahl uebersprungener Sequenznummern
    pub verloren: u64,
}

/// Statistiken des Jitter Buffers (Snapshot)
#[derive(Debug, Clone, Default)]
pub struct JitterBufferStatistik {
    /// Anzahl empfangener Pakete gesamt
    pub empfangen: u64,
    /// Anzahl in Reihenfolge freigegebener Pakete
    pub freigegeben: u64,
    /// Anzahl verworfener Duplikate (bereits gepuffert)
    pub duplikate: u64,
    /// Anzahl verworfener veralteter Pakete (hinter der Freigabe-Grenze)
    pub veraltet: u64,
    /// Anzahl per Timeout aufgegebener Sequenzen
    pub luecken: u64,
    /// Pakete, die nie freigegeben wurden (Luecken, Ueberlauf, Flush)
    pub verloren: u64,
    /// Aktueller Fuellstand in Paketen
    pub fuellstand: usize,
}

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

struct Eintrag {
    paket: Paket,
    ankunft: Instant,
}

#[derive(Default)]
struct PufferZustand {
    /// Gepufferte Pakete, sortiert nach erweiterter Sequenz
    pakete: BTreeMap<u64, Eintrag>,
    /// Erweiterte Sequenz des als naechstes erwarteten Pakets
    naechste: Option<u64>,
    geschlossen: bool,
    statistik: JitterBufferStatistik,
}

/// Entscheidung eines Pull-Versuchs unter dem Lock
enum Versuch {
    Fertig(PopErgebnis),
    Warten(Instant),
}

impl PufferZustand {
    /// Referenzpunkt fuer die Sequenz-Erweiterung
    fn referenz(&self) -> u64 {
        self.naechste
            .or_else(|| self.pakete.keys().next().copied())
            .unwrap_or(SEQ_BASIS)
    }

    /// Ende des Vorlaufs: `timeout` nach der fruehesten Ankunft
    fn vorlauf_ende(&self, timeout: Duration) -> Option<Instant> {
        self.pakete.values().map(|e| e.ankunft).min().map(|a| a + timeout)
    }

    /// Entnimmt das erwartete Paket, falls es gepuffert ist
    ///
    /// Vor der ersten Freigabe gilt nach Ablauf des Vorlaufs das niedrigste
    /// gepufferte Paket als erwartet.
    fn erwartetes_entnehmen(&mut self, timeout: Duration) -> Option<Paket> {
        let schluessel = match self.naechste {
            Some(n) => n,
            None => {
                if self.vorlauf_ende(timeout)? > Instant::now() {
                    return None;
                }
                *self.pakete.keys().next()?
            }
        };
        let eintrag = self.pakete.remove(&schluessel)?;
        self.naechste = Some(schluessel + 1);
        self.statistik.freigegeben += 1;
        self.statistik.fuellstand = self.pakete.len();
        Some(eintrag.paket)
    }

    fn versuchen(&mut self, frist: Instant, timeout: Duration) -> Versuch {
        if self.geschlossen {
            return Versuch::Fertig(PopErgebnis::Leer);
        }
        if let Some(paket) = self.erwartetes_entnehmen(timeout) {
            return Versuch::Fertig(PopErgebnis::Paket(paket));
        }

        let warten_bis = match (self.naechste, self.pakete.values().next()) {
            (_, None) => frist,
            // Vorlauf laeuft auch ueber die Frist dieses Aufrufs hinaus
            (None, Some(_)) => self.vorlauf_ende(timeout).unwrap_or(frist),
            // Hat das aelteste wartende Paket selbst schon `timeout` gewartet,
            // wird die Luecke sofort aufgegeben.
            (Some(_), Some(kopf)) => frist.min(kopf.ankunft + timeout),
        };
        if warten_bis <= Instant::now() {
            return Versuch::Fertig(self.nach_ablauf(timeout));
        }
        Versuch::Warten(warten_bis)
    }

    fn nach_ablauf(&mut self, timeout: Duration) -> PopErgebnis {
        if self.geschlossen {
            return PopErgebnis::Leer;
        }
        if let Some(paket) = self.erwartetes_entnehmen(timeout) {
            return PopErgebnis::Paket(paket);
        }
        match self.naechste {
            Some(n) if !self.pakete.is_empty() => {
                self.naechste = Some(n + 1);
                self.statistik.luecken += 1;
                self.statistik.verloren += 1;
                PopErgebnis::Luecke {
                    sequence: n as u16,
                }
            }
            _ => PopErgebnis::Leer,
        }
    }
}

/// Erweitert eine 16-Bit-Sequenz relativ zu `referenz` auf den naechstgelegenen
/// Wert im 64-Bit-Raum (RTP-Konvention: Abstand > 2^15 gilt als "aelter")
fn erweitern(seq: u16, referenz: u64) -> u64 {
    let diff = seq.wrapping_sub(referenz as u16) as i16 as i64;
    (referenz as i64 + diff) as u64
}

// ---------------------------------------------------------------------------
// JitterBuffer
// ---------------------------------------------------------------------------

/// Jitter Buffer einer einzelnen Quelle
///
/// Wird per `Arc` zwischen Producer und Consumer geteilt. `push` blockiert nie,
/// `pop` ist der einzige Suspendierungspunkt und durch `timeout` begrenzt.
pub struct JitterBuffer {
    config: JitterBufferConfig,
    zustand: Mutex<PufferZustand>,
    signal: Notify,
}

impl JitterBuffer {
    /// Erstellt einen neuen Jitter Buffer mit gegebener Konfiguration
    pub fn neu(config: JitterBufferConfig) -> Self {
        Self {
            config,
            zustand: Mutex::new(PufferZustand::default()),
            signal: Notify::new(),
        }
    }

    /// Erstellt einen Buffer mit Standardkonfiguration
    pub fn standard() -> Self {
        Self::neu(JitterBufferConfig::default())
    }

    /// Fuegt ein Paket in den Buffer ein
    ///
    /// Veraltete Pakete (hinter der Freigabe-Grenze) und Duplikate werden
    /// still verworfen.
    pub fn push(&self, paket: Paket) -> PushErgebnis {
        let seq = paket.sequence;
        let ergebnis = {
            let mut z = self.zustand.lock();
            if z.geschlossen {
                tracing::trace!(sequence = seq, "Paket fuer geschlossenen Buffer verworfen");
                return PushErgebnis::Verworfen;
            }
            z.statistik.empfangen += 1;

            let erweitert = erweitern(seq, z.referenz());

            if let Some(naechste) = z.naechste {
                if erweitert < naechste {
                    z.statistik.veraltet += 1;
                    tracing::trace!(sequence = seq, "Veraltetes Paket verworfen");
                    return PushErgebnis::Verworfen;
                }
            }

            if z.pakete.contains_key(&erweitert) {
                z.statistik.duplikate += 1;
                tracing::trace!(sequence = seq, "Duplikat-Paket verworfen");
                return PushErgebnis::Verworfen;
            }

            z.pakete.insert(
                erweitert,
                Eintrag {
                    paket,
                    ankunft: Instant::now(),
                },
            );

            // Buffer-Ueberlauf: aeltestes Paket verwerfen, Freigabe-Grenze nachziehen
            let mut ergebnis = PushErgebnis::Angenommen;
            if z.pakete.len() > self.config.max_pakete {
                if let Some((aelteste, _)) = z.pakete.pop_first() {
                    let ab = z.naechste.unwrap_or(aelteste).min(aelteste);
                    let verloren = aelteste + 1 - ab;
                    z.statistik.verloren += verloren;
                    z.naechste = Some(aelteste + 1);
                    tracing::warn!(
                        sequence = aelteste as u16,
                        verloren,
                        "Buffer-Ueberlauf: Paket verworfen"
                    );
                    ergebnis = PushErgebnis::Ueberlauf { verloren };
                }
            }

            z.statistik.fuellstand = z.pakete.len();
            ergebnis
        };
        self.signal.notify_one();
        ergebnis
    }

    /// Gibt das naechste Paket in Sequenz-Reihenfolge zurueck
    ///
    /// Wartet hoechstens `timeout`, vor der ersten Freigabe bis zum Ende des
    /// Vorlaufs. Liegt danach das erwartete Paket nicht vor,
    /// aber andere Pakete warten, wird [`PopErgebnis::Luecke`] geliefert und die
    /// Sequenz aufgegeben. Ist gar nichts gepuffert, [`PopErgebnis::Leer`].
    pub async fn pop(&self, timeout: Duration) -> PopErgebnis {
        let frist = Instant::now() + timeout;
        loop {
            let warten_bis = match self.zustand.lock().versuchen(frist, timeout) {
                Versuch::Fertig(ergebnis) => return ergebnis,
                Versuch::Warten(bis) => bis,
            };

            if tokio::time::timeout_at(warten_bis, self.signal.notified())
                .await
                .is_err()
            {
                return self.zustand.lock().nach_ablauf(timeout);
            }
        }
    }

    /// Blick auf das Paket nach dem aktuell erwarteten, ohne es zu entnehmen
    ///
    /// Nach einer Luecke fuer Sequenz N ist das genau Paket N+1 – die Quelle
    /// fuer die FEC-Rekonstruktion von N.
    pub fn peek_next(&self) -> Option<Paket> {
        let z = self.zustand.lock();
        let naechste = z.naechste?;
        z.pakete.get(&naechste).map(|e| e.paket.clone())
    }

    /// Entnimmt sofort alle gepufferten Pakete in Sequenz-Reihenfolge
    ///
    /// Uebersprungene Sequenznummern werden als Verlust gezaehlt, nicht als Fehler.
    pub fn flush(&self) -> FlushErgebnis {
        let mut z = self.zustand.lock();
        let mut erwartet = z.naechste;
        let mut verloren = 0u64;
        let gepuffert = std::mem::take(&mut z.pakete);
        let mut pakete = Vec::with_capacity(gepuffert.len());

        for (seq, eintrag) in gepuffert {
            if let Some(e) = erwartet {
                if seq > e {
                    verloren += seq - e;
                }
            }
            erwartet = Some(seq + 1);
            pakete.push(eintrag.paket);
        }

        z.naechste = erwartet;
        z.statistik.freigegeben += pakete.len() as u64;
        z.statistik.verloren += verloren;
        z.statistik.fuellstand = 0;

        if verloren > 0 {
            tracing::debug!(pakete = pakete.len(), verloren, "Flush mit Luecken");
        }

        FlushErgebnis { pakete, verloren }
    }

    /// Leert den Buffer und vergisst die Freigabe-Grenze
    ///
    /// Statistiken bleiben erhalten.
    pub fn reset(&self) {
        let mut z = self.zustand.lock();
        z.pakete.clear();
        z.naechste = None;
        z.statistik.fuellstand = 0;
    }

    /// Schliesst den Buffer endgueltig
    ///
    /// Weckt ein laufendes `pop` (liefert dann `Leer`) und verwirft alle
    /// weiteren `push`-Aufrufe.
    pub fn schliessen(&self) {
        {
            let mut z = self.zustand.lock();
            z.geschlossen = true;
            z.pakete.clear();
            z.naechste = None;
            z.statistik.fuellstand = 0;
        }
        self.signal.notify_waiters();
        // Permit fuer ein `pop`, das gerade zwischen Lock und Warten steht
        self.signal.notify_one();
    }

    /// Prueft ob der Buffer geschlossen wurde
    pub fn ist_geschlossen(&self) -> bool {
        self.zustand.lock().geschlossen
    }

    /// Gibt den aktuellen Fuellstand zurueck
    pub fn fuellstand(&self) -> usize {
        self.zustand.lock().pakete.len()
    }

    /// Prueft ob keine Pakete gepuffert sind
    pub fn ist_leer(&self) -> bool {
        self.fuellstand() == 0
    }

    /// Gibt einen Snapshot der Statistiken zurueck
    pub fn statistik(&self) -> JitterBufferStatistik {
        self.zustand.lock().statistik.clone()
    }
}

impl Default for JitterBuffer {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
