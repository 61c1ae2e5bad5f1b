//! Schnittstellen zu externen Kollaborateuren
//!
//! - [`AudioSink`] konsumiert fertige Einheiten und optionale Sprech-Ereignisse
//! - [`IdentitaetsAufloeser`] loest eine SSRC auf eine `UserId` auf
//!
//! [`KanalSink`] ist eine fertige Sink-Implementierung, die alles in eine
//! tokio-mpsc-Queue legt (nicht-blockierend, bei voller Queue wird verworfen).

use tokio::sync::mpsc;
use voicerecv_core::UserId;

use crate::paket::AudioEinheit;

/// Konsument fertiger Audio-Einheiten
///
/// Wird vom Router geteilt gehalten; die Lebensdauer verwaltet der Aufrufer.
/// Die Hooks werden nur weitergereicht, der Router interpretiert sie nicht.
pub trait AudioSink: Send + Sync {
    /// Nimmt eine fertige Einheit entgegen
    fn schreiben(&self, einheit: AudioEinheit);

    /// Ein Sprecher hat begonnen zu sprechen
    fn sprechen_start(&self, _handle: UserId) {}

    /// Ein Sprecher hat aufgehoert zu sprechen
    fn sprechen_stopp(&self, _handle: UserId) {}

    /// Eine Quelle wurde endgueltig entfernt
    fn quelle_entfernt(&self, _ssrc: u32, _handle: Option<UserId>) {}
}

/// Externer Lookup SSRC -> Sprecher-Identitaet
pub trait IdentitaetsAufloeser: Send + Sync {
    /// Gibt die Identitaet zur SSRC zurueck, `None` wenn (noch) unbekannt
    fn aufloesen(&self, ssrc: u32) -> Option<UserId>;
}

// ---------------------------------------------------------------------------
// KanalSink
// ---------------------------------------------------------------------------

/// Groesse der Ereignis-Queue, wenn nichts anderes angegeben ist
pub const SINK_QUEUE_GROESSE: usize = 256;

/// Alles, was ein Sink vom Router erhalten kann
#[derive(Debug, Clone)]
pub enum SinkEreignis {
    Audio(AudioEinheit),
    SprechenStart(UserId),
    SprechenStopp(UserId),
    QuelleEntfernt { ssrc: u32, handle: Option<UserId> },
}

/// Sink, der alle Ereignisse in eine mpsc-Queue legt
#[derive(Clone)]
pub struct KanalSink {
    tx: mpsc::Sender<SinkEreignis>,
}

impl KanalSink {
    /// Erstellt Sink und zugehoerige Empfangs-Queue
    pub fn neu(kapazitaet: usize) -> (Self, mpsc::Receiver<SinkEreignis>) {
        let (tx, rx) = mpsc::channel(kapazitaet);
        (Self { tx }, rx)
    }

    fn senden(&self, ereignis: SinkEreignis) {
        // Nicht-blockierend senden – der Decode-Pfad darf nie auf den Sink warten
        match self.tx.try_send(ereignis) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Sink-Queue voll – Ereignis verworfen");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Sink-Queue geschlossen");
            }
        }
    }
}

impl AudioSink for KanalSink {
    fn schreiben(&self, einheit: AudioEinheit) {
        self.senden(SinkEreignis::Audio(einheit));
    }

    fn sprechen_start(&self, handle: UserId) {
        self.senden(SinkEreignis::SprechenStart(handle));
    }

    fn sprechen_stopp(&self, handle: UserId) {
        self.senden(SinkEreignis::SprechenStopp(handle));
    }

    fn quelle_entfernt(&self, ssrc: u32, handle: Option<UserId>) {
        self.senden(SinkEreignis::QuelleEntfernt { ssrc, handle });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paket::{Paket, Verdeckung};

    fn einheit(seq: u16) -> AudioEinheit {
        AudioEinheit {
            paket: Paket::neu(1, seq, 0, vec![1, 2, 3]),
            quelle: None,
            pcm: Vec::new(),
            art: Verdeckung::Durchgereicht,
        }
    }

    #[test]
    fn kanal_sink_leitet_ereignisse_weiter() {
        let (sink, mut rx) = KanalSink::neu(8);
        let uid = UserId::new();

        sink.sprechen_start(uid);
        sink.schreiben(einheit(1));
        sink.quelle_entfernt(1, Some(uid));

        assert!(matches!(rx.try_recv(), Ok(SinkEreignis::SprechenStart(h)) if h == uid));
        assert!(matches!(rx.try_recv(), Ok(SinkEreignis::Audio(e)) if e.paket.sequence == 1));
        assert!(matches!(
            rx.try_recv(),
            Ok(SinkEreignis::QuelleEntfernt { ssrc: 1, handle: Some(h) }) if h == uid
        ));
    }

    #[test]
    fn kanal_sink_verwirft_bei_voller_queue() {
        let (sink, mut rx) = KanalSink::neu(1);
        sink.schreiben(einheit(1));
        sink.schreiben(einheit(2)); // verworfen

        assert!(matches!(rx.try_recv(), Ok(SinkEreignis::Audio(e)) if e.paket.sequence == 1));
        assert!(rx.try_recv().is_err());
    }
}
