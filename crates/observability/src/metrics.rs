//! Prometheus-kompatible Metriken fuer die Empfangs-Pipeline
//!
//! Registrierte Metriken:
//! - `voicerecv_units_total` – Counter: An den Sink gelieferte Einheiten
//! - `voicerecv_fec_units_total` – Counter: Per FEC rekonstruierte Einheiten
//! - `voicerecv_silence_units_total` – Counter: Per Decoder-PLC erzeugte Einheiten
//! - `voicerecv_decode_errors_total` – Counter: Fehlgeschlagene Dekodierungen
//! - `voicerecv_packets_lost_total` – Counter: Verlorene Pakete (Luecken + Flush)
//! - `voicerecv_active_sources` – Gauge: Aktive Quellen
//! - `voicerecv_source_loss_ratio` – Histogram: Verlustrate beim Entfernen einer Quelle

use anyhow::Result;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle voicerecv-Prometheus-Metriken
///
/// `Clone` teilt Registry und Zaehler.
#[derive(Clone)]
pub struct VoiceRecvMetrics {
    pub registry: Arc<Registry>,

    pub einheiten_total: IntCounter,
    pub fec_total: IntCounter,
    pub stille_total: IntCounter,
    pub dekodierfehler_total: IntCounter,
    pub verloren_total: IntCounter,
    pub aktive_quellen: IntGauge,
    pub verlust_rate: Histogram,
}

impl VoiceRecvMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let einheiten_total = IntCounter::with_opts(Opts::new(
            "voicerecv_units_total",
            "An den Sink gelieferte Audio-Einheiten",
        ))?;
        registry.register(Box::new(einheiten_total.clone()))?;

        let fec_total = IntCounter::with_opts(Opts::new(
            "voicerecv_fec_units_total",
            "Per FEC rekonstruierte Einheiten",
        ))?;
        registry.register(Box::new(fec_total.clone()))?;

        let stille_total = IntCounter::with_opts(Opts::new(
            "voicerecv_silence_units_total",
            "Per Decoder-PLC ohne Eingabe erzeugte Einheiten",
        ))?;
        registry.register(Box::new(stille_total.clone()))?;

        let dekodierfehler_total = IntCounter::with_opts(Opts::new(
            "voicerecv_decode_errors_total",
            "Fehlgeschlagene Dekodierungen echter Pakete",
        ))?;
        registry.register(Box::new(dekodierfehler_total.clone()))?;

        let verloren_total = IntCounter::with_opts(Opts::new(
            "voicerecv_packets_lost_total",
            "Verlorene Pakete (Luecken und Flush)",
        ))?;
        registry.register(Box::new(verloren_total.clone()))?;

        let aktive_quellen = IntGauge::with_opts(Opts::new(
            "voicerecv_active_sources",
            "Anzahl aktiver Quellen",
        ))?;
        registry.register(Box::new(aktive_quellen.clone()))?;

        let verlust_rate = Histogram::with_opts(
            HistogramOpts::new(
                "voicerecv_source_loss_ratio",
                "Anteil verdeckter Frames einer Quelle (0.0 bis 1.0)",
            )
            .buckets(vec![0.0, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0]),
        )?;
        registry.register(Box::new(verlust_rate.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            einheiten_total,
            fec_total,
            stille_total,
            dekodierfehler_total,
            verloren_total,
            aktive_quellen,
            verlust_rate,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
