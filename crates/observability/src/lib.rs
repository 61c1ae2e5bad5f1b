//! # voicerecv-observability
//!
//! Observability-Crate fuer voicerecv:
//! - Prometheus-kompatible Metriken fuer Verlust und Verdeckung
//! - Structured Logging via tracing-subscriber (Text oder JSON)

pub mod logging;
pub mod metrics;

pub use logging::logging_initialisieren;
pub use metrics::VoiceRecvMetrics;
