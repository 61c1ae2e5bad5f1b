//! voicerecv-core – Gemeinsame Typen und Fehlertypen
//!
//! Stellt die Bausteine bereit, die von der Voice-Pipeline und dem
//! Simulator gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, VoiceRecvError};
pub use types::UserId;
