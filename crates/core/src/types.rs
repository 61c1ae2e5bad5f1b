//! Gemeinsame Identifikationstypen fuer voicerecv
//!
//! Sprecher werden auf Transport-Ebene nur per SSRC (`u32`) identifiziert;
//! `UserId` ist die stabile Identitaet, auf die eine SSRC aufgeloest wird.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stabile Sprecher-Identitaet (Handle), ermittelt ueber einen externen Lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Erstellt eine neue zufaellige UserId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}
