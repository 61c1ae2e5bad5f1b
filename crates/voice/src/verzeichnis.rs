//! SSRC-Verzeichnis – Zuordnung Transport-Kennung <-> Sprecher
//!
//! Wird von der Verbindungsschicht gepflegt (z.B. aus Speaking-Events der
//! Signalisierung) und vom Paket-Decoder ueber [`IdentitaetsAufloeser`]
//! abgefragt. Thread-safe durch DashMap.

use dashmap::DashMap;
use std::sync::Arc;
use voicerecv_core::UserId;

use crate::sink::IdentitaetsAufloeser;

/// Geteiltes SSRC-Verzeichnis
///
/// `Clone`-faehig (innerer Arc), alle Klone sehen denselben Zustand.
#[derive(Clone, Default)]
pub struct SsrcVerzeichnis {
    inner: Arc<VerzeichnisInner>,
}

#[derive(Default)]
struct VerzeichnisInner {
    /// SSRC -> UserId fuer den Lookup aus dem Paket-Pfad
    ssrc_index: DashMap<u32, UserId>,
    /// UserId -> SSRC fuer das Entfernen per Benutzer
    user_index: DashMap<UserId, u32>,
}

impl SsrcVerzeichnis {
    /// Erstellt ein leeres Verzeichnis
    pub fn neu() -> Self {
        Self::default()
    }

    /// Ordnet eine SSRC einem Sprecher zu
    ///
    /// Eine fruehere SSRC desselben Sprechers wird dabei ersetzt.
    pub fn registrieren(&self, ssrc: u32, user_id: UserId) {
        if let Some(alte_ssrc) = self.inner.user_index.insert(user_id, ssrc) {
            if alte_ssrc != ssrc {
                self.inner.ssrc_index.remove(&alte_ssrc);
            }
        }
        self.inner.ssrc_index.insert(ssrc, user_id);
        tracing::debug!(ssrc, user_id = %user_id, "SSRC registriert");
    }

    /// Entfernt die Zuordnung einer SSRC
    pub fn ssrc_entfernen(&self, ssrc: u32) -> Option<UserId> {
        let (_, user_id) = self.inner.ssrc_index.remove(&ssrc)?;
        self.inner.user_index.remove_if(&user_id, |_, s| *s == ssrc);
        Some(user_id)
    }

    /// Entfernt alle Zuordnungen eines Sprechers
    pub fn user_entfernen(&self, user_id: &UserId) -> Option<u32> {
        let (_, ssrc) = self.inner.user_index.remove(user_id)?;
        self.inner.ssrc_index.remove(&ssrc);
        Some(ssrc)
    }

    /// Sucht UserId anhand der SSRC (Hot Path)
    pub fn user_id_von_ssrc(&self, ssrc: u32) -> Option<UserId> {
        self.inner.ssrc_index.get(&ssrc).map(|r| *r)
    }

    /// Sucht die SSRC eines Sprechers
    pub fn ssrc_von_user(&self, user_id: &UserId) -> Option<u32> {
        self.inner.user_index.get(user_id).map(|r| *r)
    }

    /// Anzahl registrierter Zuordnungen
    pub fn anzahl(&self) -> usize {
        self.inner.ssrc_index.len()
    }
}

impl IdentitaetsAufloeser for SsrcVerzeichnis {
    fn aufloesen(&self, ssrc: u32) -> Option<UserId> {
        self.user_id_von_ssrc(ssrc)
    }
}
