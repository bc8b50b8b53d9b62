//! Sperren von Gleisabschnitten durch laufende Fahrstraßen.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::{self, Display, Formatter},
};

use itertools::Itertools;
use log::{debug, trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fahrstraße;

/// Name eines Gleisabschnitts, der von höchstens einer Fahrstraße gleichzeitig verwendet wird.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Abschnitt(pub String);

impl Display for Abschnitt {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Die angeforderten Abschnitte sind (teilweise) durch andere Fahrstraßen gesperrt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Sperre für {anforderer} verweigert: {}",
    .konflikte.iter().map(|(abschnitt, inhaber)| format!("{abschnitt} gehört {inhaber}")).join(", ")
)]
pub struct SperreVerweigert {
    /// Die anfordernde Fahrstraße.
    pub anforderer: fahrstraße::Name,
    /// Die bereits gesperrten Abschnitte und ihre Inhaber.
    pub konflikte: BTreeMap<Abschnitt, fahrstraße::Name>,
}

/// Verwaltet, welche Fahrstraße welche Abschnitte gesperrt hat.
///
/// Anforderungen werden nie in eine Warteschlange eingereiht:
/// entweder alle Abschnitte werden sofort gesperrt, oder keiner.
#[derive(Debug, Default)]
pub struct Sperren {
    /// Inhaber jedes gesperrten Abschnitts.
    inhaber: Mutex<HashMap<Abschnitt, fahrstraße::Name>>,
}

impl Sperren {
    /// Erzeuge eine neue Verwaltung ohne gesperrte Abschnitte.
    #[must_use]
    pub fn neu() -> Self {
        Sperren::default()
    }

    /// Sperre alle `abschnitte` für die Fahrstraße `name`.
    ///
    /// Bereits von der selben Fahrstraße gesperrte Abschnitte sind kein Konflikt.
    ///
    /// ## Errors
    ///
    /// Mindestens ein Abschnitt ist durch eine andere Fahrstraße gesperrt.
    /// In diesem Fall wird kein Abschnitt gesperrt.
    pub fn anfordern(
        &self,
        name: &fahrstraße::Name,
        abschnitte: &BTreeSet<Abschnitt>,
    ) -> Result<(), SperreVerweigert> {
        let mut inhaber = self.inhaber.lock();
        let konflikte: BTreeMap<_, _> = abschnitte
            .iter()
            .filter_map(|abschnitt| {
                inhaber
                    .get(abschnitt)
                    .filter(|bisher| *bisher != name)
                    .map(|bisher| (abschnitt.clone(), bisher.clone()))
            })
            .collect();
        if !konflikte.is_empty() {
            debug!("Sperre für {name} verweigert, Konflikte: {konflikte:?}");
            return Err(SperreVerweigert { anforderer: name.clone(), konflikte });
        }
        for abschnitt in abschnitte {
            let _ = inhaber.insert(abschnitt.clone(), name.clone());
        }
        trace!("{name} sperrt {abschnitte:?}");
        Ok(())
    }

    /// Gebe alle Abschnitte der Fahrstraße frei. Mehrfaches Freigeben hat keine Auswirkung.
    ///
    /// Gibt die Anzahl freigegebener Abschnitte zurück.
    pub fn freigeben(&self, name: &fahrstraße::Name) -> usize {
        let mut inhaber = self.inhaber.lock();
        let vorher = inhaber.len();
        inhaber.retain(|_abschnitt, bisher| bisher != name);
        let freigegeben = vorher.saturating_sub(inhaber.len());
        if freigegeben > 0 {
            trace!("{name} gibt {freigegeben} Abschnitte frei.");
        }
        freigegeben
    }

    /// Der aktuelle Inhaber eines Abschnitts.
    #[must_use]
    pub fn inhaber(&self, abschnitt: &Abschnitt) -> Option<fahrstraße::Name> {
        self.inhaber.lock().get(abschnitt).cloned()
    }

    /// Alle von der Fahrstraße gesperrten Abschnitte.
    #[must_use]
    pub fn gesperrt_von(&self, name: &fahrstraße::Name) -> BTreeSet<Abschnitt> {
        self.inhaber
            .lock()
            .iter()
            .filter(|(_abschnitt, inhaber)| *inhaber == name)
            .map(|(abschnitt, _inhaber)| abschnitt.clone())
            .collect()
    }

    /// Hält die Fahrstraße weiterhin alle `abschnitte`?
    #[must_use]
    pub fn hält_alle(&self, name: &fahrstraße::Name, abschnitte: &BTreeSet<Abschnitt>) -> bool {
        let inhaber = self.inhaber.lock();
        abschnitte.iter().all(|abschnitt| inhaber.get(abschnitt) == Some(name))
    }

    /// Gebe einen Abschnitt unabhängig von seinem Inhaber frei, z.B. nach manuellem Eingriff.
    pub fn erzwinge_freigabe(&self, abschnitt: &Abschnitt) -> Option<fahrstraße::Name> {
        self.inhaber.lock().remove(abschnitt)
    }
}
