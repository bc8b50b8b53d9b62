//! Eine simulierte [`Zentrale`], die jeden Befehl sofort ausführt.

use std::collections::BTreeMap;

use log::{debug, warn};
use parking_lot::Mutex;
use stellwerk_gleisbild::adresse::{Stellung, ZubehörAdresse};
use stellwerk_steuerung::zentrale::{Quittung, Schaltbefehl, Zentrale};

/// Simuliert eine Anlage ohne angeschlossene Hardware.
///
/// Alle Schaltbefehle werden sofort quittiert, Rückmelder werden nie ausgelöst.
#[derive(Debug, Default)]
pub struct Simulation {
    /// Die zuletzt gesendete Stellung jedes Antriebs.
    stellungen: Mutex<BTreeMap<ZubehörAdresse, Stellung>>,
    /// Wurde ein Nothalt ausgelöst?
    nothalt: Mutex<bool>,
}

impl Simulation {
    /// Die zuletzt gesendete Stellung eines Antriebs.
    #[must_use]
    pub fn stellung(&self, adresse: ZubehörAdresse) -> Option<Stellung> {
        self.stellungen.lock().get(&adresse).copied()
    }

    /// Wurde seit dem Start ein Nothalt ausgelöst?
    #[must_use]
    pub fn nothalt_ausgelöst(&self) -> bool {
        *self.nothalt.lock()
    }
}

impl Zentrale for Simulation {
    fn sende_schaltbefehl(&self, befehl: Schaltbefehl, quittung: Quittung) {
        debug!("Simuliere Schaltbefehl {befehl}.");
        let _ = self.stellungen.lock().insert(befehl.adresse, befehl.stellung);
        quittung.bestätige();
    }

    fn nothalt(&self) {
        warn!("Simulierter Nothalt.");
        *self.nothalt.lock() = true;
    }
}
