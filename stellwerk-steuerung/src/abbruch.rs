//! Kooperativer Abbruch laufender Ausführungen.

use std::{
    sync::Arc,
    thread::sleep,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// Warum eine Ausführung abgebrochen wurde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbbruchGrund {
    /// Vom Benutzer abgebrochen.
    Abgebrochen,
    /// Die Verbindung zur Zentrale wurde getrennt.
    VerbindungGetrennt,
}

/// Von mehreren Threads geteiltes Abbruch-Signal.
///
/// Alle Wartezeiten prüfen das Signal regelmäßig, ein Abbruch wird daher
/// spätestens nach einem Abfrage-Intervall bemerkt.
#[derive(Debug, Clone, Default)]
pub struct Abbruch(Arc<Mutex<Option<AbbruchGrund>>>);

impl Abbruch {
    /// Erzeuge ein neues, nicht ausgelöstes Signal.
    #[must_use]
    pub fn neu() -> Self {
        Abbruch::default()
    }

    /// Löse den Abbruch aus. Nur der erste Grund wird gespeichert.
    pub fn brich_ab(&self, grund: AbbruchGrund) {
        let mut gespeichert = self.0.lock();
        if gespeichert.is_none() {
            *gespeichert = Some(grund);
        }
    }

    /// Der Grund, falls der Abbruch ausgelöst wurde.
    #[must_use]
    pub fn grund(&self) -> Option<AbbruchGrund> {
        *self.0.lock()
    }

    /// Gebe einen Fehler zurück, falls der Abbruch ausgelöst wurde.
    ///
    /// ## Errors
    ///
    /// Der Abbruch wurde ausgelöst.
    pub fn prüfe(&self) -> Result<(), AbbruchGrund> {
        self.grund().map_or(Ok(()), Err)
    }

    /// Warte für `dauer`, prüfe dabei alle `intervall` auf einen Abbruch.
    ///
    /// ## Errors
    ///
    /// Der Abbruch wurde vor Ende der Wartezeit ausgelöst.
    pub fn warte(&self, dauer: Duration, intervall: Duration) -> Result<(), AbbruchGrund> {
        let start = Instant::now();
        loop {
            self.prüfe()?;
            let vergangen = start.elapsed();
            if vergangen >= dauer {
                break Ok(());
            }
            sleep(intervall.min(dauer.saturating_sub(vergangen)));
        }
    }
}
