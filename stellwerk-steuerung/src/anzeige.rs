//! Schnittstelle zur Anzeige (z.B. einem GUI).

use std::{sync::Arc, time::Duration};

use log::{debug, info, trace};
use stellwerk_gleisbild::zustand::{Beobachter, Änderung};

/// Alle Benachrichtigungen, die eine Anzeige erhält.
///
/// Alle Methoden werden synchron aufgerufen und sollten nicht blockieren.
pub trait Anzeige: Send + Sync {
    /// Lokomotiven müssen neu gezeichnet werden.
    fn aktualisiere_lokomotiven(&self);

    /// Weichen und Signale müssen neu gezeichnet werden.
    fn aktualisiere_weichen(&self);

    /// Das Gleisbild (z.B. Rückmelder) muss neu gezeichnet werden.
    fn aktualisiere_gleisbild(&self);

    /// Der Strom-Zustand der Zentrale hat sich geändert.
    fn aktualisiere_stromzustand(&self);

    /// Eine Nachricht für den Benutzer.
    fn protokolliere(&self, nachricht: &str);

    /// Die Antwortzeit der Zentrale für den letzten Befehl.
    fn aktualisiere_latenz(&self, latenz: Duration);
}

/// Eine [`Anzeige`], die alle Benachrichtigungen ignoriert.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeineAnzeige;

impl Anzeige for KeineAnzeige {
    fn aktualisiere_lokomotiven(&self) {}

    fn aktualisiere_weichen(&self) {}

    fn aktualisiere_gleisbild(&self) {}

    fn aktualisiere_stromzustand(&self) {}

    fn protokolliere(&self, _nachricht: &str) {}

    fn aktualisiere_latenz(&self, _latenz: Duration) {}
}

/// Eine [`Anzeige`], die alle Benachrichtigungen an das Log weitergibt.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAnzeige;

impl Anzeige for LogAnzeige {
    fn aktualisiere_lokomotiven(&self) {
        trace!("Lokomotiven aktualisiert.");
    }

    fn aktualisiere_weichen(&self) {
        trace!("Weichen aktualisiert.");
    }

    fn aktualisiere_gleisbild(&self) {
        trace!("Gleisbild aktualisiert.");
    }

    fn aktualisiere_stromzustand(&self) {
        debug!("Strom-Zustand aktualisiert.");
    }

    fn protokolliere(&self, nachricht: &str) {
        info!("{nachricht}");
    }

    fn aktualisiere_latenz(&self, latenz: Duration) {
        trace!("Latenz: {}ms", latenz.as_millis());
    }
}

/// Leitet Zustands-Änderungen als Aktualisierung an eine [`Anzeige`] weiter.
pub(crate) struct AnzeigeBeobachter(pub(crate) Arc<dyn Anzeige>);

impl Beobachter for AnzeigeBeobachter {
    fn geändert(&self, änderung: &Änderung) {
        match änderung {
            Änderung::Zubehör { .. } => self.0.aktualisiere_weichen(),
            Änderung::Rückmelder { .. } => self.0.aktualisiere_gleisbild(),
        }
    }
}
