//! Leite Rückmeldungen an alle darauf wartenden Ausführungen weiter.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{channel, Receiver, Sender},
    },
};

use parking_lot::Mutex;
use stellwerk_gleisbild::{
    adresse::{Belegung, RückmelderAdresse},
    zustand::{Beobachter, Änderung},
};

/// Alle Ausführungen, die auf einen Rückmelder warten.
///
/// Jede Meldung wird in Empfangs-Reihenfolge genau an die Wartenden des Rückmelders gesendet.
#[derive(Debug, Default)]
pub(crate) struct Warteliste {
    /// Sender zu allen Wartenden mit ihrer Id, nach Rückmelder.
    wartende: Mutex<HashMap<RückmelderAdresse, Vec<(u64, Sender<Belegung>)>>>,
    /// Id der nächsten Registrierung.
    nächste_id: AtomicU64,
}

/// Eine Registrierung in der [`Warteliste`]. Wird beim Drop wieder entfernt.
#[derive(Debug)]
pub(crate) struct Wartend<'t> {
    /// Die Warteliste, aus der die Registrierung beim Drop entfernt wird.
    warteliste: &'t Warteliste,
    /// Der Rückmelder, auf den gewartet wird.
    adresse: RückmelderAdresse,
    /// Id der Registrierung.
    id: u64,
    /// Empfängt alle Meldungen des Rückmelders.
    empfänger: Receiver<Belegung>,
}

impl Wartend<'_> {
    /// Empfängt alle Meldungen des Rückmelders seit der Registrierung.
    pub(crate) fn empfänger(&self) -> &Receiver<Belegung> {
        &self.empfänger
    }
}

impl Drop for Wartend<'_> {
    fn drop(&mut self) {
        self.warteliste.entferne(self.adresse, self.id);
    }
}

impl Warteliste {
    /// Registriere einen neuen Wartenden. Die Registrierung endet mit dem Drop von [`Wartend`].
    pub(crate) fn registriere(&self, adresse: RückmelderAdresse) -> Wartend<'_> {
        let (sender, empfänger) = channel();
        let id = self.nächste_id.fetch_add(1, Ordering::Relaxed);
        self.wartende.lock().entry(adresse).or_default().push((id, sender));
        Wartend { warteliste: self, adresse, id, empfänger }
    }

    /// Entferne eine Registrierung.
    fn entferne(&self, adresse: RückmelderAdresse, id: u64) {
        let mut wartende = self.wartende.lock();
        if let Some(sender) = wartende.get_mut(&adresse) {
            sender.retain(|(andere_id, _sender)| *andere_id != id);
            if sender.is_empty() {
                let _ = wartende.remove(&adresse);
            }
        }
    }

    /// Sende eine Meldung an alle Wartenden.
    fn melde(&self, adresse: RückmelderAdresse, belegung: Belegung) {
        if let Some(sender) = self.wartende.lock().get(&adresse) {
            for (_id, sender) in sender {
                // Der Empfänger wird gerade zusammen mit seiner Registrierung entfernt.
                let _ = sender.send(belegung);
            }
        }
    }

    /// Anzahl der aktuell auf den Rückmelder Wartenden.
    #[cfg(test)]
    pub(crate) fn anzahl(&self, adresse: RückmelderAdresse) -> usize {
        self.wartende.lock().get(&adresse).map_or(0, Vec::len)
    }
}

impl Beobachter for Warteliste {
    fn geändert(&self, änderung: &Änderung) {
        if let Änderung::Rückmelder { adresse, belegung, vorher: _ } = änderung {
            self.melde(*adresse, *belegung);
        }
    }
}
