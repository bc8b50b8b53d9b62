//! Eine [`Zentrale`] für Tests, die alle Befehle aufzeichnet.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};

use parking_lot::Mutex;

use crate::zentrale::{Quittung, Schaltbefehl, Zentrale};

/// Wie die [`TestZentrale`] auf Befehle reagiert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verhalten {
    /// Jeder Befehl wird sofort quittiert.
    Quittieren,
    /// Jeder Befehl wird nach der Wartezeit in einem eigenen Thread quittiert.
    Verzögert(Duration),
    /// Kein Befehl wird quittiert.
    Schweigen,
    /// Die nächsten Befehle werden nicht quittiert, danach wird wieder sofort quittiert.
    Ignoriere(usize),
}

/// Zeichnet alle Befehle auf und reagiert gemäß ihres [`Verhaltens`](Verhalten).
#[derive(Debug)]
pub(crate) struct TestZentrale {
    /// Aktuelles Verhalten.
    verhalten: Mutex<Verhalten>,
    /// Alle empfangenen Befehle.
    befehle: Mutex<Vec<Schaltbefehl>>,
    /// Nicht bestätigte Quittungen, damit sie nicht gedroppt werden.
    unbestätigt: Mutex<Vec<Quittung>>,
    /// Anzahl ausgelöster Nothalte.
    nothalte: AtomicUsize,
}

impl TestZentrale {
    pub(crate) fn neu(verhalten: Verhalten) -> Self {
        TestZentrale {
            verhalten: Mutex::new(verhalten),
            befehle: Mutex::new(Vec::new()),
            unbestätigt: Mutex::new(Vec::new()),
            nothalte: AtomicUsize::new(0),
        }
    }

    pub(crate) fn setze_verhalten(&self, verhalten: Verhalten) {
        *self.verhalten.lock() = verhalten;
    }

    pub(crate) fn befehle(&self) -> Vec<Schaltbefehl> {
        self.befehle.lock().clone()
    }

    pub(crate) fn nothalte(&self) -> usize {
        self.nothalte.load(Ordering::SeqCst)
    }
}

impl Zentrale for TestZentrale {
    fn sende_schaltbefehl(&self, befehl: Schaltbefehl, quittung: Quittung) {
        self.befehle.lock().push(befehl);
        let mut verhalten = self.verhalten.lock();
        match *verhalten {
            Verhalten::Quittieren => quittung.bestätige(),
            Verhalten::Verzögert(dauer) => {
                let _ = thread::spawn(move || {
                    thread::sleep(dauer);
                    quittung.bestätige();
                });
            },
            Verhalten::Schweigen => self.unbestätigt.lock().push(quittung),
            Verhalten::Ignoriere(0) => {
                *verhalten = Verhalten::Quittieren;
                quittung.bestätige();
            },
            Verhalten::Ignoriere(anzahl) => {
                *verhalten = Verhalten::Ignoriere(anzahl.saturating_sub(1));
                self.unbestätigt.lock().push(quittung);
            },
        }
    }

    fn nothalt(&self) {
        let _ = self.nothalte.fetch_add(1, Ordering::SeqCst);
    }
}
