//! Sende Schaltbefehle an die Zentrale und warte auf ihre Quittung.
//!
//! Befehle an den selben Antrieb werden nacheinander ausgeführt,
//! Befehle an unterschiedliche Antriebe dürfen gleichzeitig ausstehen.

use std::{
    collections::HashSet,
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, RecvTimeoutError},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use stellwerk_gleisbild::{adresse::ZubehörAdresse, zustand::Zustände};
use thiserror::Error;

use crate::{
    abbruch::{Abbruch, AbbruchGrund},
    anzeige::Anzeige,
    einstellungen::Einstellungen,
    zentrale::{Quittung, Schaltbefehl, Zentrale},
};

/// Fehler beim Ausführen eines [`Schaltbefehls`](Schaltbefehl).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BefehlFehler {
    /// Die Zentrale hat den Befehl nicht rechtzeitig quittiert.
    #[error("Keine Quittung für {befehl} nach {}ms.", zeitlimit.as_millis())]
    Zeitüberschreitung {
        /// Der Befehl.
        befehl: Schaltbefehl,
        /// Das abgelaufene Zeitlimit.
        zeitlimit: Duration,
    },
    /// Es besteht keine Verbindung zur Zentrale.
    #[error("Keine Verbindung zur Zentrale, {befehl} wurde nicht gesendet.")]
    VerbindungGetrennt {
        /// Der Befehl.
        befehl: Schaltbefehl,
    },
    /// Das Warten wurde abgebrochen.
    #[error("{befehl} abgebrochen: {grund:?}")]
    Abgebrochen {
        /// Der Befehl.
        befehl: Schaltbefehl,
        /// Grund für den Abbruch.
        grund: AbbruchGrund,
    },
}

/// Alle Antriebe, für die aktuell ein Befehl aussteht.
#[derive(Debug, Default)]
struct Ausstehend {
    /// Die Adressen der Antriebe.
    adressen: Mutex<HashSet<ZubehörAdresse>>,
    /// Wird benachrichtigt, sobald eine Adresse frei wird.
    frei: Condvar,
}

/// Reserviert einen Antrieb, bis der zugehörige Befehl quittiert oder verworfen wurde.
#[derive(Debug)]
struct AdressSperre {
    /// Die reservierte Adresse.
    adresse: ZubehörAdresse,
    /// Wo die Reservierung gespeichert ist.
    ausstehend: Arc<Ausstehend>,
}

impl Drop for AdressSperre {
    fn drop(&mut self) {
        let _ = self.ausstehend.adressen.lock().remove(&self.adresse);
        let _ = self.ausstehend.frei.notify_all();
    }
}

/// Verteilt [Schaltbefehle](Schaltbefehl) an die [`Zentrale`].
pub struct Verteiler {
    /// Die Verbindung zur Anlage.
    zentrale: Arc<dyn Zentrale>,
    /// Wird nach einer Quittung aktualisiert.
    zustände: Arc<Zustände>,
    /// Erhält die Latenz jedes Befehls.
    anzeige: Arc<dyn Anzeige>,
    /// Antriebe mit ausstehendem Befehl.
    ausstehend: Arc<Ausstehend>,
    /// Besteht aktuell eine Verbindung zur Zentrale?
    verbunden: AtomicBool,
    /// Ist die Stromversorgung der Anlage eingeschaltet?
    strom_an: AtomicBool,
    /// Zeitlimit und Abfrage-Intervall.
    einstellungen: Einstellungen,
}

impl Debug for Verteiler {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Verteiler")
            .field("ausstehend", &self.ausstehend)
            .field("verbunden", &self.verbunden)
            .field("strom_an", &self.strom_an)
            .field("einstellungen", &self.einstellungen)
            .finish_non_exhaustive()
    }
}

impl Verteiler {
    /// Erzeuge einen neuen Verteiler. Es wird angenommen,
    /// dass eine Verbindung besteht und der Strom eingeschaltet ist.
    #[must_use]
    pub fn neu(
        zentrale: Arc<dyn Zentrale>,
        zustände: Arc<Zustände>,
        anzeige: Arc<dyn Anzeige>,
        einstellungen: Einstellungen,
    ) -> Self {
        Verteiler {
            zentrale,
            zustände,
            anzeige,
            ausstehend: Arc::new(Ausstehend::default()),
            verbunden: AtomicBool::new(true),
            strom_an: AtomicBool::new(true),
            einstellungen,
        }
    }

    /// Besteht aktuell eine Verbindung zur Zentrale?
    #[must_use]
    pub fn verbunden(&self) -> bool {
        self.verbunden.load(Ordering::SeqCst)
    }

    /// Setze, ob eine Verbindung zur Zentrale besteht.
    /// Ohne Verbindung werden keine Befehle gesendet.
    pub fn setze_verbunden(&self, verbunden: bool) {
        self.verbunden.store(verbunden, Ordering::SeqCst);
    }

    /// Ist die Stromversorgung der Anlage eingeschaltet?
    #[must_use]
    pub fn strom_an(&self) -> bool {
        self.strom_an.load(Ordering::SeqCst)
    }

    /// Setze den Strom-Zustand, z.B. nachdem die Zentrale ihn gemeldet hat.
    pub fn setze_strom(&self, strom_an: bool) {
        if self.strom_an.swap(strom_an, Ordering::SeqCst) != strom_an {
            self.anzeige.aktualisiere_stromzustand();
        }
    }

    /// Unterbreche sofort die Stromversorgung der Anlage.
    pub fn nothalt(&self) {
        warn!("Nothalt!");
        self.strom_an.store(false, Ordering::SeqCst);
        self.zentrale.nothalt();
        self.anzeige.aktualisiere_stromzustand();
    }

    /// Unterbreche die Stromversorgung, falls sie eingeschaltet ist.
    /// Gibt zurück, ob ein Nothalt gesendet wurde.
    pub fn nothalt_falls_strom_an(&self) -> bool {
        if self.strom_an.compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst).is_err()
        {
            return false;
        }
        warn!("Nothalt!");
        self.zentrale.nothalt();
        self.anzeige.aktualisiere_stromzustand();
        true
    }

    /// Sende einen Befehl an die Zentrale.
    ///
    /// Steht für den Antrieb noch ein Befehl aus, wird zuerst auf dessen Ende gewartet.
    ///
    /// ## Errors
    ///
    /// Es besteht keine Verbindung, oder das Warten wurde abgebrochen.
    pub fn sende(
        &self,
        befehl: Schaltbefehl,
        abbruch: &Abbruch,
    ) -> Result<AusstehenderBefehl, BefehlFehler> {
        let sperre = {
            let mut adressen = self.ausstehend.adressen.lock();
            while adressen.contains(&befehl.adresse) {
                if let Err(grund) = abbruch.prüfe() {
                    return Err(BefehlFehler::Abgebrochen { befehl, grund });
                }
                let _ = self.ausstehend.frei.wait_for(&mut adressen, self.einstellungen.abfrage_intervall);
            }
            let _ = adressen.insert(befehl.adresse);
            AdressSperre { adresse: befehl.adresse, ausstehend: Arc::clone(&self.ausstehend) }
        };
        if !self.verbunden() {
            return Err(BefehlFehler::VerbindungGetrennt { befehl });
        }
        let (sender, empfänger) = channel();
        debug!("Sende {befehl}.");
        let gesendet = Instant::now();
        self.zentrale.sende_schaltbefehl(befehl, Quittung::neu(sender));
        Ok(AusstehenderBefehl {
            befehl,
            empfänger,
            gesendet,
            einstellungen: self.einstellungen,
            zustände: Arc::clone(&self.zustände),
            anzeige: Arc::clone(&self.anzeige),
            _sperre: sperre,
        })
    }
}

/// Ein gesendeter Befehl, dessen Quittung noch aussteht.
pub struct AusstehenderBefehl {
    /// Der gesendete Befehl.
    befehl: Schaltbefehl,
    /// Empfängt die Quittung.
    empfänger: Receiver<()>,
    /// Zeitpunkt des Sendens.
    gesendet: Instant,
    /// Zeitlimit und Abfrage-Intervall.
    einstellungen: Einstellungen,
    /// Wird nach der Quittung aktualisiert.
    zustände: Arc<Zustände>,
    /// Erhält die Latenz.
    anzeige: Arc<dyn Anzeige>,
    /// Der Antrieb bleibt reserviert, bis der Befehl beendet ist.
    _sperre: AdressSperre,
}

impl Debug for AusstehenderBefehl {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AusstehenderBefehl")
            .field("befehl", &self.befehl)
            .field("gesendet", &self.gesendet)
            .finish_non_exhaustive()
    }
}

impl AusstehenderBefehl {
    /// Der gesendete Befehl.
    #[must_use]
    pub fn befehl(&self) -> Schaltbefehl {
        self.befehl
    }

    /// Warte auf die Quittung. Bei Erfolg wird die Latenz zurückgegeben.
    ///
    /// ## Errors
    ///
    /// Das Zeitlimit ist abgelaufen, die Quittung wurde verworfen,
    /// oder das Warten wurde abgebrochen.
    pub fn warte(self, abbruch: &Abbruch) -> Result<Duration, BefehlFehler> {
        let AusstehenderBefehl { befehl, empfänger, gesendet, einstellungen, zustände, anzeige, _sperre } =
            self;
        let zeitlimit = einstellungen.quittung_zeitlimit;
        let zeitüberschreitung = BefehlFehler::Zeitüberschreitung { befehl, zeitlimit };
        loop {
            let vergangen = gesendet.elapsed();
            if vergangen >= zeitlimit {
                break Err(zeitüberschreitung);
            }
            let intervall = einstellungen.abfrage_intervall.min(zeitlimit.saturating_sub(vergangen));
            match empfänger.recv_timeout(intervall) {
                Ok(()) => {
                    let latenz = gesendet.elapsed();
                    debug!("{befehl} nach {}ms quittiert.", latenz.as_millis());
                    zustände.setze_stellung(befehl.adresse, befehl.stellung);
                    anzeige.aktualisiere_latenz(latenz);
                    break Ok(latenz);
                },
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(grund) = abbruch.prüfe() {
                        break Err(BefehlFehler::Abgebrochen { befehl, grund });
                    }
                },
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Quittung für {befehl} wurde verworfen.");
                    break Err(zeitüberschreitung);
                },
            }
        }
    }
}
