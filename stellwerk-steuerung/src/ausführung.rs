//! Ausführung einer Fahrstraße in einem eigenen Thread.
//!
//! `Bereit -> Sperren -> Läuft -> {Abgeschlossen, Fehlgeschlagen, Abgebrochen}`

use std::{
    collections::BTreeSet,
    sync::{mpsc::RecvTimeoutError, Arc},
    thread,
    time::{Duration, Instant},
};

use log::{error, info, warn};
use parking_lot::{Condvar, Mutex};
use stellwerk_gleisbild::{
    adresse::{Belegung, RückmelderAdresse},
    zustand::{UngültigerZustand, Zustände},
    Art,
};
use thiserror::Error;

use crate::{
    abbruch::{Abbruch, AbbruchGrund},
    anzeige::Anzeige,
    einstellungen::Einstellungen,
    fahrstraße::{AufgelösterSchritt, Aufgelöst, AuflösenFehler, Name, Schritt},
    sperren::{Abschnitt, SperreVerweigert, Sperren},
    verteiler::{BefehlFehler, Verteiler},
    warteliste::Warteliste,
    zentrale::Schaltbefehl,
};

/// Fehler eines einzelnen Schritts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchrittFehler {
    /// Ein Schaltbefehl wurde auch nach allen Wiederholungen nicht quittiert.
    #[error(transparent)]
    Befehl(#[from] BefehlFehler),
    /// Der Rückmelder hat die erwartete Belegung nicht rechtzeitig gemeldet.
    #[error("{} hat nach {}ms nicht {belegung} gemeldet.", .rückmelder, zeitlimit.as_millis())]
    RückmeldungZeitüberschreitung {
        /// Der Rückmelder.
        rückmelder: RückmelderAdresse,
        /// Die erwartete Belegung.
        belegung: Belegung,
        /// Das abgelaufene Zeitlimit.
        zeitlimit: Duration,
    },
    /// Die Komponente kann den gewünschten Zustand nicht annehmen.
    #[error(transparent)]
    UngültigerZustand(#[from] UngültigerZustand),
}

/// Fehler beim Ausführen einer Fahrstraße.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fehler {
    /// Die Fahrstraße wird bereits ausgeführt.
    #[error("Fahrstraße {0} wird bereits ausgeführt.")]
    LäuftBereits(Name),
    /// Die benötigten Abschnitte sind durch andere Fahrstraßen gesperrt.
    #[error(transparent)]
    SperreVerweigert(#[from] SperreVerweigert),
    /// Verschachtelte Fahrstraßen konnten nicht aufgelöst werden.
    #[error(transparent)]
    Auflösen(#[from] AuflösenFehler),
    /// Ein Schritt ist fehlgeschlagen.
    #[error("Fahrstraße {}, Schritt {index}: {fehler}", .fahrstraße)]
    Schritt {
        /// Die Fahrstraße, in der der Schritt definiert ist.
        fahrstraße: Name,
        /// Index des Schritts.
        index: usize,
        /// Der Fehler.
        fehler: SchrittFehler,
    },
    /// Die Sperre eines Abschnitts ging während der Ausführung verloren.
    #[error("Fahrstraße {0} hat die Sperre ihrer Abschnitte verloren.")]
    SperreVerloren(Name),
    /// Die Verbindung zur Zentrale wurde getrennt.
    #[error("Verbindung zur Zentrale getrennt.")]
    VerbindungGetrennt,
}

/// Aktueller Status einer [`Ausführung`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Noch nicht gestartet.
    Bereit,
    /// Die Abschnitte werden gesperrt.
    Sperren,
    /// Die Schritte werden ausgeführt.
    Läuft,
    /// Alle Schritte wurden erfolgreich ausgeführt.
    Abgeschlossen,
    /// Die Ausführung ist fehlgeschlagen.
    Fehlgeschlagen(Fehler),
    /// Die Ausführung wurde abgebrochen.
    Abgebrochen,
}

impl Status {
    /// Ist die Ausführung beendet?
    #[must_use]
    pub fn ist_beendet(&self) -> bool {
        matches!(self, Status::Abgeschlossen | Status::Fehlgeschlagen(_) | Status::Abgebrochen)
    }
}

/// Alles, was eine Ausführung benötigt.
#[derive(Clone)]
pub(crate) struct Kontext {
    /// Sendet Schaltbefehle.
    pub(crate) verteiler: Arc<Verteiler>,
    /// Verwaltet gesperrte Abschnitte.
    pub(crate) sperren: Arc<Sperren>,
    /// Zustand aller Antriebe und Rückmelder.
    pub(crate) zustände: Arc<Zustände>,
    /// Leitet Rückmeldungen weiter.
    pub(crate) warteliste: Arc<Warteliste>,
    /// Erhält Nachrichten für den Benutzer.
    pub(crate) anzeige: Arc<dyn Anzeige>,
    /// Zeitlimits und Pausen.
    pub(crate) einstellungen: Einstellungen,
}

/// Eine gestartete Ausführung einer Fahrstraße.
#[derive(Debug)]
pub struct Ausführung {
    /// Name der ausgeführten Fahrstraße.
    name: Name,
    /// Alle ausgeführten Fahrstraßen, inklusive verschachtelter.
    verwendet: BTreeSet<Name>,
    /// Aktueller Status.
    status: Mutex<Status>,
    /// Wird bei Ende der Ausführung benachrichtigt.
    beendet: Condvar,
    /// Abbruch-Signal für alle Wartezeiten.
    abbruch: Abbruch,
}

impl Ausführung {
    /// Erzeuge eine neue, noch nicht gestartete Ausführung.
    fn neu(name: Name, verwendet: BTreeSet<Name>) -> Self {
        Ausführung {
            name,
            verwendet,
            status: Mutex::new(Status::Bereit),
            beendet: Condvar::new(),
            abbruch: Abbruch::neu(),
        }
    }

    /// Name der ausgeführten Fahrstraße.
    #[must_use]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Wird die Fahrstraße ausgeführt, direkt oder verschachtelt in einer anderen?
    #[must_use]
    pub fn führt_aus(&self, fahrstraße: &Name) -> bool {
        self.verwendet.contains(fahrstraße)
    }

    /// Der aktuelle Status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status.lock().clone()
    }

    /// Ist die Ausführung beendet?
    #[must_use]
    pub fn ist_beendet(&self) -> bool {
        self.status.lock().ist_beendet()
    }

    /// Breche die Ausführung ab. Alle Wartezeiten werden spätestens nach einem
    /// [Abfrage-Intervall](Einstellungen::abfrage_intervall) beendet.
    pub fn abbrechen(&self) {
        self.brich_ab(AbbruchGrund::Abgebrochen);
    }

    /// Breche die Ausführung mit dem angegebenen Grund ab.
    pub(crate) fn brich_ab(&self, grund: AbbruchGrund) {
        self.abbruch.brich_ab(grund);
    }

    /// Warte höchstens `zeitlimit` auf das Ende der Ausführung.
    ///
    /// Gibt den End-Status zurück, oder [`None`] falls die Ausführung noch läuft.
    pub fn warte_auf_ende(&self, zeitlimit: Duration) -> Option<Status> {
        let start = Instant::now();
        let mut status = self.status.lock();
        while !status.ist_beendet() {
            let verbleibend = zeitlimit.saturating_sub(start.elapsed());
            if verbleibend.is_zero() || self.beendet.wait_for(&mut status, verbleibend).timed_out() {
                break;
            }
        }
        status.ist_beendet().then(|| status.clone())
    }

    /// Setze einen neuen Status, benachrichtige bei Ende alle Wartenden.
    fn setze_status(&self, neu: Status) {
        let mut status = self.status.lock();
        *status = neu;
        if status.ist_beendet() {
            let _ = self.beendet.notify_all();
        }
    }
}

/// Sperre die Abschnitte und starte die Ausführung in einem eigenen Thread.
///
/// ## Errors
///
/// Die Abschnitte sind durch eine andere Fahrstraße gesperrt. Es wird nicht blockiert.
pub(crate) fn starte(kontext: &Kontext, aufgelöst: Aufgelöst) -> Result<Arc<Ausführung>, Fehler> {
    let Aufgelöst { name, schritte, abschnitte, verwendet } = aufgelöst;
    let ausführung = Arc::new(Ausführung::neu(name.clone(), verwendet));
    ausführung.setze_status(Status::Sperren);
    if let Err(verweigert) = kontext.sperren.anfordern(&name, &abschnitte) {
        warn!("{verweigert}");
        kontext.anzeige.protokolliere(&format!("Fahrstraße {name} nicht gestartet: {verweigert}"));
        ausführung.setze_status(Status::Fehlgeschlagen(verweigert.clone().into()));
        return Err(verweigert.into());
    }
    ausführung.setze_status(Status::Läuft);
    let nachricht = format!("Führe Fahrstraße {name} aus.");
    info!("{nachricht}");
    kontext.anzeige.protokolliere(&nachricht);

    let kontext = kontext.clone();
    let ausführung_clone = Arc::clone(&ausführung);
    let _ = thread::spawn(move || {
        let status = führe_schritte_aus(&kontext, &ausführung_clone, &schritte, &abschnitte);
        // Sperren werden immer vor dem End-Status freigegeben.
        let _ = kontext.sperren.freigeben(&name);
        let nachricht = match &status {
            Status::Abgeschlossen => {
                let nachricht = format!("Fahrstraße {name} ausgeführt.");
                info!("{nachricht}");
                nachricht
            },
            Status::Fehlgeschlagen(fehler) => {
                let nachricht = format!("Fahrstraße {name} fehlgeschlagen: {fehler}");
                error!("{nachricht}");
                nachricht
            },
            Status::Abgebrochen => {
                let nachricht = format!("Fahrstraße {name} abgebrochen.");
                warn!("{nachricht}");
                nachricht
            },
            Status::Bereit | Status::Sperren | Status::Läuft => {
                format!("Fahrstraße {name} in unerwartetem Status {status:?} beendet.")
            },
        };
        kontext.anzeige.protokolliere(&nachricht);
        ausführung_clone.setze_status(status);
    });
    Ok(ausführung)
}

/// Grund, warum ein Schritt nicht erfolgreich beendet wurde.
#[derive(Debug)]
enum Unterbrechung {
    /// Der Schritt ist fehlgeschlagen.
    Fehler(SchrittFehler),
    /// Die Verbindung zur Zentrale wurde getrennt.
    VerbindungGetrennt,
    /// Die Ausführung wurde abgebrochen.
    Abbruch(AbbruchGrund),
}

impl From<AbbruchGrund> for Unterbrechung {
    fn from(grund: AbbruchGrund) -> Self {
        Unterbrechung::Abbruch(grund)
    }
}

impl From<UngültigerZustand> for Unterbrechung {
    fn from(fehler: UngültigerZustand) -> Self {
        Unterbrechung::Fehler(fehler.into())
    }
}

/// Führe alle Schritte aus und gebe den End-Status zurück.
fn führe_schritte_aus(
    kontext: &Kontext,
    ausführung: &Ausführung,
    schritte: &[AufgelösterSchritt],
    abschnitte: &BTreeSet<Abschnitt>,
) -> Status {
    for AufgelösterSchritt { fahrstraße, index, schritt } in schritte {
        let ergebnis = if kontext.sperren.hält_alle(&ausführung.name, abschnitte) {
            führe_schritt_aus(kontext, &ausführung.abbruch, schritt)
        } else {
            return Status::Fehlgeschlagen(Fehler::SperreVerloren(ausführung.name.clone()));
        };
        match ergebnis {
            Ok(()) => {},
            Err(Unterbrechung::Fehler(fehler)) => {
                return Status::Fehlgeschlagen(Fehler::Schritt {
                    fahrstraße: fahrstraße.clone(),
                    index: *index,
                    fehler,
                })
            },
            Err(Unterbrechung::VerbindungGetrennt | Unterbrechung::Abbruch(AbbruchGrund::VerbindungGetrennt)) => {
                return Status::Fehlgeschlagen(Fehler::VerbindungGetrennt)
            },
            Err(Unterbrechung::Abbruch(AbbruchGrund::Abgebrochen)) => return Status::Abgebrochen,
        }
    }
    Status::Abgeschlossen
}

/// Führe einen einzelnen Schritt aus.
fn führe_schritt_aus(
    kontext: &Kontext,
    abbruch: &Abbruch,
    schritt: &Schritt,
) -> Result<(), Unterbrechung> {
    let Einstellungen { schalt_pause, dreiwege_verzögerung, abfrage_intervall, .. } =
        kontext.einstellungen;
    abbruch.prüfe()?;
    match schritt {
        Schritt::Schalten { adresse, stellung, verzögerung } => {
            schalte(kontext, abbruch, Schaltbefehl { adresse: *adresse, stellung: *stellung })?;
            abbruch.warte(schalt_pause.saturating_add(verzögerung.unwrap_or_default()), abfrage_intervall)?;
        },
        Schritt::Stellen { koordinate, zustand, verzögerung } => {
            let gleisbild = kontext.zustände.gleisbild();
            let komponente = gleisbild
                .komponente(koordinate)
                .ok_or(UngültigerZustand::KeineKomponente(*koordinate))?;
            let stellungen = zustand.stellungen(komponente)?;
            let dreiwege = komponente.art == Art::DreiwegeWeiche;
            for (nummer, (adresse, stellung)) in stellungen.into_iter().enumerate() {
                if dreiwege && nummer > 0 {
                    abbruch.warte(dreiwege_verzögerung, abfrage_intervall)?;
                }
                schalte(kontext, abbruch, Schaltbefehl { adresse, stellung })?;
            }
            abbruch.warte(schalt_pause.saturating_add(verzögerung.unwrap_or_default()), abfrage_intervall)?;
        },
        Schritt::WartenAuf { rückmelder, belegung, zeitlimit } => {
            let zeitlimit = zeitlimit.unwrap_or(kontext.einstellungen.rückmeldung_zeitlimit);
            warte_auf_rückmelder(kontext, abbruch, *rückmelder, *belegung, zeitlimit)?;
        },
        Schritt::Warten(dauer) => abbruch.warte(*dauer, abfrage_intervall)?,
        Schritt::Nothalt => {
            if kontext.verteiler.nothalt_falls_strom_an() {
                kontext.anzeige.protokolliere("Nothalt ausgelöst.");
            } else {
                info!("Nothalt übersprungen, der Strom ist bereits ausgeschaltet.");
                kontext.anzeige.protokolliere("Nothalt übersprungen, Strom bereits aus.");
            }
        },
        // Wurde bereits durch `fahrstraße::auflösen` ersetzt.
        Schritt::Fahrstraße(_name) => {},
    }
    Ok(())
}

/// Sende einen Schaltbefehl, wiederhole ihn bei fehlender Quittung.
fn schalte(kontext: &Kontext, abbruch: &Abbruch, befehl: Schaltbefehl) -> Result<(), Unterbrechung> {
    let max_wiederholungen = kontext.einstellungen.max_wiederholungen;
    let mut wiederholungen = 0;
    loop {
        let ergebnis =
            kontext.verteiler.sende(befehl, abbruch).and_then(|ausstehend| ausstehend.warte(abbruch));
        match ergebnis {
            Ok(_latenz) => break Ok(()),
            Err(fehler @ BefehlFehler::Zeitüberschreitung { .. }) => {
                if wiederholungen >= max_wiederholungen {
                    break Err(Unterbrechung::Fehler(fehler.into()));
                }
                wiederholungen = wiederholungen.saturating_add(1);
                warn!("{fehler} Wiederholung {wiederholungen}/{max_wiederholungen}.");
            },
            Err(BefehlFehler::VerbindungGetrennt { .. }) => {
                break Err(Unterbrechung::VerbindungGetrennt)
            },
            Err(BefehlFehler::Abgebrochen { befehl: _, grund }) => break Err(grund.into()),
        }
    }
}

/// Warte, bis der Rückmelder die gewünschte Belegung meldet.
///
/// Hat der Rückmelder bereits die gewünschte Belegung, wird nicht gewartet.
fn warte_auf_rückmelder(
    kontext: &Kontext,
    abbruch: &Abbruch,
    rückmelder: RückmelderAdresse,
    belegung: Belegung,
    zeitlimit: Duration,
) -> Result<(), Unterbrechung> {
    // Zuerst registrieren, damit keine Meldung zwischen Prüfung und Warten verloren geht.
    let wartend = kontext.warteliste.registriere(rückmelder);
    if kontext.zustände.belegung(rückmelder) == belegung {
        return Ok(());
    }
    let start = Instant::now();
    let intervall = kontext.einstellungen.abfrage_intervall;
    loop {
        abbruch.prüfe()?;
        let vergangen = start.elapsed();
        if vergangen >= zeitlimit {
            break Err(Unterbrechung::Fehler(SchrittFehler::RückmeldungZeitüberschreitung {
                rückmelder,
                belegung,
                zeitlimit,
            }));
        }
        match wartend.empfänger().recv_timeout(intervall.min(zeitlimit.saturating_sub(vergangen))) {
            Ok(gemeldet) if gemeldet == belegung => break Ok(()),
            Ok(_) | Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => {
                if kontext.zustände.belegung(rückmelder) == belegung {
                    break Ok(());
                }
                thread::sleep(intervall);
            },
        }
    }
}
