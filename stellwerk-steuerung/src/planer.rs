//! Ausführung eines Fahrplans in einem eigenen Thread.

use std::{
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    ausführung::{self, Ausführung, Status},
    fahrplan::{self, Fahrplan, Fortschritt},
    fahrstraße,
    stellwerk::{Fehler, Inneres, Stellwerk},
};

/// Steuerung eines laufenden Fahrplans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Steuerung {
    /// Unterbreche nach der aktuellen Fahrstraße bzw. sofort während einer Wartezeit.
    Pausieren,
    /// Setze einen pausierten Fahrplan fort.
    Fortsetzen,
    /// Beende die Ausführung, eine laufende Fahrstraße wird abgebrochen.
    Anhalten,
}

/// Verbindung zum Thread eines laufenden Fahrplans.
#[derive(Debug)]
pub(crate) struct Lauf {
    /// Nur der Thread mit der aktuellen Id darf den Fortschritt verändern.
    pub(crate) id: u64,
    /// Sendet Befehle an den Thread.
    pub(crate) steuerung: Sender<Steuerung>,
    /// Die aktuell ausgeführte Fahrstraße.
    pub(crate) ausführung: Option<Arc<Ausführung>>,
}

/// Ein Fahrplan zusammen mit seinem Fortschritt.
#[derive(Debug)]
pub(crate) struct Planer {
    /// Die Definition.
    pub(crate) fahrplan: Fahrplan,
    /// Status und aktueller Eintrag.
    pub(crate) fortschritt: Fortschritt,
    /// Verbindung zum ausführenden Thread.
    pub(crate) lauf: Option<Lauf>,
}

impl Planer {
    /// Ein neuer, nicht laufender Planer.
    pub(crate) fn neu(fahrplan: Fahrplan) -> Self {
        Planer { fahrplan, fortschritt: Fortschritt::default(), lauf: None }
    }

    /// Sende einen Befehl an den ausführenden Thread.
    pub(crate) fn sende(&self, steuerung: Steuerung) {
        if let Some(lauf) = &self.lauf {
            // Der Thread hat sich bereits beendet.
            let _ = lauf.steuerung.send(steuerung);
        }
    }

    /// Beende die Ausführung. Der Cursor bleibt erhalten.
    pub(crate) fn halte_an(&mut self) {
        if let Some(Lauf { id: _, steuerung, ausführung }) = self.lauf.take() {
            let _ = steuerung.send(Steuerung::Anhalten);
            if let Some(ausführung) = ausführung {
                ausführung.abbrechen();
            }
        }
        self.fortschritt.status = fahrplan::Status::Bereit;
    }
}

/// Der Thread wurde angehalten oder das Stellwerk existiert nicht mehr.
#[derive(Debug)]
struct Beendet;

/// Ergebnis eines Startversuchs für den aktuellen Eintrag.
#[derive(Debug)]
enum Start {
    /// Die Fahrstraße wurde gestartet.
    Gestartet(Arc<Ausführung>),
    /// Die Sperre wurde verweigert, der Start wird ohne erneute Verzögerung des Eintrags wiederholt.
    Wiederholen,
    /// Der Fahrplan war wegen eines Fehlers pausiert, der Eintrag wird neu gelesen.
    Fortgesetzt,
}

/// Zustand des ausführenden Threads.
struct Ausführer {
    /// Das zugehörige Stellwerk, ohne es am Leben zu halten.
    inneres: Weak<Inneres>,
    /// Der ausgeführte Fahrplan.
    name: fahrplan::Name,
    /// Id dieses Laufs.
    id: u64,
    /// Empfängt Befehle.
    empfänger: Receiver<Steuerung>,
}

/// Führe den Fahrplan aus, bis das Ende erreicht ist oder er angehalten wird.
pub(crate) fn führe_aus(
    inneres: Weak<Inneres>,
    name: fahrplan::Name,
    id: u64,
    empfänger: Receiver<Steuerung>,
) {
    let ausführer = Ausführer { inneres, name, id, empfänger };
    match ausführer.schleife() {
        Ok(()) => {
            let nachricht = format!("Fahrplan {} beendet.", ausführer.name);
            info!("{nachricht}");
            ausführer.protokolliere(&nachricht);
        },
        Err(Beendet) => debug!("Fahrplan {} angehalten.", ausführer.name),
    }
}

impl Ausführer {
    /// Das Stellwerk, sofern es noch existiert.
    fn stellwerk(&self) -> Result<Stellwerk, Beendet> {
        self.inneres.upgrade().map(Stellwerk).ok_or(Beendet)
    }

    /// Verändere den Planer, solange dieser Lauf aktuell ist.
    fn mit_planer<T>(&self, verändere: impl FnOnce(&mut Planer) -> T) -> Result<T, Beendet> {
        let stellwerk = self.stellwerk()?;
        let mut fahrpläne = stellwerk.0.fahrpläne.lock();
        let planer = fahrpläne.get_mut(&self.name).ok_or(Beendet)?;
        if planer.lauf.as_ref().map(|lauf| lauf.id) != Some(self.id) {
            return Err(Beendet);
        }
        Ok(verändere(planer))
    }

    /// Zeige eine Nachricht in der Anzeige des Stellwerks.
    fn protokolliere(&self, nachricht: &str) {
        if let Ok(stellwerk) = self.stellwerk() {
            stellwerk.0.kontext.anzeige.protokolliere(nachricht);
        }
    }

    /// Arbeite alle Einträge ab dem aktuellen Cursor ab.
    ///
    /// Der Eintrag wird bei jedem Versuch neu gelesen, damit Änderungen während einer Pause
    /// berücksichtigt werden.
    fn schleife(&self) -> Result<(), Beendet> {
        // Cursor, dessen Wartezeit bereits abgelaufen und dessen Bedingung erfüllt ist.
        let mut bereit: Option<usize> = None;
        loop {
            let (cursor, eintrag) = self.mit_planer(|planer| {
                let cursor = planer.fortschritt.cursor;
                (cursor, planer.fahrplan.einträge.get(cursor).cloned())
            })?;
            let Some(eintrag) = eintrag else {
                return self.mit_planer(|planer| {
                    planer.lauf = None;
                    planer.fortschritt.status = fahrplan::Status::Bereit;
                });
            };
            if bereit != Some(cursor) {
                self.warte(eintrag.verzögerung)?;
                if let Some(verzweigung) = eintrag.verzweigung {
                    if !verzweigung.erfüllt(&self.stellwerk()?.0.kontext.zustände) {
                        debug!(
                            "Fahrplan {}: Bedingung für Eintrag {cursor} nicht erfüllt, weiter bei {}.",
                            self.name, verzweigung.sonst
                        );
                        self.mit_planer(|planer| planer.fortschritt.cursor = verzweigung.sonst)?;
                        // Ohne Wartezeit würde ein Rücksprung die Bedingung ununterbrochen prüfen.
                        let intervall = self.stellwerk()?.0.kontext.einstellungen.abfrage_intervall;
                        self.warte(intervall)?;
                        continue;
                    }
                }
                bereit = Some(cursor);
            }

            let ausführung = match self.starte(&eintrag.fahrstraße)? {
                Start::Gestartet(ausführung) => ausführung,
                Start::Wiederholen => continue,
                Start::Fortgesetzt => {
                    bereit = None;
                    continue;
                },
            };
            bereit = None;
            let (status, pause_angefordert) = self.warte_auf_ende(&ausführung)?;
            self.mit_planer(|planer| {
                if let Some(lauf) = &mut planer.lauf {
                    lauf.ausführung = None;
                }
            })?;
            match status {
                Status::Abgeschlossen => {
                    self.mit_planer(|planer| planer.fortschritt.cursor = cursor.saturating_add(1))?;
                    if pause_angefordert {
                        self.pausiert()?;
                    }
                },
                Status::Fehlgeschlagen(fehler) => {
                    self.pausiere_mit_fehler(Some(Fehler::Ausführung(fehler)))?;
                },
                Status::Abgebrochen => self.pausiere_mit_fehler(None)?,
                Status::Bereit | Status::Sperren | Status::Läuft => {},
            }
        }
    }

    /// Starte die Fahrstraße. Eine verweigerte Sperre wird nach einer Wartezeit erneut angefordert.
    fn starte(&self, fahrstraße: &fahrstraße::Name) -> Result<Start, Beendet> {
        let ergebnis = self.stellwerk()?.starte_fahrstraße(fahrstraße);
        match ergebnis {
            Ok(ausführung) => {
                let gespeichert = self.mit_planer(|planer| {
                    if let Some(lauf) = &mut planer.lauf {
                        lauf.ausführung = Some(Arc::clone(&ausführung));
                    }
                });
                if let Err(beendet) = gespeichert {
                    ausführung.abbrechen();
                    return Err(beendet);
                }
                Ok(Start::Gestartet(ausführung))
            },
            Err(Fehler::Ausführung(
                ausführung::Fehler::SperreVerweigert(_) | ausführung::Fehler::LäuftBereits(_),
            )) => {
                debug!("Fahrplan {}: {fahrstraße} kann noch nicht starten.", self.name);
                let wartezeit = self.stellwerk()?.0.kontext.einstellungen.sperre_wiederholung;
                self.warte(wartezeit)?;
                Ok(Start::Wiederholen)
            },
            Err(fehler) => {
                self.pausiere_mit_fehler(Some(fehler))?;
                Ok(Start::Fortgesetzt)
            },
        }
    }

    /// Warte auf das Ende der Fahrstraße, reagiere dabei auf Befehle.
    ///
    /// Gibt den End-Status zurück, und ob währenddessen eine Pause angefordert wurde.
    fn warte_auf_ende(&self, ausführung: &Ausführung) -> Result<(Status, bool), Beendet> {
        let intervall = self.stellwerk()?.0.kontext.einstellungen.abfrage_intervall;
        let mut pause_angefordert = false;
        loop {
            if let Some(status) = ausführung.warte_auf_ende(intervall) {
                break Ok((status, pause_angefordert));
            }
            match self.empfänger.try_recv() {
                Ok(Steuerung::Pausieren) => pause_angefordert = true,
                Ok(Steuerung::Fortsetzen) => pause_angefordert = false,
                Ok(Steuerung::Anhalten) | Err(TryRecvError::Disconnected) => {
                    ausführung.abbrechen();
                    break Err(Beendet);
                },
                Err(TryRecvError::Empty) => {},
            }
        }
    }

    /// Warte für `dauer`, bleibe dabei ansprechbar. Die Zeit einer Pause zählt nicht.
    fn warte(&self, dauer: Duration) -> Result<(), Beendet> {
        let mut verbleibend = dauer;
        loop {
            let start = Instant::now();
            match self.empfänger.recv_timeout(verbleibend) {
                Err(RecvTimeoutError::Timeout) => break Ok(()),
                Ok(Steuerung::Pausieren) => {
                    verbleibend = verbleibend.saturating_sub(start.elapsed());
                    self.pausiert()?;
                },
                Ok(Steuerung::Fortsetzen) => {
                    verbleibend = verbleibend.saturating_sub(start.elapsed());
                },
                Ok(Steuerung::Anhalten) | Err(RecvTimeoutError::Disconnected) => break Err(Beendet),
            }
            if verbleibend.is_zero() {
                break Ok(());
            }
        }
    }

    /// Blockiere, bis der Fahrplan fortgesetzt oder angehalten wird.
    fn pausiert(&self) -> Result<(), Beendet> {
        debug!("Fahrplan {} pausiert.", self.name);
        loop {
            match self.empfänger.recv() {
                Ok(Steuerung::Fortsetzen) => {
                    return self.mit_planer(|planer| {
                        planer.fortschritt.status = fahrplan::Status::Läuft;
                        planer.fortschritt.letzter_fehler = None;
                    })
                },
                Ok(Steuerung::Pausieren) => {},
                Ok(Steuerung::Anhalten) | Err(_) => return Err(Beendet),
            }
        }
    }

    /// Pausiere den Fahrplan wegen eines Fehlers oder Abbruchs der aktuellen Fahrstraße.
    fn pausiere_mit_fehler(&self, fehler: Option<Fehler>) -> Result<(), Beendet> {
        let nachricht = match &fehler {
            Some(fehler) => format!("Fahrplan {} pausiert: {fehler}", self.name),
            None => format!("Fahrplan {} pausiert: Fahrstraße abgebrochen.", self.name),
        };
        warn!("{nachricht}");
        self.protokolliere(&nachricht);
        self.mit_planer(|planer| {
            planer.fortschritt.status = fahrplan::Status::Pausiert;
            planer.fortschritt.letzter_fehler = fehler;
        })?;
        self.pausiert()
    }
}
