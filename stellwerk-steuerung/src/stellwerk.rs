//! Das Stellwerk: verwaltet Fahrstraßen und Fahrpläne und führt sie aus.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::channel,
        Arc, Weak,
    },
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use stellwerk_gleisbild::{
    adresse::{Belegung, RückmelderAdresse},
    zustand::{UngültigerZustand, Zustand, Zustände, Änderung},
    Gleisbild, Koordinate,
};
use thiserror::Error;

use crate::{
    abbruch::AbbruchGrund,
    anzeige::{Anzeige, AnzeigeBeobachter},
    ausführung::{self, Ausführung, Kontext},
    einstellungen::Einstellungen,
    fahrplan::{self, Eintrag, Fahrplan, Fortschritt},
    fahrstraße::{self, Fahrstraße},
    planer::{self, Lauf, Planer, Steuerung},
    speichern::Speicherstand,
    sperren::Sperren,
    verteiler::Verteiler,
    warteliste::Warteliste,
    zentrale::Zentrale,
};

/// Fehler bei Verwendung des [`Stellwerks`](Stellwerk).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fehler {
    /// Es gibt keine Fahrstraße mit diesem Namen.
    #[error("Unbekannte Fahrstraße {0}.")]
    UnbekannteFahrstraße(fahrstraße::Name),
    /// Es gibt bereits eine Fahrstraße mit diesem Namen.
    #[error("Es gibt bereits eine Fahrstraße {0}.")]
    FahrstraßeExistiert(fahrstraße::Name),
    /// Es gibt keinen Fahrplan mit diesem Namen.
    #[error("Unbekannter Fahrplan {0}.")]
    UnbekannterFahrplan(fahrplan::Name),
    /// Es gibt bereits einen Fahrplan mit diesem Namen.
    #[error("Es gibt bereits einen Fahrplan {0}.")]
    FahrplanExistiert(fahrplan::Name),
    /// Der Fahrplan wird bereits ausgeführt.
    #[error("Fahrplan {0} wird bereits ausgeführt.")]
    FahrplanLäuft(fahrplan::Name),
    /// Der Fahrplan hat keinen Eintrag an dieser Position.
    #[error("Fahrplan {fahrplan} hat keinen Eintrag {index}.")]
    UnbekannterEintrag {
        /// Der Fahrplan.
        fahrplan: fahrplan::Name,
        /// Die Position.
        index: usize,
    },
    /// Fehler beim Starten einer Fahrstraße.
    #[error(transparent)]
    Ausführung(#[from] ausführung::Fehler),
    /// Die Komponente kann den Zustand nicht annehmen.
    #[error(transparent)]
    UngültigerZustand(#[from] UngültigerZustand),
}

/// Gemeinsamer Zustand aller Kopien eines [`Stellwerks`](Stellwerk).
pub(crate) struct Inneres {
    /// Alles, was eine Ausführung benötigt.
    pub(crate) kontext: Kontext,
    /// Alle bekannten Fahrstraßen.
    fahrstraßen: RwLock<BTreeMap<fahrstraße::Name, Fahrstraße>>,
    /// Aktuell (oder zuletzt) laufende Ausführungen.
    laufende: Mutex<HashMap<fahrstraße::Name, Arc<Ausführung>>>,
    /// Alle bekannten Fahrpläne und ihr Fortschritt.
    pub(crate) fahrpläne: Mutex<BTreeMap<fahrplan::Name, Planer>>,
    /// Id des nächsten Fahrplan-Laufs.
    nächster_lauf: AtomicU64,
}

impl Drop for Inneres {
    fn drop(&mut self) {
        for ausführung in self.laufende.get_mut().values() {
            ausführung.abbrechen();
        }
        for planer in self.fahrpläne.get_mut().values_mut() {
            planer.halte_an();
        }
    }
}

/// Verwaltet Fahrstraßen und Fahrpläne und führt sie aus.
///
/// Alle Kopien teilen sich den selben Zustand.
#[derive(Clone)]
pub struct Stellwerk(pub(crate) Arc<Inneres>);

impl Debug for Stellwerk {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Stellwerk")
            .field("zustände", &self.0.kontext.zustände)
            .field("fahrstraßen", &self.0.fahrstraßen.read().len())
            .field("fahrpläne", &self.0.fahrpläne.lock().len())
            .field("einstellungen", &self.0.kontext.einstellungen)
            .finish_non_exhaustive()
    }
}

impl Stellwerk {
    /// Erzeuge ein neues Stellwerk ohne Fahrstraßen und Fahrpläne.
    #[must_use]
    pub fn neu(
        gleisbild: Arc<Gleisbild>,
        zentrale: Arc<dyn Zentrale>,
        anzeige: Arc<dyn Anzeige>,
        einstellungen: Einstellungen,
    ) -> Self {
        let zustände = Arc::new(Zustände::neu(gleisbild));
        let verteiler = Arc::new(Verteiler::neu(
            zentrale,
            Arc::clone(&zustände),
            Arc::clone(&anzeige),
            einstellungen,
        ));
        let warteliste = Arc::new(Warteliste::default());
        let _ = zustände.abonniere(Arc::new(AnzeigeBeobachter(Arc::clone(&anzeige))));
        let _ = zustände.abonniere(Arc::<Warteliste>::clone(&warteliste));
        let inneres = Arc::new_cyclic(|weak: &Weak<Inneres>| {
            let weak = Weak::clone(weak);
            let _ = zustände.abonniere(Arc::new(move |änderung: &Änderung| {
                if let Änderung::Rückmelder { adresse, belegung, vorher } = änderung {
                    if let Some(inneres) = weak.upgrade() {
                        Stellwerk(inneres).löse_aus(*adresse, *vorher, *belegung);
                    }
                }
            }));
            Inneres {
                kontext: Kontext {
                    verteiler,
                    sperren: Arc::new(Sperren::neu()),
                    zustände,
                    warteliste,
                    anzeige,
                    einstellungen,
                },
                fahrstraßen: RwLock::new(BTreeMap::new()),
                laufende: Mutex::new(HashMap::new()),
                fahrpläne: Mutex::new(BTreeMap::new()),
                nächster_lauf: AtomicU64::new(0),
            }
        });
        Stellwerk(inneres)
    }

    /// Zustand aller Antriebe und Rückmelder.
    #[must_use]
    pub fn zustände(&self) -> &Arc<Zustände> {
        &self.0.kontext.zustände
    }

    /// Die Verwaltung gesperrter Abschnitte.
    #[must_use]
    pub fn sperren(&self) -> &Arc<Sperren> {
        &self.0.kontext.sperren
    }

    /// Die verwendeten Einstellungen.
    #[must_use]
    pub fn einstellungen(&self) -> &Einstellungen {
        &self.0.kontext.einstellungen
    }

    // Zentrale

    /// Eine Meldung eines Rückmelders, z.B. von der Zentrale.
    pub fn rückmeldung(&self, adresse: RückmelderAdresse, belegung: Belegung) {
        let _ = self.0.kontext.zustände.rückmeldung(adresse, belegung);
    }

    /// Setze die Belegung eines Rückmelders von Hand, z.B. ohne Verbindung zur Anlage.
    pub fn setze_rückmelder(&self, adresse: RückmelderAdresse, belegung: Belegung) {
        self.0.kontext.anzeige.protokolliere(&format!("{adresse} manuell auf {belegung} gesetzt."));
        self.rückmeldung(adresse, belegung);
    }

    /// Übernehme den Zustand einer Komponente, ohne einen Befehl an die Zentrale zu senden.
    ///
    /// ## Errors
    ///
    /// Die Komponente kann den Zustand nicht annehmen.
    pub fn setze_zustand(&self, koordinate: Koordinate, zustand: Zustand) -> Result<(), Fehler> {
        self.0.kontext.zustände.setze_zustand(koordinate, zustand).map_err(|fehler| {
            warn!("{fehler}");
            self.0.kontext.anzeige.protokolliere(&fehler.to_string());
            Fehler::from(fehler)
        })
    }

    /// Die Verbindung zur Zentrale wurde getrennt.
    ///
    /// Alle laufenden Fahrstraßen schlagen fehl, neue Befehle werden nicht mehr gesendet.
    pub fn verbindung_getrennt(&self) {
        self.0.kontext.verteiler.setze_verbunden(false);
        let laufende = self.0.laufende.lock();
        for ausführung in laufende.values() {
            ausführung.brich_ab(AbbruchGrund::VerbindungGetrennt);
        }
        let nachricht = format!(
            "Verbindung zur Zentrale getrennt, {} Fahrstraßen betroffen.",
            laufende.values().filter(|ausführung| !ausführung.ist_beendet()).count()
        );
        error!("{nachricht}");
        self.0.kontext.anzeige.protokolliere(&nachricht);
    }

    /// Die Verbindung zur Zentrale wurde (wieder) hergestellt.
    pub fn verbindung_hergestellt(&self) {
        self.0.kontext.verteiler.setze_verbunden(true);
        info!("Verbindung zur Zentrale hergestellt.");
        self.0.kontext.anzeige.protokolliere("Verbindung zur Zentrale hergestellt.");
    }

    /// Die Zentrale meldet einen neuen Strom-Zustand.
    pub fn stromzustand(&self, strom_an: bool) {
        self.0.kontext.verteiler.setze_strom(strom_an);
        info!("Strom {}.", if strom_an { "eingeschaltet" } else { "ausgeschaltet" });
    }

    /// Ist die Stromversorgung der Anlage eingeschaltet?
    #[must_use]
    pub fn strom_an(&self) -> bool {
        self.0.kontext.verteiler.strom_an()
    }

    /// Unterbreche sofort die Stromversorgung der Anlage.
    pub fn nothalt(&self) {
        self.0.kontext.verteiler.nothalt();
        self.0.kontext.anzeige.protokolliere("Nothalt ausgelöst.");
    }

    /// Starte alle aktivierten Fahrstraßen, die durch die Änderung ausgelöst werden.
    fn löse_aus(&self, rückmelder: RückmelderAdresse, vorher: Belegung, nachher: Belegung) {
        let ausgelöst: Vec<_> = self
            .0
            .fahrstraßen
            .read()
            .values()
            .filter(|fahrstraße| fahrstraße.wird_ausgelöst(rückmelder, vorher, nachher))
            .map(|fahrstraße| {
                let bedingungen_erfüllt = fahrstraße.bedingungen_erfüllt(&self.0.kontext.zustände);
                (fahrstraße.name.clone(), bedingungen_erfüllt)
            })
            .collect();
        for (name, bedingungen_erfüllt) in ausgelöst {
            if !bedingungen_erfüllt {
                let nachricht =
                    format!("{rückmelder} löst {name} aus, aber die Bedingungen sind nicht erfüllt.");
                debug!("{nachricht}");
                self.0.kontext.anzeige.protokolliere(&nachricht);
                continue;
            }
            info!("{rückmelder} löst {name} aus.");
            if let Err(fehler) = self.starte_fahrstraße(&name) {
                warn!("Automatischer Start von {name} fehlgeschlagen: {fehler}");
            }
        }
    }

    // Fahrstraßen

    /// Eine Kopie der Fahrstraße.
    #[must_use]
    pub fn fahrstraße(&self, name: &fahrstraße::Name) -> Option<Fahrstraße> {
        self.0.fahrstraßen.read().get(name).cloned()
    }

    /// Kopien aller Fahrstraßen, sortiert nach Namen.
    #[must_use]
    pub fn fahrstraßen(&self) -> Vec<Fahrstraße> {
        self.0.fahrstraßen.read().values().cloned().collect()
    }

    /// Füge eine neue Fahrstraße hinzu.
    ///
    /// ## Errors
    ///
    /// Es gibt bereits eine Fahrstraße mit dem selben Namen.
    pub fn füge_fahrstraße_hinzu(&self, fahrstraße: Fahrstraße) -> Result<(), Fehler> {
        let mut fahrstraßen = self.0.fahrstraßen.write();
        if fahrstraßen.contains_key(&fahrstraße.name) {
            return Err(Fehler::FahrstraßeExistiert(fahrstraße.name));
        }
        debug!("Neue Fahrstraße {}.", fahrstraße.name);
        let _ = fahrstraßen.insert(fahrstraße.name.clone(), fahrstraße);
        Ok(())
    }

    /// Ersetze die gleichnamige Fahrstraße. Läuft sie gerade, wird sie zuerst abgebrochen.
    ///
    /// ## Errors
    ///
    /// Es gibt keine Fahrstraße mit dem Namen.
    pub fn ersetze_fahrstraße(&self, fahrstraße: Fahrstraße) -> Result<(), Fehler> {
        let name = fahrstraße.name.clone();
        if !self.0.fahrstraßen.read().contains_key(&name) {
            return Err(Fehler::UnbekannteFahrstraße(name));
        }
        self.erzwinge_abbruch(&name);
        let mut fahrstraßen = self.0.fahrstraßen.write();
        match fahrstraßen.get_mut(&name) {
            Some(bisher) => {
                *bisher = fahrstraße;
                Ok(())
            },
            None => Err(Fehler::UnbekannteFahrstraße(name)),
        }
    }

    /// Benenne eine Fahrstraße um. Alle Verweise in Fahrstraßen und Fahrplänen werden angepasst.
    /// Läuft sie gerade, wird sie zuerst abgebrochen.
    ///
    /// ## Errors
    ///
    /// Es gibt keine Fahrstraße `alt`, oder bereits eine Fahrstraße `neu`.
    pub fn benenne_fahrstraße_um(
        &self,
        alt: &fahrstraße::Name,
        neu: fahrstraße::Name,
    ) -> Result<(), Fehler> {
        if *alt == neu {
            return if self.0.fahrstraßen.read().contains_key(alt) {
                Ok(())
            } else {
                Err(Fehler::UnbekannteFahrstraße(neu))
            };
        }
        {
            let fahrstraßen = self.0.fahrstraßen.read();
            if !fahrstraßen.contains_key(alt) {
                return Err(Fehler::UnbekannteFahrstraße(alt.clone()));
            }
            if fahrstraßen.contains_key(&neu) {
                return Err(Fehler::FahrstraßeExistiert(neu));
            }
        }
        self.erzwinge_abbruch(alt);
        {
            let mut fahrstraßen = self.0.fahrstraßen.write();
            if fahrstraßen.contains_key(&neu) {
                return Err(Fehler::FahrstraßeExistiert(neu));
            }
            let mut fahrstraße =
                fahrstraßen.remove(alt).ok_or_else(|| Fehler::UnbekannteFahrstraße(alt.clone()))?;
            fahrstraße.name = neu.clone();
            let _ = fahrstraßen.insert(neu.clone(), fahrstraße);
            for fahrstraße in fahrstraßen.values_mut() {
                if fahrstraße.benenne_verweise_um(alt, &neu) {
                    debug!("Verweis in {} auf {neu} angepasst.", fahrstraße.name);
                }
            }
        }
        for planer in self.0.fahrpläne.lock().values_mut() {
            if planer.fahrplan.benenne_verweise_um(alt, &neu) {
                debug!("Verweis in Fahrplan {} auf {neu} angepasst.", planer.fahrplan.name);
            }
        }
        info!("Fahrstraße {alt} in {neu} umbenannt.");
        Ok(())
    }

    /// Entferne eine Fahrstraße. Läuft sie gerade, wird sie zuerst abgebrochen.
    ///
    /// ## Errors
    ///
    /// Es gibt keine Fahrstraße mit dem Namen.
    pub fn entferne_fahrstraße(&self, name: &fahrstraße::Name) -> Result<Fahrstraße, Fehler> {
        if !self.0.fahrstraßen.read().contains_key(name) {
            return Err(Fehler::UnbekannteFahrstraße(name.clone()));
        }
        self.erzwinge_abbruch(name);
        let mut fahrstraßen = self.0.fahrstraßen.write();
        let entfernt =
            fahrstraßen.remove(name).ok_or_else(|| Fehler::UnbekannteFahrstraße(name.clone()))?;
        if let Some(verwender) = fahrstraßen.values().find(|fahrstraße| fahrstraße.verwendet(name)) {
            warn!("Entfernte Fahrstraße {name} wird weiterhin von {} verwendet.", verwender.name);
        }
        Ok(entfernt)
    }

    /// Erstelle eine Kopie der Fahrstraße mit dem Namen `"<name> (Kopie)"`,
    /// bzw. `"<name> (Kopie n)"` falls dieser bereits vergeben ist.
    ///
    /// Die automatische Auslösung der Kopie ist deaktiviert.
    ///
    /// ## Errors
    ///
    /// Es gibt keine Fahrstraße mit dem Namen.
    pub fn dupliziere_fahrstraße(
        &self,
        name: &fahrstraße::Name,
    ) -> Result<fahrstraße::Name, Fehler> {
        let mut fahrstraßen = self.0.fahrstraßen.write();
        let mut kopie =
            fahrstraßen.get(name).cloned().ok_or_else(|| Fehler::UnbekannteFahrstraße(name.clone()))?;
        let mut neuer_name = fahrstraße::Name(format!("{name} (Kopie)"));
        let mut nummer: u32 = 2;
        while fahrstraßen.contains_key(&neuer_name) {
            neuer_name = fahrstraße::Name(format!("{name} (Kopie {nummer})"));
            nummer = nummer.saturating_add(1);
        }
        kopie.name = neuer_name.clone();
        kopie.aktiviert = false;
        let _ = fahrstraßen.insert(neuer_name.clone(), kopie);
        Ok(neuer_name)
    }

    /// Aktiviere oder deaktiviere die automatische Auslösung einer Fahrstraße.
    ///
    /// ## Errors
    ///
    /// Es gibt keine Fahrstraße mit dem Namen.
    pub fn setze_aktiviert(&self, name: &fahrstraße::Name, aktiviert: bool) -> Result<(), Fehler> {
        let mut fahrstraßen = self.0.fahrstraßen.write();
        let fahrstraße =
            fahrstraßen.get_mut(name).ok_or_else(|| Fehler::UnbekannteFahrstraße(name.clone()))?;
        fahrstraße.aktiviert = aktiviert;
        Ok(())
    }

    /// Starte eine Fahrstraße.
    ///
    /// Die Abschnitte werden sofort gesperrt, die Schritte in einem eigenen Thread ausgeführt.
    ///
    /// ## Errors
    ///
    /// Die Fahrstraße ist unbekannt, läuft bereits, enthält einen Zyklus
    /// oder ihre Abschnitte sind durch eine andere Fahrstraße gesperrt.
    pub fn starte_fahrstraße(&self, name: &fahrstraße::Name) -> Result<Arc<Ausführung>, Fehler> {
        let aufgelöst = {
            let fahrstraßen = self.0.fahrstraßen.read();
            if !fahrstraßen.contains_key(name) {
                return Err(Fehler::UnbekannteFahrstraße(name.clone()));
            }
            fahrstraße::auflösen(name, &fahrstraßen).map_err(|fehler| {
                warn!("{fehler}");
                self.0.kontext.anzeige.protokolliere(&fehler.to_string());
                ausführung::Fehler::from(fehler)
            })?
        };
        let mut laufende = self.0.laufende.lock();
        laufende.retain(|_name, ausführung| !ausführung.ist_beendet());
        if laufende.contains_key(name) {
            return Err(ausführung::Fehler::LäuftBereits(name.clone()).into());
        }
        let ausführung = ausführung::starte(&self.0.kontext, aufgelöst)?;
        let _ = laufende.insert(name.clone(), Arc::clone(&ausführung));
        Ok(ausführung)
    }

    /// Die aktuelle Ausführung einer Fahrstraße, sofern sie noch läuft.
    #[must_use]
    pub fn ausführung(&self, name: &fahrstraße::Name) -> Option<Arc<Ausführung>> {
        self.0.laufende.lock().get(name).filter(|ausführung| !ausführung.ist_beendet()).cloned()
    }

    /// Die Namen aller aktuell laufenden Fahrstraßen.
    #[must_use]
    pub fn laufende_fahrstraßen(&self) -> Vec<fahrstraße::Name> {
        let mut laufende = self.0.laufende.lock();
        laufende.retain(|_name, ausführung| !ausführung.ist_beendet());
        let mut namen: Vec<_> = laufende.keys().cloned().collect();
        namen.sort();
        namen
    }

    /// Breche eine laufende Fahrstraße ab. Gibt zurück, ob sie lief.
    pub fn brich_fahrstraße_ab(&self, name: &fahrstraße::Name) -> bool {
        match self.ausführung(name) {
            Some(ausführung) => {
                ausführung.abbrechen();
                true
            },
            None => false,
        }
    }

    /// Breche alle Ausführungen ab, die die Fahrstraße direkt oder verschachtelt verwenden,
    /// und warte auf ihr Ende.
    ///
    /// Die Ausführungen bleiben bis zu ihrem Ende in `laufende`,
    /// damit die Fahrstraße währenddessen nicht erneut gestartet werden kann.
    fn erzwinge_abbruch(&self, name: &fahrstraße::Name) {
        let betroffen: Vec<_> = self
            .0
            .laufende
            .lock()
            .values()
            .filter(|ausführung| !ausführung.ist_beendet() && ausführung.führt_aus(name))
            .cloned()
            .collect();
        for ausführung in &betroffen {
            warn!("Laufende Fahrstraße {} wird abgebrochen.", ausführung.name());
            ausführung.abbrechen();
        }
        let zeitlimit = self.0.kontext.einstellungen.quittung_zeitlimit;
        for ausführung in &betroffen {
            if ausführung.warte_auf_ende(zeitlimit).is_none() {
                error!(
                    "Fahrstraße {} wurde nach {}ms noch nicht beendet.",
                    ausführung.name(),
                    zeitlimit.as_millis()
                );
            }
        }
        self.0.laufende.lock().retain(|_name, ausführung| !ausführung.ist_beendet());
    }

    // Fahrpläne

    /// Eine Kopie des Fahrplans.
    #[must_use]
    pub fn fahrplan(&self, name: &fahrplan::Name) -> Option<Fahrplan> {
        self.0.fahrpläne.lock().get(name).map(|planer| planer.fahrplan.clone())
    }

    /// Kopien aller Fahrpläne, sortiert nach Namen.
    #[must_use]
    pub fn fahrpläne(&self) -> Vec<Fahrplan> {
        self.0.fahrpläne.lock().values().map(|planer| planer.fahrplan.clone()).collect()
    }

    /// Status und aktueller Eintrag eines Fahrplans.
    #[must_use]
    pub fn fortschritt(&self, name: &fahrplan::Name) -> Option<Fortschritt> {
        self.0.fahrpläne.lock().get(name).map(|planer| planer.fortschritt.clone())
    }

    /// Füge einen neuen Fahrplan hinzu.
    ///
    /// ## Errors
    ///
    /// Es gibt bereits einen Fahrplan mit dem selben Namen.
    pub fn füge_fahrplan_hinzu(&self, fahrplan: Fahrplan) -> Result<(), Fehler> {
        let mut fahrpläne = self.0.fahrpläne.lock();
        if fahrpläne.contains_key(&fahrplan.name) {
            return Err(Fehler::FahrplanExistiert(fahrplan.name));
        }
        let _ = fahrpläne.insert(fahrplan.name.clone(), Planer::neu(fahrplan));
        Ok(())
    }

    /// Entferne einen Fahrplan. Läuft er gerade, wird er zuerst angehalten.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen.
    pub fn entferne_fahrplan(&self, name: &fahrplan::Name) -> Result<Fahrplan, Fehler> {
        let mut planer = self
            .0
            .fahrpläne
            .lock()
            .remove(name)
            .ok_or_else(|| Fehler::UnbekannterFahrplan(name.clone()))?;
        planer.halte_an();
        Ok(planer.fahrplan)
    }

    /// Führe `verändere` mit dem Planer des Fahrplans aus.
    fn mit_planer<T>(
        &self,
        name: &fahrplan::Name,
        verändere: impl FnOnce(&mut Planer) -> Result<T, Fehler>,
    ) -> Result<T, Fehler> {
        let mut fahrpläne = self.0.fahrpläne.lock();
        let planer =
            fahrpläne.get_mut(name).ok_or_else(|| Fehler::UnbekannterFahrplan(name.clone()))?;
        verändere(planer)
    }

    /// Füge einen Eintrag an Position `index` ein, bzw. am Ende falls `index` zu groß ist.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen.
    pub fn füge_eintrag_ein(
        &self,
        name: &fahrplan::Name,
        index: usize,
        eintrag: Eintrag,
    ) -> Result<(), Fehler> {
        self.mit_planer(name, |planer| {
            planer.fahrplan.füge_ein(index, eintrag);
            Ok(())
        })
    }

    /// Entferne den Eintrag an Position `index`.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen, oder keinen Eintrag an der Position.
    pub fn entferne_eintrag(&self, name: &fahrplan::Name, index: usize) -> Result<Eintrag, Fehler> {
        self.mit_planer(name, |planer| {
            planer
                .fahrplan
                .entferne(index)
                .ok_or_else(|| Fehler::UnbekannterEintrag { fahrplan: name.clone(), index })
        })
    }

    /// Verschiebe den Eintrag von Position `von` nach `nach`.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen, oder eine der Positionen existiert nicht.
    pub fn verschiebe_eintrag(
        &self,
        name: &fahrplan::Name,
        von: usize,
        nach: usize,
    ) -> Result<(), Fehler> {
        self.mit_planer(name, |planer| {
            if planer.fahrplan.verschiebe(von, nach) {
                Ok(())
            } else {
                let index = von.max(nach);
                Err(Fehler::UnbekannterEintrag { fahrplan: name.clone(), index })
            }
        })
    }

    /// Setze die Wartezeit vor dem Eintrag an Position `index`.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen, oder keinen Eintrag an der Position.
    pub fn setze_verzögerung(
        &self,
        name: &fahrplan::Name,
        index: usize,
        verzögerung: Duration,
    ) -> Result<(), Fehler> {
        self.mit_planer(name, |planer| {
            if planer.fahrplan.setze_verzögerung(index, verzögerung) {
                Ok(())
            } else {
                Err(Fehler::UnbekannterEintrag { fahrplan: name.clone(), index })
            }
        })
    }

    /// Starte einen Fahrplan beim aktuellen Eintrag.
    /// Ist das Ende bereits erreicht, wird beim ersten Eintrag begonnen.
    /// Ein pausierter Fahrplan wird fortgesetzt.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen, oder er läuft bereits.
    pub fn starte_fahrplan(&self, name: &fahrplan::Name) -> Result<(), Fehler> {
        let mut fahrpläne = self.0.fahrpläne.lock();
        let planer =
            fahrpläne.get_mut(name).ok_or_else(|| Fehler::UnbekannterFahrplan(name.clone()))?;
        match planer.fortschritt.status {
            fahrplan::Status::Läuft => return Err(Fehler::FahrplanLäuft(name.clone())),
            fahrplan::Status::Pausiert => {
                planer.fortschritt.status = fahrplan::Status::Läuft;
                planer.fortschritt.letzter_fehler = None;
                planer.sende(Steuerung::Fortsetzen);
                return Ok(());
            },
            fahrplan::Status::Bereit => {},
        }
        if planer.fortschritt.cursor >= planer.fahrplan.einträge.len() {
            planer.fortschritt.cursor = 0;
        }
        let nachricht = format!("Starte Fahrplan {name} ab Eintrag {}.", planer.fortschritt.cursor);
        info!("{nachricht}");
        self.0.kontext.anzeige.protokolliere(&nachricht);

        let id = self.0.nächster_lauf.fetch_add(1, Ordering::Relaxed);
        let (steuerung, empfänger) = channel();
        planer.lauf = Some(Lauf { id, steuerung, ausführung: None });
        planer.fortschritt.status = fahrplan::Status::Läuft;
        planer.fortschritt.letzter_fehler = None;
        drop(fahrpläne);

        let inneres = Arc::downgrade(&self.0);
        let name = name.clone();
        let _ = thread::spawn(move || planer::führe_aus(inneres, name, id, empfänger));
        Ok(())
    }

    /// Pausiere einen laufenden Fahrplan. Eine laufende Fahrstraße wird noch beendet.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen.
    pub fn pausiere_fahrplan(&self, name: &fahrplan::Name) -> Result<(), Fehler> {
        self.mit_planer(name, |planer| {
            if planer.fortschritt.status == fahrplan::Status::Läuft {
                planer.fortschritt.status = fahrplan::Status::Pausiert;
                planer.sende(Steuerung::Pausieren);
            }
            Ok(())
        })
    }

    /// Setze einen pausierten Fahrplan fort.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen.
    pub fn setze_fahrplan_fort(&self, name: &fahrplan::Name) -> Result<(), Fehler> {
        self.mit_planer(name, |planer| {
            if planer.fortschritt.status == fahrplan::Status::Pausiert {
                planer.fortschritt.status = fahrplan::Status::Läuft;
                planer.fortschritt.letzter_fehler = None;
                planer.sende(Steuerung::Fortsetzen);
            }
            Ok(())
        })
    }

    /// Halte einen Fahrplan an. Eine laufende Fahrstraße wird abgebrochen,
    /// der aktuelle Eintrag bleibt erhalten.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen.
    pub fn halte_fahrplan_an(&self, name: &fahrplan::Name) -> Result<(), Fehler> {
        self.mit_planer(name, |planer| {
            planer.halte_an();
            Ok(())
        })
    }

    /// Halte einen Fahrplan an und setze ihn auf den ersten Eintrag zurück.
    /// Die Einträge bleiben erhalten.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen.
    pub fn setze_fahrplan_zurück(&self, name: &fahrplan::Name) -> Result<(), Fehler> {
        self.mit_planer(name, |planer| {
            planer.halte_an();
            planer.fortschritt = Fortschritt::default();
            Ok(())
        })
    }

    /// Halte einen Fahrplan an und entferne alle Einträge.
    ///
    /// ## Errors
    ///
    /// Es gibt keinen Fahrplan mit dem Namen.
    pub fn leere_fahrplan(&self, name: &fahrplan::Name) -> Result<(), Fehler> {
        self.mit_planer(name, |planer| {
            planer.halte_an();
            planer.fahrplan.einträge.clear();
            planer.fortschritt = Fortschritt::default();
            Ok(())
        })
    }

    // Speichern

    /// Alle Fahrstraßen und Fahrpläne, z.B. zum Speichern.
    #[must_use]
    pub fn speicherstand(&self) -> Speicherstand {
        Speicherstand { fahrstraßen: self.fahrstraßen(), fahrpläne: self.fahrpläne() }
    }

    /// Ersetze alle Fahrstraßen und Fahrpläne.
    /// Laufende Fahrstraßen werden abgebrochen, laufende Fahrpläne angehalten.
    pub fn lade(&self, speicherstand: Speicherstand) {
        let Speicherstand { fahrstraßen, fahrpläne } = speicherstand;
        for planer in self.0.fahrpläne.lock().values_mut() {
            planer.halte_an();
        }
        let laufende: Vec<_> = self.0.laufende.lock().keys().cloned().collect();
        for name in laufende {
            self.erzwinge_abbruch(&name);
        }
        *self.0.fahrstraßen.write() = fahrstraßen
            .into_iter()
            .map(|fahrstraße| (fahrstraße.name.clone(), fahrstraße))
            .collect();
        *self.0.fahrpläne.lock() = fahrpläne
            .into_iter()
            .map(|fahrplan| (fahrplan.name.clone(), Planer::neu(fahrplan)))
            .collect();
        info!("Speicherstand geladen.");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::{
        collections::BTreeSet,
        sync::atomic::AtomicUsize,
        time::Instant,
    };

    use stellwerk_gleisbild::{
        adresse::{Stellung, ZubehörAdresse},
        Art, Komponente,
    };
    use stellwerk_test_util::{
        expect_eq, expect_true, init_test_logging, warte_bis, Expectation,
    };

    use crate::{
        anzeige::KeineAnzeige,
        ausführung::{SchrittFehler, Status},
        fahrstraße::{Auslöser, Bedingung, Flanke, Schritt},
        sperren::{Abschnitt, SperreVerweigert},
        test_zentrale::{TestZentrale, Verhalten},
        verteiler::BefehlFehler,
        zentrale::Schaltbefehl,
    };

    const ENDE: Duration = Duration::from_secs(2);

    fn gleisbild() -> Arc<Gleisbild> {
        let komponenten = vec![
            Komponente::neu(
                Koordinate { x: 0, y: 0 },
                Art::Weiche,
                vec![ZubehörAdresse(4)],
                None,
            ),
            Komponente::neu(
                Koordinate { x: 2, y: 3 },
                Art::DreiwegeWeiche,
                vec![ZubehörAdresse(10), ZubehörAdresse(11)],
                None,
            ),
            Komponente::neu(
                Koordinate { x: 1, y: 1 },
                Art::Rückmelder,
                Vec::new(),
                Some(RückmelderAdresse(7)),
            ),
        ];
        Arc::new(Gleisbild::neu(komponenten).expect("Gültiges Gleisbild."))
    }

    fn einstellungen() -> Einstellungen {
        Einstellungen {
            quittung_zeitlimit: Duration::from_millis(100),
            max_wiederholungen: 2,
            rückmeldung_zeitlimit: Duration::from_millis(500),
            schalt_pause: Duration::ZERO,
            dreiwege_verzögerung: Duration::from_millis(5),
            sperre_wiederholung: Duration::from_millis(20),
            abfrage_intervall: Duration::from_millis(5),
        }
    }

    fn stellwerk_mit(
        verhalten: Verhalten,
        anzeige: Arc<dyn Anzeige>,
    ) -> (Stellwerk, Arc<TestZentrale>) {
        stellwerk_mit_einstellungen(verhalten, anzeige, einstellungen())
    }

    fn stellwerk_mit_einstellungen(
        verhalten: Verhalten,
        anzeige: Arc<dyn Anzeige>,
        einstellungen: Einstellungen,
    ) -> (Stellwerk, Arc<TestZentrale>) {
        let zentrale = Arc::new(TestZentrale::neu(verhalten));
        let stellwerk = Stellwerk::neu(
            gleisbild(),
            Arc::<TestZentrale>::clone(&zentrale),
            anzeige,
            einstellungen,
        );
        (stellwerk, zentrale)
    }

    fn stellwerk(verhalten: Verhalten) -> (Stellwerk, Arc<TestZentrale>) {
        stellwerk_mit(verhalten, Arc::new(KeineAnzeige))
    }

    fn name(name: &str) -> fahrstraße::Name {
        fahrstraße::Name(name.to_owned())
    }

    fn abschnitte(namen: &[&str]) -> BTreeSet<Abschnitt> {
        namen.iter().map(|name| Abschnitt((*name).to_owned())).collect()
    }

    fn schalten(adresse: u16) -> Schritt {
        Schritt::Schalten {
            adresse: ZubehörAdresse(adresse),
            stellung: Stellung::Abzweig,
            verzögerung: None,
        }
    }

    fn befehl(adresse: u16, stellung: Stellung) -> Schaltbefehl {
        Schaltbefehl { adresse: ZubehörAdresse(adresse), stellung }
    }

    fn füge_hinzu(stellwerk: &Stellwerk, fahrstraße: &str, schritte: Vec<Schritt>, gesperrt: &[&str]) {
        stellwerk
            .füge_fahrstraße_hinzu(Fahrstraße::neu(name(fahrstraße), schritte, abschnitte(gesperrt)))
            .expect("Neuer Name.");
    }

    #[test]
    fn abgeschlossen_ohne_sperren() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        let stellen = Schritt::Stellen {
            koordinate: Koordinate { x: 2, y: 3 },
            zustand: Zustand::Rechts,
            verzögerung: None,
        };
        füge_hinzu(&stellwerk, "Einfahrt", vec![schalten(4), stellen], &["S1", "S2"]);

        let ausführung = stellwerk.starte_fahrstraße(&name("Einfahrt")).expect("Alles frei.");
        expect_eq(ausführung.warte_auf_ende(ENDE), Some(Status::Abgeschlossen))?;
        expect_true(stellwerk.sperren().gesperrt_von(&name("Einfahrt")).is_empty())?;
        expect_eq(
            zentrale.befehle(),
            vec![
                befehl(4, Stellung::Abzweig),
                befehl(10, Stellung::Gerade),
                befehl(11, Stellung::Abzweig),
            ],
        )?;
        expect_eq(stellwerk.zustände().zustand(Koordinate { x: 2, y: 3 }), Some(Zustand::Rechts))?;
        expect_true(stellwerk.laufende_fahrstraßen().is_empty())?;
        Ok(())
    }

    #[test]
    fn rückmeldung_setzt_fort() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        let warten = Schritt::WartenAuf {
            rückmelder: RückmelderAdresse(7),
            belegung: Belegung::Belegt,
            zeitlimit: Some(Duration::from_secs(5)),
        };
        füge_hinzu(&stellwerk, "Ausfahrt", vec![warten, schalten(4)], &["S3"]);

        let ausführung = stellwerk.starte_fahrstraße(&name("Ausfahrt")).expect("Alles frei.");
        thread::sleep(Duration::from_millis(30));
        expect_eq(ausführung.status(), Status::Läuft)?;
        expect_true(zentrale.befehle().is_empty())?;

        stellwerk.rückmeldung(RückmelderAdresse(7), Belegung::Belegt);
        expect_eq(ausführung.warte_auf_ende(ENDE), Some(Status::Abgeschlossen))?;
        expect_eq(zentrale.befehle(), vec![befehl(4, Stellung::Abzweig)])?;
        Ok(())
    }

    #[test]
    fn rückmeldung_zeitüberschreitung() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        let zeitlimit = Duration::from_millis(50);
        let warten = Schritt::WartenAuf {
            rückmelder: RückmelderAdresse(7),
            belegung: Belegung::Belegt,
            zeitlimit: Some(zeitlimit),
        };
        füge_hinzu(&stellwerk, "Ausfahrt", vec![warten], &["S3"]);

        let ausführung = stellwerk.starte_fahrstraße(&name("Ausfahrt")).expect("Alles frei.");
        let erwartet = Status::Fehlgeschlagen(ausführung::Fehler::Schritt {
            fahrstraße: name("Ausfahrt"),
            index: 0,
            fehler: SchrittFehler::RückmeldungZeitüberschreitung {
                rückmelder: RückmelderAdresse(7),
                belegung: Belegung::Belegt,
                zeitlimit,
            },
        });
        expect_eq(ausführung.warte_auf_ende(ENDE), Some(erwartet))?;
        expect_true(stellwerk.sperren().gesperrt_von(&name("Ausfahrt")).is_empty())?;
        // Nach dem Zeitlimit ist niemand mehr für den Rückmelder registriert.
        expect_eq(stellwerk.0.kontext.warteliste.anzahl(RückmelderAdresse(7)), 0)?;
        Ok(())
    }

    #[test]
    fn abbrechen_gibt_sperren_frei() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "Warten", vec![Schritt::Warten(Duration::from_secs(30))], &["S1"]);

        let ausführung = stellwerk.starte_fahrstraße(&name("Warten")).expect("Alles frei.");
        expect_eq(stellwerk.sperren().inhaber(&Abschnitt("S1".to_owned())), Some(name("Warten")))?;
        let start = Instant::now();
        expect_true(stellwerk.brich_fahrstraße_ab(&name("Warten")))?;
        expect_eq(ausführung.warte_auf_ende(ENDE), Some(Status::Abgebrochen))?;
        expect_true(start.elapsed() < Duration::from_millis(500))?;
        expect_true(stellwerk.sperren().gesperrt_von(&name("Warten")).is_empty())?;
        Ok(())
    }

    #[test]
    fn wiederholung_ohne_quittung() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Ignoriere(2));
        füge_hinzu(&stellwerk, "Weiche", vec![schalten(4)], &[]);
        let ausführung = stellwerk.starte_fahrstraße(&name("Weiche")).expect("Alles frei.");
        expect_eq(ausführung.warte_auf_ende(ENDE), Some(Status::Abgeschlossen))?;
        expect_eq(zentrale.befehle().len(), 3)?;

        zentrale.setze_verhalten(Verhalten::Schweigen);
        let ausführung = stellwerk.starte_fahrstraße(&name("Weiche")).expect("Alles frei.");
        let erwartet = Status::Fehlgeschlagen(ausführung::Fehler::Schritt {
            fahrstraße: name("Weiche"),
            index: 0,
            fehler: SchrittFehler::Befehl(BefehlFehler::Zeitüberschreitung {
                befehl: befehl(4, Stellung::Abzweig),
                zeitlimit: Duration::from_millis(100),
            }),
        });
        expect_eq(ausführung.warte_auf_ende(ENDE), Some(erwartet))?;
        expect_eq(zentrale.befehle().len(), 6)?;
        Ok(())
    }

    #[test]
    fn verbindung_getrennt() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        let warten = Schritt::WartenAuf {
            rückmelder: RückmelderAdresse(7),
            belegung: Belegung::Belegt,
            zeitlimit: Some(Duration::from_secs(30)),
        };
        füge_hinzu(&stellwerk, "Ausfahrt", vec![warten], &["S3"]);
        füge_hinzu(&stellwerk, "Weiche", vec![schalten(4)], &[]);

        let ausführung = stellwerk.starte_fahrstraße(&name("Ausfahrt")).expect("Alles frei.");
        thread::sleep(Duration::from_millis(20));
        stellwerk.verbindung_getrennt();
        expect_eq(
            ausführung.warte_auf_ende(ENDE),
            Some(Status::Fehlgeschlagen(ausführung::Fehler::VerbindungGetrennt)),
        )?;
        expect_true(stellwerk.sperren().gesperrt_von(&name("Ausfahrt")).is_empty())?;

        // Ohne Verbindung wird kein Befehl gesendet.
        let weiche = stellwerk.starte_fahrstraße(&name("Weiche")).expect("Alles frei.");
        expect_eq(
            weiche.warte_auf_ende(ENDE),
            Some(Status::Fehlgeschlagen(ausführung::Fehler::VerbindungGetrennt)),
        )?;
        expect_true(zentrale.befehle().is_empty())?;

        stellwerk.verbindung_hergestellt();
        let weiche = stellwerk.starte_fahrstraße(&name("Weiche")).expect("Alles frei.");
        expect_eq(weiche.warte_auf_ende(ENDE), Some(Status::Abgeschlossen))?;
        Ok(())
    }

    #[test]
    fn gemeinsamer_abschnitt() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "A", vec![Schritt::Warten(Duration::from_secs(30))], &["S7"]);
        füge_hinzu(&stellwerk, "B", vec![schalten(4)], &["S6", "S7"]);

        let a = stellwerk.starte_fahrstraße(&name("A")).expect("Alles frei.");
        let verweigert = stellwerk.starte_fahrstraße(&name("B")).map(|ausführung| ausführung.status());
        let erwartet = SperreVerweigert {
            anforderer: name("B"),
            konflikte: BTreeMap::from([(Abschnitt("S7".to_owned()), name("A"))]),
        };
        expect_eq(verweigert, Err(Fehler::Ausführung(erwartet.into())))?;
        expect_eq(stellwerk.sperren().inhaber(&Abschnitt("S6".to_owned())), None)?;
        let erneut = stellwerk.starte_fahrstraße(&name("A")).map(|ausführung| ausführung.status());
        expect_eq(erneut, Err(Fehler::Ausführung(ausführung::Fehler::LäuftBereits(name("A")))))?;

        a.abbrechen();
        expect_eq(a.warte_auf_ende(ENDE), Some(Status::Abgebrochen))?;
        let b = stellwerk.starte_fahrstraße(&name("B")).expect("A hat S7 freigegeben.");
        expect_eq(b.warte_auf_ende(ENDE), Some(Status::Abgeschlossen))?;
        Ok(())
    }

    #[test]
    fn verschachtelte_fahrstraßen() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "innen", vec![schalten(10)], &["S2"]);
        füge_hinzu(
            &stellwerk,
            "außen",
            vec![schalten(4), Schritt::Fahrstraße(name("innen")), schalten(11)],
            &["S1"],
        );
        let ausführung = stellwerk.starte_fahrstraße(&name("außen")).expect("Alles frei.");
        expect_eq(stellwerk.sperren().gesperrt_von(&name("außen")), abschnitte(&["S1", "S2"]))?;
        expect_eq(ausführung.warte_auf_ende(ENDE), Some(Status::Abgeschlossen))?;
        let adressen: Vec<_> = zentrale.befehle().iter().map(|befehl| befehl.adresse.0).collect();
        expect_eq(adressen, vec![4, 10, 11])?;

        füge_hinzu(&stellwerk, "zyklus", vec![Schritt::Fahrstraße(name("zyklus"))], &[]);
        let zyklus = stellwerk.starte_fahrstraße(&name("zyklus")).map(|ausführung| ausführung.status());
        expect_eq(
            zyklus,
            Err(Fehler::Ausführung(ausführung::Fehler::Auflösen(
                fahrstraße::AuflösenFehler::Zyklus(vec![name("zyklus"), name("zyklus")]),
            ))),
        )?;
        Ok(())
    }

    #[test]
    fn auslöser_startet_fahrstraße() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        let mut fahrstraße = Fahrstraße::neu(name("Automatik"), vec![schalten(4)], abschnitte(&["S1"]));
        fahrstraße.auslöser =
            Some(Auslöser { rückmelder: RückmelderAdresse(7), flanke: Flanke::FreiDannBelegt });
        fahrstraße.bedingungen =
            vec![Bedingung::Zubehör { adresse: ZubehörAdresse(10), stellung: Stellung::Abzweig }];
        fahrstraße.aktiviert = true;
        stellwerk.füge_fahrstraße_hinzu(fahrstraße).expect("Neuer Name.");

        // Bedingung nicht erfüllt.
        stellwerk.rückmeldung(RückmelderAdresse(7), Belegung::Belegt);
        thread::sleep(Duration::from_millis(30));
        expect_true(zentrale.befehle().is_empty())?;

        stellwerk.rückmeldung(RückmelderAdresse(7), Belegung::Frei);
        stellwerk.zustände().setze_stellung(ZubehörAdresse(10), Stellung::Abzweig);
        // Keine Flanke: frei nach frei.
        stellwerk.rückmeldung(RückmelderAdresse(7), Belegung::Frei);
        thread::sleep(Duration::from_millis(30));
        expect_true(zentrale.befehle().is_empty())?;

        stellwerk.setze_rückmelder(RückmelderAdresse(7), Belegung::Belegt);
        warte_bis(ENDE, || zentrale.befehle() == vec![befehl(4, Stellung::Abzweig)])?;

        stellwerk.setze_aktiviert(&name("Automatik"), false).expect("Fahrstraße existiert.");
        warte_bis(ENDE, || stellwerk.laufende_fahrstraßen().is_empty())?;
        stellwerk.rückmeldung(RückmelderAdresse(7), Belegung::Frei);
        stellwerk.rückmeldung(RückmelderAdresse(7), Belegung::Belegt);
        thread::sleep(Duration::from_millis(30));
        expect_eq(zentrale.befehle().len(), 1)?;
        Ok(())
    }

    #[test]
    fn entfernen_bricht_ab() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "Warten", vec![Schritt::Warten(Duration::from_secs(30))], &["S1"]);
        let ausführung = stellwerk.starte_fahrstraße(&name("Warten")).expect("Alles frei.");

        let entfernt = stellwerk.entferne_fahrstraße(&name("Warten")).map(|fahrstraße| fahrstraße.name);
        expect_eq(entfernt, Ok(name("Warten")))?;
        expect_eq(ausführung.status(), Status::Abgebrochen)?;
        expect_true(stellwerk.sperren().gesperrt_von(&name("Warten")).is_empty())?;
        expect_true(stellwerk.laufende_fahrstraßen().is_empty())?;
        expect_eq(stellwerk.fahrstraße(&name("Warten")), None)?;
        expect_eq(
            stellwerk.entferne_fahrstraße(&name("Warten")).map(|fahrstraße| fahrstraße.name),
            Err(Fehler::UnbekannteFahrstraße(name("Warten"))),
        )?;

        // Der Abbruch ist abgeschlossen, eine neue Fahrstraße kann sofort starten.
        füge_hinzu(&stellwerk, "Warten", vec![Schritt::Warten(Duration::from_secs(30))], &["S1"]);
        let neu = stellwerk.starte_fahrstraße(&name("Warten")).expect("Alles frei.");
        neu.abbrechen();
        expect_eq(neu.warte_auf_ende(ENDE), Some(Status::Abgebrochen))?;
        Ok(())
    }

    #[test]
    fn verschachtelt_entfernen_bricht_ab() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "innen", vec![Schritt::Warten(Duration::from_secs(30))], &["S2"]);
        füge_hinzu(&stellwerk, "außen", vec![Schritt::Fahrstraße(name("innen"))], &["S1"]);
        let ausführung = stellwerk.starte_fahrstraße(&name("außen")).expect("Alles frei.");
        expect_eq(stellwerk.sperren().gesperrt_von(&name("außen")), abschnitte(&["S1", "S2"]))?;

        let _ = stellwerk.entferne_fahrstraße(&name("innen")).expect("Fahrstraße existiert.");
        expect_eq(ausführung.status(), Status::Abgebrochen)?;
        expect_true(stellwerk.sperren().gesperrt_von(&name("außen")).is_empty())?;
        expect_true(stellwerk.laufende_fahrstraßen().is_empty())?;
        Ok(())
    }

    #[test]
    fn verschachtelt_umbenennen_bricht_ab() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "innen", vec![Schritt::Warten(Duration::from_secs(30))], &["S2"]);
        füge_hinzu(&stellwerk, "außen", vec![Schritt::Fahrstraße(name("innen"))], &["S1"]);
        füge_hinzu(&stellwerk, "andere", vec![Schritt::Warten(Duration::from_secs(30))], &["S3"]);
        let außen = stellwerk.starte_fahrstraße(&name("außen")).expect("Alles frei.");
        let andere = stellwerk.starte_fahrstraße(&name("andere")).expect("Alles frei.");

        stellwerk.benenne_fahrstraße_um(&name("innen"), name("mitte")).expect("Neuer Name.");
        expect_eq(außen.status(), Status::Abgebrochen)?;
        // Unbeteiligte Fahrstraßen laufen weiter.
        expect_eq(andere.status(), Status::Läuft)?;
        expect_eq(stellwerk.laufende_fahrstraßen(), vec![name("andere")])?;
        andere.abbrechen();
        expect_eq(andere.warte_auf_ende(ENDE), Some(Status::Abgebrochen))?;
        Ok(())
    }

    #[test]
    fn ersetzen_bricht_ab() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "Warten", vec![Schritt::Warten(Duration::from_secs(30))], &["S1"]);
        let ausführung = stellwerk.starte_fahrstraße(&name("Warten")).expect("Alles frei.");

        let neu = Fahrstraße::neu(name("Warten"), vec![schalten(4)], abschnitte(&["S2"]));
        stellwerk.ersetze_fahrstraße(neu.clone()).expect("Fahrstraße existiert.");
        expect_eq(ausführung.status(), Status::Abgebrochen)?;
        expect_eq(stellwerk.fahrstraße(&name("Warten")), Some(neu))?;
        Ok(())
    }

    #[test]
    fn umbenennen_passt_verweise_an() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "innen", vec![schalten(10)], &[]);
        füge_hinzu(&stellwerk, "außen", vec![Schritt::Fahrstraße(name("innen"))], &[]);
        let mut fahrplan = Fahrplan::neu(fahrplan::Name("Pendel".to_owned()));
        fahrplan.einträge.push(Eintrag::neu(name("innen"), Duration::ZERO));
        stellwerk.füge_fahrplan_hinzu(fahrplan).expect("Neuer Name.");

        expect_eq(
            stellwerk.benenne_fahrstraße_um(&name("innen"), name("außen")),
            Err(Fehler::FahrstraßeExistiert(name("außen"))),
        )?;
        stellwerk.benenne_fahrstraße_um(&name("innen"), name("mitte")).expect("Neuer Name.");
        expect_eq(stellwerk.fahrstraße(&name("innen")), None)?;
        let außen = stellwerk.fahrstraße(&name("außen")).expect("Nicht umbenannt.");
        expect_eq(außen.schritte, vec![Schritt::Fahrstraße(name("mitte"))])?;
        let fahrplan =
            stellwerk.fahrplan(&fahrplan::Name("Pendel".to_owned())).expect("Fahrplan existiert.");
        expect_eq(
            fahrplan.einträge.into_iter().map(|eintrag| eintrag.fahrstraße).collect::<Vec<_>>(),
            vec![name("mitte")],
        )?;
        Ok(())
    }

    #[test]
    fn duplizieren() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "Einfahrt", vec![schalten(4)], &["S1"]);
        expect_eq(stellwerk.dupliziere_fahrstraße(&name("Einfahrt")), Ok(name("Einfahrt (Kopie)")))?;
        expect_eq(
            stellwerk.dupliziere_fahrstraße(&name("Einfahrt")),
            Ok(name("Einfahrt (Kopie 2)")),
        )?;
        let kopie = stellwerk.fahrstraße(&name("Einfahrt (Kopie)")).expect("Kopie existiert.");
        expect_eq(kopie.schritte, vec![schalten(4)])?;
        expect_eq(stellwerk.fahrstraßen().len(), 3)?;
        Ok(())
    }

    #[test]
    fn fahrplan_reihenfolge() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "A", vec![schalten(4)], &["S1"]);
        füge_hinzu(&stellwerk, "B", vec![schalten(10)], &["S1"]);
        let plan = fahrplan::Name("Pendel".to_owned());
        let mut fahrplan = Fahrplan::neu(plan.clone());
        fahrplan.einträge = vec![
            Eintrag::neu(name("A"), Duration::ZERO),
            Eintrag::neu(name("B"), Duration::from_millis(150)),
        ];
        stellwerk.füge_fahrplan_hinzu(fahrplan).expect("Neuer Name.");

        let start = Instant::now();
        stellwerk.starte_fahrplan(&plan).expect("Fahrplan existiert.");
        expect_eq(stellwerk.starte_fahrplan(&plan), Err(Fehler::FahrplanLäuft(plan.clone())))?;
        warte_bis(ENDE, || !zentrale.befehle().is_empty())?;
        expect_eq(zentrale.befehle(), vec![befehl(4, Stellung::Abzweig)])?;

        warte_bis(ENDE, || {
            stellwerk.fortschritt(&plan).is_some_and(|fortschritt| {
                fortschritt.status == fahrplan::Status::Bereit && fortschritt.cursor == 2
            })
        })?;
        expect_true(start.elapsed() >= Duration::from_millis(150))?;
        expect_eq(
            zentrale.befehle(),
            vec![befehl(4, Stellung::Abzweig), befehl(10, Stellung::Abzweig)],
        )?;

        // Am Ende wird wieder beim ersten Eintrag begonnen.
        stellwerk.starte_fahrplan(&plan).expect("Fahrplan existiert.");
        warte_bis(ENDE, || zentrale.befehle().len() == 3)?;
        stellwerk.halte_fahrplan_an(&plan).expect("Fahrplan existiert.");
        Ok(())
    }

    #[test]
    fn fahrplan_pausieren_und_fortsetzen() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "A", vec![schalten(4)], &[]);
        let plan = fahrplan::Name("Pendel".to_owned());
        let mut fahrplan = Fahrplan::neu(plan.clone());
        fahrplan.einträge = vec![Eintrag::neu(name("A"), Duration::from_millis(200))];
        stellwerk.füge_fahrplan_hinzu(fahrplan).expect("Neuer Name.");

        stellwerk.starte_fahrplan(&plan).expect("Fahrplan existiert.");
        thread::sleep(Duration::from_millis(20));
        stellwerk.pausiere_fahrplan(&plan).expect("Fahrplan existiert.");
        expect_eq(
            stellwerk.fortschritt(&plan).map(|fortschritt| fortschritt.status),
            Some(fahrplan::Status::Pausiert),
        )?;
        thread::sleep(Duration::from_millis(300));
        expect_true(zentrale.befehle().is_empty())?;

        stellwerk.setze_fahrplan_fort(&plan).expect("Fahrplan existiert.");
        warte_bis(ENDE, || zentrale.befehle().len() == 1)?;
        warte_bis(ENDE, || {
            stellwerk.fortschritt(&plan).map(|fortschritt| fortschritt.status)
                == Some(fahrplan::Status::Bereit)
        })?;
        Ok(())
    }

    #[test]
    fn fahrplan_pausiert_bei_fehler() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        let plan = fahrplan::Name("Pendel".to_owned());
        let mut fahrplan = Fahrplan::neu(plan.clone());
        fahrplan.einträge = vec![Eintrag::neu(name("fehlt"), Duration::ZERO)];
        stellwerk.füge_fahrplan_hinzu(fahrplan).expect("Neuer Name.");

        stellwerk.starte_fahrplan(&plan).expect("Fahrplan existiert.");
        warte_bis(ENDE, || {
            stellwerk.fortschritt(&plan).map(|fortschritt| fortschritt.status)
                == Some(fahrplan::Status::Pausiert)
        })?;
        expect_eq(
            stellwerk.fortschritt(&plan).and_then(|fortschritt| fortschritt.letzter_fehler),
            Some(Fehler::UnbekannteFahrstraße(name("fehlt"))),
        )?;

        // Nach dem Fortsetzen wird der Eintrag erneut versucht.
        füge_hinzu(&stellwerk, "fehlt", vec![schalten(4)], &[]);
        stellwerk.setze_fahrplan_fort(&plan).expect("Fahrplan existiert.");
        warte_bis(ENDE, || zentrale.befehle().len() == 1)?;
        Ok(())
    }

    #[test]
    fn fahrplan_wartet_auf_sperre() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "Blockade", vec![Schritt::Warten(Duration::from_secs(30))], &["S7"]);
        füge_hinzu(&stellwerk, "A", vec![schalten(4)], &["S7"]);
        let plan = fahrplan::Name("Pendel".to_owned());
        let mut fahrplan = Fahrplan::neu(plan.clone());
        fahrplan.einträge = vec![Eintrag::neu(name("A"), Duration::ZERO)];
        stellwerk.füge_fahrplan_hinzu(fahrplan).expect("Neuer Name.");

        let blockade = stellwerk.starte_fahrstraße(&name("Blockade")).expect("Alles frei.");
        stellwerk.starte_fahrplan(&plan).expect("Fahrplan existiert.");
        thread::sleep(Duration::from_millis(60));
        expect_true(zentrale.befehle().is_empty())?;
        expect_eq(
            stellwerk.fortschritt(&plan).map(|fortschritt| fortschritt.status),
            Some(fahrplan::Status::Läuft),
        )?;

        blockade.abbrechen();
        warte_bis(ENDE, || zentrale.befehle().len() == 1)?;
        Ok(())
    }

    #[test]
    fn fahrplan_zurücksetzen_und_leeren() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "Warten", vec![Schritt::Warten(Duration::from_secs(30))], &["S1"]);
        let plan = fahrplan::Name("Pendel".to_owned());
        let mut fahrplan = Fahrplan::neu(plan.clone());
        fahrplan.einträge = vec![Eintrag::neu(name("Warten"), Duration::ZERO)];
        stellwerk.füge_fahrplan_hinzu(fahrplan).expect("Neuer Name.");
        stellwerk
            .füge_eintrag_ein(&plan, 0, Eintrag::neu(name("Warten"), Duration::from_secs(1)))
            .expect("Fahrplan existiert.");
        stellwerk.setze_verzögerung(&plan, 0, Duration::ZERO).expect("Eintrag existiert.");

        stellwerk.starte_fahrplan(&plan).expect("Fahrplan existiert.");
        warte_bis(ENDE, || stellwerk.ausführung(&name("Warten")).is_some())?;

        stellwerk.setze_fahrplan_zurück(&plan).expect("Fahrplan existiert.");
        warte_bis(ENDE, || stellwerk.sperren().gesperrt_von(&name("Warten")).is_empty())?;
        expect_eq(stellwerk.fortschritt(&plan), Some(Fortschritt::default()))?;
        expect_eq(stellwerk.fahrplan(&plan).map(|fahrplan| fahrplan.einträge.len()), Some(2))?;

        stellwerk.leere_fahrplan(&plan).expect("Fahrplan existiert.");
        expect_eq(stellwerk.fahrplan(&plan).map(|fahrplan| fahrplan.einträge.len()), Some(0))?;
        expect_eq(
            stellwerk.entferne_eintrag(&plan, 0),
            Err(Fehler::UnbekannterEintrag { fahrplan: plan.clone(), index: 0 }),
        )?;
        Ok(())
    }

    #[test]
    fn fahrplan_eintrag_nach_pause_neu_gelesen() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "A", vec![schalten(4)], &[]);
        let plan = fahrplan::Name("Pendel".to_owned());
        let mut fahrplan = Fahrplan::neu(plan.clone());
        fahrplan.einträge = vec![Eintrag::neu(name("fehlt"), Duration::ZERO)];
        stellwerk.füge_fahrplan_hinzu(fahrplan).expect("Neuer Name.");

        stellwerk.starte_fahrplan(&plan).expect("Fahrplan existiert.");
        warte_bis(ENDE, || {
            stellwerk.fortschritt(&plan).map(|fortschritt| fortschritt.status)
                == Some(fahrplan::Status::Pausiert)
        })?;

        // Während der Pause wird der fehlerhafte Eintrag ersetzt.
        let _ = stellwerk.entferne_eintrag(&plan, 0).expect("Eintrag existiert.");
        stellwerk
            .füge_eintrag_ein(&plan, 0, Eintrag::neu(name("A"), Duration::ZERO))
            .expect("Fahrplan existiert.");
        stellwerk.setze_fahrplan_fort(&plan).expect("Fahrplan existiert.");
        warte_bis(ENDE, || {
            stellwerk.fortschritt(&plan).map(|fortschritt| fortschritt.status)
                == Some(fahrplan::Status::Bereit)
        })?;
        expect_eq(zentrale.befehle(), vec![befehl(4, Stellung::Abzweig)])?;
        Ok(())
    }

    #[test]
    fn fahrplan_verzweigung_auf_sich_selbst() -> Result<(), Expectation> {
        init_test_logging();

        let abfrage_intervall = Duration::from_millis(100);
        let (stellwerk, zentrale) = stellwerk_mit_einstellungen(
            Verhalten::Quittieren,
            Arc::new(KeineAnzeige),
            Einstellungen { abfrage_intervall, ..einstellungen() },
        );
        füge_hinzu(&stellwerk, "A", vec![schalten(4)], &[]);
        let plan = fahrplan::Name("Pendel".to_owned());
        let mut fahrplan = Fahrplan::neu(plan.clone());
        fahrplan.einträge = vec![Eintrag {
            fahrstraße: name("A"),
            verzögerung: Duration::ZERO,
            verzweigung: Some(fahrplan::Verzweigung {
                rückmelder: RückmelderAdresse(7),
                belegung: Belegung::Belegt,
                sonst: 0,
            }),
        }];
        stellwerk.füge_fahrplan_hinzu(fahrplan).expect("Neuer Name.");

        let start = Instant::now();
        stellwerk.starte_fahrplan(&plan).expect("Fahrplan existiert.");
        thread::sleep(Duration::from_millis(20));
        expect_eq(
            stellwerk.fortschritt(&plan).map(|fortschritt| (fortschritt.status, fortschritt.cursor)),
            Some((fahrplan::Status::Läuft, 0)),
        )?;
        expect_true(zentrale.befehle().is_empty())?;

        // Die Bedingung wird erst nach dem Abfrage-Intervall erneut geprüft.
        stellwerk.rückmeldung(RückmelderAdresse(7), Belegung::Belegt);
        warte_bis(ENDE, || !zentrale.befehle().is_empty())?;
        expect_true(start.elapsed() >= abfrage_intervall)?;
        expect_eq(zentrale.befehle(), vec![befehl(4, Stellung::Abzweig)])?;
        stellwerk.halte_fahrplan_an(&plan).expect("Fahrplan existiert.");
        Ok(())
    }

    #[test]
    fn fahrplan_wartet_auf_vorherige_fahrstraße() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "A", vec![Schritt::Warten(Duration::from_millis(300))], &["S1"]);
        füge_hinzu(&stellwerk, "B", vec![schalten(10)], &["S2"]);
        let plan = fahrplan::Name("Pendel".to_owned());
        let mut fahrplan = Fahrplan::neu(plan.clone());
        fahrplan.einträge = vec![
            Eintrag::neu(name("A"), Duration::ZERO),
            Eintrag::neu(name("B"), Duration::from_millis(50)),
        ];
        stellwerk.füge_fahrplan_hinzu(fahrplan).expect("Neuer Name.");

        let start = Instant::now();
        stellwerk.starte_fahrplan(&plan).expect("Fahrplan existiert.");
        // Die Wartezeit von B ist abgelaufen, aber A läuft noch.
        thread::sleep(Duration::from_millis(150));
        expect_true(stellwerk.ausführung(&name("A")).is_some())?;
        expect_true(stellwerk.ausführung(&name("B")).is_none())?;
        expect_true(zentrale.befehle().is_empty())?;

        warte_bis(ENDE, || !zentrale.befehle().is_empty())?;
        expect_true(start.elapsed() >= Duration::from_millis(350))?;
        expect_eq(zentrale.befehle(), vec![befehl(10, Stellung::Abzweig)])?;
        Ok(())
    }

    #[test]
    fn fahrplan_ohne_verbindung() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "A", vec![schalten(4)], &["S1"]);
        let plan = fahrplan::Name("Pendel".to_owned());
        let mut fahrplan = Fahrplan::neu(plan.clone());
        fahrplan.einträge = vec![Eintrag::neu(name("A"), Duration::ZERO)];
        stellwerk.füge_fahrplan_hinzu(fahrplan).expect("Neuer Name.");

        stellwerk.verbindung_getrennt();
        stellwerk.starte_fahrplan(&plan).expect("Fahrplan existiert.");
        warte_bis(ENDE, || {
            stellwerk.fortschritt(&plan).map(|fortschritt| fortschritt.status)
                == Some(fahrplan::Status::Pausiert)
        })?;
        expect_eq(
            stellwerk.fortschritt(&plan).and_then(|fortschritt| fortschritt.letzter_fehler),
            Some(Fehler::Ausführung(ausführung::Fehler::VerbindungGetrennt)),
        )?;
        expect_true(zentrale.befehle().is_empty())?;
        expect_true(stellwerk.sperren().gesperrt_von(&name("A")).is_empty())?;

        stellwerk.verbindung_hergestellt();
        stellwerk.setze_fahrplan_fort(&plan).expect("Fahrplan existiert.");
        warte_bis(ENDE, || zentrale.befehle().len() == 1)?;
        warte_bis(ENDE, || {
            stellwerk.fortschritt(&plan).map(|fortschritt| fortschritt.status)
                == Some(fahrplan::Status::Bereit)
        })?;
        Ok(())
    }

    /// Zählt, wie oft die Weichen neu gezeichnet werden.
    #[derive(Debug, Default)]
    struct ZählAnzeige {
        /// Anzahl Aufrufe von [`Anzeige::aktualisiere_weichen`].
        weichen: AtomicUsize,
    }

    impl Anzeige for ZählAnzeige {
        fn aktualisiere_lokomotiven(&self) {}

        fn aktualisiere_weichen(&self) {
            let _ = self.weichen.fetch_add(1, Ordering::SeqCst);
        }

        fn aktualisiere_gleisbild(&self) {}

        fn aktualisiere_stromzustand(&self) {}

        fn protokolliere(&self, _nachricht: &str) {}

        fn aktualisiere_latenz(&self, _latenz: Duration) {}
    }

    #[test]
    fn dreiwege_weiche_ein_neuzeichnen() -> Result<(), Expectation> {
        init_test_logging();

        let anzeige = Arc::new(ZählAnzeige::default());
        let (stellwerk, zentrale) =
            stellwerk_mit(Verhalten::Quittieren, Arc::<ZählAnzeige>::clone(&anzeige));
        stellwerk
            .setze_zustand(Koordinate { x: 2, y: 3 }, Zustand::Rechts)
            .expect("Erlaubter Zustand.");
        expect_eq(anzeige.weichen.load(Ordering::SeqCst), 1)?;
        expect_eq(stellwerk.zustände().stellung(ZubehörAdresse(10)), Stellung::Gerade)?;
        expect_eq(stellwerk.zustände().stellung(ZubehörAdresse(11)), Stellung::Abzweig)?;
        // Manuelles Setzen sendet keine Befehle.
        expect_true(zentrale.befehle().is_empty())?;

        let fehler = stellwerk.setze_zustand(Koordinate { x: 0, y: 0 }, Zustand::Links);
        expect_true(matches!(fehler, Err(Fehler::UngültigerZustand(_))))?;
        expect_eq(anzeige.weichen.load(Ordering::SeqCst), 1)?;
        Ok(())
    }

    #[test]
    fn nothalt_schritt() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "Halt", vec![Schritt::Nothalt], &[]);
        let ausführung = stellwerk.starte_fahrstraße(&name("Halt")).expect("Alles frei.");
        expect_eq(ausführung.warte_auf_ende(ENDE), Some(Status::Abgeschlossen))?;
        expect_eq(zentrale.nothalte(), 1)?;
        expect_eq(stellwerk.strom_an(), false)?;

        // Ohne Strom wird kein weiterer Nothalt gesendet.
        let ausführung = stellwerk.starte_fahrstraße(&name("Halt")).expect("Alles frei.");
        expect_eq(ausführung.warte_auf_ende(ENDE), Some(Status::Abgeschlossen))?;
        expect_eq(zentrale.nothalte(), 1)?;

        stellwerk.stromzustand(true);
        let ausführung = stellwerk.starte_fahrstraße(&name("Halt")).expect("Alles frei.");
        expect_eq(ausführung.warte_auf_ende(ENDE), Some(Status::Abgeschlossen))?;
        expect_eq(zentrale.nothalte(), 2)?;

        // Ein manueller Nothalt wird immer gesendet.
        stellwerk.nothalt();
        expect_eq(zentrale.nothalte(), 3)?;
        Ok(())
    }

    #[test]
    fn speicherstand_laden() -> Result<(), Expectation> {
        init_test_logging();

        let (stellwerk, _zentrale) = stellwerk(Verhalten::Quittieren);
        füge_hinzu(&stellwerk, "A", vec![schalten(4)], &["S1"]);
        stellwerk
            .füge_fahrplan_hinzu(Fahrplan::neu(fahrplan::Name("Pendel".to_owned())))
            .expect("Neuer Name.");
        let speicherstand = stellwerk.speicherstand();

        let (anderes, _andere_zentrale) = stellwerk_mit(Verhalten::Quittieren, Arc::new(KeineAnzeige));
        anderes.lade(speicherstand.clone());
        expect_eq(anderes.speicherstand(), speicherstand)?;
        Ok(())
    }
}
