//! Aktueller Zustand aller Zubehör-Antriebe und Rückmelder, mit Benachrichtigung bei Änderungen.

use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use log::{debug, trace};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    adresse::{Belegung, RückmelderAdresse, Stellung, ZubehörAdresse},
    Art, Gleisbild, Komponente, Koordinate,
};

/// Logischer Zustand einer [`Komponente`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zustand {
    /// Weiche oder Dreiwege-Weiche: gerade.
    Gerade,
    /// Weiche: abzweigend.
    Abzweig,
    /// Dreiwege-Weiche: links abzweigend.
    Links,
    /// Dreiwege-Weiche: rechts abzweigend.
    Rechts,
    /// Signal: Halt.
    Rot,
    /// Signal: Fahrt.
    Grün,
    /// Signal mit zweitem Antrieb: Langsamfahrt.
    Gelb,
    /// Rückmelder: kein Zug erkannt.
    Frei,
    /// Rückmelder: Zug erkannt.
    Belegt,
}

/// Der gewünschte [`Zustand`] kann nicht eingestellt werden.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UngültigerZustand {
    /// An der Koordinate befindet sich keine Komponente.
    #[error("Keine Komponente bei {0}.")]
    KeineKomponente(Koordinate),
    /// Der Zustand passt nicht zur Art der Komponente.
    #[error("{zustand:?} ist für {art:?} bei {koordinate} nicht erlaubt.")]
    NichtErlaubt {
        /// Position der Komponente.
        koordinate: Koordinate,
        /// Art der Komponente.
        art: Art,
        /// Der abgelehnte Zustand.
        zustand: Zustand,
    },
}

/// Eine Zustands-Änderung für eine Zubehör-Komponente.
pub type Stellungen = Vec<(ZubehörAdresse, Stellung)>;

impl Zustand {
    /// Die benötigten Stellungen der Antriebe, in der Reihenfolge in der sie geschaltet werden müssen.
    ///
    /// Bei einer Dreiwege-Weiche wird zuerst der nicht mehr benötigte Antrieb zurückgestellt.
    ///
    /// ## Errors
    ///
    /// Der Zustand ist für die Art der Komponente nicht erlaubt,
    /// z.B. [`Zustand::Links`] für eine [`Art::Weiche`].
    pub fn stellungen(self, komponente: &Komponente) -> Result<Stellungen, UngültigerZustand> {
        let nicht_erlaubt = || UngültigerZustand::NichtErlaubt {
            koordinate: komponente.koordinate,
            art: komponente.art,
            zustand: self,
        };
        let stellungen = match (komponente.art, komponente.zubehör.as_slice(), self) {
            (Art::Weiche, [adresse], Zustand::Gerade) => vec![(*adresse, Stellung::Gerade)],
            (Art::Weiche, [adresse], Zustand::Abzweig) => vec![(*adresse, Stellung::Abzweig)],
            (Art::DreiwegeWeiche, [links, rechts], Zustand::Gerade) => {
                vec![(*links, Stellung::Gerade), (*rechts, Stellung::Gerade)]
            },
            (Art::DreiwegeWeiche, [links, rechts], Zustand::Links) => {
                vec![(*rechts, Stellung::Gerade), (*links, Stellung::Abzweig)]
            },
            (Art::DreiwegeWeiche, [links, rechts], Zustand::Rechts) => {
                vec![(*links, Stellung::Gerade), (*rechts, Stellung::Abzweig)]
            },
            (Art::Signal, [haupt, ..], Zustand::Rot) => vec![(*haupt, Stellung::Abzweig)],
            (Art::Signal, [haupt], Zustand::Grün) => vec![(*haupt, Stellung::Gerade)],
            (Art::Signal, [haupt, zusatz], Zustand::Grün) => {
                vec![(*haupt, Stellung::Gerade), (*zusatz, Stellung::Gerade)]
            },
            (Art::Signal, [haupt, zusatz], Zustand::Gelb) => {
                vec![(*haupt, Stellung::Gerade), (*zusatz, Stellung::Abzweig)]
            },
            _ => return Err(nicht_erlaubt()),
        };
        Ok(stellungen)
    }

    /// Bestimme den Zustand einer Komponente aus den Stellungen ihrer Antriebe.
    fn aus_stellungen(art: Art, stellungen: &[Stellung]) -> Option<Zustand> {
        let zustand = match (art, stellungen) {
            (Art::Weiche, [Stellung::Gerade])
            | (Art::DreiwegeWeiche, [Stellung::Gerade, Stellung::Gerade]) => Zustand::Gerade,
            (Art::Weiche, [Stellung::Abzweig]) => Zustand::Abzweig,
            (Art::DreiwegeWeiche, [Stellung::Abzweig, Stellung::Gerade]) => Zustand::Links,
            (Art::DreiwegeWeiche, [Stellung::Gerade, Stellung::Abzweig]) => Zustand::Rechts,
            (Art::Signal, [Stellung::Abzweig, ..]) => Zustand::Rot,
            (Art::Signal, [Stellung::Gerade] | [Stellung::Gerade, Stellung::Gerade]) => {
                Zustand::Grün
            },
            (Art::Signal, [Stellung::Gerade, Stellung::Abzweig]) => Zustand::Gelb,
            _ => return None,
        };
        Some(zustand)
    }
}

/// Eine Änderung, über die [Beobachter](Beobachter) informiert werden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Änderung {
    /// Ein oder mehrere Antriebe wurden gestellt.
    Zubehör {
        /// Die betroffene Komponente, falls über [`Zustände::setze_zustand`] geändert.
        koordinate: Option<Koordinate>,
        /// Die neuen Stellungen.
        stellungen: Stellungen,
    },
    /// Ein Rückmelder hat eine neue Belegung gemeldet.
    Rückmelder {
        /// Der meldende Rückmelder.
        adresse: RückmelderAdresse,
        /// Die neue Belegung.
        belegung: Belegung,
        /// Die Belegung vor der Meldung.
        vorher: Belegung,
    },
}

/// Wird nach jeder erfolgreichen Änderung synchron benachrichtigt.
pub trait Beobachter: Send + Sync {
    /// Eine Änderung ist passiert.
    fn geändert(&self, änderung: &Änderung);
}

impl<F: Fn(&Änderung) + Send + Sync> Beobachter for F {
    fn geändert(&self, änderung: &Änderung) {
        self(änderung);
    }
}

/// Identifiziert ein Abonnement, z.B. um es über [`Zustände::kündige`] zu beenden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbonnementId(u64);

/// Zustand eines Rückmelders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RückmelderZustand {
    /// Die zuletzt gemeldete Belegung.
    pub belegung: Belegung,
    /// Zeitpunkt der letzten Änderung der Belegung.
    pub letzte_änderung: Option<Instant>,
}

/// Zustand eines Rückmelders, zusammen mit der Sperre für die Reihenfolge seiner Meldungen.
#[derive(Debug, Default)]
struct RückmelderEintrag {
    /// Der aktuelle Zustand.
    zustand: Mutex<RückmelderZustand>,
    /// Wird von der Änderung bis zur letzten Benachrichtigung gehalten.
    /// Wiedereintrittsfähig, damit Beobachter den selben Rückmelder melden dürfen.
    meldung: ReentrantMutex<()>,
}

/// Zustand aller Zubehör-Antriebe und Rückmelder eines [`Gleisbilds`](Gleisbild).
///
/// Jeder Antrieb und Rückmelder ist einzeln geschützt,
/// Änderungen an unterschiedlichen Adressen blockieren sich nicht gegenseitig.
pub struct Zustände {
    /// Das zugehörige Gleisbild.
    gleisbild: Arc<Gleisbild>,
    /// Stellung aller bekannten Antriebe.
    zubehör: RwLock<HashMap<ZubehörAdresse, Arc<Mutex<Stellung>>>>,
    /// Belegung aller bekannten Rückmelder.
    rückmelder: RwLock<HashMap<RückmelderAdresse, Arc<RückmelderEintrag>>>,
    /// Alle registrierten Beobachter.
    beobachter: Mutex<Vec<(AbonnementId, Arc<dyn Beobachter>)>>,
    /// Die Id für das nächste Abonnement.
    nächste_id: AtomicU64,
}

impl Debug for Zustände {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Zustände")
            .field("gleisbild", &self.gleisbild)
            .field("zubehör", &self.zubehör.read().len())
            .field("rückmelder", &self.rückmelder.read().len())
            .field("beobachter", &self.beobachter.lock().len())
            .finish_non_exhaustive()
    }
}

impl Zustände {
    /// Erzeuge einen neuen Zustand, alle Antriebe gerade und alle Rückmelder frei.
    #[must_use]
    pub fn neu(gleisbild: Arc<Gleisbild>) -> Self {
        let zubehör = gleisbild
            .zubehör_adressen()
            .map(|adresse| (adresse, Arc::new(Mutex::new(Stellung::default()))))
            .collect();
        let rückmelder = gleisbild
            .rückmelder_adressen()
            .map(|adresse| (adresse, Arc::new(RückmelderEintrag::default())))
            .collect();
        Zustände {
            gleisbild,
            zubehör: RwLock::new(zubehör),
            rückmelder: RwLock::new(rückmelder),
            beobachter: Mutex::new(Vec::new()),
            nächste_id: AtomicU64::new(0),
        }
    }

    /// Das zugehörige Gleisbild.
    #[must_use]
    pub fn gleisbild(&self) -> &Arc<Gleisbild> {
        &self.gleisbild
    }

    /// Registriere einen [`Beobachter`].
    pub fn abonniere(&self, beobachter: Arc<dyn Beobachter>) -> AbonnementId {
        let id = AbonnementId(self.nächste_id.fetch_add(1, Ordering::Relaxed));
        self.beobachter.lock().push((id, beobachter));
        id
    }

    /// Entferne einen [`Beobachter`]. Gibt zurück, ob er registriert war.
    pub fn kündige(&self, id: AbonnementId) -> bool {
        let mut beobachter = self.beobachter.lock();
        let vorher = beobachter.len();
        beobachter.retain(|(registriert, _beobachter)| *registriert != id);
        beobachter.len() != vorher
    }

    /// Benachrichtige alle Beobachter. Es wird keine Sperre gehalten,
    /// Beobachter dürfen also selbst wieder Zustände ändern.
    fn benachrichtige(&self, änderung: &Änderung) {
        let beobachter: Vec<_> =
            self.beobachter.lock().iter().map(|(_id, beobachter)| Arc::clone(beobachter)).collect();
        trace!("Benachrichtige {} Beobachter über {änderung:?}", beobachter.len());
        for beobachter in beobachter {
            beobachter.geändert(änderung);
        }
    }

    /// Der Mutex für die Stellung eines Antriebs, bei Bedarf neu erzeugt.
    fn zubehör_eintrag(&self, adresse: ZubehörAdresse) -> Arc<Mutex<Stellung>> {
        if let Some(eintrag) = self.zubehör.read().get(&adresse) {
            return Arc::clone(eintrag);
        }
        Arc::clone(self.zubehör.write().entry(adresse).or_default())
    }

    /// Der Eintrag für die Belegung eines Rückmelders, bei Bedarf neu erzeugt.
    fn rückmelder_eintrag(&self, adresse: RückmelderAdresse) -> Arc<RückmelderEintrag> {
        if let Some(eintrag) = self.rückmelder.read().get(&adresse) {
            return Arc::clone(eintrag);
        }
        Arc::clone(self.rückmelder.write().entry(adresse).or_default())
    }

    /// Setze den Zustand einer Komponente.
    ///
    /// Alle betroffenen Antriebe werden gemeinsam gestellt,
    /// danach werden die Beobachter genau einmal benachrichtigt.
    ///
    /// ## Errors
    ///
    /// Es gibt keine Komponente an der Koordinate,
    /// oder der Zustand passt nicht zu ihrer Art. Es wird nichts verändert.
    pub fn setze_zustand(
        &self,
        koordinate: Koordinate,
        zustand: Zustand,
    ) -> Result<(), UngültigerZustand> {
        let komponente = self
            .gleisbild
            .komponente(&koordinate)
            .ok_or(UngültigerZustand::KeineKomponente(koordinate))?;
        match (komponente.art, komponente.rückmelder, zustand) {
            (Art::Rückmelder, Some(adresse), Zustand::Frei) => {
                let _ = self.rückmeldung(adresse, Belegung::Frei);
                return Ok(());
            },
            (Art::Rückmelder, Some(adresse), Zustand::Belegt) => {
                let _ = self.rückmeldung(adresse, Belegung::Belegt);
                return Ok(());
            },
            _ => {},
        }
        let stellungen = zustand.stellungen(komponente)?;
        {
            // Sperren in Adress-Reihenfolge, damit sich parallele Aufrufe nicht blockieren.
            let mut einträge: Vec<_> = stellungen
                .iter()
                .map(|(adresse, stellung)| (*adresse, *stellung, self.zubehör_eintrag(*adresse)))
                .collect();
            einträge.sort_by_key(|(adresse, _stellung, _eintrag)| *adresse);
            einträge.dedup_by_key(|(adresse, _stellung, _eintrag)| *adresse);
            let mut guards: Vec<_> = einträge
                .iter()
                .map(|(_adresse, stellung, eintrag)| (*stellung, eintrag.lock()))
                .collect();
            for (stellung, guard) in &mut guards {
                **guard = *stellung;
            }
        }
        debug!("{:?} bei {koordinate} ist jetzt {zustand:?}.", komponente.art);
        self.benachrichtige(&Änderung::Zubehör { koordinate: Some(koordinate), stellungen });
        Ok(())
    }

    /// Der aktuelle Zustand einer Komponente.
    ///
    /// [`None`], wenn es keine Komponente mit Zustand an der Koordinate gibt,
    /// oder die Stellungen der Antriebe keinem Zustand entsprechen.
    #[must_use]
    pub fn zustand(&self, koordinate: Koordinate) -> Option<Zustand> {
        let komponente = self.gleisbild.komponente(&koordinate)?;
        if let Some(adresse) = komponente.rückmelder {
            return Some(match self.belegung(adresse) {
                Belegung::Frei => Zustand::Frei,
                Belegung::Belegt => Zustand::Belegt,
            });
        }
        let stellungen: Vec<_> =
            komponente.zubehör.iter().map(|adresse| self.stellung(*adresse)).collect();
        Zustand::aus_stellungen(komponente.art, &stellungen)
    }

    /// Setze die Stellung eines einzelnen Antriebs, z.B. nach Quittung durch die Zentrale.
    pub fn setze_stellung(&self, adresse: ZubehörAdresse, stellung: Stellung) {
        *self.zubehör_eintrag(adresse).lock() = stellung;
        trace!("{adresse} ist jetzt {stellung}.");
        self.benachrichtige(&Änderung::Zubehör {
            koordinate: None,
            stellungen: vec![(adresse, stellung)],
        });
    }

    /// Die aktuelle Stellung eines Antriebs.
    #[must_use]
    pub fn stellung(&self, adresse: ZubehörAdresse) -> Stellung {
        *self.zubehör_eintrag(adresse).lock()
    }

    /// Eine neue Meldung eines Rückmelders. Gibt die vorherige Belegung zurück.
    ///
    /// Meldungen des selben Rückmelders erreichen alle Beobachter
    /// in der Reihenfolge, in der sie den Zustand geändert haben.
    pub fn rückmeldung(&self, adresse: RückmelderAdresse, belegung: Belegung) -> Belegung {
        let eintrag = self.rückmelder_eintrag(adresse);
        let _meldung = eintrag.meldung.lock();
        let vorher = {
            let mut zustand = eintrag.zustand.lock();
            let vorher = zustand.belegung;
            if vorher != belegung {
                zustand.belegung = belegung;
                zustand.letzte_änderung = Some(Instant::now());
            }
            vorher
        };
        trace!("{adresse} meldet {belegung} (vorher {vorher}).");
        self.benachrichtige(&Änderung::Rückmelder { adresse, belegung, vorher });
        vorher
    }

    /// Die aktuelle Belegung eines Rückmelders.
    #[must_use]
    pub fn belegung(&self, adresse: RückmelderAdresse) -> Belegung {
        self.rückmelder_eintrag(adresse).zustand.lock().belegung
    }

    /// Belegung und Zeitpunkt der letzten Änderung eines Rückmelders.
    #[must_use]
    pub fn rückmelder_zustand(&self, adresse: RückmelderAdresse) -> RückmelderZustand {
        *self.rückmelder_eintrag(adresse).zustand.lock()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use stellwerk_test_util::{expect_eq, expect_true, init_test_logging, Expectation};

    fn gleisbild() -> Arc<Gleisbild> {
        let dreiwege = Komponente::neu(
            Koordinate { x: 2, y: 3 },
            Art::DreiwegeWeiche,
            vec![ZubehörAdresse(10), ZubehörAdresse(11)],
            None,
        );
        let weiche =
            Komponente::neu(Koordinate { x: 0, y: 0 }, Art::Weiche, vec![ZubehörAdresse(1)], None);
        let signal = Komponente::neu(
            Koordinate { x: 1, y: 0 },
            Art::Signal,
            vec![ZubehörAdresse(4), ZubehörAdresse(5)],
            None,
        );
        let kontakt = Komponente::neu(
            Koordinate { x: 5, y: 5 },
            Art::Rückmelder,
            Vec::new(),
            Some(RückmelderAdresse(7)),
        );
        Arc::new(Gleisbild::neu([dreiwege, weiche, signal, kontakt]).expect("Gültiges Gleisbild."))
    }

    /// Zählt alle Benachrichtigungen über Zubehör-Änderungen.
    fn zähler(zustände: &Zustände) -> Arc<AtomicUsize> {
        let zähler = Arc::new(AtomicUsize::new(0));
        let zähler_clone = Arc::clone(&zähler);
        let _ = zustände.abonniere(Arc::new(move |änderung: &Änderung| {
            if let Änderung::Zubehör { .. } = änderung {
                let _ = zähler_clone.fetch_add(1, Ordering::SeqCst);
            }
        }));
        zähler
    }

    #[test]
    fn dreiwege_weiche_eine_benachrichtigung() -> Result<(), Expectation> {
        init_test_logging();

        let zustände = Zustände::neu(gleisbild());
        let zähler = zähler(&zustände);
        zustände
            .setze_zustand(Koordinate { x: 2, y: 3 }, Zustand::Rechts)
            .expect("Rechts ist für eine Dreiwege-Weiche erlaubt.");

        expect_eq(zustände.stellung(ZubehörAdresse(10)), Stellung::Gerade)?;
        expect_eq(zustände.stellung(ZubehörAdresse(11)), Stellung::Abzweig)?;
        expect_eq(zustände.zustand(Koordinate { x: 2, y: 3 }), Some(Zustand::Rechts))?;
        expect_eq(zähler.load(Ordering::SeqCst), 1)?;
        Ok(())
    }

    #[test]
    fn dreiwege_reihenfolge() -> Result<(), Expectation> {
        init_test_logging();

        let gleisbild = gleisbild();
        let dreiwege = gleisbild.komponente_bei(2, 3).expect("Dreiwege-Weiche existiert.");
        let links = Zustand::Links.stellungen(dreiwege).expect("Links ist erlaubt.");
        expect_eq(
            links,
            vec![(ZubehörAdresse(11), Stellung::Gerade), (ZubehörAdresse(10), Stellung::Abzweig)],
        )?;
        Ok(())
    }

    #[test]
    fn ungültiger_zustand_ohne_auswirkung() -> Result<(), Expectation> {
        init_test_logging();

        let zustände = Zustände::neu(gleisbild());
        let zähler = zähler(&zustände);
        let ergebnis = zustände.setze_zustand(Koordinate { x: 0, y: 0 }, Zustand::Links);
        expect_true(matches!(ergebnis, Err(UngültigerZustand::NichtErlaubt { .. })))?;
        let ergebnis = zustände.setze_zustand(Koordinate { x: 9, y: 9 }, Zustand::Gerade);
        expect_eq(ergebnis, Err(UngültigerZustand::KeineKomponente(Koordinate { x: 9, y: 9 })))?;
        expect_eq(zustände.stellung(ZubehörAdresse(1)), Stellung::Gerade)?;
        expect_eq(zähler.load(Ordering::SeqCst), 0)?;
        Ok(())
    }

    #[test]
    fn signal_gelb() -> Result<(), Expectation> {
        init_test_logging();

        let zustände = Zustände::neu(gleisbild());
        let signal = Koordinate { x: 1, y: 0 };
        expect_eq(zustände.zustand(signal), Some(Zustand::Grün))?;
        zustände.setze_zustand(signal, Zustand::Gelb).expect("Gelb mit zweitem Antrieb.");
        expect_eq(zustände.zustand(signal), Some(Zustand::Gelb))?;
        zustände.setze_zustand(signal, Zustand::Rot).expect("Rot ist erlaubt.");
        expect_eq(zustände.zustand(signal), Some(Zustand::Rot))?;
        Ok(())
    }

    #[test]
    fn rückmeldung_benachrichtigt() -> Result<(), Expectation> {
        init_test_logging();

        let zustände = Zustände::neu(gleisbild());
        let änderungen = Arc::new(Mutex::new(Vec::new()));
        let änderungen_clone = Arc::clone(&änderungen);
        let id = zustände.abonniere(Arc::new(move |änderung: &Änderung| {
            änderungen_clone.lock().push(änderung.clone());
        }));
        let adresse = RückmelderAdresse(7);

        expect_eq(zustände.rückmelder_zustand(adresse).letzte_änderung, None)?;
        expect_eq(zustände.rückmeldung(adresse, Belegung::Belegt), Belegung::Frei)?;
        expect_true(zustände.rückmelder_zustand(adresse).letzte_änderung.is_some())?;
        expect_eq(zustände.zustand(Koordinate { x: 5, y: 5 }), Some(Zustand::Belegt))?;
        zustände
            .setze_zustand(Koordinate { x: 5, y: 5 }, Zustand::Frei)
            .expect("Rückmelder kann manuell gesetzt werden.");
        expect_eq(zustände.belegung(adresse), Belegung::Frei)?;

        expect_true(zustände.kündige(id))?;
        let _ = zustände.rückmeldung(adresse, Belegung::Belegt);
        expect_eq(
            änderungen.lock().clone(),
            vec![
                Änderung::Rückmelder { adresse, belegung: Belegung::Belegt, vorher: Belegung::Frei },
                Änderung::Rückmelder { adresse, belegung: Belegung::Frei, vorher: Belegung::Belegt },
            ],
        )?;
        Ok(())
    }

    #[test]
    fn rückmeldungen_in_reihenfolge() -> Result<(), Expectation> {
        init_test_logging();

        let zustände = Arc::new(Zustände::neu(gleisbild()));
        let adresse = RückmelderAdresse(7);
        let meldungen = Arc::new(Mutex::new(Vec::new()));
        let meldungen_clone = Arc::clone(&meldungen);
        let _ = zustände.abonniere(Arc::new(move |änderung: &Änderung| {
            if let Änderung::Rückmelder { belegung, vorher, .. } = änderung {
                meldungen_clone.lock().push((*vorher, *belegung));
            }
        }));

        let threads: Vec<_> = (0..4)
            .map(|nummer| {
                let zustände = Arc::clone(&zustände);
                std::thread::spawn(move || {
                    for schritt in 0..200_usize {
                        let belegung = if schritt.wrapping_add(nummer) % 2 == 0 {
                            Belegung::Belegt
                        } else {
                            Belegung::Frei
                        };
                        let _ = zustände.rückmeldung(adresse, belegung);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().expect("Thread ohne panic beendet.");
        }

        // Jede Benachrichtigung beginnt bei der Belegung der vorherigen.
        let meldungen = meldungen.lock().clone();
        expect_eq(meldungen.len(), 800)?;
        let mut aktuell = Belegung::Frei;
        for (vorher, belegung) in meldungen {
            expect_eq(vorher, aktuell)?;
            aktuell = belegung;
        }
        expect_eq(zustände.belegung(adresse), aktuell)?;
        Ok(())
    }

    #[test]
    fn beobachter_meldet_selben_rückmelder() -> Result<(), Expectation> {
        init_test_logging();

        let zustände = Arc::new(Zustände::neu(gleisbild()));
        let adresse = RückmelderAdresse(7);
        let schwach = Arc::downgrade(&zustände);
        let _ = zustände.abonniere(Arc::new(move |änderung: &Änderung| {
            if let (Änderung::Rückmelder { belegung: Belegung::Belegt, .. }, Some(zustände)) =
                (änderung, schwach.upgrade())
            {
                let _ = zustände.rückmeldung(adresse, Belegung::Frei);
            }
        }));

        expect_eq(zustände.rückmeldung(adresse, Belegung::Belegt), Belegung::Frei)?;
        expect_eq(zustände.belegung(adresse), Belegung::Frei)?;
        Ok(())
    }
}
