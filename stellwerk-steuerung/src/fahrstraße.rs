//! Fahrstraßen: eine Folge von Schaltbefehlen und Rückmelder-Bedingungen für eine Zugfahrt.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display, Formatter},
    time::Duration,
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use stellwerk_gleisbild::{
    adresse::{Belegung, RückmelderAdresse, Stellung, ZubehörAdresse},
    zustand::{Zustand, Zustände},
    Koordinate,
};
use thiserror::Error;

use crate::sperren::Abschnitt;

/// Eindeutiger Name einer [`Fahrstraße`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name(pub String);

impl Display for Name {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Ein einzelner Schritt einer [`Fahrstraße`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schritt {
    /// Stelle einen einzelnen Antrieb.
    Schalten {
        /// Der Antrieb.
        adresse: ZubehörAdresse,
        /// Die gewünschte Stellung.
        stellung: Stellung,
        /// Zusätzliche Wartezeit nach dem Schalten.
        verzögerung: Option<Duration>,
    },
    /// Stelle eine Komponente des Gleisbilds, z.B. eine Dreiwege-Weiche.
    Stellen {
        /// Position der Komponente.
        koordinate: Koordinate,
        /// Der gewünschte Zustand.
        zustand: Zustand,
        /// Zusätzliche Wartezeit nach dem Stellen.
        verzögerung: Option<Duration>,
    },
    /// Warte, bis ein Rückmelder die gewünschte Belegung meldet.
    WartenAuf {
        /// Der Rückmelder.
        rückmelder: RückmelderAdresse,
        /// Die erwartete Belegung.
        belegung: Belegung,
        /// Zeitlimit, ohne Angabe wird die [Standard-Einstellung](crate::einstellungen::Einstellungen::rückmeldung_zeitlimit) verwendet.
        zeitlimit: Option<Duration>,
    },
    /// Warte eine feste Zeit.
    Warten(Duration),
    /// Führe eine andere Fahrstraße an dieser Stelle aus.
    Fahrstraße(Name),
    /// Unterbreche die Stromversorgung der Anlage.
    Nothalt,
}

/// Welche Änderung eines Rückmelders eine Fahrstraße auslöst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flanke {
    /// Der Rückmelder wechselt von frei zu belegt.
    FreiDannBelegt,
    /// Der Rückmelder wechselt von belegt zu frei.
    BelegtDannFrei,
}

impl Flanke {
    /// Passt der Wechsel von `vorher` zu `nachher` zur Flanke?
    #[must_use]
    pub fn passt(self, vorher: Belegung, nachher: Belegung) -> bool {
        matches!(
            (self, vorher, nachher),
            (Flanke::FreiDannBelegt, Belegung::Frei, Belegung::Belegt)
                | (Flanke::BelegtDannFrei, Belegung::Belegt, Belegung::Frei)
        )
    }
}

/// Automatischer Start einer Fahrstraße durch einen Rückmelder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Auslöser {
    /// Der auslösende Rückmelder.
    pub rückmelder: RückmelderAdresse,
    /// Die auslösende Änderung.
    pub flanke: Flanke,
}

/// Bedingung, die für einen automatischen Start erfüllt sein muss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bedingung {
    /// Ein Rückmelder hat die gewünschte Belegung.
    Rückmelder {
        /// Der Rückmelder.
        adresse: RückmelderAdresse,
        /// Die geforderte Belegung.
        belegung: Belegung,
    },
    /// Ein Antrieb hat die gewünschte Stellung.
    Zubehör {
        /// Der Antrieb.
        adresse: ZubehörAdresse,
        /// Die geforderte Stellung.
        stellung: Stellung,
    },
}

impl Bedingung {
    /// Ist die Bedingung aktuell erfüllt?
    #[must_use]
    pub fn erfüllt(&self, zustände: &Zustände) -> bool {
        match self {
            Bedingung::Rückmelder { adresse, belegung } => zustände.belegung(*adresse) == *belegung,
            Bedingung::Zubehör { adresse, stellung } => zustände.stellung(*adresse) == *stellung,
        }
    }
}

/// Eine Fahrstraße.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fahrstraße {
    /// Der eindeutige Name.
    pub name: Name,
    /// Die Schritte, in Ausführungs-Reihenfolge.
    pub schritte: Vec<Schritt>,
    /// Während der Ausführung gesperrte Abschnitte.
    pub abschnitte: BTreeSet<Abschnitt>,
    /// Optionaler automatischer Start.
    pub auslöser: Option<Auslöser>,
    /// Bedingungen für den automatischen Start.
    pub bedingungen: Vec<Bedingung>,
    /// Ist der automatische Start aktiviert?
    pub aktiviert: bool,
}

impl Fahrstraße {
    /// Erstelle eine neue Fahrstraße ohne automatischen Start.
    #[must_use]
    pub fn neu(name: Name, schritte: Vec<Schritt>, abschnitte: BTreeSet<Abschnitt>) -> Self {
        Fahrstraße {
            name,
            schritte,
            abschnitte,
            auslöser: None,
            bedingungen: Vec::new(),
            aktiviert: false,
        }
    }

    /// Sind alle Start-Bedingungen erfüllt?
    #[must_use]
    pub fn bedingungen_erfüllt(&self, zustände: &Zustände) -> bool {
        self.bedingungen.iter().all(|bedingung| bedingung.erfüllt(zustände))
    }

    /// Soll die Änderung des Rückmelders die Fahrstraße automatisch starten?
    #[must_use]
    pub fn wird_ausgelöst(
        &self,
        rückmelder: RückmelderAdresse,
        vorher: Belegung,
        nachher: Belegung,
    ) -> bool {
        self.aktiviert
            && self.auslöser.is_some_and(|auslöser| {
                auslöser.rückmelder == rückmelder && auslöser.flanke.passt(vorher, nachher)
            })
    }

    /// Wird die Fahrstraße `name` als Schritt ausgeführt?
    #[must_use]
    pub fn verwendet(&self, name: &Name) -> bool {
        self.schritte.iter().any(|schritt| matches!(schritt, Schritt::Fahrstraße(verwendet) if verwendet == name))
    }

    /// Ersetze alle Verweise auf die Fahrstraße `alt` durch `neu`.
    /// Gibt zurück, ob ein Verweis ersetzt wurde.
    pub fn benenne_verweise_um(&mut self, alt: &Name, neu: &Name) -> bool {
        let mut ersetzt = false;
        for schritt in &mut self.schritte {
            if let Schritt::Fahrstraße(verwendet) = schritt {
                if verwendet == alt {
                    *verwendet = neu.clone();
                    ersetzt = true;
                }
            }
        }
        ersetzt
    }
}

/// Fehler beim Auflösen verschachtelter Fahrstraßen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuflösenFehler {
    /// Eine verwendete Fahrstraße existiert nicht.
    #[error("Unbekannte Fahrstraße {0}.")]
    Unbekannt(Name),
    /// Eine Fahrstraße verwendet sich (indirekt) selbst.
    #[error("Zyklische Fahrstraßen: {}", .0.iter().join(" -> "))]
    Zyklus(Vec<Name>),
}

/// Ein Schritt nach dem Auflösen verschachtelter Fahrstraßen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AufgelösterSchritt {
    /// Die Fahrstraße, in der der Schritt definiert ist.
    pub fahrstraße: Name,
    /// Index des Schritts in seiner Fahrstraße.
    pub index: usize,
    /// Der Schritt.
    pub schritt: Schritt,
}

/// Eine Fahrstraße, in der alle verschachtelten Fahrstraßen aufgelöst wurden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aufgelöst {
    /// Name der äußeren Fahrstraße.
    pub name: Name,
    /// Alle Schritte, ohne [`Schritt::Fahrstraße`].
    pub schritte: Vec<AufgelösterSchritt>,
    /// Vereinigung der Abschnitte aller beteiligten Fahrstraßen.
    pub abschnitte: BTreeSet<Abschnitt>,
    /// Alle beteiligten Fahrstraßen, inklusive der äußeren.
    pub verwendet: BTreeSet<Name>,
}

/// Löse alle verschachtelten Fahrstraßen von `name` auf.
///
/// ## Errors
///
/// Eine verwendete Fahrstraße existiert nicht, oder die Verschachtelung ist zyklisch.
pub fn auflösen(
    name: &Name,
    fahrstraßen: &BTreeMap<Name, Fahrstraße>,
) -> Result<Aufgelöst, AuflösenFehler> {
    /// Füge die Schritte von `name` rekursiv hinzu. `pfad` enthält alle aktuell offenen Fahrstraßen.
    fn füge_hinzu(
        name: &Name,
        fahrstraßen: &BTreeMap<Name, Fahrstraße>,
        pfad: &mut Vec<Name>,
        aufgelöst: &mut Aufgelöst,
    ) -> Result<(), AuflösenFehler> {
        if pfad.contains(name) {
            let mut zyklus = pfad.clone();
            zyklus.push(name.clone());
            return Err(AuflösenFehler::Zyklus(zyklus));
        }
        let fahrstraße =
            fahrstraßen.get(name).ok_or_else(|| AuflösenFehler::Unbekannt(name.clone()))?;
        pfad.push(name.clone());
        let _ = aufgelöst.verwendet.insert(name.clone());
        aufgelöst.abschnitte.extend(fahrstraße.abschnitte.iter().cloned());
        for (index, schritt) in fahrstraße.schritte.iter().enumerate() {
            if let Schritt::Fahrstraße(verschachtelt) = schritt {
                füge_hinzu(verschachtelt, fahrstraßen, pfad, aufgelöst)?;
            } else {
                aufgelöst.schritte.push(AufgelösterSchritt {
                    fahrstraße: name.clone(),
                    index,
                    schritt: schritt.clone(),
                });
            }
        }
        let _ = pfad.pop();
        Ok(())
    }

    let mut aufgelöst = Aufgelöst {
        name: name.clone(),
        schritte: Vec::new(),
        abschnitte: BTreeSet::new(),
        verwendet: BTreeSet::new(),
    };
    füge_hinzu(name, fahrstraßen, &mut Vec::new(), &mut aufgelöst)?;
    Ok(aufgelöst)
}
