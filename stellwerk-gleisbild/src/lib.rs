//! Gleisbild einer Modelleisenbahn: Komponenten mit absoluten Koordinaten und ihren Adressen.

use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt::{self, Display, Formatter},
    ops::RangeInclusive,
};

use itertools::Itertools;
use log::debug;
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adresse::{RückmelderAdresse, ZubehörAdresse};

pub mod adresse;
pub mod kachel;
pub mod laden;
pub mod zustand;

/// Position einer Komponente im Gleisbild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Koordinate {
    /// Spalte.
    pub x: u16,
    /// Zeile.
    pub y: u16,
}

impl Display for Koordinate {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "({}, {})", self.x, self.y)
    }
}

/// Die Art einer [`Komponente`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Art {
    /// Eine Weiche mit einem Antrieb.
    Weiche,
    /// Eine Weiche mit drei Stellungen und zwei Antrieben.
    DreiwegeWeiche,
    /// Ein Signal, mit optionalem zweiten Antrieb für die Gelb-Stellung.
    Signal,
    /// Ein Rückmelder-Gleis.
    Rückmelder,
    /// Ein Gleis ohne steuerbare Elemente.
    Gleis,
    /// Eine Beschriftung.
    Beschriftung,
}

impl Art {
    /// Erlaubte Anzahl an Zubehör-Adressen.
    #[must_use]
    pub fn zubehör_anzahl(self) -> RangeInclusive<usize> {
        match self {
            Art::Weiche => 1..=1,
            Art::DreiwegeWeiche => 2..=2,
            Art::Signal => 1..=2,
            Art::Rückmelder | Art::Gleis | Art::Beschriftung => 0..=0,
        }
    }

    /// Benötigt die Art eine Rückmelder-Adresse?
    #[must_use]
    pub fn benötigt_rückmelder(self) -> bool {
        matches!(self, Art::Rückmelder)
    }
}

/// Eine Komponente des Gleisbilds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Komponente {
    /// Die eindeutige Position im Gleisbild.
    pub koordinate: Koordinate,
    /// Die Art der Komponente.
    pub art: Art,
    /// Adressen der Antriebe, in Reihenfolge.
    pub zubehör: Vec<ZubehörAdresse>,
    /// Adresse des Rückmelders.
    pub rückmelder: Option<RückmelderAdresse>,
    /// Drehung in Vielfachen von 90°.
    pub drehung: u8,
    /// Angezeigter Text.
    pub beschriftung: Option<String>,
}

impl Komponente {
    /// Erstelle eine neue Komponente ohne Drehung und Beschriftung.
    #[must_use]
    pub fn neu(
        koordinate: Koordinate,
        art: Art,
        zubehör: Vec<ZubehörAdresse>,
        rückmelder: Option<RückmelderAdresse>,
    ) -> Self {
        Komponente { koordinate, art, zubehör, rückmelder, drehung: 0, beschriftung: None }
    }
}

/// Kleinstes Rechteck, das alle Komponenten enthält.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grenzen {
    /// Kleinste belegte Spalte.
    pub min_x: u16,
    /// Kleinste belegte Zeile.
    pub min_y: u16,
    /// Größte belegte Spalte.
    pub max_x: u16,
    /// Größte belegte Zeile.
    pub max_y: u16,
}

/// Ein Mangel im Gleisbild, der das Laden verhindert.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Mangel {
    /// Zwei Komponenten haben die selbe Koordinate.
    #[error("Mehrere Komponenten bei {koordinate}.")]
    DoppelteKoordinate {
        /// Die mehrfach verwendete Koordinate.
        koordinate: Koordinate,
    },
    /// Die Anzahl Zubehör-Adressen passt nicht zur Art.
    #[error("{art:?} bei {koordinate} hat {anzahl} Zubehör-Adressen, erlaubt sind {erlaubt:?}.")]
    ZubehörAnzahl {
        /// Die betroffene Komponente.
        koordinate: Koordinate,
        /// Die Art der Komponente.
        art: Art,
        /// Die gefundene Anzahl.
        anzahl: usize,
        /// Die erlaubte Anzahl.
        erlaubt: RangeInclusive<usize>,
    },
    /// Eine Rückmelder-Komponente ohne Adresse.
    #[error("Rückmelder bei {koordinate} hat keine Adresse.")]
    FehlenderRückmelder {
        /// Die betroffene Komponente.
        koordinate: Koordinate,
    },
    /// Eine Rückmelder-Adresse an einer Komponente, die keinen Rückmelder hat.
    #[error("{art:?} bei {koordinate} kann keinen Rückmelder haben.")]
    UnerwarteterRückmelder {
        /// Die betroffene Komponente.
        koordinate: Koordinate,
        /// Die Art der Komponente.
        art: Art,
    },
    /// Eine Zubehör-Adresse wird von Komponenten unterschiedlicher Art verwendet.
    #[error("{adresse} wird von {art:?} bei {koordinate} und {andere_art:?} bei {andere_koordinate} verwendet.")]
    Adresskonflikt {
        /// Die mehrfach verwendete Adresse.
        adresse: ZubehörAdresse,
        /// Die zuerst gefundene Komponente.
        koordinate: Koordinate,
        /// Art der zuerst gefundenen Komponente.
        art: Art,
        /// Die konfliktierende Komponente.
        andere_koordinate: Koordinate,
        /// Art der konfliktierenden Komponente.
        andere_art: Art,
    },
    /// Die Beschreibung konnte nicht gelesen werden.
    #[error("Zeile {zeile}: {nachricht}")]
    Syntax {
        /// Die betroffene Zeile, beginnend bei 1.
        zeile: usize,
        /// Beschreibung des Problems.
        nachricht: String,
    },
}

/// Das Gleisbild konnte nicht erstellt werden.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Fehlerhaftes Gleisbild: {}", .0.iter().join(" "))]
pub struct FehlerhaftesGleisbild(pub NonEmpty<Mangel>);

impl From<Mangel> for FehlerhaftesGleisbild {
    fn from(mangel: Mangel) -> Self {
        FehlerhaftesGleisbild(NonEmpty::singleton(mangel))
    }
}

/// Das Gleisbild einer Anlage.
///
/// Nach dem Erstellen sind die Komponenten unveränderlich.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gleisbild {
    /// Alle Komponenten, nach Koordinate.
    komponenten: BTreeMap<Koordinate, Komponente>,
    /// Welche Komponenten verwenden ein Zubehör.
    zubehör: BTreeMap<ZubehörAdresse, Vec<Koordinate>>,
    /// Welche Komponenten zeigen einen Rückmelder an.
    rückmelder: BTreeMap<RückmelderAdresse, Vec<Koordinate>>,
}

impl Gleisbild {
    /// Erstelle ein Gleisbild aus den übergebenen Komponenten.
    ///
    /// ## Errors
    ///
    /// Alle gefundenen [Mängel](Mangel): doppelte Koordinaten, fehlende oder unpassende Adressen.
    pub fn neu(
        komponenten: impl IntoIterator<Item = Komponente>,
    ) -> Result<Gleisbild, FehlerhaftesGleisbild> {
        let mut mängel = Vec::new();
        let mut gleisbild = Gleisbild::default();
        for komponente in komponenten {
            let koordinate = komponente.koordinate;
            let art = komponente.art;
            let erlaubt = art.zubehör_anzahl();
            let anzahl = komponente.zubehör.len();
            if !erlaubt.contains(&anzahl) {
                mängel.push(Mangel::ZubehörAnzahl { koordinate, art, anzahl, erlaubt });
            }
            match (art.benötigt_rückmelder(), komponente.rückmelder) {
                (true, None) => mängel.push(Mangel::FehlenderRückmelder { koordinate }),
                (false, Some(_)) => mängel.push(Mangel::UnerwarteterRückmelder { koordinate, art }),
                (true, Some(_)) | (false, None) => {},
            }
            for adresse in &komponente.zubehör {
                let verwendet = gleisbild.zubehör.entry(*adresse).or_default();
                let konflikt = verwendet.iter().find_map(|andere_koordinate| {
                    gleisbild
                        .komponenten
                        .get(andere_koordinate)
                        .filter(|andere| andere.art != art)
                        .map(|andere| (*andere_koordinate, andere.art))
                });
                if let Some((andere_koordinate, andere_art)) = konflikt {
                    mängel.push(Mangel::Adresskonflikt {
                        adresse: *adresse,
                        koordinate: andere_koordinate,
                        art: andere_art,
                        andere_koordinate: koordinate,
                        andere_art: art,
                    });
                }
                verwendet.push(koordinate);
            }
            if let Some(adresse) = komponente.rückmelder {
                gleisbild.rückmelder.entry(adresse).or_default().push(koordinate);
            }
            match gleisbild.komponenten.entry(koordinate) {
                Entry::Vacant(vacant) => {
                    let _ = vacant.insert(komponente);
                },
                Entry::Occupied(_occupied) => {
                    mängel.push(Mangel::DoppelteKoordinate { koordinate });
                },
            }
        }
        if let Some(mängel) = NonEmpty::from_vec(mängel) {
            Err(FehlerhaftesGleisbild(mängel))
        } else {
            debug!("Gleisbild mit {} Komponenten erstellt.", gleisbild.komponenten.len());
            Ok(gleisbild)
        }
    }

    /// Die Komponente an der gewünschten Position, sofern vorhanden.
    #[must_use]
    pub fn komponente_bei(&self, x: u16, y: u16) -> Option<&Komponente> {
        self.komponente(&Koordinate { x, y })
    }

    /// Die Komponente an der gewünschten [`Koordinate`], sofern vorhanden.
    #[must_use]
    pub fn komponente(&self, koordinate: &Koordinate) -> Option<&Komponente> {
        self.komponenten.get(koordinate)
    }

    /// Das kleinste Rechteck, das alle Komponenten enthält.
    /// Ein leeres Gleisbild hat keine Grenzen.
    #[must_use]
    pub fn grenzen(&self) -> Option<Grenzen> {
        self.komponenten.keys().fold(None, |grenzen, Koordinate { x, y }| {
            Some(match grenzen {
                None => Grenzen { min_x: *x, min_y: *y, max_x: *x, max_y: *y },
                Some(Grenzen { min_x, min_y, max_x, max_y }) => Grenzen {
                    min_x: min_x.min(*x),
                    min_y: min_y.min(*y),
                    max_x: max_x.max(*x),
                    max_y: max_y.max(*y),
                },
            })
        })
    }

    /// Alle Komponenten.
    pub fn komponenten(&self) -> impl Iterator<Item = &Komponente> {
        self.komponenten.values()
    }

    /// Anzahl der Komponenten.
    #[must_use]
    pub fn len(&self) -> usize {
        self.komponenten.len()
    }

    /// Enthält das Gleisbild keine Komponenten?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.komponenten.is_empty()
    }

    /// Alle Komponenten, die das Zubehör verwenden.
    pub fn komponenten_mit_zubehör(
        &self,
        adresse: ZubehörAdresse,
    ) -> impl Iterator<Item = &Komponente> {
        self.zubehör
            .get(&adresse)
            .into_iter()
            .flatten()
            .filter_map(|koordinate| self.komponenten.get(koordinate))
    }

    /// Alle Komponenten, die den Rückmelder anzeigen.
    pub fn komponenten_mit_rückmelder(
        &self,
        adresse: RückmelderAdresse,
    ) -> impl Iterator<Item = &Komponente> {
        self.rückmelder
            .get(&adresse)
            .into_iter()
            .flatten()
            .filter_map(|koordinate| self.komponenten.get(koordinate))
    }

    /// Alle verwendeten Zubehör-Adressen.
    pub fn zubehör_adressen(&self) -> impl Iterator<Item = ZubehörAdresse> + '_ {
        self.zubehör.keys().copied()
    }

    /// Alle verwendeten Rückmelder-Adressen.
    pub fn rückmelder_adressen(&self) -> impl Iterator<Item = RückmelderAdresse> + '_ {
        self.rückmelder.keys().copied()
    }
}
