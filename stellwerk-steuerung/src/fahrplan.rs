//! Fahrpläne: eine Abfolge von Fahrstraßen mit Wartezeiten.

use std::{
    fmt::{self, Display, Formatter},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use stellwerk_gleisbild::{
    adresse::{Belegung, RückmelderAdresse},
    zustand::Zustände,
};

use crate::{fahrstraße, stellwerk};

/// Eindeutiger Name eines [`Fahrplans`](Fahrplan).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name(pub String);

impl Display for Name {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Bedingte Ausführung eines [`Eintrags`](Eintrag).
///
/// Hat der Rückmelder nicht die geforderte Belegung, wird beim Eintrag `sonst` fortgesetzt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Verzweigung {
    /// Der geprüfte Rückmelder.
    pub rückmelder: RückmelderAdresse,
    /// Die geforderte Belegung.
    pub belegung: Belegung,
    /// Index des nächsten Eintrags, falls die Bedingung nicht erfüllt ist.
    pub sonst: usize,
}

impl Verzweigung {
    /// Ist die Bedingung aktuell erfüllt?
    #[must_use]
    pub fn erfüllt(&self, zustände: &Zustände) -> bool {
        zustände.belegung(self.rückmelder) == self.belegung
    }
}

/// Ein Eintrag eines [`Fahrplans`](Fahrplan).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eintrag {
    /// Die auszuführende Fahrstraße.
    pub fahrstraße: fahrstraße::Name,
    /// Wartezeit vor der Ausführung.
    pub verzögerung: Duration,
    /// Optionale Bedingung für die Ausführung.
    pub verzweigung: Option<Verzweigung>,
}

impl Eintrag {
    /// Ein unbedingter Eintrag.
    #[must_use]
    pub fn neu(fahrstraße: fahrstraße::Name, verzögerung: Duration) -> Self {
        Eintrag { fahrstraße, verzögerung, verzweigung: None }
    }
}

/// Ein Fahrplan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fahrplan {
    /// Der eindeutige Name.
    pub name: Name,
    /// Die Einträge, in Ausführungs-Reihenfolge.
    pub einträge: Vec<Eintrag>,
}

impl Fahrplan {
    /// Ein neuer Fahrplan ohne Einträge.
    #[must_use]
    pub fn neu(name: Name) -> Self {
        Fahrplan { name, einträge: Vec::new() }
    }

    /// Füge einen Eintrag an Position `index` ein, bzw. am Ende falls `index` zu groß ist.
    pub fn füge_ein(&mut self, index: usize, eintrag: Eintrag) {
        let index = index.min(self.einträge.len());
        self.einträge.insert(index, eintrag);
    }

    /// Entferne den Eintrag an Position `index`.
    pub fn entferne(&mut self, index: usize) -> Option<Eintrag> {
        (index < self.einträge.len()).then(|| self.einträge.remove(index))
    }

    /// Verschiebe den Eintrag von Position `von` nach `nach`.
    /// Gibt zurück, ob beide Positionen existieren.
    pub fn verschiebe(&mut self, von: usize, nach: usize) -> bool {
        let länge = self.einträge.len();
        if von >= länge || nach >= länge {
            return false;
        }
        let eintrag = self.einträge.remove(von);
        self.einträge.insert(nach, eintrag);
        true
    }

    /// Setze die Wartezeit des Eintrags an Position `index`.
    /// Gibt zurück, ob der Eintrag existiert.
    pub fn setze_verzögerung(&mut self, index: usize, verzögerung: Duration) -> bool {
        if let Some(eintrag) = self.einträge.get_mut(index) {
            eintrag.verzögerung = verzögerung;
            true
        } else {
            false
        }
    }

    /// Ersetze alle Verweise auf die Fahrstraße `alt` durch `neu`.
    /// Gibt zurück, ob ein Verweis ersetzt wurde.
    pub fn benenne_verweise_um(&mut self, alt: &fahrstraße::Name, neu: &fahrstraße::Name) -> bool {
        let mut ersetzt = false;
        for eintrag in &mut self.einträge {
            if eintrag.fahrstraße == *alt {
                eintrag.fahrstraße = neu.clone();
                ersetzt = true;
            }
        }
        ersetzt
    }
}

/// Status eines Fahrplans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// Der Fahrplan wird nicht ausgeführt.
    #[default]
    Bereit,
    /// Der Fahrplan wird ausgeführt.
    Läuft,
    /// Die Ausführung ist unterbrochen und kann fortgesetzt werden.
    Pausiert,
}

/// Fortschritt bei der Ausführung eines Fahrplans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fortschritt {
    /// Der aktuelle Status.
    pub status: Status,
    /// Index des aktuellen bzw. nächsten Eintrags.
    pub cursor: usize,
    /// Der Fehler, durch den der Fahrplan zuletzt pausiert wurde.
    pub letzter_fehler: Option<stellwerk::Fehler>,
}
