//! Speichern und Laden von Fahrstraßen und Fahrplänen.

use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{fahrplan::Fahrplan, fahrstraße::Fahrstraße};

/// Alle gespeicherten Definitionen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speicherstand {
    /// Alle Fahrstraßen.
    pub fahrstraßen: Vec<Fahrstraße>,
    /// Alle Fahrpläne.
    pub fahrpläne: Vec<Fahrplan>,
}

/// Fehler beim Speichern oder Laden.
#[derive(Debug, Error)]
pub enum Fehler {
    /// Fehler beim Zugriff auf die Datei.
    #[error("Fehler beim Dateizugriff: {0}")]
    IO(#[from] io::Error),
    /// Fehler beim Serialisieren.
    #[error("Fehler beim Serialisieren: {0}")]
    BincodeSerialisieren(bincode::Error),
    /// Fehler beim Deserialisieren.
    #[error("Fehler beim Deserialisieren: {0}")]
    BincodeDeserialisieren(bincode::Error),
}

impl Speicherstand {
    /// Speichere alle Fahrstraßen und Fahrpläne in einer Datei.
    ///
    /// ## Errors
    ///
    /// Die Datei konnte nicht erstellt oder geschrieben werden.
    pub fn speichern(&self, pfad: impl AsRef<Path>) -> Result<(), Fehler> {
        let file = fs::File::create(pfad)?;
        bincode::serialize_into(file, self).map_err(Fehler::BincodeSerialisieren)
    }

    /// Lade Fahrstraßen und Fahrpläne aus einer Datei.
    ///
    /// ## Errors
    ///
    /// Die Datei konnte nicht gelesen werden, oder hat ein unbekanntes Format.
    pub fn laden(pfad: impl AsRef<Path>) -> Result<Speicherstand, Fehler> {
        let mut file = fs::File::open(pfad)?;
        let mut content = Vec::new();
        let _ = file.read_to_end(&mut content)?;
        bincode::deserialize(content.as_slice()).map_err(Fehler::BincodeDeserialisieren)
    }
}
