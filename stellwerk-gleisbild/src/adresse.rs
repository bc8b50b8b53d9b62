//! Adressen von Zubehör-Artikeln und Rückmeldern an der Zentrale.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Adresse eines Zubehör-Artikels (Weiche, Signal) an der Zentrale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZubehörAdresse(pub u16);

impl Display for ZubehörAdresse {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "Zubehör {}", self.0)
    }
}

/// Adresse eines Rückmelders (z.B. S88-Kontakt) an der Zentrale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RückmelderAdresse(pub u16);

impl Display for RückmelderAdresse {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "Rückmelder {}", self.0)
    }
}

/// Stellung eines einzelnen Zubehör-Antriebs.
///
/// Bei Signalen entspricht [`Stellung::Abzweig`] rot, [`Stellung::Gerade`] grün.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stellung {
    /// Gerade, bzw. grün.
    #[default]
    Gerade,
    /// Abzweig, bzw. rot.
    Abzweig,
}

impl Display for Stellung {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Stellung::Gerade => "gerade",
            Stellung::Abzweig => "abzweig",
        })
    }
}

/// Belegung eines Rückmelders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Belegung {
    /// Kein Zug erkannt.
    #[default]
    Frei,
    /// Ein Zug befindet sich auf dem überwachten Abschnitt.
    Belegt,
}

impl Display for Belegung {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Belegung::Frei => "frei",
            Belegung::Belegt => "belegt",
        })
    }
}
