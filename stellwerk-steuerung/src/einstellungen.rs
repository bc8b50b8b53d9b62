//! Einstellungen für die Ausführung von Fahrstraßen und Fahrplänen.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Zeitlimits, Wiederholungen und Pausen bei der Ausführung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Einstellungen {
    /// Wie lange auf die Quittung eines Schaltbefehls gewartet wird.
    pub quittung_zeitlimit: Duration,
    /// Wie oft ein Schaltbefehl ohne Quittung wiederholt wird.
    pub max_wiederholungen: u8,
    /// Zeitlimit beim Warten auf einen Rückmelder, falls der Schritt keines festlegt.
    pub rückmeldung_zeitlimit: Duration,
    /// Pause nach jedem Schaltbefehl einer Fahrstraße.
    pub schalt_pause: Duration,
    /// Pause zwischen den beiden Antrieben einer Dreiwege-Weiche.
    pub dreiwege_verzögerung: Duration,
    /// Wartezeit eines Fahrplans, bevor eine verweigerte Sperre erneut angefordert wird.
    pub sperre_wiederholung: Duration,
    /// Intervall, in dem wartende Ausführungen auf einen Abbruch prüfen.
    pub abfrage_intervall: Duration,
}

impl Default for Einstellungen {
    fn default() -> Self {
        Einstellungen {
            quittung_zeitlimit: Duration::from_secs(2),
            max_wiederholungen: 2,
            rückmeldung_zeitlimit: Duration::from_secs(60),
            schalt_pause: Duration::from_millis(150),
            dreiwege_verzögerung: Duration::from_millis(350),
            sperre_wiederholung: Duration::from_millis(500),
            abfrage_intervall: Duration::from_millis(10),
        }
    }
}
