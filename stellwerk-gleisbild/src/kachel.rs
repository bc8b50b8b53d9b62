//! Zuordnung von Komponenten zu Kacheln einer Anzeige.
//!
//! Die Zuordnung wird ausschließlich von der Anzeige befüllt und gelesen.

use std::collections::HashMap;

use crate::Koordinate;

/// Nachschlage-Tabelle von [`Koordinaten`](Koordinate) zu Kacheln vom Typ `K`.
///
/// Die Tabelle besitzt keine Komponenten, sie verweist nur über deren Koordinate darauf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kachelzuordnung<K> {
    /// Die zugeordneten Kacheln.
    kacheln: HashMap<Koordinate, K>,
}

impl<K> Default for Kachelzuordnung<K> {
    fn default() -> Self {
        Kachelzuordnung { kacheln: HashMap::new() }
    }
}

impl<K> Kachelzuordnung<K> {
    /// Erzeuge eine leere Zuordnung.
    #[must_use]
    pub fn neu() -> Self {
        Kachelzuordnung::default()
    }

    /// Ordne einer Koordinate eine Kachel zu. Gibt eine vorher zugeordnete Kachel zurück.
    pub fn verknüpfe(&mut self, koordinate: Koordinate, kachel: K) -> Option<K> {
        self.kacheln.insert(koordinate, kachel)
    }

    /// Die Kachel einer Koordinate.
    #[must_use]
    pub fn kachel(&self, koordinate: &Koordinate) -> Option<&K> {
        self.kacheln.get(koordinate)
    }

    /// Entferne die Zuordnung einer Koordinate.
    pub fn entferne(&mut self, koordinate: &Koordinate) -> Option<K> {
        self.kacheln.remove(koordinate)
    }

    /// Entferne alle Zuordnungen, z.B. nach dem Laden eines neuen Gleisbilds.
    pub fn leeren(&mut self) {
        self.kacheln.clear();
    }
}
