//! Schnittstelle zur Zentrale, die Befehle an die Anlage weitergibt.

use std::{
    fmt::{self, Display, Formatter},
    sync::mpsc::Sender,
};

use serde::{Deserialize, Serialize};
use stellwerk_gleisbild::adresse::{Stellung, ZubehörAdresse};

/// Ein Befehl zum Stellen eines einzelnen Antriebs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schaltbefehl {
    /// Der zu stellende Antrieb.
    pub adresse: ZubehörAdresse,
    /// Die gewünschte Stellung.
    pub stellung: Stellung,
}

impl Display for Schaltbefehl {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}", self.adresse, self.stellung)
    }
}

/// Bestätigung für einen [`Schaltbefehl`].
///
/// Wird die Quittung ohne [`bestätige`](Quittung::bestätige) gedroppt,
/// gilt der Befehl sofort als nicht quittiert.
#[derive(Debug)]
pub struct Quittung {
    /// Benachrichtigt den wartenden [Befehl](crate::verteiler::AusstehenderBefehl).
    sender: Sender<()>,
}

impl Quittung {
    /// Erzeuge eine neue Quittung.
    pub(crate) fn neu(sender: Sender<()>) -> Self {
        Quittung { sender }
    }

    /// Der Befehl wurde von der Anlage ausgeführt.
    pub fn bestätige(self) {
        // Der Empfänger existiert nicht mehr, wenn das Zeitlimit bereits abgelaufen ist.
        let _ = self.sender.send(());
    }
}

/// Die Zentrale, über die Befehle an die Anlage gesendet werden.
///
/// Rückmeldungen und Verbindungsabbrüche meldet die Zentrale asynchron über
/// [`Stellwerk::rückmeldung`](crate::stellwerk::Stellwerk::rückmeldung) und
/// [`Stellwerk::verbindung_getrennt`](crate::stellwerk::Stellwerk::verbindung_getrennt).
pub trait Zentrale: Send + Sync {
    /// Sende einen Schaltbefehl. Sobald der Befehl ausgeführt wurde muss die Quittung
    /// [bestätigt](Quittung::bestätige) werden.
    ///
    /// Die Methode darf nicht auf die Ausführung warten.
    fn sende_schaltbefehl(&self, befehl: Schaltbefehl, quittung: Quittung);

    /// Unterbreche sofort die Stromversorgung der Anlage.
    fn nothalt(&self);
}
