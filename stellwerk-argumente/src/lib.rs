//! Kommandozeilen-Argumente.

// Zu viele/große dependencies, um das wirklich zu vermeiden.
#![allow(clippy::multiple_crate_versions)]
// Durch das derive-Macro für Parse ausgelöst.
#![allow(clippy::shadow_unrelated)]

use std::{
    env,
    fmt::{self, Display, Formatter},
    num::NonZeroI32,
    time::Duration,
};

use kommandozeilen_argumente::{Beschreibung, Parse, ParseArgument, Vergleich};

#[derive(Debug, Clone, Parse)]
/// Automatische Steuerung einer Modelleisenbahn über eine Zentrale.
#[kommandozeilen_argumente(sprache: deutsch, version, hilfe(lang: [hilfe, help], kurz: h))]
pub struct Argumente {
    /// Lade das Gleisbild aus der angegebenen Datei.
    #[kommandozeilen_argumente(kurz, meta_var: DATEI)]
    pub gleisbild: Option<String>,

    /// Lade Fahrstraßen und Fahrpläne aus der angegebenen Datei.
    #[kommandozeilen_argumente(kurz, meta_var: DATEI)]
    pub fahrstraßen: Option<String>,

    /// Starte bei Programmstart den angegebenen Fahrplan.
    #[kommandozeilen_argumente(meta_var: NAME)]
    pub fahrplan: Option<String>,

    /// Zeitlimit für die Quittung eines Schaltbefehls.
    #[kommandozeilen_argumente(standard: Sekunden(2.), meta_var: SEKUNDEN)]
    pub quittung: Sekunden,

    /// Standard-Zeitlimit beim Warten auf einen Rückmelder.
    #[kommandozeilen_argumente(standard: Sekunden(60.), meta_var: SEKUNDEN)]
    pub rückmeldung: Sekunden,

    /// Zeige zusätzliche Informationen in der Konsole an.
    pub verbose: bool,

    /// Speichere Log-Nachrichten zusätzlich in einer Datei.
    #[kommandozeilen_argumente(kurz: l, invertiere_präfix: keine)]
    pub log_datei: bool,
}

impl Argumente {
    /// Parse Kommandozeilen-Argumente.
    ///
    /// ## Panics
    ///
    /// Programmierfehler, wenn [`NonZeroI32::new`] [`None`] für den Exit-Code zurückgibt.
    #[must_use]
    pub fn parse_aus_env() -> Self {
        let args = env::args_os().skip(1);
        Argumente::parse_mit_fehlermeldung(args, NonZeroI32::new(1).expect("1 != 0"))
    }
}

/// Eine Zeitspanne in Sekunden.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Sekunden(pub f32);

impl Sekunden {
    /// Die Zeitspanne als [`Duration`]. Negative oder ungültige Werte werden als 0 interpretiert.
    #[must_use]
    pub fn dauer(self) -> Duration {
        Duration::try_from_secs_f32(self.0).unwrap_or_default()
    }
}

impl Display for Sekunden {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl ParseArgument for Sekunden {
    fn argumente<'t>(
        beschreibung: Beschreibung<'t, Self>,
        invertiere_präfix: impl Into<Vergleich<'t>>,
        invertiere_infix: impl Into<Vergleich<'t>>,
        wert_infix: impl Into<Vergleich<'t>>,
        meta_var: &'t str,
    ) -> kommandozeilen_argumente::Argumente<'t, Self, String> {
        kommandozeilen_argumente::Argumente::konvertiere(
            Sekunden,
            f32::argumente(
                beschreibung.konvertiere(|sekunden| sekunden.0),
                invertiere_präfix,
                invertiere_infix,
                wert_infix,
                meta_var,
            ),
        )
    }

    fn standard() -> Option<Self> {
        None
    }
}
