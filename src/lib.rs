//! Automatische Steuerung einer Modelleisenbahn über eine Zentrale.

use std::{sync::Arc, thread, time::Duration};

use flexi_logger::{Duplicate, FileSpec, FlexiLoggerError, LogSpecBuilder, Logger, LoggerHandle};
use log::{error, info, LevelFilter};
use thiserror::Error;

use stellwerk_argumente::Argumente;
use stellwerk_gleisbild::{laden, Gleisbild};
use stellwerk_steuerung::{
    anzeige::LogAnzeige,
    einstellungen::Einstellungen,
    fahrplan::{self, Status},
    speichern::{self, Speicherstand},
    stellwerk::{self, Stellwerk},
};

pub use self::simulation::Simulation;

pub mod simulation;

/// Bei der [Ausführung](ausführen) potentiell auftretende Fehler.
#[derive(Debug, Error)]
pub enum Fehler {
    /// Ein Fehler beim starten des Loggers.
    #[error(transparent)]
    FlexiLogger(#[from] FlexiLoggerError),
    /// Ein Fehler beim Laden des Gleisbilds.
    #[error(transparent)]
    Gleisbild(#[from] laden::LadenFehler),
    /// Ein Fehler beim Laden der Fahrstraßen und Fahrpläne.
    #[error(transparent)]
    Speichern(#[from] speichern::Fehler),
    /// Ein Fehler beim Starten des Fahrplans.
    #[error(transparent)]
    Stellwerk(#[from] stellwerk::Fehler),
    /// Der Fahrplan wurde durch einen Fehler unterbrochen.
    #[error("Fahrplan {fahrplan} unterbrochen bei Eintrag {cursor}.")]
    FahrplanUnterbrochen {
        /// Der unterbrochene Fahrplan.
        fahrplan: fahrplan::Name,
        /// Der Eintrag, bei dem der Fahrplan pausiert wurde.
        cursor: usize,
    },
}

/// Wie oft der Fortschritt eines Fahrplans geprüft wird.
const ABFRAGE_INTERVALL: Duration = Duration::from_millis(100);

/// Parse die Kommandozeilen-Argumente und führe die Anwendung aus.
///
/// ## Errors
///
/// Siehe [`ausführen`].
#[inline(always)]
pub fn ausführen_aus_env() -> Result<(), Fehler> {
    let args = Argumente::parse_aus_env();
    ausführen(args)
}

/// Starte den Logger. Log-Nachrichten außerhalb dieser crate werden nur als Fehler angezeigt.
fn start_logger(verbose: bool, log_datei: bool) -> Result<LoggerHandle, FlexiLoggerError> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    let mut log_spec_builder = LogSpecBuilder::new();
    let _ = log_spec_builder.default(LevelFilter::Error).module("stellwerk", log_level);
    let log_spec = log_spec_builder.finalize();
    let logger_base = Logger::with(log_spec);
    let logger = if log_datei {
        logger_base
            .log_to_file(FileSpec::default().directory("log"))
            .duplicate_to_stderr(Duplicate::All)
    } else {
        logger_base.log_to_stderr()
    };
    logger.start()
}

/// Führe die Anwendung mit den übergebenen Kommandozeilen-Argumenten aus.
///
/// Ist ein Fahrplan angegeben, wird er gegen eine [`Simulation`] ausgeführt,
/// bis er beendet ist oder durch einen Fehler pausiert wird.
///
/// ## Errors
///
/// Der Logger konnte nicht gestartet werden, das Laden einer Datei ist fehlgeschlagen,
/// oder der Fahrplan existiert nicht bzw. wurde unterbrochen.
pub fn ausführen(argumente: Argumente) -> Result<(), Fehler> {
    let Argumente {
        gleisbild, fahrstraßen, fahrplan, quittung, rückmeldung, verbose, log_datei
    } = argumente;
    let logger_handle = start_logger(verbose, log_datei)?;

    let gleisbild = match gleisbild {
        Some(pfad) => laden::lese_datei(pfad)?,
        None => Gleisbild::default(),
    };
    info!("Gleisbild mit {} Komponenten geladen.", gleisbild.len());
    let einstellungen = Einstellungen {
        quittung_zeitlimit: quittung.dauer(),
        rückmeldung_zeitlimit: rückmeldung.dauer(),
        ..Einstellungen::default()
    };
    let stellwerk = Stellwerk::neu(
        Arc::new(gleisbild),
        Arc::new(Simulation::default()),
        Arc::new(LogAnzeige),
        einstellungen,
    );
    if let Some(pfad) = fahrstraßen {
        stellwerk.lade(Speicherstand::laden(pfad)?);
    }
    info!(
        "{} Fahrstraßen und {} Fahrpläne bekannt.",
        stellwerk.fahrstraßen().len(),
        stellwerk.fahrpläne().len()
    );

    if let Some(name) = fahrplan {
        führe_fahrplan_aus(&stellwerk, fahrplan::Name(name))?;
    }

    // explizit drop aufrufen, damit logger_handle auf jeden Fall lang genau in scope bleibt.
    drop(logger_handle);

    Ok(())
}

/// Starte einen Fahrplan und warte, bis er beendet oder unterbrochen wird.
fn führe_fahrplan_aus(stellwerk: &Stellwerk, name: fahrplan::Name) -> Result<(), Fehler> {
    stellwerk.starte_fahrplan(&name)?;
    loop {
        thread::sleep(ABFRAGE_INTERVALL);
        let Some(fortschritt) = stellwerk.fortschritt(&name) else {
            return Err(stellwerk::Fehler::UnbekannterFahrplan(name).into());
        };
        match fortschritt.status {
            Status::Läuft => {},
            Status::Bereit => {
                info!("Fahrplan {name} beendet.");
                return Ok(());
            },
            Status::Pausiert => {
                if let Some(fehler) = &fortschritt.letzter_fehler {
                    error!("{fehler}");
                }
                stellwerk.halte_fahrplan_an(&name)?;
                return Err(Fehler::FahrplanUnterbrochen {
                    fahrplan: name,
                    cursor: fortschritt.cursor,
                });
            },
        }
    }
}
