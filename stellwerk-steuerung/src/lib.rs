//! Automatische Steuerung einer Modelleisenbahn: Fahrstraßen, Fahrpläne und ihre Ausführung.

pub mod abbruch;
pub mod anzeige;
#[path = "ausführung.rs"]
pub mod ausführung;
pub mod einstellungen;
pub mod fahrplan;
#[path = "fahrstraße.rs"]
pub mod fahrstraße;
mod planer;
pub mod speichern;
pub mod sperren;
pub mod stellwerk;
pub mod verteiler;
mod warteliste;
pub mod zentrale;

#[cfg(test)]
mod test_zentrale;

