//! Automatische Steuerung einer Modelleisenbahn über eine Zentrale.

fn main() -> Result<(), stellwerk::Fehler> {
    stellwerk::ausführen_aus_env()
}
