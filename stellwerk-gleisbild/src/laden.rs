//! Lese ein Gleisbild im Textformat der Central Station 2 (`gleisbild/*.cs2`).
//!
//! ```text
//! [gleisbildseite]
//! element
//!  .id=0x302
//!  .typ=dreiwegweiche
//!  .artikel=20
//! ```

use std::{collections::BTreeMap, fs, io, path::Path};

use log::{debug, warn};
use nonempty::NonEmpty;
use thiserror::Error;

use crate::{
    adresse::{RückmelderAdresse, ZubehörAdresse},
    Art, FehlerhaftesGleisbild, Gleisbild, Komponente, Koordinate, Mangel,
};

/// Fehler beim Laden eines Gleisbilds aus einer Datei.
#[derive(Debug, Error)]
pub enum LadenFehler {
    /// Die Datei konnte nicht gelesen werden.
    #[error("Gleisbild konnte nicht gelesen werden: {0}")]
    IO(#[from] io::Error),
    /// Der Inhalt beschreibt kein gültiges Gleisbild.
    #[error(transparent)]
    Gleisbild(#[from] FehlerhaftesGleisbild),
}

/// Lese ein Gleisbild aus einer Datei.
///
/// ## Errors
///
/// Die Datei kann nicht gelesen werden, oder sie beschreibt kein gültiges Gleisbild.
pub fn lese_datei(pfad: impl AsRef<Path>) -> Result<Gleisbild, LadenFehler> {
    let text = fs::read_to_string(pfad)?;
    Ok(lese(&text)?)
}

/// Ein `element`-Block mit seinen Werten.
#[derive(Debug, Default)]
struct Element {
    /// Zeile des `element`-Schlüsselworts.
    zeile: usize,
    /// Die `.schlüssel=wert`-Paare.
    werte: BTreeMap<String, String>,
}

/// Lese ein Gleisbild aus dem Text einer Gleisbildseite.
///
/// Unbekannte Element-Typen werden mit einer Warnung übersprungen.
/// Weichen ohne Adresse werden als festes Gleis interpretiert.
///
/// ## Errors
///
/// Syntaxfehler, doppelte Koordinaten und fehlende Adressen.
pub fn lese(text: &str) -> Result<Gleisbild, FehlerhaftesGleisbild> {
    let mut elemente = Vec::new();
    let mut mängel = Vec::new();
    let mut aktuell: Option<Element> = None;
    for (index, zeile) in text.lines().enumerate() {
        let nummer = index.saturating_add(1);
        let eingerückt = zeile.trim();
        if eingerückt.is_empty() || eingerückt.starts_with('[') || eingerückt.starts_with("..") {
            continue;
        }
        if let Some(rest) = eingerückt.strip_prefix('.') {
            let Some(element) = aktuell.as_mut() else {
                // Werte anderer Blöcke, z.B. `version`.
                continue;
            };
            if let Some((schlüssel, wert)) = rest.split_once('=') {
                let _ = element.werte.insert(schlüssel.to_owned(), wert.to_owned());
            } else {
                mängel.push(Mangel::Syntax {
                    zeile: nummer,
                    nachricht: format!("Erwartete `.schlüssel=wert`, bekam `{eingerückt}`."),
                });
            }
        } else {
            if let Some(element) = aktuell.take() {
                elemente.push(element);
            }
            if eingerückt == "element" {
                aktuell = Some(Element { zeile: nummer, werte: BTreeMap::new() });
            }
        }
    }
    if let Some(element) = aktuell {
        elemente.push(element);
    }

    let mut komponenten = Vec::new();
    for element in elemente {
        match komponente(&element) {
            Ok(Some(komponente)) => komponenten.push(komponente),
            Ok(None) => {},
            Err(mangel) => mängel.push(mangel),
        }
    }
    if let Some(mängel) = NonEmpty::from_vec(mängel) {
        return Err(FehlerhaftesGleisbild(mängel));
    }
    Gleisbild::neu(komponenten)
}

/// Lese eine Zahl, optional im Hexadezimal-Format mit `0x`-Präfix.
fn zahl(element: &Element, schlüssel: &str) -> Result<Option<u32>, Mangel> {
    let Some(wert) = element.werte.get(schlüssel) else {
        return Ok(None);
    };
    let ergebnis = if let Some(hex) = wert.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        wert.parse()
    };
    ergebnis.map(Some).map_err(|fehler| Mangel::Syntax {
        zeile: element.zeile,
        nachricht: format!("Ungültiger Wert für `.{schlüssel}`: `{wert}` ({fehler})"),
    })
}

/// Die Art eines Elements zu seinem `.typ`, sowie ob ein zweiter Antrieb verwendet wird.
fn art(typ: &str) -> Option<(Art, bool)> {
    let art = match typ {
        "linksweiche" | "rechtsweiche" | "yweiche" | "dkw3_li" | "dkw3_li_2" | "dkw3_re"
        | "dkw3_re_2" | "dkweiche" | "dkweiche_2" | "andreaskreuz" | "hosentraeger"
        | "custom_scissors" => (Art::Weiche, false),
        "dreiwegweiche" => (Art::DreiwegeWeiche, true),
        "signal_hp012" | "signal_hp012s" | "signal_p_hp012" | "signal_f_hp012"
        | "signal_f_hp012s" => (Art::Signal, true),
        "signal" | "signal_sh01" | "signal_hp02" | "signal_f_hp01" | "signal_f_hp02"
        | "std_rot_gruen_0" | "std_rot_gruen_1" | "std_rot" | "k84_einfach" | "sonstige_gbs"
        | "standard" | "entkuppler" | "entkuppler_1" | "lampe" | "lampe_rt" | "lampe_bl"
        | "lampe_gn" | "lampe_ge" | "bahnschranke" => (Art::Signal, false),
        "s88kontakt" | "s88bogen" | "s88doppelbogen" => (Art::Rückmelder, false),
        "gerade" | "bogen" | "doppelbogen" | "tunnel" | "kreuzung" | "unterfuehrung"
        | "prellbock" | "drehscheibe" | "pfeil" | "fahrstrasse" | "custom_perm_left"
        | "custom_perm_right" | "custom_perm_y" | "custom_perm_threeway"
        | "custom_perm_scissors" => (Art::Gleis, false),
        "text" => (Art::Beschriftung, false),
        _ => return None,
    };
    Some(art)
}

/// Erzeuge die [`Komponente`] eines Elements.
/// Unbekannte Elemente werden ignoriert.
fn komponente(element: &Element) -> Result<Option<Komponente>, Mangel> {
    let koordinate = match zahl(element, "id")? {
        Some(id) => Koordinate {
            x: u16::try_from(id & 0xFF).unwrap_or_default(),
            y: u16::try_from((id >> 8_u8) & 0xFF).unwrap_or_default(),
        },
        None => {
            warn!("Element in Zeile {} hat keine Koordinate, verwende (0, 0).", element.zeile);
            Koordinate { x: 0, y: 0 }
        },
    };
    let beschriftung = element.werte.get("text").cloned();
    let typ = match element.werte.get("typ") {
        Some(typ) => typ.as_str(),
        None if beschriftung.is_some() => "text",
        None => "unbekannt",
    };
    let Some((mut art, zweiter_antrieb)) = art(typ) else {
        warn!("Element `{typ}` bei {koordinate} wird nicht unterstützt und ignoriert.");
        return Ok(None);
    };
    let artikel = zahl(element, "artikel")?;
    let zu_u16 = |wert: u32| {
        u16::try_from(wert).map_err(|fehler| Mangel::Syntax {
            zeile: element.zeile,
            nachricht: format!("Adresse {wert} zu groß: {fehler}"),
        })
    };
    // Zubehör wird mit getrennten Adressen für rot und grün gespeichert.
    // Adresse 0 ist gültig, nur ein fehlender Artikel bedeutet keine Adresse.
    let adresse = artikel.map(|roh| roh.div_euclid(2));
    let mut zubehör = Vec::new();
    let mut rückmelder = None;
    match art {
        Art::Weiche | Art::DreiwegeWeiche if adresse.is_none() => {
            debug!("{art:?} bei {koordinate} ohne Adresse wird als festes Gleis behandelt.");
            art = Art::Gleis;
        },
        Art::Weiche | Art::DreiwegeWeiche | Art::Signal => {
            if let Some(adresse) = adresse {
                let adresse = zu_u16(adresse)?;
                zubehör.push(ZubehörAdresse(adresse));
                if zweiter_antrieb {
                    zubehör.push(ZubehörAdresse(adresse.saturating_add(1)));
                }
            }
        },
        Art::Rückmelder => {
            if let Some(artikel) = artikel {
                rückmelder = Some(RückmelderAdresse(zu_u16(artikel)?));
            }
        },
        Art::Gleis | Art::Beschriftung => {},
    }
    let mut drehung = zahl(element, "drehung")?.unwrap_or_default() % 4;
    if typ.contains("_f_") {
        // Formsignale sind im Gleisbild der Zentrale um 90° gedreht.
        drehung = (drehung + 3) % 4;
    }
    Ok(Some(Komponente {
        koordinate,
        art,
        zubehör,
        rückmelder,
        drehung: u8::try_from(drehung).unwrap_or_default(),
        beschriftung,
    }))
}
