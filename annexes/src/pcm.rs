//! Lecteur des fichiers de calcul COMAC (`.pcm`, XML)
//!
//! L'encodage est pris dans la déclaration XML (ISO-8859-1 en pratique, les
//! fichiers sont produits par un outil Windows). Les attributs optionnels
//! absents donnent des champs à zéro; seul un XML mal formé écarte le fichier.

use std::path::Path;

use encoding_rs::Encoding;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::types::{PcmSpan, PcmStudy, PcmSupport, TcfLine};
use crate::AnnexeError;

/// Parse un fichier `.pcm` et retourne l'étude typée
///
/// # Errors
///
/// Retourne `AnnexeError::Pcm` si le fichier n'est pas un XML bien formé.
/// L'appelant signale et écarte le fichier, le job continue.
pub fn read(path: &Path) -> Result<PcmStudy, AnnexeError> {
    let bytes = std::fs::read(path)?;
    let text = decode(&bytes);
    parse(&text).map_err(|reason| AnnexeError::pcm(path, reason))
}

/// Décode les octets selon l'encodage de la déclaration XML
///
/// Défaut: ISO-8859-1 (Latin-1), l'encodage historique des fichiers COMAC.
fn decode(bytes: &[u8]) -> String {
    let encoding = declared_encoding(bytes).unwrap_or(encoding_rs::WINDOWS_1252);
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

/// Extrait le label d'encodage de la déclaration `<?xml ... encoding="..."?>`
fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    // La déclaration est ASCII: une lecture lossy du début suffit
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let decl_start = head.find("<?xml")?;
    let decl_end = head[decl_start..].find("?>")? + decl_start;
    let decl = &head[decl_start..decl_end];

    let enc_pos = decl.find("encoding")?;
    let rest = &decl[enc_pos + "encoding".len()..];
    let quote_pos = rest.find(['"', '\''])?;
    let quote = rest.as_bytes()[quote_pos] as char;
    let value_start = quote_pos + 1;
    let value_end = rest[value_start..].find(quote)? + value_start;

    Encoding::for_label(rest[value_start..value_end].trim().as_bytes())
}

fn parse(text: &str) -> Result<PcmStudy, String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut study = PcmStudy::default();
    let mut current_line: Option<TcfLine> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = local_name(&e);
                match name.as_str() {
                    "etude" | "study" => {
                        study.name = attr(&e, &["nom", "name"]).unwrap_or_default();
                    }
                    "support" | "appui" => {
                        study.supports.push(parse_support(&e));
                    }
                    "lignetcf" | "tcf" | "ligne" => {
                        // Une ligne TCF non refermée avant la suivante est
                        // clôturée ici (XML dégradé vu sur le terrain)
                        if let Some(line) = current_line.take() {
                            study.tcf_lines.push(line);
                        }
                        current_line = Some(TcfLine {
                            fo_code: attr(&e, &["cable", "cablefo", "codecable"])
                                .unwrap_or_default(),
                            spans: Vec::new(),
                        });
                    }
                    "portee" | "span" => {
                        let span = PcmSpan {
                            length_m: attr_f64(&e, &["longueur", "lg", "length"]),
                        };
                        if let Some(line) = current_line.as_mut() {
                            line.spans.push(span);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if matches!(name.as_str(), "lignetcf" | "tcf" | "ligne") {
                    if let Some(line) = current_line.take() {
                        study.tcf_lines.push(line);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }

    if let Some(line) = current_line.take() {
        study.tcf_lines.push(line);
    }

    Ok(study)
}

fn parse_support(e: &BytesStart) -> PcmSupport {
    PcmSupport {
        id: attr(e, &["id", "nom", "numero"]).unwrap_or_default(),
        nature: attr(e, &["nature"]).unwrap_or_default(),
        height_m: attr_f64(e, &["hauteur", "ht"]),
        class: attr(e, &["classe", "class"]).unwrap_or_default(),
        traverse_height_m: attr_f64(e, &["hauteurtraverse", "httraverse", "traverse"]),
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase()
}

/// Première valeur d'attribut trouvée parmi les noms candidats
/// (insensible à la casse)
fn attr(e: &BytesStart, names: &[&str]) -> Option<String> {
    for a in e.attributes().flatten() {
        let key = String::from_utf8_lossy(a.key.local_name().as_ref()).to_lowercase();
        if names.contains(&key.as_str()) {
            if let Ok(value) = a.unescape_value() {
                let value = value.trim().to_string();
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Valeur numérique d'attribut, 0.0 si absente ou non parsable
fn attr_f64(e: &BytesStart, names: &[&str]) -> f64 {
    attr(e, names)
        .and_then(|v| v.replace(',', ".").parse().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_encoding_iso_8859_1() {
        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><Etude/>";
        let enc = declared_encoding(xml).unwrap();
        assert_eq!(enc.name(), "windows-1252"); // alias encoding_rs de latin-1
    }

    #[test]
    fn test_declared_encoding_missing() {
        assert!(declared_encoding(b"<Etude/>").is_none());
    }

    #[test]
    fn test_parse_minimal_study() {
        let xml = r#"<?xml version="1.0"?>
            <Etude nom="NGE-1">
              <Supports>
                <Support id="S1" nature="BOIS" hauteur="8.0" classe="B" hauteurTraverse="7.2"/>
                <Support id="S2" nature="METAL"/>
              </Supports>
              <LigneTcf cable="F24">
                <Portee longueur="95.0"/>
                <Portee longueur="42.5"/>
              </LigneTcf>
            </Etude>"#;

        let study = parse(xml).unwrap();
        assert_eq!(study.name, "NGE-1");
        assert_eq!(study.supports.len(), 2);
        assert_eq!(study.supports[0].nature, "BOIS");
        assert_eq!(study.supports[0].height_m, 8.0);
        assert_eq!(study.supports[0].traverse_height_m, 7.2);
        // Attributs absents → champs à zéro
        assert_eq!(study.supports[1].height_m, 0.0);
        assert_eq!(study.supports[1].class, "");

        assert_eq!(study.tcf_lines.len(), 1);
        assert_eq!(study.tcf_lines[0].fo_code, "F24");
        assert_eq!(study.tcf_lines[0].spans.len(), 2);
        assert_eq!(study.tcf_lines[0].spans[0].length_m, 95.0);
    }

    #[test]
    fn test_parse_french_decimal_in_attribute() {
        let xml = r#"<Etude><LigneTcf cable="F12"><Portee longueur="42,5"/></LigneTcf></Etude>"#;
        let study = parse(xml).unwrap();
        assert_eq!(study.tcf_lines[0].spans[0].length_m, 42.5);
    }

    #[test]
    fn test_parse_malformed_is_error() {
        assert!(parse("<Etude><Support></Etude>").is_err());
    }
}
