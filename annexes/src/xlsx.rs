//! Aide à la lecture des classeurs Excel
//!
//! Les annexes terrain n'ont pas d'en-têtes à position fixe fiable: ce module
//! fournit la découverte dynamique de la ligne d'en-tête (balayage des
//! premières lignes, noms de colonnes canonisés sans accents) et la coercition
//! des cellules (un numéro d'appui peut arriver en entier, en flottant avec un
//! `.0` parasite, ou en texte).

use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use regex::RegexSet;

use crate::AnnexeError;

/// Nombre de lignes balayées pour trouver l'en-tête
pub const HEADER_SCAN_ROWS: usize = 15;

/// Remplace un caractère accentué français par son équivalent ASCII
pub fn strip_accent(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'î' | 'ï' => 'i',
        'ô' | 'ö' => 'o',
        'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        _ => c,
    }
}

/// Canonise un nom de colonne: minuscules, accents retirés, tout caractère
/// non alphanumérique devient un espace, espaces multiples réduits.
///
/// `"N° Appui"` → `"n appui"`, `"Effort  disponible"` → `"effort disponible"`.
pub fn canon_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_space = true;
    for c in raw.to_lowercase().chars().map(strip_accent) {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Associe des noms de colonnes canonisés à des concepts métier
///
/// Chaque concept porte une liste de motifs regex appliqués au nom canonisé.
/// Le premier concept dont un motif matche gagne.
pub struct HeaderMatcher {
    concepts: Vec<(&'static str, RegexSet)>,
}

impl HeaderMatcher {
    /// Construit le matcher depuis des couples (concept, motifs)
    ///
    /// Les motifs sont des constantes du crate: une erreur de compilation
    /// regex est une erreur de programmation, pas une erreur d'entrée.
    pub fn new(concepts: &[(&'static str, &[&str])]) -> Self {
        let concepts = concepts
            .iter()
            .map(|(name, patterns)| {
                let set = RegexSet::new(*patterns).expect("static header pattern must compile");
                (*name, set)
            })
            .collect();
        Self { concepts }
    }

    /// Retourne le concept correspondant à un nom de colonne canonisé
    pub fn concept_of(&self, canon: &str) -> Option<&'static str> {
        self.concepts
            .iter()
            .find(|(_, set)| set.is_match(canon))
            .map(|(name, _)| *name)
    }
}

/// Résultat de la découverte d'en-tête
#[derive(Debug)]
pub struct HeaderLayout {
    /// Index (0-based) de la ligne d'en-tête dans la feuille
    pub row: usize,

    /// Concept → index de colonne
    pub columns: HashMap<&'static str, usize>,
}

impl HeaderLayout {
    /// Index de colonne d'un concept, s'il a été trouvé
    pub fn col(&self, concept: &str) -> Option<usize> {
        self.columns.get(concept).copied()
    }
}

/// Balaye les premières lignes d'une feuille à la recherche de la ligne
/// d'en-tête: la première ligne où tous les concepts `required` sont présents.
///
/// Les lignes précédentes sont des métadonnées et sont ignorées. Les concepts
/// optionnels trouvés sur la même ligne sont inclus dans le résultat.
/// `scan_rows` borne le balayage (15 par défaut; les C7/C3A ont leur en-tête
/// plus bas et passent une borne élargie).
pub fn find_header(
    range: &Range<Data>,
    matcher: &HeaderMatcher,
    required: &[&str],
    scan_rows: usize,
) -> Option<HeaderLayout> {
    for (row_idx, row) in range.rows().take(scan_rows).enumerate() {
        let mut columns: HashMap<&'static str, usize> = HashMap::new();
        for (col_idx, cell) in row.iter().enumerate() {
            let text = cell_text(cell);
            if text.is_empty() {
                continue;
            }
            if let Some(concept) = matcher.concept_of(&canon_header(&text)) {
                // Première colonne du concept: les suivantes sont ignorées
                columns.entry(concept).or_insert(col_idx);
            }
        }
        if required.iter().all(|c| columns.contains_key(*c)) {
            return Some(HeaderLayout { row: row_idx, columns });
        }
    }
    None
}

/// Ouvre un classeur, quel que soit son format OOXML
pub fn open_workbook(path: &Path) -> Result<Sheets<std::io::BufReader<std::fs::File>>, AnnexeError> {
    open_workbook_auto(path).map_err(|e| AnnexeError::workbook(path, e.to_string()))
}

/// Extrait la plage d'une feuille par nom, insensible à la casse et aux
/// espaces de bord
pub fn sheet_range(
    workbook: &mut Sheets<std::io::BufReader<std::fs::File>>,
    path: &Path,
    sheet: &str,
) -> Result<Range<Data>, AnnexeError> {
    let wanted = sheet.trim().to_lowercase();
    let actual = workbook
        .sheet_names()
        .iter()
        .find(|n| n.trim().to_lowercase() == wanted)
        .cloned()
        .ok_or_else(|| AnnexeError::missing_sheet(path, sheet))?;

    workbook
        .worksheet_range(&actual)
        .map_err(|e| AnnexeError::workbook(path, e.to_string()))
}

/// Forme textuelle d'une cellule
///
/// Les flottants à partie décimale nulle perdent leur `.0` (artefact Excel sur
/// les numéros d'appui stockés en nombre).
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => if *b { "X" } else { "" }.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::Error(_) => String::new(),
    }
}

/// Forme textuelle optionnelle: `None` si la cellule est vide
pub fn cell_opt_text(cell: &Data) -> Option<String> {
    let text = cell_text(cell);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Valeur numérique d'une cellule
///
/// Accepte la virgule décimale française dans les cellules texte.
pub fn cell_f64(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Numéro d'appui d'une cellule
///
/// Retourne la forme textuelle si elle contient au moins un chiffre; les
/// cellules vides ou sans chiffre donnent `None` (la ligne est abandonnée en
/// silence, conformément au modèle d'entrée).
pub fn cell_pole_number(cell: &Data) -> Option<String> {
    let text = cell_text(cell);
    if text.chars().any(|c| c.is_ascii_digit()) {
        Some(text)
    } else {
        None
    }
}

/// Cellule "drapeau": `X`, `OUI`, `O`, `VRAI` ou booléen vrai
pub fn cell_flag(cell: &Data) -> bool {
    match cell {
        Data::Bool(b) => *b,
        _ => matches!(
            cell_text(cell).to_uppercase().as_str(),
            "X" | "OUI" | "O" | "VRAI" | "TRUE" | "1"
        ),
    }
}

/// Cellule d'une ligne, `Data::Empty` si hors plage
pub fn cell_at<'a>(row: &'a [Data], col: usize) -> &'a Data {
    row.get(col).unwrap_or(&Data::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canon_header() {
        assert_eq!(canon_header("N° Appui"), "n appui");
        assert_eq!(canon_header("Effort  disponible"), "effort disponible");
        assert_eq!(canon_header("  Câbles   "), "cables");
        assert_eq!(canon_header("PT_AD_NUMSU"), "pt ad numsu");
        assert_eq!(canon_header("Portée (m)"), "portee m");
        assert_eq!(canon_header(""), "");
    }

    #[test]
    fn test_cell_text_float_artifact() {
        assert_eq!(cell_text(&Data::Float(372300.0)), "372300");
        assert_eq!(cell_text(&Data::Float(12.5)), "12.5");
        assert_eq!(cell_text(&Data::Int(372300)), "372300");
        assert_eq!(cell_text(&Data::String("  372300  ".into())), "372300");
    }

    #[test]
    fn test_cell_pole_number() {
        assert_eq!(cell_pole_number(&Data::Float(372300.0)), Some("372300".into()));
        assert_eq!(cell_pole_number(&Data::String("E372300".into())), Some("E372300".into()));
        assert_eq!(cell_pole_number(&Data::String("sans objet".into())), None);
        assert_eq!(cell_pole_number(&Data::Empty), None);
    }

    #[test]
    fn test_cell_f64_french_decimal() {
        assert_eq!(cell_f64(&Data::String("42,5".into())), Some(42.5));
        assert_eq!(cell_f64(&Data::Float(4.2)), Some(4.2));
        assert_eq!(cell_f64(&Data::String("abc".into())), None);
    }

    #[test]
    fn test_cell_flag() {
        assert!(cell_flag(&Data::String("X".into())));
        assert!(cell_flag(&Data::String("oui".into())));
        assert!(cell_flag(&Data::Bool(true)));
        assert!(!cell_flag(&Data::String("non".into())));
        assert!(!cell_flag(&Data::Empty));
    }

    #[test]
    fn test_header_matcher() {
        let matcher = HeaderMatcher::new(&[
            ("pole", &[r"^n\s?appui$", r"^num\s?appui$", r"^pt ad numsu$"]),
            ("cables", &[r"cable"]),
        ]);
        assert_eq!(matcher.concept_of("n appui"), Some("pole"));
        assert_eq!(matcher.concept_of("pt ad numsu"), Some("pole"));
        assert_eq!(matcher.concept_of("cables poses"), Some("cables"));
        assert_eq!(matcher.concept_of("commentaire"), None);
    }
}
