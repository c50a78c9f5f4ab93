//! Lecteur d'annexes C6 (déclarations d'appuis du bureau d'études)
//!
//! Une ligne C6 porte un numéro d'appui, le texte libre des étiquettes câbles
//! (ex: `L192.11-26P | L193.12-6P`), un boîtier à poser (PB/PEO) et la colonne
//! "effort disponible" dont la vacuité marque un appui EDF, exclu du
//! rapprochement.

use std::path::Path;

use calamine::Reader;
use tracing::debug;

use crate::types::{C6Row, PoseBox};
use crate::xlsx::{
    cell_at, cell_opt_text, cell_pole_number, cell_text, find_header, HeaderMatcher,
    HEADER_SCAN_ROWS,
};
use crate::AnnexeError;

/// Concept: numéro d'appui
const POLE_PATTERNS: &[&str] = &[
    r"^n appui",
    r"^num appui",
    r"^numero appui",
    r"^pt ad numsu$",
    r"^appui$",
];

/// Concept: étiquettes câbles
const CABLE_PATTERNS: &[&str] = &[r"cable", r"etiquette"];

/// Concept: effort disponible (vide → appui EDF)
const EFFORT_PATTERNS: &[&str] = &[r"^effort"];

/// Concept: boîtier à poser
const BOX_PATTERNS: &[&str] = &[r"boitier", r"^pose"];

/// Concept: nom d'étude
const STUDY_PATTERNS: &[&str] = &[r"^nom etude", r"^etude", r"^nom$", r"^zone$"];

fn matcher() -> HeaderMatcher {
    HeaderMatcher::new(&[
        ("pole", POLE_PATTERNS),
        ("cables", CABLE_PATTERNS),
        ("effort", EFFORT_PATTERNS),
        ("box", BOX_PATTERNS),
        ("study", STUDY_PATTERNS),
    ])
}

/// Lit une annexe C6 et retourne ses lignes typées
///
/// La feuille cible est la première dont l'en-tête contient à la fois le
/// concept "numéro d'appui" et le concept "étiquettes câbles". Les lignes
/// sans numéro d'appui exploitable sont abandonnées en silence; le nom
/// d'étude est reporté depuis la dernière valeur non vide de la feuille.
///
/// # Errors
///
/// Retourne `AnnexeError` si le classeur est illisible ou si aucune feuille
/// ne porte l'en-tête attendu. L'appelant journalise et passe au fichier
/// suivant: une C6 invalide n'interrompt jamais le job.
pub fn read(path: &Path) -> Result<Vec<C6Row>, AnnexeError> {
    let mut workbook = crate::xlsx::open_workbook(path)?;
    let matcher = matcher();

    let sheet_names = workbook.sheet_names().to_vec();
    for name in &sheet_names {
        let range = match calamine::Reader::worksheet_range(&mut workbook, name) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if let Some(layout) = find_header(&range, &matcher, &["pole", "cables"], HEADER_SCAN_ROWS) {
            return Ok(read_rows(&range, &layout));
        }
    }

    Err(AnnexeError::HeaderNotFound {
        file: path.display().to_string(),
        scanned: HEADER_SCAN_ROWS,
    })
}

fn read_rows(range: &calamine::Range<calamine::Data>, layout: &crate::xlsx::HeaderLayout) -> Vec<C6Row> {
    let pole_col = layout.col("pole").unwrap_or(0);
    let cables_col = layout.col("cables");
    let effort_col = layout.col("effort");
    let box_col = layout.col("box");
    let study_col = layout.col("study");

    let mut rows = Vec::new();
    let mut last_study: Option<String> = None;

    for (idx, row) in range.rows().enumerate().skip(layout.row + 1) {
        // Report du nom d'étude depuis la dernière ligne qui en portait un
        if let Some(col) = study_col {
            if let Some(study) = cell_opt_text(cell_at(row, col)) {
                last_study = Some(study.trim().to_uppercase());
            }
        }

        let Some(pole) = cell_pole_number(cell_at(row, pole_col)) else {
            continue;
        };

        let cables = cables_col.and_then(|c| cell_opt_text(cell_at(row, c)));
        let pose_box = box_col
            .and_then(|c| cell_opt_text(cell_at(row, c)))
            .and_then(|s| s.parse::<PoseBox>().ok());

        // Effort disponible vide → appui d'un autre exploitant (EDF)
        let is_edf = match effort_col {
            Some(c) => cell_text(cell_at(row, c)).is_empty(),
            None => false,
        };

        if is_edf {
            debug!(pole = pole.as_str(), line = idx + 1, "C6 row flagged EDF");
        }

        rows.push(C6Row {
            line: (idx + 1) as u32,
            study: last_study.clone(),
            pole,
            cables,
            pose_box,
            is_edf,
        });
    }

    rows
}
