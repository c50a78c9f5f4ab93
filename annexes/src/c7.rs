//! Lecteur d'annexes C7 (commandes de remplacement d'appuis)

use std::path::Path;

use crate::types::C7Row;
use crate::xlsx::{cell_at, cell_opt_text, cell_pole_number, find_header, HeaderMatcher};
use crate::AnnexeError;

/// Feuille cible d'une annexe C7
const SHEET: &str = "Commande";

/// L'en-tête C7 est en ligne 17: le balayage standard (15 lignes) est élargi
const SCAN_ROWS: usize = 20;

const POLE_PATTERNS: &[&str] = &[
    r"^n appui",
    r"^num appui",
    r"^numero appui",
    r"^appui$",
];

const WORK_PATTERNS: &[&str] = &[r"travaux", r"^type travaux"];

const STUDY_PATTERNS: &[&str] = &[r"^nom etude", r"^etude", r"^zone$"];

/// Lit une annexe C7 et retourne ses lignes typées
///
/// # Errors
///
/// Retourne `AnnexeError` si le classeur est illisible, si la feuille
/// `Commande` est absente ou si l'en-tête est introuvable.
pub fn read(path: &Path) -> Result<Vec<C7Row>, AnnexeError> {
    let mut workbook = crate::xlsx::open_workbook(path)?;
    let range = crate::xlsx::sheet_range(&mut workbook, path, SHEET)?;

    let matcher = HeaderMatcher::new(&[
        ("pole", POLE_PATTERNS),
        ("work", WORK_PATTERNS),
        ("study", STUDY_PATTERNS),
    ]);

    let layout = find_header(&range, &matcher, &["pole"], SCAN_ROWS).ok_or_else(|| {
        AnnexeError::HeaderNotFound {
            file: path.display().to_string(),
            scanned: SCAN_ROWS,
        }
    })?;

    let pole_col = layout.col("pole").unwrap_or(0);
    let work_col = layout.col("work");
    let study_col = layout.col("study");

    let mut rows = Vec::new();
    let mut last_study: Option<String> = None;

    for (idx, row) in range.rows().enumerate().skip(layout.row + 1) {
        if let Some(col) = study_col {
            if let Some(study) = cell_opt_text(cell_at(row, col)) {
                last_study = Some(study.trim().to_uppercase());
            }
        }

        let Some(pole) = cell_pole_number(cell_at(row, pole_col)) else {
            continue;
        };

        rows.push(C7Row {
            line: (idx + 1) as u32,
            study: last_study.clone(),
            pole,
            work_type: work_col.and_then(|c| cell_opt_text(cell_at(row, c))),
        });
    }

    Ok(rows)
}
