//! Lecteur des relevés COMAC au format Excel
//!
//! La colonne A porte les numéros d'appuis; les autres colonnes d'intérêt
//! (portée, conducteur, code câble FO, hauteur câble/sol) sont localisées par
//! découverte d'en-tête.

use std::path::Path;

use calamine::Reader;

use crate::types::ComacRow;
use crate::xlsx::{
    cell_at, cell_f64, cell_opt_text, cell_pole_number, find_header, HeaderMatcher,
    HEADER_SCAN_ROWS,
};
use crate::AnnexeError;

const SPAN_PATTERNS: &[&str] = &[r"^portee"];
const CONDUCTOR_PATTERNS: &[&str] = &[r"^conducteur"];
const FO_PATTERNS: &[&str] = &[r"cable fo", r"^code cable", r"^fo$"];
const HEIGHT_PATTERNS: &[&str] = &[r"^hauteur"];

/// Lit un relevé COMAC Excel et retourne ses lignes typées
///
/// # Errors
///
/// Retourne `AnnexeError` si le classeur est illisible ou si aucune feuille
/// ne porte la colonne "portée".
pub fn read(path: &Path) -> Result<Vec<ComacRow>, AnnexeError> {
    let mut workbook = crate::xlsx::open_workbook(path)?;

    let matcher = HeaderMatcher::new(&[
        ("span", SPAN_PATTERNS),
        ("conductor", CONDUCTOR_PATTERNS),
        ("fo", FO_PATTERNS),
        ("height", HEIGHT_PATTERNS),
    ]);

    let sheet_names = workbook.sheet_names().to_vec();
    for name in &sheet_names {
        let range = match calamine::Reader::worksheet_range(&mut workbook, name) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if let Some(layout) = find_header(&range, &matcher, &["span"], HEADER_SCAN_ROWS) {
            return Ok(read_rows(&range, &layout));
        }
    }

    Err(AnnexeError::HeaderNotFound {
        file: path.display().to_string(),
        scanned: HEADER_SCAN_ROWS,
    })
}

fn read_rows(
    range: &calamine::Range<calamine::Data>,
    layout: &crate::xlsx::HeaderLayout,
) -> Vec<ComacRow> {
    let span_col = layout.col("span");
    let conductor_col = layout.col("conductor");
    let fo_col = layout.col("fo");
    let height_col = layout.col("height");

    let mut rows = Vec::new();

    for (idx, row) in range.rows().enumerate().skip(layout.row + 1) {
        // Les appuis sont toujours en colonne A
        let Some(pole) = cell_pole_number(cell_at(row, 0)) else {
            continue;
        };

        rows.push(ComacRow {
            line: (idx + 1) as u32,
            pole,
            span_length_m: span_col.and_then(|c| cell_f64(cell_at(row, c))),
            conductor: conductor_col.and_then(|c| cell_opt_text(cell_at(row, c))),
            fo_code: fo_col.and_then(|c| cell_opt_text(cell_at(row, c))),
            ground_height_m: height_col.and_then(|c| cell_f64(cell_at(row, c))),
        });
    }

    rows
}
