//! Lecteur d'annexes C3A (commandes fermes)
//!
//! Chaque commande référence jusqu'à deux appuis `(type, numéro)` avec un
//! drapeau de remplacement par extrémité.

use std::path::Path;

use crate::types::{C3aOrder, C3aPoleRef};
use crate::xlsx::{cell_at, cell_flag, cell_pole_number, cell_text, find_header, HeaderMatcher};
use crate::AnnexeError;

/// Feuille cible d'une annexe C3A
const SHEET: &str = "Commandes Fermes";

/// L'en-tête C3A est en ligne 14
const SCAN_ROWS: usize = 16;

const TYPE1_PATTERNS: &[&str] = &[r"^type appui 1$", r"^type 1$"];
const NUM1_PATTERNS: &[&str] = &[r"^n appui 1$", r"^num appui 1$", r"^appui 1$"];
const REP1_PATTERNS: &[&str] = &[r"^remplacement 1$", r"^rempl 1$"];
const TYPE2_PATTERNS: &[&str] = &[r"^type appui 2$", r"^type 2$"];
const NUM2_PATTERNS: &[&str] = &[r"^n appui 2$", r"^num appui 2$", r"^appui 2$"];
const REP2_PATTERNS: &[&str] = &[r"^remplacement 2$", r"^rempl 2$"];

/// Lit une annexe C3A et retourne ses commandes typées
///
/// # Errors
///
/// Retourne `AnnexeError` si le classeur est illisible, si la feuille
/// `Commandes Fermes` est absente ou si l'en-tête est introuvable.
pub fn read(path: &Path) -> Result<Vec<C3aOrder>, AnnexeError> {
    let mut workbook = crate::xlsx::open_workbook(path)?;
    let range = crate::xlsx::sheet_range(&mut workbook, path, SHEET)?;

    let matcher = HeaderMatcher::new(&[
        ("type1", TYPE1_PATTERNS),
        ("num1", NUM1_PATTERNS),
        ("rep1", REP1_PATTERNS),
        ("type2", TYPE2_PATTERNS),
        ("num2", NUM2_PATTERNS),
        ("rep2", REP2_PATTERNS),
    ]);

    let layout = find_header(&range, &matcher, &["num1"], SCAN_ROWS).ok_or_else(|| {
        AnnexeError::HeaderNotFound {
            file: path.display().to_string(),
            scanned: SCAN_ROWS,
        }
    })?;

    let mut orders = Vec::new();

    for (idx, row) in range.rows().enumerate().skip(layout.row + 1) {
        let mut poles = Vec::new();

        for (type_c, num_c, rep_c) in [("type1", "num1", "rep1"), ("type2", "num2", "rep2")] {
            let Some(num_col) = layout.col(num_c) else {
                continue;
            };
            let Some(num) = cell_pole_number(cell_at(row, num_col)) else {
                continue;
            };
            let pole_type = layout
                .col(type_c)
                .map(|c| cell_text(cell_at(row, c)).to_uppercase())
                .unwrap_or_default();
            let replace = layout
                .col(rep_c)
                .map(|c| cell_flag(cell_at(row, c)))
                .unwrap_or(false);

            poles.push(C3aPoleRef {
                pole_type,
                num,
                replace,
            });
        }

        if poles.is_empty() {
            continue;
        }

        orders.push(C3aOrder {
            line: (idx + 1) as u32,
            poles,
        });
    }

    Ok(orders)
}
