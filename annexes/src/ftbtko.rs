//! Lecteur des listes de travail FT-BT KO
//!
//! Deux feuilles à colonnes fixes (`FT` et `BT`). Contrairement aux annexes
//! C6/C7, une colonne obligatoire manquante est une erreur fatale pour le
//! fichier: il est écarté et signalé, le job continue.

use std::path::Path;

use tracing::debug;

use crate::types::{FtBtKoFile, KoAction, KoRow};
use crate::xlsx::{
    cell_at, cell_flag, cell_opt_text, cell_pole_number, cell_text, find_header, HeaderMatcher,
    HEADER_SCAN_ROWS,
};
use crate::AnnexeError;

/// Colonnes obligatoires (forme canonisée), avec leurs motifs exacts
const REQUIRED: &[(&str, &[&str])] = &[
    ("study", &[r"^etude$"]),
    ("pole", &[r"^n appui$"]),
    ("action", &[r"^action$"]),
    ("material", &[r"^materiau$", r"^materiau remplacement$"]),
    ("yellow", &[r"^etiquette jaune$"]),
    ("private", &[r"^terrain prive$"]),
    ("aero", &[r"^aero souterrain$"]),
    ("soft", &[r"^portee molle$"]),
];

/// Lit une liste de travail FT-BT KO
///
/// # Errors
///
/// Retourne `AnnexeError::MissingSheet` si `FT` ou `BT` est absente,
/// `AnnexeError::MissingColumn` à la première colonne obligatoire manquante.
pub fn read(path: &Path) -> Result<FtBtKoFile, AnnexeError> {
    let mut workbook = crate::xlsx::open_workbook(path)?;

    let ft = read_sheet(&mut workbook, path, "FT")?;
    let bt = read_sheet(&mut workbook, path, "BT")?;

    Ok(FtBtKoFile { ft, bt })
}

fn read_sheet(
    workbook: &mut calamine::Sheets<std::io::BufReader<std::fs::File>>,
    path: &Path,
    sheet: &str,
) -> Result<Vec<KoRow>, AnnexeError> {
    let range = crate::xlsx::sheet_range(workbook, path, sheet)?;

    let matcher = HeaderMatcher::new(REQUIRED);
    let required: Vec<&str> = REQUIRED.iter().map(|(name, _)| *name).collect();

    let layout = match find_header(&range, &matcher, &required, HEADER_SCAN_ROWS) {
        Some(l) => l,
        None => {
            // Identifier la colonne fautive pour le message d'erreur: on
            // reprend la meilleure ligne candidate (celle qui porte "n appui")
            let missing = first_missing_column(&range, &matcher, &required)
                .unwrap_or_else(|| required[0].to_string());
            return Err(AnnexeError::missing_column(path, missing));
        }
    };

    let study_col = layout.col("study").unwrap_or(0);
    let pole_col = layout.col("pole").unwrap_or(0);
    let action_col = layout.col("action").unwrap_or(0);
    let material_col = layout.col("material").unwrap_or(0);
    let yellow_col = layout.col("yellow").unwrap_or(0);
    let private_col = layout.col("private").unwrap_or(0);
    let aero_col = layout.col("aero").unwrap_or(0);
    let soft_col = layout.col("soft").unwrap_or(0);

    let mut rows = Vec::new();
    let mut last_study: Option<String> = None;

    for (idx, row) in range.rows().enumerate().skip(layout.row + 1) {
        if let Some(study) = cell_opt_text(cell_at(row, study_col)) {
            last_study = Some(study.trim().to_uppercase());
        }

        let Some(pole) = cell_pole_number(cell_at(row, pole_col)) else {
            continue;
        };

        // Étude vide sans report antérieur: ligne non exploitable
        let Some(study) = last_study.clone() else {
            debug!(pole = pole.as_str(), line = idx + 1, "KO row without study, skipped");
            continue;
        };

        let action_raw = cell_text(cell_at(row, action_col));
        let Ok(action) = action_raw.parse::<KoAction>() else {
            debug!(
                pole = pole.as_str(),
                action = action_raw.as_str(),
                line = idx + 1,
                "KO row with unknown action, skipped"
            );
            continue;
        };

        rows.push(KoRow {
            line: (idx + 1) as u32,
            study,
            pole,
            action,
            replacement_material: cell_opt_text(cell_at(row, material_col)),
            yellow_label: cell_flag(cell_at(row, yellow_col)),
            private_land: cell_flag(cell_at(row, private_col)),
            aero_underground: cell_flag(cell_at(row, aero_col)),
            soft_span: cell_flag(cell_at(row, soft_col)),
        });
    }

    Ok(rows)
}

/// Cherche, sur la meilleure ligne d'en-tête candidate, la première colonne
/// obligatoire absente (pour un message d'erreur utile)
fn first_missing_column(
    range: &calamine::Range<calamine::Data>,
    matcher: &HeaderMatcher,
    required: &[&str],
) -> Option<String> {
    let mut best: Option<(usize, Vec<&str>)> = None;

    for row in range.rows().take(HEADER_SCAN_ROWS) {
        let mut found = Vec::new();
        for cell in row {
            let text = cell_text(cell);
            if text.is_empty() {
                continue;
            }
            if let Some(concept) = matcher.concept_of(&crate::xlsx::canon_header(&text)) {
                if !found.contains(&concept) {
                    found.push(concept);
                }
            }
        }
        if best.as_ref().map_or(true, |(n, _)| found.len() > *n) {
            best = Some((found.len(), found));
        }
    }

    let (_, found) = best?;
    required
        .iter()
        .find(|c| !found.contains(*c))
        .map(|c| c.to_string())
}
