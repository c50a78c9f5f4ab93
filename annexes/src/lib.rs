//! # annexes
//!
//! Décodeurs typés pour les livrables terrain d'un déploiement FTTH aérien:
//! annexes C6/C7/C3A, relevés COMAC (Excel et fichiers de calcul `.pcm`),
//! listes de travail FT-BT KO.
//!
//! ## Features
//!
//! - Découverte dynamique des lignes d'en-tête (noms de colonnes canonisés,
//!   sans accents, espaces réduits)
//! - Coercition des numéros d'appuis (entier, flottant avec `.0` parasite,
//!   texte) vers une forme textuelle stable
//! - Fichiers `.pcm` XML avec encodage pris dans la déclaration
//! - Modèle d'échec par fichier: un livrable illisible est signalé et écarté,
//!   jamais propagé comme erreur de job
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::path::Path;
//!
//! let rows = annexes::c6::read(Path::new("ANNEXE_C6_NGE1.xlsx"))?;
//! for row in &rows {
//!     println!("{}: {:?}", row.pole, row.cables);
//! }
//! ```

pub mod c3a;
pub mod c6;
pub mod c7;
pub mod comac;
pub mod error;
pub mod ftbtko;
pub mod pcm;
pub mod types;
pub mod xlsx;

pub use error::AnnexeError;
pub use types::{
    C3aOrder, C3aPoleRef, C6Row, C7Row, ComacRow, FtBtKoFile, KoAction, KoRow, PcmSpan, PcmStudy,
    PcmSupport, PoseBox, TcfLine,
};

use std::path::{Path, PathBuf};

/// Motifs d'exclusion par format lors de la collecte des classeurs C6
///
/// Les fiches d'appui, les C7 et les exports GESPOT partagent les dossiers
/// des C6 et matchent les mêmes en-têtes: ils sont écartés par leur nom.
pub const C6_EXCLUDE: &[&str] = &["FicheAppui_*", "*_C7*", "GESPOT_*"];

/// Vérifie si un nom de fichier matche un motif à jokers `*`
///
/// Seul le joker `*` est supporté (n'importe quelle séquence, y compris
/// vide); la comparaison est insensible à la casse.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    fn inner(name: &[u8], pattern: &[u8]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(b'*'), _) => {
                inner(name, &pattern[1..])
                    || (!name.is_empty() && inner(&name[1..], pattern))
            }
            (Some(p), Some(n)) => p.eq_ignore_ascii_case(n) && inner(&name[1..], &pattern[1..]),
            (Some(_), None) => false,
        }
    }
    inner(name.as_bytes(), pattern.as_bytes())
}

/// Vérifie si un fichier doit être écarté de la collecte
///
/// Sont écartés: les fichiers de verrou Excel (`~$...`), les sorties du
/// moteur (`ANALYSE_...`) et les noms matchant un motif d'exclusion.
pub fn is_excluded(name: &str, exclude: &[&str]) -> bool {
    if name.starts_with("~$") || name.starts_with("ANALYSE_") {
        return true;
    }
    exclude.iter().any(|p| matches_pattern(name, p))
}

/// Collecte récursivement les classeurs `.xlsx` d'un dossier
///
/// Applique le filtrage de noms de [`is_excluded`]. L'ordre de sortie est
/// trié pour des rapports reproductibles.
///
/// # Errors
///
/// Retourne une erreur d'I/O si le dossier est illisible.
pub fn collect_workbooks(path: &Path, exclude: &[&str]) -> Result<Vec<PathBuf>, AnnexeError> {
    let mut files = Vec::new();
    collect_by_extension(path, "xlsx", exclude, &mut files)?;
    files.sort();
    Ok(files)
}

/// Collecte récursivement les fichiers `.pcm` d'un dossier
///
/// # Errors
///
/// Retourne une erreur d'I/O si le dossier est illisible.
pub fn collect_pcm(path: &Path) -> Result<Vec<PathBuf>, AnnexeError> {
    let mut files = Vec::new();
    collect_by_extension(path, "pcm", &[], &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_by_extension(
    path: &Path,
    extension: &str,
    exclude: &[&str],
    out: &mut Vec<PathBuf>,
) -> Result<(), AnnexeError> {
    if path.is_file() {
        if wanted(path, extension, exclude) {
            out.push(path.to_path_buf());
        }
        return Ok(());
    }

    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();

        if entry_path.is_dir() {
            collect_by_extension(&entry_path, extension, exclude, out)?;
        } else if wanted(&entry_path, extension, exclude) {
            out.push(entry_path);
        }
    }

    Ok(())
}

fn wanted(path: &Path, extension: &str, exclude: &[&str]) -> bool {
    let ext_ok = path
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case(extension));
    if !ext_ok {
        return false;
    }
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    !is_excluded(name, exclude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("FicheAppui_372300.xlsx", "FicheAppui_*"));
        assert!(matches_pattern("NGE1_C7_v2.xlsx", "*_C7*"));
        assert!(matches_pattern("GESPOT_export.xlsx", "GESPOT_*"));
        assert!(matches_pattern("gespot_export.xlsx", "GESPOT_*"));
        assert!(!matches_pattern("ANNEXE_C6_NGE1.xlsx", "FicheAppui_*"));
        assert!(!matches_pattern("ANNEXE_C6.xlsx", "*_C7*"));
    }

    #[test]
    fn test_is_excluded() {
        assert!(is_excluded("~$ANNEXE_C6.xlsx", &[]));
        assert!(is_excluded("ANALYSE_NGE1.xlsx", &[]));
        assert!(is_excluded("FicheAppui_1.xlsx", C6_EXCLUDE));
        assert!(!is_excluded("ANNEXE_C6_NGE1.xlsx", C6_EXCLUDE));
    }
}
