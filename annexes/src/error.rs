//! Types d'erreurs pour le crate annexes

use std::path::Path;
use thiserror::Error;

/// Erreurs pouvant survenir lors de la lecture des livrables terrain
#[derive(Debug, Error)]
pub enum AnnexeError {
    /// Erreur d'I/O lors de la lecture d'un fichier
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Classeur illisible (corrompu, verrouillé, mauvais format)
    #[error("Cannot open workbook {file}: {reason}")]
    Workbook { file: String, reason: String },

    /// Feuille cible absente du classeur
    #[error("Missing sheet '{sheet}' in {file}")]
    MissingSheet { file: String, sheet: String },

    /// Ligne d'en-tête introuvable dans les premières lignes
    #[error("Header row not found in {file} (scanned first {scanned} rows)")]
    HeaderNotFound { file: String, scanned: usize },

    /// Colonne obligatoire absente (fatal pour le fichier, pas pour le job)
    #[error("Missing required column '{column}' in {file}")]
    MissingColumn { file: String, column: String },

    /// Classeur trop court pour contenir des données
    #[error("Not enough rows in {file}: expected at least {expected}, got {got}")]
    TooFewRows {
        file: String,
        expected: usize,
        got: usize,
    },

    /// Fichier .pcm non parsable
    #[error("Invalid PCM file {file}: {reason}")]
    Pcm { file: String, reason: String },
}

impl AnnexeError {
    /// Crée une erreur de classeur illisible avec contexte
    pub fn workbook(file: &Path, reason: impl Into<String>) -> Self {
        Self::Workbook {
            file: file.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de feuille manquante
    pub fn missing_sheet(file: &Path, sheet: impl Into<String>) -> Self {
        Self::MissingSheet {
            file: file.display().to_string(),
            sheet: sheet.into(),
        }
    }

    /// Crée une erreur de colonne manquante
    pub fn missing_column(file: &Path, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            file: file.display().to_string(),
            column: column.into(),
        }
    }

    /// Crée une erreur de fichier .pcm invalide
    pub fn pcm(file: &Path, reason: impl Into<String>) -> Self {
        Self::Pcm {
            file: file.display().to_string(),
            reason: reason.into(),
        }
    }
}
