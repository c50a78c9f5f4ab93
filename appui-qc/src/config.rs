//! Configuration d'une exécution
//!
//! La configuration de run est un fichier JSON; la connexion base vient des
//! variables d'environnement PG* (chargées depuis `.env` au démarrage).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::matching::CapacityRule;
use crate::rules::ClimaticZone;

/// Identifiants des couches du référentiel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayerConfig {
    /// Table des appuis
    pub poles: String,

    /// Table des polygones d'étude CAP-FT
    pub capft_studies: String,

    /// Table des polygones d'étude COMAC
    pub comac_studies: String,

    /// Table des boîtiers (BPE)
    pub boxes: String,

    /// Fonction serveur retournant les tronçons de câbles d'une zone
    #[serde(default = "default_cable_function")]
    pub cable_function: String,
}

fn default_cable_function() -> String {
    "cables_zone".to_string()
}

/// Activation des jobs d'un run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobToggles {
    #[serde(default)]
    pub maj: bool,
    #[serde(default)]
    pub capft: bool,
    #[serde(default)]
    pub comac: bool,
    #[serde(default)]
    pub c6_vs_bd: bool,
    #[serde(default)]
    pub police_c6: bool,
    #[serde(default)]
    pub c6_c3a_c7: bool,
}

impl Default for JobToggles {
    fn default() -> Self {
        Self {
            maj: false,
            capft: true,
            comac: true,
            c6_vs_bd: true,
            police_c6: true,
            c6_c3a_c7: true,
        }
    }
}

/// Configuration principale d'un run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Racine du projet (dossier des livrables terrain), chemin absolu
    pub project_root: PathBuf,

    /// Dossier de sortie des rapports, chemin absolu
    pub export_dir: PathBuf,

    /// Couches du référentiel
    pub layers: LayerConfig,

    /// Jobs à exécuter
    #[serde(default)]
    pub jobs: JobToggles,

    /// Zone climatique de la zone de travaux
    pub climatic_zone: ClimaticZone,

    /// Règle de comparaison des capacités câble
    #[serde(default)]
    pub capacity_rule: CapacityRule,

    /// Retirer le préfixe `E` des identifiants BT lors de la normalisation
    #[serde(default = "default_true")]
    pub strip_e_prefix: bool,

    /// Identifiant de zone (SRO) forcé; à défaut, dérivé du nom du dossier
    #[serde(default)]
    pub study_root: Option<String>,
}

fn default_true() -> bool {
    true
}

impl RunConfig {
    /// Charge une configuration depuis un fichier JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.project_root.is_absolute() {
            anyhow::bail!(
                "project_root must be an absolute path: {}",
                self.project_root.display()
            );
        }
        if !self.export_dir.is_absolute() {
            anyhow::bail!(
                "export_dir must be an absolute path: {}",
                self.export_dir.display()
            );
        }
        Ok(())
    }

    /// Identifiant de zone effectif: forcé par la config, sinon dérivé du
    /// nom du dossier projet
    pub fn effective_study_root(&self) -> Result<String> {
        if let Some(root) = &self.study_root {
            return Ok(root.clone());
        }
        let basename = self
            .project_root
            .file_name()
            .and_then(|n| n.to_str())
            .context("Project root has no usable basename")?;
        study_root_from_basename(basename).context(format!(
            "Cannot derive a study-root identifier from directory name '{}'",
            basename
        ))
    }
}

/// Dérive l'identifiant de zone (SRO) du nom d'un dossier projet
///
/// Convention `NNNNN-XXX-YYY-MMMMM`, suffixe `_*` optionnel, traduite en
/// `NNNNN/XXX/YYY/MMMMM`.
pub fn study_root_from_basename(basename: &str) -> Option<String> {
    // Motif constant: une erreur de compilation est une erreur de programmation
    let re = Regex::new(r"^(\d{5})-(\w{3})-(\w{3})-(\w{5})(?:_.*)?$")
        .expect("static study-root pattern must compile");
    let caps = re.captures(basename.trim())?;
    Some(format!("{}/{}/{}/{}", &caps[1], &caps[2], &caps[3], &caps[4]))
}
