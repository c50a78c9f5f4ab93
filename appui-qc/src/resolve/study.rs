//! Affectation des appuis aux polygones d'étude
//!
//! Un appui appartient à au plus un polygone d'une famille donnée. Les noms
//! d'étude dupliqués au sein d'une famille sont une anomalie dure: le nom est
//! signalé et exclu du rapprochement, les appuis concernés sortent du
//! périmètre.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use tracing::{debug, warn};

use crate::geometry::PolygonIndex;
use crate::model::{Pole, StudyKind, StudyPolygon};

/// Descripteur d'un champ attributaire d'une couche
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub is_text: bool,
}

/// Détecte le champ portant le nom d'étude dans une couche de polygones
///
/// Les motifs sont essayés dans l'ordre de priorité; à défaut, le premier
/// champ texte fait foi.
pub fn detect_study_field(fields: &[FieldDescriptor]) -> Option<String> {
    const PATTERNS: &[&str] = &[
        r"^nom_?etude[s]?$",
        r"^etude[s]?$",
        r"^nom$",
        r"^decoupage$",
        r"^zone$",
    ];

    for pattern in PATTERNS {
        // Motif constant: une erreur de compilation est une erreur de programmation
        let re = Regex::new(pattern).expect("static field pattern must compile");
        if let Some(field) = fields
            .iter()
            .find(|f| re.is_match(&f.name.trim().to_lowercase()))
        {
            debug!(field = %field.name, pattern = %pattern, "Study-name field detected");
            return Some(field.name.clone());
        }
    }

    let fallback = fields.iter().find(|f| f.is_text)?;
    debug!(field = %fallback.name, "Study-name field fallback: first text field");
    Some(fallback.name.clone())
}

/// Noms d'étude portés par plus d'un polygone de la même famille
///
/// La comparaison se fait sur le nom en majuscules sans espaces de bord: deux
/// noms qui ne diffèrent que par un espace final sont des doublons.
pub fn duplicate_names(polygons: &[StudyPolygon]) -> Vec<(String, Vec<i64>)> {
    duplicates_of(polygons.iter().map(|p| (p.gid, p.name.as_str())))
}

fn duplicates_of<'a>(pairs: impl Iterator<Item = (i64, &'a str)>) -> Vec<(String, Vec<i64>)> {
    let mut by_name: HashMap<String, Vec<i64>> = HashMap::new();
    for (gid, name) in pairs {
        by_name
            .entry(name.trim().to_uppercase())
            .or_default()
            .push(gid);
    }

    let mut duplicates: Vec<(String, Vec<i64>)> = by_name
        .into_iter()
        .filter(|(_, gids)| gids.len() > 1)
        .collect();
    duplicates.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, gids) in &mut duplicates {
        gids.sort_unstable();
    }
    duplicates
}

/// Un appui contenu par plus d'un polygone de la même famille
#[derive(Debug, Clone)]
pub struct MultiContainment {
    pub pole_gid: i64,

    /// Polygones contenants, dans l'ordre de parcours de l'index
    pub polygons: Vec<(i64, String)>,
}

/// Résultat de l'affectation d'une couche d'appuis à une famille d'études
#[derive(Debug)]
pub struct StudyResolution {
    pub kind: StudyKind,

    /// Affectation appui → nom d'étude (majuscules)
    pub assignments: HashMap<i64, String>,

    /// Appuis hors de tout polygone exploitable de la famille
    pub out_of_perimeter: Vec<i64>,

    /// Noms portés par plusieurs polygones, exclus du rapprochement
    pub duplicate_names: Vec<(String, Vec<i64>)>,

    /// Appuis contenus par plusieurs polygones de noms distincts
    pub multi_containments: Vec<MultiContainment>,

    /// Appuis en terrain privé, par nom d'étude
    pub private_by_study: HashMap<String, Vec<i64>>,
}

/// Affecte chaque appui à son polygone d'étude
///
/// Le premier polygone contenant (ordre de parcours de l'index) fait
/// l'affectation; tout polygone contenant supplémentaire est signalé. Un
/// appui dont le polygone porte un nom dupliqué n'est pas affecté: il sort du
/// périmètre pour cette famille. L'index suffit: les noms et identifiants
/// des polygones en sont relus, la couche n'est pas réextraite.
pub fn resolve_studies(poles: &[Pole], index: &PolygonIndex, kind: StudyKind) -> StudyResolution {
    let duplicates = duplicates_of(index.iter().map(|e| (e.gid, e.name.as_str())));
    let excluded: HashSet<&str> = duplicates.iter().map(|(name, _)| name.as_str()).collect();

    if !excluded.is_empty() {
        warn!(
            kind = %kind.as_str(),
            names = %duplicates.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(", "),
            "Duplicate study names excluded from matching"
        );
    }

    let mut assignments = HashMap::new();
    let mut out_of_perimeter = Vec::new();
    let mut multi_containments = Vec::new();
    let mut private_by_study: HashMap<String, Vec<i64>> = HashMap::new();

    for pole in poles {
        let Some(hit) = index.containing(&pole.point) else {
            out_of_perimeter.push(pole.gid);
            continue;
        };

        if !hit.duplicates.is_empty() {
            let mut containing = vec![(hit.first.gid, hit.first.name.clone())];
            containing.extend(hit.duplicates.iter().map(|e| (e.gid, e.name.clone())));
            multi_containments.push(MultiContainment {
                pole_gid: pole.gid,
                polygons: containing,
            });
        }

        let study = hit.first.name.trim().to_uppercase();
        if excluded.contains(study.as_str()) {
            // Nom ambigu: l'appui n'est affecté à rien pour cette famille
            out_of_perimeter.push(pole.gid);
            continue;
        }

        if pole.is_private_land() {
            private_by_study.entry(study.clone()).or_default().push(pole.gid);
        }
        assignments.insert(pole.gid, study);
    }

    out_of_perimeter.sort_unstable();
    multi_containments.sort_by_key(|m| m.pole_gid);
    for gids in private_by_study.values_mut() {
        gids.sort_unstable();
    }

    StudyResolution {
        kind,
        assignments,
        out_of_perimeter,
        duplicate_names: duplicates,
        multi_containments,
        private_by_study,
    }
}
