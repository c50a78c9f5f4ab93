//! Comparaison de charge câble par appui (SIG vs annexe C6)
//!
//! Côté C6, la charge est déclarée en texte libre d'étiquettes
//! (`L192.11-26P | L193.12-6P`); côté SIG, c'est le sac de câbles physiques
//! touchant l'appui avec leurs capacités FO. La comparaison porte sur le
//! nombre de câbles et sur la compatibilité des capacités.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::rules::permitted_capacities;

/// Règle de comparaison des capacités
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityRule {
    /// Bijection gloutonne sur les ensembles de capacités admissibles
    /// par référence (une référence `L192.11` accepte 24 ou 36 FO)
    #[default]
    Compatible,
    /// Égalité stricte des multi-ensembles de capacités
    Strict,
}

/// Une étiquette câble déclarée
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nameplate {
    /// Référence canonique (majuscules, préfixe `L` garanti)
    pub reference: String,

    /// Capacité déclarée (le `<N>` de `-<N>P`)
    pub declared_capacity: u32,
}

/// Parse le texte libre des étiquettes câbles d'une ligne C6
///
/// Reconnaît le motif `L?<ref>-<N>P` répété, séparé par des pipes ou des
/// espaces. Tout ce qui ne matche pas est ignoré (le texte libre du terrain
/// porte aussi des mentions hors nomenclature).
pub fn parse_nameplates(raw: &str) -> Vec<Nameplate> {
    // Motif constant: une erreur de compilation est une erreur de programmation
    let re = Regex::new(r"(?i)\b(L?\d+(?:\.\d+)*)\s*-\s*(\d+)\s*P\b")
        .expect("static nameplate pattern must compile");

    re.captures_iter(raw)
        .filter_map(|caps| {
            let mut reference = caps.get(1)?.as_str().to_uppercase();
            if !reference.starts_with('L') {
                reference.insert(0, 'L');
            }
            let declared_capacity: u32 = caps.get(2)?.as_str().parse().ok()?;
            Some(Nameplate {
                reference,
                declared_capacity,
            })
        })
        .collect()
}

/// Écart de charge d'un appui
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadDiff {
    /// Nombre de câbles SIG moins nombre d'étiquettes déclarées
    /// (0 = accord)
    pub count_delta: i64,

    /// Détail du désaccord de capacités, `None` si compatibles
    pub capacity_mismatch: Option<String>,
}

impl LoadDiff {
    /// Accord complet (ni écart de nombre ni écart de capacité)
    pub fn is_ok(&self) -> bool {
        self.count_delta == 0 && self.capacity_mismatch.is_none()
    }
}

/// Compare la charge d'un appui: capacités SIG vs étiquettes C6
pub fn compare_load(gis_capacities: &[u32], declared: &[Nameplate], rule: CapacityRule) -> LoadDiff {
    let count_delta = gis_capacities.len() as i64 - declared.len() as i64;

    let capacity_mismatch = match rule {
        CapacityRule::Compatible => compatible_mismatch(gis_capacities, declared),
        CapacityRule::Strict => strict_mismatch(gis_capacities, declared),
    };

    LoadDiff {
        count_delta,
        capacity_mismatch,
    }
}

/// Règle "capacités compatibles": bijection gloutonne, une capacité SIG par
/// référence déclarée, chaque capacité appartenant à l'ensemble admissible
/// de sa référence
fn compatible_mismatch(gis_capacities: &[u32], declared: &[Nameplate]) -> Option<String> {
    let mut remaining: Vec<u32> = gis_capacities.to_vec();
    let mut unmatched: Vec<&Nameplate> = Vec::new();

    for plate in declared {
        let permitted = permitted_capacities(&plate.reference, plate.declared_capacity);
        match remaining.iter().position(|cap| permitted.contains(cap)) {
            Some(idx) => {
                remaining.remove(idx);
            }
            None => unmatched.push(plate),
        }
    }

    if unmatched.is_empty() && remaining.is_empty() {
        return None;
    }

    let mut parts = Vec::new();
    if !unmatched.is_empty() {
        let refs: Vec<String> = unmatched
            .iter()
            .map(|p| format!("{}-{}P", p.reference, p.declared_capacity))
            .collect();
        parts.push(format!("declared without GIS counterpart: {}", refs.join(", ")));
    }
    if !remaining.is_empty() {
        let caps: Vec<String> = remaining.iter().map(u32::to_string).collect();
        parts.push(format!("GIS capacities without declaration: {}", caps.join(", ")));
    }
    Some(parts.join("; "))
}

/// Règle stricte: égalité des multi-ensembles de capacités déclarées vs SIG
fn strict_mismatch(gis_capacities: &[u32], declared: &[Nameplate]) -> Option<String> {
    let mut gis: Vec<u32> = gis_capacities.to_vec();
    let mut decl: Vec<u32> = declared.iter().map(|p| p.declared_capacity).collect();
    gis.sort_unstable();
    decl.sort_unstable();

    if gis == decl {
        None
    } else {
        Some(format!("declared {:?} vs GIS {:?}", decl, gis))
    }
}
