//! Vérification de présence des boîtiers (BPE)
//!
//! Un appui qui déclare un boîtier en C6 doit avoir un équipement SIG à
//! moins de 1.0 m (inclus). Les équipements du périmètre que personne ne
//! déclare sont orphelins.

use std::collections::{HashMap, HashSet};

use annexes::types::PoseBox;
use geo::Point;

use crate::geometry::{PointEntry, PointIndex};
use crate::model::JunctionBox;

/// Tolérance de rattachement d'un boîtier à un appui, en mètres (incluse)
pub const BOX_TOLERANCE_M: f64 = 1.0;

/// Un appui déclarant un boîtier à poser
#[derive(Debug, Clone)]
pub struct DeclaredBox {
    /// Identifiant SIG de l'appui déclarant
    pub pole_gid: i64,

    /// Position de l'appui
    pub point: Point,

    /// Boîtier déclaré (PB ou PEO)
    pub declared: PoseBox,
}

/// Résultat de la vérification des boîtiers
#[derive(Debug, Default)]
pub struct BoxMatchResult {
    /// Déclarations satisfaites: (appui, équipement, type d'équipement)
    pub ok: Vec<(i64, i64, String)>,

    /// Déclarations sans équipement à portée: (appui, boîtier déclaré)
    pub declared_missing: Vec<(i64, PoseBox)>,

    /// Équipements du périmètre sans appui déclarant: (gid, type)
    pub orphans: Vec<(i64, String)>,
}

/// Vérifie chaque déclaration de boîtier contre les équipements du périmètre
///
/// `boxes` ne doit contenir que les équipements du périmètre courant: tout
/// équipement non rattaché en sort orphelin.
pub fn verify_boxes(declared: &[DeclaredBox], boxes: &[JunctionBox]) -> BoxMatchResult {
    let index = PointIndex::build(
        boxes
            .iter()
            .map(|b| PointEntry::new(b.gid, &b.point))
            .collect(),
    );
    let by_gid: HashMap<i64, &JunctionBox> = boxes.iter().map(|b| (b.gid, b)).collect();

    let mut result = BoxMatchResult::default();
    let mut claimed: HashSet<i64> = HashSet::new();

    for declaration in declared {
        match index.nearest_within(&declaration.point, BOX_TOLERANCE_M) {
            Some((entry, _d)) => {
                let box_type = by_gid
                    .get(&entry.gid)
                    .map(|b| b.box_type.clone())
                    .unwrap_or_default();
                claimed.insert(entry.gid);
                result.ok.push((declaration.pole_gid, entry.gid, box_type));
            }
            None => {
                result
                    .declared_missing
                    .push((declaration.pole_gid, declaration.declared));
            }
        }
    }

    for junction_box in boxes {
        if !claimed.contains(&junction_box.gid) {
            result
                .orphans
                .push((junction_box.gid, junction_box.box_type.clone()));
        }
    }

    result.ok.sort_unstable_by_key(|(pole, gid, _)| (*pole, *gid));
    result.declared_missing.sort_unstable_by_key(|(pole, _)| *pole);
    result.orphans.sort_unstable_by_key(|(gid, _)| *gid);

    result
}
