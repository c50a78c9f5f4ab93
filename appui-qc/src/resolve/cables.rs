//! Rattachement des extrémités de câbles aux appuis
//!
//! Seuls les tronçons aériens et façade touchent des appuis. Chaque extrémité
//! (premier et dernier sommet du tracé) est rattachée à l'appui le plus
//! proche à 0.5 m inclus.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::geometry::PointIndex;
use crate::model::{CableSegment, PoseMode};

/// Tolérance de rattachement d'une extrémité à un appui, en mètres (incluse)
pub const ENDPOINT_TOLERANCE_M: f64 = 0.5;

/// Un câble rattaché à un appui
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CableBinding {
    /// Identifiant du tronçon, ou du câble physique si `group_by_gid`
    pub cable_id: i64,

    /// Capacité FO
    pub capacity: u32,

    /// Mode de pose
    pub pose_mode: PoseMode,
}

/// Rattache les extrémités des tronçons aux appuis
///
/// `group_by_gid` à vrai: au plus un rattachement par (câble physique,
/// appui), pour les comptages de câbles physiques. À faux: chaque extrémité
/// de chaque tronçon compte, pour la comptabilité tronçon par tronçon.
pub fn bind_endpoints(
    segments: &[CableSegment],
    pole_index: &PointIndex,
    group_by_gid: bool,
) -> HashMap<i64, Vec<CableBinding>> {
    let mut bags: HashMap<i64, Vec<CableBinding>> = HashMap::new();
    let mut seen: HashSet<(i64, i64)> = HashSet::new();
    let mut unbound = 0usize;

    for segment in segments {
        if !segment.pose_mode.touches_poles() {
            continue;
        }

        let endpoints = match segment.polyline.as_slice() {
            [] => continue,
            [single] => vec![single],
            [first, .., last] => vec![first, last],
        };

        for endpoint in endpoints {
            let Some((entry, _d)) = pole_index.nearest_within(endpoint, ENDPOINT_TOLERANCE_M)
            else {
                unbound += 1;
                continue;
            };

            let cable_id = if group_by_gid {
                segment.cable_gid
            } else {
                segment.segment_id
            };

            if group_by_gid && !seen.insert((segment.cable_gid, entry.gid)) {
                continue;
            }

            bags.entry(entry.gid).or_default().push(CableBinding {
                cable_id,
                capacity: segment.capacity,
                pose_mode: segment.pose_mode,
            });
        }
    }

    if unbound > 0 {
        debug!(count = unbound, "Cable endpoints without a pole within tolerance");
    }

    // Ordre stable par identifiant de câble pour des sorties reproductibles
    for bindings in bags.values_mut() {
        bindings.sort_by_key(|b| b.cable_id);
    }

    bags
}
