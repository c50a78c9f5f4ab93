//! Index spatiaux R-tree et cache de session
//!
//! Un index est construit une seule fois par couche et réutilisé entre
//! requêtes et entre jobs d'un même lot. La clé de cache inclut le nombre
//! d'entités comme proxy d'invalidation bon marché: une couche rechargée avec
//! un autre décompte reconstruit l'index.

use std::collections::HashMap;
use std::sync::Arc;

use geo::{MultiPolygon, Point};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use tracing::debug;

use super::kernel::{bbox_of_polygon, contains_point};

/// Clé d'identité d'une couche pour le cache d'index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerKey {
    /// Identifiant de la couche (nom de table ou handle)
    pub layer_id: String,

    /// Révision de la couche côté référentiel
    pub revision: u64,

    /// Nombre d'entités au moment de l'extraction
    pub feature_count: usize,
}

impl LayerKey {
    pub fn new(layer_id: impl Into<String>, revision: u64, feature_count: usize) -> Self {
        Self {
            layer_id: layer_id.into(),
            revision,
            feature_count,
        }
    }
}

/// Entrée polygone de l'index (polygone d'étude)
#[derive(Debug, Clone)]
pub struct PolygonEntry {
    /// Identifiant interne SIG
    pub gid: i64,

    /// Nom d'étude porté par le polygone
    pub name: String,

    /// Géométrie complète pour le test exact
    pub polygon: MultiPolygon,

    envelope: AABB<[f64; 2]>,
}

impl PolygonEntry {
    /// Construit une entrée; `None` pour une géométrie sans sommet
    pub fn new(gid: i64, name: impl Into<String>, polygon: MultiPolygon) -> Option<Self> {
        let envelope = bbox_of_polygon(&polygon)?;
        Some(Self {
            gid,
            name: name.into(),
            polygon,
            envelope,
        })
    }
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Entrée ponctuelle de l'index (appui ou boîtier)
#[derive(Debug, Clone)]
pub struct PointEntry {
    /// Identifiant interne SIG
    pub gid: i64,

    /// Position en CRS projeté
    pub position: [f64; 2],
}

impl PointEntry {
    pub fn new(gid: i64, point: &Point) -> Self {
        Self {
            gid,
            position: [point.x(), point.y()],
        }
    }
}

impl RTreeObject for PointEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for PointEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Résultat d'une requête d'appartenance
#[derive(Debug)]
pub struct ContainmentHit<'a> {
    /// Polygone retenu pour le rattachement (premier candidat contenant)
    pub first: &'a PolygonEntry,

    /// Autres polygones contenant le même point (anomalie de duplication)
    pub duplicates: Vec<&'a PolygonEntry>,
}

/// Index polygonal interrogeable
#[derive(Debug)]
pub struct PolygonIndex {
    tree: RTree<PolygonEntry>,
}

impl PolygonIndex {
    /// Construit l'index en une passe (bulk load)
    pub fn build(entries: Vec<PolygonEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Nombre d'entrées indexées
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Polygones contenant le point
    ///
    /// Le premier candidat contenant (dans l'ordre de parcours du R-tree,
    /// déterministe pour un index donné) porte le rattachement; les suivants
    /// sont retournés comme duplications.
    pub fn containing(&self, point: &Point) -> Option<ContainmentHit<'_>> {
        let query = AABB::from_point([point.x(), point.y()]);
        let mut hits = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .filter(|entry| contains_point(&entry.polygon, point));

        let first = hits.next()?;
        Some(ContainmentHit {
            first,
            duplicates: hits.collect(),
        })
    }

    /// Itère toutes les entrées (ordre interne du R-tree)
    pub fn iter(&self) -> impl Iterator<Item = &PolygonEntry> {
        self.tree.iter()
    }
}

/// Index ponctuel interrogeable
#[derive(Debug)]
pub struct PointIndex {
    tree: RTree<PointEntry>,
}

impl PointIndex {
    pub fn build(entries: Vec<PointEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Entrée la plus proche dans la tolérance (inclusive), avec sa distance
    ///
    /// `tolerance_m` inclusif: un appui à exactement 0.5 m d'une extrémité
    /// de câble est rattaché.
    pub fn nearest_within(&self, point: &Point, tolerance_m: f64) -> Option<(&PointEntry, f64)> {
        let query = [point.x(), point.y()];
        let entry = self.tree.nearest_neighbor(&query)?;
        let d = entry.distance_2(&query).sqrt();
        if d <= tolerance_m {
            Some((entry, d))
        } else {
            None
        }
    }
}

/// Cache de session des index spatiaux
///
/// Possédé par l'orchestrateur; les workers reçoivent des `Arc` immuables
/// après extraction, aucun handle SIG ne traverse un thread.
#[derive(Debug, Default)]
pub struct IndexCache {
    polygons: HashMap<LayerKey, Arc<PolygonIndex>>,
    points: HashMap<LayerKey, Arc<PointIndex>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index polygonal pour une couche: construit au premier appel, réutilisé
    /// ensuite (le constructeur n'est pas rappelé sur un hit)
    pub fn polygon_index<F>(&mut self, key: LayerKey, build: F) -> Arc<PolygonIndex>
    where
        F: FnOnce() -> Vec<PolygonEntry>,
    {
        if let Some(index) = self.polygons.get(&key) {
            debug!(layer = key.layer_id.as_str(), "Polygon index cache hit");
            return Arc::clone(index);
        }
        let index = Arc::new(PolygonIndex::build(build()));
        debug!(
            layer = key.layer_id.as_str(),
            entries = index.len(),
            "Polygon index built"
        );
        self.polygons.insert(key, Arc::clone(&index));
        index
    }

    /// Index polygonal déjà en cache, sans construction
    ///
    /// Permet à l'appelant de ne pas extraire la couche du tout sur un hit.
    pub fn get_polygon_index(&self, key: &LayerKey) -> Option<Arc<PolygonIndex>> {
        self.polygons.get(key).map(Arc::clone)
    }

    /// Index ponctuel pour une couche, même politique
    pub fn point_index<F>(&mut self, key: LayerKey, build: F) -> Arc<PointIndex>
    where
        F: FnOnce() -> Vec<PointEntry>,
    {
        if let Some(index) = self.points.get(&key) {
            debug!(layer = key.layer_id.as_str(), "Point index cache hit");
            return Arc::clone(index);
        }
        let index = Arc::new(PointIndex::build(build()));
        self.points.insert(key, Arc::clone(&index));
        index
    }

    /// Vide le cache (changement de session ou de référentiel)
    pub fn clear(&mut self) {
        self.polygons.clear();
        self.points.clear();
    }
}
