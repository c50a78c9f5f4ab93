//! Noyau géométrique et cache d'index spatiaux
//!
//! Toute la géométrie du moteur passe par ici: appartenance point-polygone
//! avec préfiltre par emprise, distances euclidiennes, R-trees construits une
//! fois et réutilisés entre requêtes et entre jobs d'une même session.

pub mod index;
pub mod kernel;

pub use index::{
    ContainmentHit, IndexCache, LayerKey, PointEntry, PointIndex, PolygonEntry, PolygonIndex,
};
pub use kernel::{
    bbox_intersects, bbox_of_polygon, contains_point, distance, nearest_vertex_distance,
};
