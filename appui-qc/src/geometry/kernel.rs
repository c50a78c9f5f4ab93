//! Primitives géométriques
//!
//! L'appartenance exacte n'est testée que sur les candidats retenus par le
//! préfiltre d'emprise: sur des couches de 10^4 à 10^6 entités, le test exact
//! systématique serait prohibitif.

use geo::{Contains, Coord, MultiPolygon, Point, Rect};
use rstar::AABB;

/// Emprise d'un multi-polygone
///
/// Retourne `None` pour un polygone sans sommet (géométrie dégradée du
/// référentiel: l'entité est ignorée, pas plantée).
pub fn bbox_of_polygon(polygon: &MultiPolygon) -> Option<AABB<[f64; 2]>> {
    let mut min = [f64::INFINITY, f64::INFINITY];
    let mut max = [f64::NEG_INFINITY, f64::NEG_INFINITY];
    let mut seen = false;

    for poly in &polygon.0 {
        for coord in poly.exterior().coords() {
            min[0] = min[0].min(coord.x);
            min[1] = min[1].min(coord.y);
            max[0] = max[0].max(coord.x);
            max[1] = max[1].max(coord.y);
            seen = true;
        }
    }

    if seen {
        Some(AABB::from_corners(min, max))
    } else {
        None
    }
}

/// Test d'appartenance exact (l'appelant a déjà préfiltré par emprise)
pub fn contains_point(polygon: &MultiPolygon, point: &Point) -> bool {
    // geo::Contains exclut la frontière; un appui posé exactement sur la
    // limite d'étude est rattaché via le test de bord
    polygon.contains(point) || on_boundary(polygon, point)
}

fn on_boundary(polygon: &MultiPolygon, point: &Point) -> bool {
    let c: Coord = (*point).into();
    polygon.0.iter().any(|poly| {
        poly.exterior().coords().any(|v| *v == c)
            || poly
                .interiors()
                .iter()
                .any(|ring| ring.coords().any(|v| *v == c))
    })
}

/// Distance euclidienne entre deux points (CRS projeté, en mètres)
pub fn distance(a: &Point, b: &Point) -> f64 {
    let dx = a.x() - b.x();
    let dy = a.y() - b.y();
    (dx * dx + dy * dy).sqrt()
}

/// Distance du point au sommet le plus proche d'une polyligne
pub fn nearest_vertex_distance(point: &Point, polyline: &[Point]) -> Option<f64> {
    polyline
        .iter()
        .map(|v| distance(point, v))
        .min_by(|a, b| a.total_cmp(b))
}

/// Intersection de deux emprises
pub fn bbox_intersects(a: &Rect, b: &Rect) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn square() -> MultiPolygon {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]])
    }

    #[test]
    fn test_contains_point_inside_outside() {
        let sq = square();
        assert!(contains_point(&sq, &Point::new(5.0, 5.0)));
        assert!(!contains_point(&sq, &Point::new(15.0, 5.0)));
        assert!(!contains_point(&sq, &Point::new(-0.1, 5.0)));
    }

    #[test]
    fn test_contains_point_on_vertex() {
        let sq = square();
        assert!(contains_point(&sq, &Point::new(0.0, 0.0)));
    }

    #[test]
    fn test_bbox_of_polygon() {
        let sq = square();
        let bbox = bbox_of_polygon(&sq).unwrap();
        assert_eq!(bbox.lower(), [0.0, 0.0]);
        assert_eq!(bbox.upper(), [10.0, 10.0]);
    }

    #[test]
    fn test_bbox_of_empty_polygon() {
        assert!(bbox_of_polygon(&MultiPolygon::new(vec![])).is_none());
    }

    #[test]
    fn test_distance() {
        assert_eq!(distance(&Point::new(0.0, 0.0), &Point::new(3.0, 4.0)), 5.0);
    }

    #[test]
    fn test_nearest_vertex_distance() {
        let line = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let d = nearest_vertex_distance(&Point::new(10.5, 0.0), &line).unwrap();
        assert!((d - 0.5).abs() < 1e-12);
        assert!(nearest_vertex_distance(&Point::new(0.0, 0.0), &[]).is_none());
    }
}
