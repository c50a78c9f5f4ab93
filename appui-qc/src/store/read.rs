//! Chargement du référentiel
//!
//! Les géométries arrivent en WKB via `ST_AsBinary`; les colonnes
//! attributaires sont découvertes dans `information_schema` pour tolérer les
//! variations de schéma entre les bases départementales.

use anyhow::{anyhow, Context, Result};
use deadpool_postgres::Pool;
use geo::{Geometry, LineString, MultiPolygon, Point};
use tracing::{debug, info};

use crate::fingerprint::Fingerprint;
use crate::model::{CableSegment, JunctionBox, Pole, PoleType, PoseMode, StudyKind, StudyPolygon};
use crate::resolve::study::{detect_study_field, FieldDescriptor};
use crate::store::quote_ident;

fn decode_geometry(bytes: &[u8]) -> Result<Geometry> {
    wkb::wkb_to_geom(&mut &bytes[..]).map_err(|e| anyhow!("WKB decode failed: {:?}", e))
}

fn decode_point(bytes: &[u8]) -> Result<Point> {
    match decode_geometry(bytes)? {
        Geometry::Point(p) => Ok(p),
        other => Err(anyhow!("Expected Point geometry, got {:?}", kind_of(&other))),
    }
}

fn decode_multipolygon(bytes: &[u8]) -> Result<MultiPolygon> {
    match decode_geometry(bytes)? {
        Geometry::MultiPolygon(mp) => Ok(mp),
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        other => Err(anyhow!(
            "Expected (Multi)Polygon geometry, got {:?}",
            kind_of(&other)
        )),
    }
}

fn decode_polyline(bytes: &[u8]) -> Result<Vec<Point>> {
    let line_points = |line: &LineString| line.points().collect::<Vec<_>>();
    match decode_geometry(bytes)? {
        Geometry::LineString(line) => Ok(line_points(&line)),
        // Un tronçon multi-parties garde l'ordre des parties
        Geometry::MultiLineString(lines) => {
            Ok(lines.iter().flat_map(|l| line_points(l)).collect())
        }
        other => Err(anyhow!(
            "Expected (Multi)LineString geometry, got {:?}",
            kind_of(&other)
        )),
    }
}

fn kind_of(geometry: &Geometry) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Colonnes d'une table, via `information_schema`
async fn table_columns(pool: &Pool, table: &str) -> Result<Vec<FieldDescriptor>> {
    let client = pool.get().await.context("Failed to get connection from pool")?;

    let (schema, name) = match table.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    };

    let rows = match schema {
        Some(schema) => {
            client
                .query(
                    "SELECT column_name, data_type FROM information_schema.columns \
                     WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                    &[&schema, &name],
                )
                .await
        }
        None => {
            client
                .query(
                    "SELECT column_name, data_type FROM information_schema.columns \
                     WHERE table_name = $1 ORDER BY ordinal_position",
                    &[&name],
                )
                .await
        }
    }
    .context(format!("Failed to read columns of {}", table))?;

    if rows.is_empty() {
        anyhow::bail!("Table not found or has no columns: {}", table);
    }

    Ok(rows
        .iter()
        .map(|row| {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            FieldDescriptor {
                name,
                is_text: matches!(data_type.as_str(), "text" | "character varying" | "character"),
            }
        })
        .collect())
}

/// Signature d'une couche pour la clé de cache d'index
///
/// `max(gid)` sert de proxy de révision, le nombre de lignes de garde-fou.
pub async fn layer_signature(pool: &Pool, table: &str) -> Result<(u64, usize)> {
    let client = pool.get().await.context("Failed to get connection from pool")?;
    let sql = format!(
        "SELECT coalesce(max(gid), 0)::bigint, count(*)::bigint FROM {}",
        quote_ident(table)
    );
    let row = client
        .query_one(&sql, &[])
        .await
        .context(format!("Failed to read signature of {}", table))?;
    let max_gid: i64 = row.get(0);
    let count: i64 = row.get(1);
    Ok((max_gid as u64, count as usize))
}

/// Charge les appuis
///
/// L'empreinte est calculée au chargement: forme BT pour les appuis BT
/// (préfixe `E` selon la configuration), forme standard sinon.
pub async fn load_poles(pool: &Pool, table: &str, strip_e_prefix: bool) -> Result<Vec<Pole>> {
    let client = pool.get().await.context("Failed to get connection from pool")?;

    let sql = format!(
        "SELECT gid::bigint, coalesce(inf_num, ''), coalesce(inf_type, ''), \
         etat, commentair, ST_AsBinary(geom) \
         FROM {} WHERE geom IS NOT NULL",
        quote_ident(table)
    );
    let rows = client
        .query(&sql, &[])
        .await
        .context(format!("Failed to load poles from {}", table))?;

    let mut poles = Vec::with_capacity(rows.len());
    for row in &rows {
        let gid: i64 = row.get(0);
        let inf_num: String = row.get(1);
        let inf_type: String = row.get(2);
        let state: Option<String> = row.get(3);
        let comment: Option<String> = row.get(4);
        let wkb_bytes: Vec<u8> = row.get(5);

        let point =
            decode_point(&wkb_bytes).context(format!("Invalid pole geometry, gid={}", gid))?;
        let pole_type = PoleType::from_inf_type(&inf_type);
        let fingerprint = match pole_type {
            PoleType::Bt => Fingerprint::normalise_bt(&inf_num, strip_e_prefix),
            _ => Fingerprint::normalise(&inf_num),
        };

        poles.push(Pole {
            gid,
            inf_num,
            fingerprint,
            pole_type,
            point,
            state,
            comment,
        });
    }

    info!(table = %table, count = poles.len(), "Poles loaded");
    Ok(poles)
}

/// Charge une couche de polygones d'étude
///
/// Le champ portant le nom d'étude est auto-détecté; les noms sont
/// normalisés (majuscules, sans espaces de bord) dès le chargement.
pub async fn load_studies(pool: &Pool, table: &str, kind: StudyKind) -> Result<Vec<StudyPolygon>> {
    let fields = table_columns(pool, table).await?;
    let name_field = detect_study_field(&fields)
        .context(format!("No usable study-name field in {}", table))?;
    debug!(table = %table, field = %name_field, "Study-name field");

    let client = pool.get().await.context("Failed to get connection from pool")?;
    let sql = format!(
        "SELECT gid::bigint, coalesce({}::text, ''), ST_AsBinary(geom) \
         FROM {} WHERE geom IS NOT NULL",
        quote_ident(&name_field),
        quote_ident(table)
    );
    let rows = client
        .query(&sql, &[])
        .await
        .context(format!("Failed to load studies from {}", table))?;

    let mut studies = Vec::with_capacity(rows.len());
    for row in &rows {
        let gid: i64 = row.get(0);
        let name: String = row.get(1);
        let wkb_bytes: Vec<u8> = row.get(2);

        let polygon = decode_multipolygon(&wkb_bytes)
            .context(format!("Invalid study geometry, gid={}", gid))?;

        studies.push(StudyPolygon {
            gid,
            name: name.trim().to_uppercase(),
            polygon,
            kind,
        });
    }

    info!(table = %table, kind = %kind.as_str(), count = studies.len(), "Studies loaded");
    Ok(studies)
}

/// Charge les boîtiers (BPE)
pub async fn load_boxes(pool: &Pool, table: &str) -> Result<Vec<JunctionBox>> {
    let client = pool.get().await.context("Failed to get connection from pool")?;

    let sql = format!(
        "SELECT gid::bigint, coalesce(type_bpe::text, ''), ST_AsBinary(geom) \
         FROM {} WHERE geom IS NOT NULL",
        quote_ident(table)
    );
    let rows = client
        .query(&sql, &[])
        .await
        .context(format!("Failed to load boxes from {}", table))?;

    let mut boxes = Vec::with_capacity(rows.len());
    for row in &rows {
        let gid: i64 = row.get(0);
        let box_type: String = row.get(1);
        let wkb_bytes: Vec<u8> = row.get(2);

        let point =
            decode_point(&wkb_bytes).context(format!("Invalid box geometry, gid={}", gid))?;
        boxes.push(JunctionBox { gid, box_type, point });
    }

    info!(table = %table, count = boxes.len(), "Junction boxes loaded");
    Ok(boxes)
}

/// Appelle la fonction serveur des tronçons de câbles d'une zone
///
/// La fonction retourne `(segment_id, cable_gid, capacite, mode_pose, geom)`
/// pour l'identifiant de zone (SRO) passé en paramètre.
pub async fn load_cable_segments(
    pool: &Pool,
    function: &str,
    study_root: &str,
) -> Result<Vec<CableSegment>> {
    let client = pool.get().await.context("Failed to get connection from pool")?;

    let sql = format!(
        "SELECT segment_id::bigint, cable_gid::bigint, capacite::int, \
         coalesce(mode_pose, ''), ST_AsBinary(geom) FROM {}($1)",
        quote_ident(function)
    );
    let rows = client
        .query(&sql, &[&study_root])
        .await
        .context(format!("Cable-segment function {} failed", function))?;

    let mut segments = Vec::with_capacity(rows.len());
    for row in &rows {
        let segment_id: i64 = row.get(0);
        let cable_gid: i64 = row.get(1);
        let capacity: i32 = row.get(2);
        let pose_mode: String = row.get(3);
        let wkb_bytes: Vec<u8> = row.get(4);

        let polyline = decode_polyline(&wkb_bytes)
            .context(format!("Invalid segment geometry, id={}", segment_id))?;

        segments.push(CableSegment {
            segment_id,
            cable_gid,
            capacity: capacity.max(0) as u32,
            pose_mode: PoseMode::from_str_loose(&pose_mode),
            polyline,
        });
    }

    info!(
        function = %function,
        study_root = %study_root,
        count = segments.len(),
        "Cable segments loaded"
    );
    Ok(segments)
}
