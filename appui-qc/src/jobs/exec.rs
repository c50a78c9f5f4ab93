//! Implémentation des six jobs
//!
//! Le fil conducteur est le même partout: lire les livrables (workers
//! bloquants), charger ou réutiliser le référentiel, résoudre, apparier,
//! consigner dans le registre. L'annulation est consultée à chaque frontière
//! de lot et à chaque lecture fichier.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use annexes::types::{C6Row, KoRow};
use annexes::{c3a, c6, c7, comac, ftbtko, pcm, AnnexeError};
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::fingerprint::Fingerprint;
use crate::geometry::{LayerKey, PointEntry, PointIndex, PolygonEntry, PolygonIndex};
use crate::jobs::{BatchProgress, JobContext, JobKind, CANCEL_CHECK_EVERY};
use crate::ledger::{
    BoxAnomaly, BoxIssue, GisOnlyEntry, Ledger, LoadAnomaly, LoadIssue, MatchedEntry, OrderKey,
    OutOfPerimeterEntry, SafetyAnomaly, SafetyIssue, SourceOnlyEntry, StudyDuplicate,
};
use crate::matching::{compare_load, match_bags, parse_nameplates, MatchKey};
use crate::model::{CableSegment, Pole, StudyKind};
use crate::resolve::{bind_endpoints, resolve_studies, verify_boxes, DeclaredBox};
use crate::rules::{capacity_of_fo_code, check_ground, check_span, max_span_m, GroundCheck,
    SpanCheck};
use crate::store::read;
use crate::update::{plan_run, BtUpdate, FtUpdate, PlannedStatement};

/// Motifs de sélection des livrables par format (nom de fichier)
const C7_INCLUDE: &[&str] = &["*C7*"];
const C3A_INCLUDE: &[&str] = &["*C3A*"];
const COMAC_INCLUDE: &[&str] = &["*COMAC*"];
const KO_INCLUDE: &[&str] = &["*KO*"];

/// Résultat d'un job: registre plus, pour `maj`, le plan SQL
pub struct JobOutput {
    pub ledger: Ledger,
    pub plan: Vec<PlannedStatement>,
}

impl JobOutput {
    fn ledger_only(ledger: Ledger) -> Self {
        Self {
            ledger,
            plan: Vec::new(),
        }
    }
}

/// Exécute un job
pub async fn run_job(
    ctx: &mut JobContext<'_>,
    kind: JobKind,
    progress: &BatchProgress,
) -> Result<JobOutput> {
    match kind {
        JobKind::PoliceC6 => job_police_c6(ctx, progress).await,
        JobKind::C6VsBd => job_c6_vs_bd(ctx, progress).await,
        JobKind::CapFt => job_capft(ctx, progress).await,
        JobKind::Comac => job_comac(ctx, progress).await,
        JobKind::C6C3aC7 => job_c6_c3a_c7(ctx, progress).await,
        JobKind::Maj => job_maj(ctx, progress).await,
    }
}

// ---------------------------------------------------------------------------
// Accès mutualisé au référentiel et aux livrables

fn base_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

fn keep_matching(paths: Vec<PathBuf>, patterns: &[&str]) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|p| {
            patterns
                .iter()
                .any(|pattern| annexes::matches_pattern(&base_name(p), pattern))
        })
        .collect()
}

/// Parse une liste de fichiers sur des workers bloquants
///
/// Un fichier illisible est tracé et sauté; il ne fait jamais échouer le job.
async fn parse_files<T: Send + 'static>(
    paths: Vec<PathBuf>,
    parse: fn(&Path) -> Result<T, AnnexeError>,
    ctx: &JobContext<'_>,
) -> Result<Vec<(PathBuf, T)>> {
    let mut parsed = Vec::with_capacity(paths.len());

    for path in paths {
        if ctx.cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }

        let outcome = tokio::task::spawn_blocking({
            let path = path.clone();
            move || parse(&path)
        })
        .await
        .context("Parser task panicked")?;

        match outcome {
            Ok(value) => parsed.push((path, value)),
            Err(e) => warn!(file = %path.display(), reason = %e, "Deliverable skipped"),
        }
    }

    Ok(parsed)
}

/// Lignes C6 de tous les classeurs du projet, appuis EDF exclus
async fn c6_rows(ctx: &JobContext<'_>) -> Result<Vec<(String, C6Row)>> {
    let paths = annexes::collect_workbooks(&ctx.config.project_root, annexes::C6_EXCLUDE)
        .context("Failed to scan project directory for C6 workbooks")?;
    let files = parse_files(paths, c6::read, ctx).await?;

    let mut rows = Vec::new();
    let mut edf = 0usize;
    for (path, file_rows) in files {
        let file = base_name(&path);
        for row in file_rows {
            if row.is_edf {
                edf += 1;
                continue;
            }
            rows.push((file.clone(), row));
        }
    }
    if edf > 0 {
        info!(count = edf, "EDF poles excluded from reconciliation");
    }
    Ok(rows)
}

/// Instantané des appuis, réutilisé entre jobs
async fn snapshot_poles(ctx: &mut JobContext<'_>) -> Result<Arc<Vec<Pole>>> {
    let key = format!("poles:{}", ctx.config.layers.poles);
    if let Some(hit) = ctx.caches.pole_snapshot(&key) {
        debug!(key = %key, "Pole snapshot cache hit");
        return Ok(hit);
    }

    let pool = ctx.require_pool()?;
    let poles =
        read::load_poles(pool, &ctx.config.layers.poles, ctx.config.strip_e_prefix).await?;
    let poles = Arc::new(poles);
    ctx.caches.put_pole_snapshot(key, Arc::clone(&poles));
    Ok(poles)
}

/// Tronçons de câbles de la zone, réutilisés entre jobs
async fn zone_cable_segments(ctx: &mut JobContext<'_>) -> Result<Arc<Vec<CableSegment>>> {
    let study_root = ctx.config.effective_study_root()?;
    let key = format!("cables:{}", study_root);
    if let Some(hit) = ctx.caches.cable_segments(&key) {
        debug!(key = %key, "Cable-segment cache hit");
        return Ok(hit);
    }

    let pool = ctx.require_pool()?;
    let segments =
        read::load_cable_segments(pool, &ctx.config.layers.cable_function, &study_root).await?;
    let segments = Arc::new(segments);
    ctx.caches.put_cable_segments(key, Arc::clone(&segments));
    Ok(segments)
}

/// Index polygonal d'une famille d'études; sur un hit de cache, la couche
/// n'est pas relue
async fn study_index(ctx: &mut JobContext<'_>, kind: StudyKind) -> Result<Arc<PolygonIndex>> {
    let table = match kind {
        StudyKind::CapFt => ctx.config.layers.capft_studies.clone(),
        StudyKind::Comac => ctx.config.layers.comac_studies.clone(),
    };

    let pool = ctx.require_pool()?;
    let (revision, count) = read::layer_signature(pool, &table).await?;
    let key = LayerKey::new(table.clone(), revision, count);

    if let Some(index) = ctx.caches.index_cache.get_polygon_index(&key) {
        return Ok(index);
    }

    let studies = read::load_studies(pool, &table, kind).await?;
    let entries: Vec<PolygonEntry> = studies
        .into_iter()
        .filter_map(|s| PolygonEntry::new(s.gid, s.name, s.polygon))
        .collect();
    Ok(ctx.caches.index_cache.polygon_index(key, || entries))
}

/// Index ponctuel des appuis, dérivé de l'instantané
fn pole_point_index(ctx: &mut JobContext<'_>, poles: &Arc<Vec<Pole>>) -> Arc<PointIndex> {
    // Le nombre d'appuis sert de proxy de révision, comme pour les couches
    let key = LayerKey::new(format!("points:{}", ctx.config.layers.poles), 0, poles.len());
    let poles = Arc::clone(poles);
    ctx.caches.index_cache.point_index(key, move || {
        poles
            .iter()
            .map(|p| PointEntry::new(p.gid, &p.point))
            .collect()
    })
}

fn check_cancel(ctx: &JobContext<'_>, processed: usize) -> Result<()> {
    if processed % CANCEL_CHECK_EVERY == 0 && ctx.cancel.is_cancelled() {
        anyhow::bail!("cancelled");
    }
    Ok(())
}

fn row_key(row: &C6Row) -> OrderKey {
    OrderKey::new(
        Fingerprint::normalise(&row.pole).render(),
        row.study.as_deref(),
        row.line,
    )
}

fn push_resolution(
    ledger: &mut Ledger,
    resolution: &crate::resolve::StudyResolution,
    poles_by_gid: &HashMap<i64, &Pole>,
) {
    for (name, gids) in &resolution.duplicate_names {
        ledger.study_duplicates.push(StudyDuplicate {
            kind: resolution.kind.as_str().to_string(),
            name: name.clone(),
            gids: gids.clone(),
        });
    }
    for containment in &resolution.multi_containments {
        // Recouvrement de polygones de noms distincts: chaque polygone
        // surnuméraire est signalé avec le polygone retenu
        for (gid, name) in containment.polygons.iter().skip(1) {
            ledger.study_duplicates.push(StudyDuplicate {
                kind: resolution.kind.as_str().to_string(),
                name: name.clone(),
                gids: vec![containment.polygons[0].0, *gid],
            });
        }
    }
    for gid in &resolution.out_of_perimeter {
        let Some(pole) = poles_by_gid.get(gid) else { continue };
        ledger.out_of_perimeter.push(OutOfPerimeterEntry {
            key: OrderKey::new(pole.fingerprint.render(), None, 0),
            gid: *gid,
            inf_num: pole.inf_num.clone(),
            kind: resolution.kind.as_str().to_string(),
        });
    }
}

/// Compare la charge câble des paires appariées et consigne les écarts
fn compare_matched_loads(
    ctx: &JobContext<'_>,
    ledger: &mut Ledger,
    matched: &[((String, C6Row), usize)],
    poles: &[Pole],
    bags: &HashMap<i64, Vec<crate::resolve::CableBinding>>,
) -> Result<()> {
    for (processed, ((_, row), pole_idx)) in matched.iter().enumerate() {
        check_cancel(ctx, processed)?;

        let pole = &poles[*pole_idx];
        let declared = row
            .cables
            .as_deref()
            .map(parse_nameplates)
            .unwrap_or_default();
        let bag = bags.get(&pole.gid);

        match bag {
            None if declared.is_empty() => {}
            None => {
                ledger.load_anomalies.push(LoadAnomaly {
                    key: row_key(row),
                    gid: Some(pole.gid),
                    issue: LoadIssue::MissingInGis,
                });
            }
            Some(bindings) => {
                let capacities: Vec<u32> = bindings.iter().map(|b| b.capacity).collect();
                let diff = compare_load(&capacities, &declared, ctx.config.capacity_rule);
                if !diff.is_ok() {
                    ledger.load_anomalies.push(LoadAnomaly {
                        key: row_key(row),
                        gid: Some(pole.gid),
                        issue: LoadIssue::Mismatch {
                            count_delta: diff.count_delta,
                            capacity: diff.capacity_mismatch,
                        },
                    });
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// police_c6: qualité du texte des annexes C6, sans base

async fn job_police_c6(ctx: &mut JobContext<'_>, progress: &BatchProgress) -> Result<JobOutput> {
    let rows = c6_rows(ctx).await?;
    progress.report(0.4);

    let mut ledger = Ledger::new();

    for (processed, (_file, row)) in rows.iter().enumerate() {
        check_cancel(ctx, processed)?;

        let Some(text) = row.cables.as_deref().map(str::trim).filter(|t| !t.is_empty())
        else {
            continue;
        };

        let plates = parse_nameplates(text);
        if plates.is_empty() {
            ledger.load_anomalies.push(LoadAnomaly {
                key: row_key(row),
                gid: None,
                issue: LoadIssue::Mismatch {
                    count_delta: 0,
                    capacity: Some(format!("unrecognised nameplate text: {}", text)),
                },
            });
            continue;
        }

        for plate in plates {
            let permitted =
                crate::rules::permitted_capacities(&plate.reference, plate.declared_capacity);
            if !permitted.contains(&plate.declared_capacity) {
                ledger.load_anomalies.push(LoadAnomaly {
                    key: row_key(row),
                    gid: None,
                    issue: LoadIssue::Mismatch {
                        count_delta: 0,
                        capacity: Some(format!(
                            "capacity {} not permitted for reference {} (permitted: {:?})",
                            plate.declared_capacity, plate.reference, permitted
                        )),
                    },
                });
            }
        }
    }

    Ok(JobOutput::ledger_only(ledger))
}

// ---------------------------------------------------------------------------
// c6_vs_bd: annexes C6 contre le référentiel, toutes études confondues

async fn job_c6_vs_bd(ctx: &mut JobContext<'_>, progress: &BatchProgress) -> Result<JobOutput> {
    let rows = c6_rows(ctx).await?;
    progress.report(0.2);

    let poles = snapshot_poles(ctx).await?;
    let index = study_index(ctx, StudyKind::CapFt).await?;
    progress.report(0.4);

    // Côté SIG: seuls les appuis dans le périmètre d'une étude participent
    let in_perimeter: Vec<usize> = poles
        .iter()
        .enumerate()
        .filter(|(_, p)| index.containing(&p.point).is_some())
        .map(|(i, _)| i)
        .collect();

    let poles_for_key = Arc::clone(&poles);
    let result = match_bags(
        rows,
        in_perimeter,
        |(_, row)| MatchKey::of(&Fingerprint::normalise(&row.pole)),
        move |i| MatchKey::of(&poles_for_key[*i].fingerprint),
    );
    progress.report(0.6);

    let mut ledger = Ledger::new();
    for ((_, row), pole_idx) in &result.matched {
        let pole = &poles[*pole_idx];
        ledger.matched.push(MatchedEntry {
            key: row_key(row),
            gid: pole.gid,
            inf_num: pole.inf_num.clone(),
        });
    }
    for (file, row) in &result.source_only {
        ledger.source_only.push(SourceOnlyEntry {
            key: row_key(row),
            raw: row.pole.clone(),
            source: format!("C6 {}", file),
        });
    }
    for pole_idx in &result.gis_only {
        let pole = &poles[*pole_idx];
        ledger.gis_only.push(GisOnlyEntry {
            key: OrderKey::new(pole.fingerprint.render(), None, 0),
            gid: pole.gid,
            inf_num: pole.inf_num.clone(),
        });
    }
    progress.report(0.7);

    // Charge câble des paires appariées
    let segments = zone_cable_segments(ctx).await?;
    let point_index = pole_point_index(ctx, &poles);
    let bags = bind_endpoints(&segments, &point_index, true);
    compare_matched_loads(ctx, &mut ledger, &result.matched, &poles, &bags)?;

    Ok(JobOutput::ledger_only(ledger))
}

// ---------------------------------------------------------------------------
// capft: rapprochement par étude + vérification des boîtiers

async fn job_capft(ctx: &mut JobContext<'_>, progress: &BatchProgress) -> Result<JobOutput> {
    let rows = c6_rows(ctx).await?;
    progress.report(0.15);

    let poles = snapshot_poles(ctx).await?;
    let index = study_index(ctx, StudyKind::CapFt).await?;
    progress.report(0.3);

    let poles_by_gid: HashMap<i64, &Pole> = poles.iter().map(|p| (p.gid, p)).collect();
    let resolution = resolve_studies(&poles, &index, StudyKind::CapFt);

    let mut ledger = Ledger::new();
    push_resolution(&mut ledger, &resolution, &poles_by_gid);
    progress.report(0.45);

    // Appariement (empreinte, étude): une différence de casse ou d'espaces
    // ne provoque jamais un raté
    let assigned: Vec<usize> = poles
        .iter()
        .enumerate()
        .filter(|(_, p)| resolution.assignments.contains_key(&p.gid))
        .map(|(i, _)| i)
        .collect();

    let poles_for_key = Arc::clone(&poles);
    let assignments = resolution.assignments.clone();
    let result = match_bags(
        rows,
        assigned,
        |(_, row)| {
            let study = row.study.as_deref()?;
            MatchKey::with_study(&Fingerprint::normalise(&row.pole), study)
        },
        move |i| {
            let pole = &poles_for_key[*i];
            let study = assignments.get(&pole.gid)?;
            MatchKey::with_study(&pole.fingerprint, study)
        },
    );
    progress.report(0.6);

    let mut key_by_gid: HashMap<i64, OrderKey> = HashMap::new();
    for ((_, row), pole_idx) in &result.matched {
        let pole = &poles[*pole_idx];
        key_by_gid.insert(pole.gid, row_key(row));
        ledger.matched.push(MatchedEntry {
            key: row_key(row),
            gid: pole.gid,
            inf_num: pole.inf_num.clone(),
        });
    }
    for (file, row) in &result.source_only {
        ledger.source_only.push(SourceOnlyEntry {
            key: row_key(row),
            raw: row.pole.clone(),
            source: format!("C6 {}", file),
        });
    }
    for pole_idx in &result.gis_only {
        let pole = &poles[*pole_idx];
        let study = resolution.assignments.get(&pole.gid).map(String::as_str);
        ledger.gis_only.push(GisOnlyEntry {
            key: OrderKey::new(pole.fingerprint.render(), study, 0),
            gid: pole.gid,
            inf_num: pole.inf_num.clone(),
        });
    }
    progress.report(0.75);

    // Boîtiers déclarés: équipement à 1 m, orphelins du périmètre
    let pool = ctx.require_pool()?;
    let boxes = read::load_boxes(pool, &ctx.config.layers.boxes).await?;
    let in_perimeter: Vec<_> = boxes
        .into_iter()
        .filter(|b| index.containing(&b.point).is_some())
        .collect();

    let declared: Vec<DeclaredBox> = result
        .matched
        .iter()
        .filter_map(|((_, row), pole_idx)| {
            let declared = row.pose_box?;
            let pole = &poles[*pole_idx];
            Some(DeclaredBox {
                pole_gid: pole.gid,
                point: pole.point,
                declared,
            })
        })
        .collect();

    let box_result = verify_boxes(&declared, &in_perimeter);
    for (pole_gid, declared) in box_result.declared_missing {
        let key = key_by_gid.get(&pole_gid).cloned().unwrap_or_default();
        ledger.box_anomalies.push(BoxAnomaly {
            key,
            issue: BoxIssue::DeclaredMissing {
                declared: format!("{:?}", declared).to_uppercase(),
            },
        });
    }
    for (gid, box_type) in box_result.orphans {
        ledger.box_anomalies.push(BoxAnomaly {
            key: OrderKey::default(),
            issue: BoxIssue::Orphan { gid, box_type },
        });
    }

    Ok(JobOutput::ledger_only(ledger))
}

// ---------------------------------------------------------------------------
// comac: règles de sécurité sur les fichiers .pcm et relevés Excel

async fn job_comac(ctx: &mut JobContext<'_>, progress: &BatchProgress) -> Result<JobOutput> {
    let zone = ctx.config.climatic_zone;
    let mut ledger = Ledger::new();

    // Fichiers .pcm: portées des lignes TCF
    let pcm_paths =
        annexes::collect_pcm(&ctx.config.project_root).context("Failed to scan for .pcm files")?;
    let pcm_files = parse_files(pcm_paths, pcm::read, ctx).await?;
    progress.report(0.25);

    for (path, study) in &pcm_files {
        let source = base_name(path);
        for line in &study.tcf_lines {
            // Capacité hors catalogue: contrôle non applicable
            let Some(capacity) = capacity_of_fo_code(&line.fo_code) else {
                debug!(file = %source, code = %line.fo_code, "FO code outside catalogue");
                continue;
            };
            let Some(max_m) = max_span_m(zone, capacity) else {
                continue;
            };
            for span in &line.spans {
                if let SpanCheck::OverBy(over_by_m) = check_span(span.length_m, capacity, zone) {
                    ledger.safety_anomalies.push(SafetyAnomaly {
                        key: OrderKey::new("", Some(study.name.as_str()), 0),
                        source: source.clone(),
                        issue: SafetyIssue::SpanOverLength {
                            length_m: span.length_m,
                            max_m,
                            over_by_m,
                            capacity,
                        },
                    });
                }
            }
        }
    }
    progress.report(0.45);

    // Relevés COMAC Excel: portées et gardes au sol par appui
    let paths = annexes::collect_workbooks(&ctx.config.project_root, &[])
        .context("Failed to scan for COMAC workbooks")?;
    let comac_files = parse_files(keep_matching(paths, COMAC_INCLUDE), comac::read, ctx).await?;

    let mut measured: Vec<(String, Fingerprint, u32)> = Vec::new();
    for (path, rows) in &comac_files {
        let source = base_name(path);
        for (processed, row) in rows.iter().enumerate() {
            check_cancel(ctx, processed)?;

            let fingerprint =
                Fingerprint::normalise_bt(&row.pole, ctx.config.strip_e_prefix);
            let key = OrderKey::new(fingerprint.render(), None, row.line);

            let capacity = row.fo_code.as_deref().and_then(capacity_of_fo_code);
            if let (Some(length_m), Some(capacity)) = (row.span_length_m, capacity) {
                if let (Some(max_m), SpanCheck::OverBy(over_by_m)) =
                    (max_span_m(zone, capacity), check_span(length_m, capacity, zone))
                {
                    ledger.safety_anomalies.push(SafetyAnomaly {
                        key: key.clone(),
                        source: source.clone(),
                        issue: SafetyIssue::SpanOverLength {
                            length_m,
                            max_m,
                            over_by_m,
                            capacity,
                        },
                    });
                }
            }
            if let Some(height_m) = row.ground_height_m {
                if let GroundCheck::ShortBy(short_by_m) = check_ground(height_m) {
                    ledger.safety_anomalies.push(SafetyAnomaly {
                        key: key.clone(),
                        source: source.clone(),
                        issue: SafetyIssue::GroundClearance {
                            height_m,
                            short_by_m,
                        },
                    });
                }
            }

            measured.push((row.pole.clone(), fingerprint, row.line));
        }
    }
    progress.report(0.7);

    // Avec base: les appuis relevés doivent exister au référentiel, et le
    // périmètre COMAC s'applique
    if ctx.pool.is_some() {
        let poles = snapshot_poles(ctx).await?;
        let index = study_index(ctx, StudyKind::Comac).await?;

        let poles_by_gid: HashMap<i64, &Pole> = poles.iter().map(|p| (p.gid, p)).collect();
        let resolution = resolve_studies(&poles, &index, StudyKind::Comac);
        push_resolution(&mut ledger, &resolution, &poles_by_gid);

        let poles_for_key = Arc::clone(&poles);
        let gis: Vec<usize> = (0..poles.len()).collect();
        let result = match_bags(
            measured,
            gis,
            |(_, fingerprint, _)| MatchKey::of(fingerprint),
            move |i| MatchKey::of(&poles_for_key[*i].fingerprint),
        );

        for ((_, fingerprint, line), pole_idx) in &result.matched {
            let pole = &poles[*pole_idx];
            ledger.matched.push(MatchedEntry {
                key: OrderKey::new(fingerprint.render(), None, *line),
                gid: pole.gid,
                inf_num: pole.inf_num.clone(),
            });
        }
        for (raw, fingerprint, line) in &result.source_only {
            ledger.source_only.push(SourceOnlyEntry {
                key: OrderKey::new(fingerprint.render(), None, *line),
                raw: raw.clone(),
                source: "COMAC".to_string(),
            });
        }
        // Les appuis SIG absents des relevés COMAC ne sont pas une anomalie:
        // un relevé ne couvre qu'une partie de la zone
    }

    Ok(JobOutput::ledger_only(ledger))
}

// ---------------------------------------------------------------------------
// c6_c3a_c7: cohérence croisée des trois annexes, sans base

async fn job_c6_c3a_c7(ctx: &mut JobContext<'_>, progress: &BatchProgress) -> Result<JobOutput> {
    let c6 = c6_rows(ctx).await?;
    progress.report(0.25);

    let all = annexes::collect_workbooks(&ctx.config.project_root, &[])
        .context("Failed to scan project directory")?;
    let c3a_files = parse_files(keep_matching(all.clone(), C3A_INCLUDE), c3a::read, ctx).await?;
    let c7_files = parse_files(keep_matching(all, C7_INCLUDE), c7::read, ctx).await?;
    progress.report(0.5);

    // Appuis à remplacer selon les commandes fermes C3A
    let mut c3a_poles: Vec<(String, u32, String)> = Vec::new();
    for (path, orders) in &c3a_files {
        let file = base_name(path);
        for order in orders {
            for pole_ref in order.poles.iter().filter(|p| p.replace) {
                c3a_poles.push((file.clone(), order.line, pole_ref.num.clone()));
            }
        }
    }

    let mut c7_poles: Vec<(String, u32, String)> = Vec::new();
    for (path, rows) in &c7_files {
        let file = base_name(path);
        for row in rows {
            c7_poles.push((file.clone(), row.line, row.pole.clone()));
        }
    }

    let mut ledger = Ledger::new();

    // Tout remplacement C3A doit avoir sa commande C7
    let c3a_vs_c7 = match_bags(
        c3a_poles,
        c7_poles.clone(),
        |(_, _, num)| MatchKey::of(&Fingerprint::normalise(num)),
        |(_, _, num)| MatchKey::of(&Fingerprint::normalise(num)),
    );
    for (file, line, num) in &c3a_vs_c7.source_only {
        ledger.source_only.push(SourceOnlyEntry {
            key: OrderKey::new(Fingerprint::normalise(num).render(), None, *line),
            raw: num.clone(),
            source: format!("C3A {} (no matching C7 order)", file),
        });
    }
    progress.report(0.75);

    // Toute commande C7 doit viser un appui déclaré en C6
    let c7_vs_c6 = match_bags(
        c7_poles,
        c6,
        |(_, _, num)| MatchKey::of(&Fingerprint::normalise(num)),
        |(_, row)| MatchKey::of(&Fingerprint::normalise(&row.pole)),
    );
    for (file, line, num) in &c7_vs_c6.source_only {
        ledger.source_only.push(SourceOnlyEntry {
            key: OrderKey::new(Fingerprint::normalise(num).render(), None, *line),
            raw: num.clone(),
            source: format!("C7 {} (no matching C6 row)", file),
        });
    }

    Ok(JobOutput::ledger_only(ledger))
}

// ---------------------------------------------------------------------------
// maj: listes FT-BT KO → plan SQL

async fn job_maj(ctx: &mut JobContext<'_>, progress: &BatchProgress) -> Result<JobOutput> {
    let paths = annexes::collect_workbooks(&ctx.config.project_root, &[])
        .context("Failed to scan for FT-BT KO workbooks")?;
    let ko_files = parse_files(keep_matching(paths, KO_INCLUDE), ftbtko::read, ctx).await?;
    progress.report(0.25);

    let poles = snapshot_poles(ctx).await?;
    let mut by_fingerprint: HashMap<&str, Vec<&Pole>> = HashMap::new();
    for pole in poles.iter() {
        if !pole.fingerprint.is_empty() {
            by_fingerprint
                .entry(pole.fingerprint.render())
                .or_default()
                .push(pole);
        }
    }
    progress.report(0.45);

    let mut ledger = Ledger::new();
    let mut ft_updates: Vec<FtUpdate> = Vec::new();
    let mut bt_updates: Vec<BtUpdate> = Vec::new();

    let resolve_row = |row: &KoRow,
                           fingerprint: Fingerprint,
                           sheet: &str,
                           file: &str,
                           ledger: &mut Ledger|
     -> Option<i64> {
        let key = OrderKey::new(fingerprint.render(), Some(row.study.as_str()), row.line);
        let candidates = by_fingerprint
            .get(fingerprint.render())
            .map(Vec::as_slice)
            .unwrap_or_default();
        match candidates {
            [pole] => {
                ledger.matched.push(MatchedEntry {
                    key,
                    gid: pole.gid,
                    inf_num: pole.inf_num.clone(),
                });
                Some(pole.gid)
            }
            [] => {
                ledger.source_only.push(SourceOnlyEntry {
                    key,
                    raw: row.pole.clone(),
                    source: format!("{} KO {} (no GIS pole)", sheet, file),
                });
                None
            }
            _ => {
                // Plusieurs appuis SIG partagent l'empreinte: aucune mise à
                // jour n'est planifiée sur une cible ambiguë
                ledger.source_only.push(SourceOnlyEntry {
                    key,
                    raw: row.pole.clone(),
                    source: format!("{} KO {} (ambiguous GIS match)", sheet, file),
                });
                None
            }
        }
    };

    for (path, file) in &ko_files {
        let name = base_name(path);
        for (processed, row) in file.ft.iter().enumerate() {
            check_cancel(ctx, processed)?;
            let fingerprint = Fingerprint::normalise(&row.pole);
            if let Some(gid) = resolve_row(row, fingerprint, "FT", &name, &mut ledger) {
                ft_updates.push(FtUpdate::from_ko_row(gid, row));
            }
        }
        for (processed, row) in file.bt.iter().enumerate() {
            check_cancel(ctx, processed)?;
            let fingerprint = Fingerprint::normalise_bt(&row.pole, ctx.config.strip_e_prefix);
            if let Some(gid) = resolve_row(row, fingerprint, "BT", &name, &mut ledger) {
                bt_updates.push(BtUpdate::from_ko_row(gid, row));
            }
        }
    }
    progress.report(0.85);

    let plan = plan_run(&ctx.config.layers.poles, &ft_updates, &bt_updates);
    info!(
        ft = ft_updates.len(),
        bt = bt_updates.len(),
        statements = plan.len(),
        "Update plan ready"
    );

    Ok(JobOutput { ledger, plan })
}
