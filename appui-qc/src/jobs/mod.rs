//! Orchestration des jobs de rapprochement
//!
//! Un job est une unité nommée; un run en enchaîne plusieurs dans l'ordre
//! demandé. Deux caches passent d'un job au suivant: les tronçons de câbles
//! de la zone (appel serveur coûteux) et l'instantané des appuis. Un cache
//! dont la clé correspond est réutilisé, jamais reconstruit.

pub mod exec;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use deadpool_postgres::Pool;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::geometry::IndexCache;
use crate::ledger::Ledger;
use crate::model::{CableSegment, Pole};
use crate::update::PlannedStatement;

/// Nombre d'enregistrements entre deux consultations du drapeau d'annulation
pub const CANCEL_CHECK_EVERY: usize = 200;

/// Les six jobs du moteur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Mise à jour: listes FT-BT KO → plan SQL
    Maj,
    /// Rapprochement CAP-FT: annexes C6 vs référentiel, par étude
    CapFt,
    /// Contrôles COMAC: fichiers .pcm et relevés Excel vs règles de sécurité
    Comac,
    /// C6 contre la base, toutes études confondues
    C6VsBd,
    /// Police des annexes C6: qualité du texte des étiquettes câbles
    PoliceC6,
    /// Croisement C6 / C3A / C7
    C6C3aC7,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Maj => "maj",
            JobKind::CapFt => "capft",
            JobKind::Comac => "comac",
            JobKind::C6VsBd => "c6_vs_bd",
            JobKind::PoliceC6 => "police_c6",
            JobKind::C6C3aC7 => "c6_c3a_c7",
        }
    }

    /// Jobs activés par la configuration, dans l'ordre d'exécution canonique
    pub fn enabled(config: &RunConfig) -> Vec<JobKind> {
        let toggles = &config.jobs;
        let mut kinds = Vec::new();
        if toggles.police_c6 {
            kinds.push(JobKind::PoliceC6);
        }
        if toggles.c6_vs_bd {
            kinds.push(JobKind::C6VsBd);
        }
        if toggles.capft {
            kinds.push(JobKind::CapFt);
        }
        if toggles.comac {
            kinds.push(JobKind::Comac);
        }
        if toggles.c6_c3a_c7 {
            kinds.push(JobKind::C6C3aC7);
        }
        if toggles.maj {
            kinds.push(JobKind::Maj);
        }
        kinds
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "maj" => Ok(JobKind::Maj),
            "capft" => Ok(JobKind::CapFt),
            "comac" => Ok(JobKind::Comac),
            "c6_vs_bd" => Ok(JobKind::C6VsBd),
            "police_c6" => Ok(JobKind::PoliceC6),
            "c6_c3a_c7" => Ok(JobKind::C6C3aC7),
            _ => Err(format!(
                "Unknown job: {}. Use: maj, capft, comac, c6_vs_bd, police_c6, c6_c3a_c7",
                s
            )),
        }
    }
}

/// Issue d'un job, exactement l'une des trois formes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Ok,
    OkWithAnomalies(usize),
    Error(String),
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Ok => write!(f, "OK"),
            JobOutcome::OkWithAnomalies(n) => write!(f, "OK with anomalies {}", n),
            JobOutcome::Error(reason) => write!(f, "Error: {}", reason),
        }
    }
}

/// Drapeau d'annulation coopératif, partageable entre tâches
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Demande l'arrêt; idempotent
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Accès au booléen partagé (applicateur SQL)
    pub fn as_atomic(&self) -> &AtomicBool {
        &self.0
    }
}

/// Progression entière sur l'ensemble du batch
///
/// La progression de chaque job est projetée dans la sous-plage
/// `[i/N, (i+1)/N]` du batch; le pourcentage émis est monotone.
pub struct BatchProgress {
    total_jobs: usize,
    current_job: usize,
    last_emitted: AtomicU8,
    callback: Option<Box<dyn Fn(u8) + Send + Sync>>,
}

impl BatchProgress {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            total_jobs: total_jobs.max(1),
            current_job: 0,
            last_emitted: AtomicU8::new(0),
            callback: None,
        }
    }

    pub fn with_callback(total_jobs: usize, callback: Box<dyn Fn(u8) + Send + Sync>) -> Self {
        Self {
            callback: Some(callback),
            ..Self::new(total_jobs)
        }
    }

    /// Entre dans la sous-plage du job d'indice `index`
    pub fn start_job(&mut self, index: usize) {
        self.current_job = index.min(self.total_jobs - 1);
        self.report(0.0);
    }

    /// Signale la progression du job courant, `fraction` dans [0, 1]
    pub fn report(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let overall = (self.current_job as f64 + fraction) / self.total_jobs as f64;
        let percent = (overall * 100.0).round() as u8;

        // Monotone: jamais de retour en arrière sur le pourcentage affiché
        let previous = self.last_emitted.fetch_max(percent, Ordering::Relaxed);
        if percent > previous {
            if let Some(callback) = &self.callback {
                callback(percent);
            }
        }
    }

    /// Pourcentage courant
    pub fn percent(&self) -> u8 {
        self.last_emitted.load(Ordering::Relaxed)
    }
}

/// Caches transmis d'un job au suivant
///
/// Les clés incluent l'identifiant de zone: un changement de zone invalide
/// naturellement l'entrée.
#[derive(Default)]
pub struct RunCaches {
    /// Index spatiaux, par couche et révision
    pub index_cache: IndexCache,

    cable_segments: Option<(String, Arc<Vec<CableSegment>>)>,
    pole_snapshot: Option<(String, Arc<Vec<Pole>>)>,
}

impl RunCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tronçons de câbles en cache, si la clé correspond
    pub fn cable_segments(&self, key: &str) -> Option<Arc<Vec<CableSegment>>> {
        self.cable_segments
            .as_ref()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| Arc::clone(v))
    }

    pub fn put_cable_segments(&mut self, key: String, segments: Arc<Vec<CableSegment>>) {
        self.cable_segments = Some((key, segments));
    }

    /// Instantané des appuis en cache, si la clé correspond
    pub fn pole_snapshot(&self, key: &str) -> Option<Arc<Vec<Pole>>> {
        self.pole_snapshot
            .as_ref()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| Arc::clone(v))
    }

    pub fn put_pole_snapshot(&mut self, key: String, poles: Arc<Vec<Pole>>) {
        self.pole_snapshot = Some((key, poles));
    }
}

/// Contexte partagé d'un run
pub struct JobContext<'a> {
    pub config: &'a RunConfig,

    /// Pool de lecture; absent en mode fichiers seuls
    pub pool: Option<&'a Pool>,

    pub caches: &'a mut RunCaches,
    pub cancel: CancelFlag,
}

impl JobContext<'_> {
    /// Pool de lecture, ou erreur explicite pour un job qui l'exige
    pub fn require_pool(&self) -> anyhow::Result<&Pool> {
        self.pool
            .ok_or_else(|| anyhow::anyhow!("This job requires a database connection"))
    }
}

/// Résultat d'un job
#[derive(Debug)]
pub struct JobResult {
    pub kind: JobKind,
    pub outcome: JobOutcome,

    /// Registre trié, absent si le job a échoué ou a été annulé
    pub ledger: Option<Ledger>,

    /// Plan SQL produit (job `maj` uniquement)
    pub plan: Vec<PlannedStatement>,
}

/// Exécute un batch ordonné de jobs
///
/// Un échec de job n'arrête pas le batch: le job suivant démarre, l'issue
/// en échec est consignée. L'annulation, elle, arrête tout.
pub async fn run_batch(
    ctx: &mut JobContext<'_>,
    kinds: &[JobKind],
    progress: &mut BatchProgress,
) -> Vec<JobResult> {
    let mut results = Vec::with_capacity(kinds.len());

    for (i, kind) in kinds.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            warn!(job = kind.as_str(), "Batch cancelled before job start");
            results.push(JobResult {
                kind: *kind,
                outcome: JobOutcome::Error("cancelled".to_string()),
                ledger: None,
                plan: Vec::new(),
            });
            continue;
        }

        progress.start_job(i);
        info!(job = kind.as_str(), "Job started");

        let result = match exec::run_job(ctx, *kind, progress).await {
            Ok(output) => {
                let mut ledger = output.ledger;
                ledger.sort();
                let outcome = match ledger.anomaly_count() {
                    0 => JobOutcome::Ok,
                    n => JobOutcome::OkWithAnomalies(n),
                };
                JobResult {
                    kind: *kind,
                    outcome,
                    ledger: Some(ledger),
                    plan: output.plan,
                }
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(job = kind.as_str(), reason = %reason, "Job failed");
                JobResult {
                    kind: *kind,
                    outcome: JobOutcome::Error(reason),
                    ledger: None,
                    plan: Vec::new(),
                }
            }
        };

        info!(job = kind.as_str(), outcome = %result.outcome, "Job finished");
        progress.report(1.0);
        results.push(result);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use crate::model::PoseMode;

    #[test]
    fn test_job_kind_round_trip() {
        for kind in [
            JobKind::Maj,
            JobKind::CapFt,
            JobKind::Comac,
            JobKind::C6VsBd,
            JobKind::PoliceC6,
            JobKind::C6C3aC7,
        ] {
            assert_eq!(kind.as_str().parse::<JobKind>(), Ok(kind));
        }
        assert!("demolition".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(JobOutcome::Ok.to_string(), "OK");
        assert_eq!(
            JobOutcome::OkWithAnomalies(3).to_string(),
            "OK with anomalies 3"
        );
        assert_eq!(
            JobOutcome::Error("no files".to_string()).to_string(),
            "Error: no files"
        );
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
        // Idempotent
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_progress_sub_ranges() {
        let mut progress = BatchProgress::new(4);
        progress.start_job(1);
        progress.report(0.5);
        // Job 1 sur 4, à mi-course: (1 + 0.5) / 4 = 37.5% → 38
        assert_eq!(progress.percent(), 38);

        progress.start_job(3);
        progress.report(1.0);
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_progress_is_monotone() {
        let mut progress = BatchProgress::new(2);
        progress.start_job(1);
        progress.report(0.8);
        let at_80 = progress.percent();
        // Une fraction en retrait n'abaisse jamais le pourcentage
        progress.report(0.2);
        assert_eq!(progress.percent(), at_80);
    }

    #[test]
    fn test_caches_key_match() {
        let mut caches = RunCaches::new();
        assert!(caches.cable_segments("38000/NGE/T01/SRO01").is_none());

        let segments = Arc::new(vec![crate::model::CableSegment {
            segment_id: 1,
            cable_gid: 1,
            capacity: 24,
            pose_mode: PoseMode::Aerial,
            polyline: vec![Point::new(0.0, 0.0)],
        }]);
        caches.put_cable_segments("38000/NGE/T01/SRO01".to_string(), Arc::clone(&segments));

        let hit = caches
            .cable_segments("38000/NGE/T01/SRO01")
            .expect("key matches");
        assert!(Arc::ptr_eq(&hit, &segments));
        // Une autre zone ne réutilise pas le cache
        assert!(caches.cable_segments("38000/NGE/T01/SRO02").is_none());
    }
}
