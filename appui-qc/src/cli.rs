//! Définition et implémentation des commandes CLI
//!
//! Trois commandes:
//! - `run`: batch de jobs contre la base et les livrables
//! - `check`: jobs fichiers seuls, sans base de données
//! - `apply`: application transactionnelle du plan de mise à jour

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::jobs::{
    run_batch, BatchProgress, CancelFlag, JobContext, JobKind, JobOutcome, JobResult, RunCaches,
};
use crate::report::{self, RunSummary};
use crate::store::{create_pool, create_update_pool, test_connection, DatabaseConfig};
use crate::update::{apply_updates, ApplyStatus};

#[derive(Subcommand)]
pub enum Commands {
    /// Run the reconciliation batch against the database and deliverables
    Run {
        /// Path to the JSON run configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Jobs to run (repeatable), overriding the configuration toggles
        #[arg(short, long)]
        job: Vec<String>,
    },

    /// File-only checks, no database required
    Check {
        /// Path to the JSON run configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Apply the SQL update plan derived from the FT-BT KO worklists
    Apply {
        /// Path to the JSON run configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Print the SQL statements without executing them
        #[arg(long)]
        dry_run: bool,
    },
}

/// Jobs sans accès base: exécutables par `check`
const FILE_ONLY: &[JobKind] = &[JobKind::PoliceC6, JobKind::C6C3aC7, JobKind::Comac];

/// Exécute la commande run
pub async fn cmd_run(config_path: &Path, jobs: &[String]) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    let study_root = config.effective_study_root()?;
    let kinds = resolve_kinds(jobs, &config)?;
    if kinds.is_empty() {
        anyhow::bail!("No job enabled; check the configuration or pass --job");
    }

    let db_config = DatabaseConfig::from_env();
    println!(
        "Database: {}@{}:{}/{} (SSL: {:?})",
        db_config.user, db_config.host, db_config.port, db_config.dbname, db_config.ssl_mode
    );
    let pool = create_pool(&db_config)?;
    test_connection(&pool).await?;

    info!(
        study_root = %study_root,
        jobs = %kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", "),
        "Starting run"
    );

    let cancel = CancelFlag::new();
    spawn_cancel_watch(&cancel);

    let started = Instant::now();
    let mut caches = RunCaches::new();
    let mut ctx = JobContext {
        config: &config,
        pool: Some(&pool),
        caches: &mut caches,
        cancel: cancel.clone(),
    };
    let mut progress = BatchProgress::with_callback(
        kinds.len(),
        Box::new(|percent| info!(percent, "Batch progress")),
    );

    let results = run_batch(&mut ctx, &kinds, &mut progress).await;
    finish_run(&config, &study_root, results, started.elapsed(), &cancel).await
}

/// Exécute la commande check (fichiers seuls)
pub async fn cmd_check(config_path: &Path) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    // L'identifiant de zone ne sert ici qu'au rapport
    let study_root = config
        .effective_study_root()
        .unwrap_or_else(|_| "-".to_string());

    let kinds: Vec<JobKind> = JobKind::enabled(&config)
        .into_iter()
        .filter(|k| FILE_ONLY.contains(k))
        .collect();
    if kinds.is_empty() {
        anyhow::bail!("No file-only job enabled; check the configuration");
    }

    let cancel = CancelFlag::new();
    spawn_cancel_watch(&cancel);

    let started = Instant::now();
    let mut caches = RunCaches::new();
    let mut ctx = JobContext {
        config: &config,
        pool: None,
        caches: &mut caches,
        cancel: cancel.clone(),
    };
    let mut progress = BatchProgress::with_callback(
        kinds.len(),
        Box::new(|percent| info!(percent, "Batch progress")),
    );

    let results = run_batch(&mut ctx, &kinds, &mut progress).await;
    finish_run(&config, &study_root, results, started.elapsed(), &cancel).await
}

/// Exécute la commande apply
///
/// Le plan est reconstruit depuis les listes FT-BT KO du projet puis appliqué
/// dans une transaction unique. `--dry-run` trace le SQL sans rien exécuter.
pub async fn cmd_apply(config_path: &Path, dry_run: bool) -> Result<()> {
    let config = RunConfig::load(config_path)?;

    let db_config = DatabaseConfig::from_env();
    println!(
        "Database: {}@{}:{}/{} (SSL: {:?})",
        db_config.user, db_config.host, db_config.port, db_config.dbname, db_config.ssl_mode
    );
    // Connexion unique: l'applicateur n'a jamais deux transactions en vol
    let pool = create_update_pool(&db_config)?;
    test_connection(&pool).await?;

    let cancel = CancelFlag::new();
    spawn_cancel_watch(&cancel);

    let mut caches = RunCaches::new();
    let mut ctx = JobContext {
        config: &config,
        pool: Some(&pool),
        caches: &mut caches,
        cancel: cancel.clone(),
    };
    let mut progress = BatchProgress::new(1);

    let results = run_batch(&mut ctx, &[JobKind::Maj], &mut progress).await;
    let result = results
        .into_iter()
        .next()
        .context("The maj job produced no result")?;

    if let JobOutcome::Error(reason) = &result.outcome {
        anyhow::bail!("maj job failed: {}", reason);
    }
    if let Some(ledger) = &result.ledger {
        println!(
            "Plan: {} statements for {} matched poles ({} unmatched rows)",
            result.plan.len(),
            ledger.matched.len(),
            ledger.source_only.len()
        );
    }

    let report = apply_updates(&pool, &result.plan, cancel.as_atomic(), dry_run).await?;

    println!("\n=== Apply ===");
    println!("Status: {:?}", report.status);
    println!("Statements executed: {}", report.statements_executed);
    println!("Rows touched: {}", report.rows_touched);

    if report.status == ApplyStatus::RolledBack {
        anyhow::bail!(
            "Update transaction rolled back: {}",
            report.rollback_reason.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}

fn resolve_kinds(requested: &[String], config: &RunConfig) -> Result<Vec<JobKind>> {
    if requested.is_empty() {
        return Ok(JobKind::enabled(config));
    }
    requested
        .iter()
        .map(|s| s.parse::<JobKind>().map_err(|e| anyhow::anyhow!(e)))
        .collect()
}

/// Écoute Ctrl-C et bascule le drapeau d'annulation
fn spawn_cancel_watch(cancel: &CancelFlag) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });
}

/// Écrit les rapports puis affiche le bilan du run
async fn finish_run(
    config: &RunConfig,
    study_root: &str,
    results: Vec<JobResult>,
    duration: Duration,
    cancel: &CancelFlag,
) -> Result<()> {
    let summary = RunSummary::new(study_root, &results, duration);
    let export_dir = config.export_dir.clone();
    let cancel = cancel.clone();

    let (summary, results, written) = tokio::task::spawn_blocking(move || {
        let written = report::write_reports(&export_dir, &summary, &results, &cancel)?;
        Ok::<_, anyhow::Error>((summary, results, written))
    })
    .await
    .context("Report task panicked")??;

    println!("\n=== Run {} ===", summary.study_root);
    for job in &summary.jobs {
        println!("- {}: {}", job.job, job.outcome);
    }
    println!("Reports: {}", written.unified.display());
    info!(summary = %summary.summary(), "Run complete");

    let failed = results
        .iter()
        .filter(|r| matches!(r.outcome, JobOutcome::Error(_)))
        .count();
    if failed > 0 {
        anyhow::bail!("{} job(s) failed", failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobToggles, LayerConfig};
    use crate::rules::ClimaticZone;

    fn config_with(toggles: JobToggles) -> RunConfig {
        RunConfig {
            project_root: PathBuf::from("/data/38000-NGE-T01-SRO01"),
            export_dir: PathBuf::from("/data/export"),
            layers: LayerConfig {
                poles: "sig.appuis".into(),
                capft_studies: "sig.etudes_capft".into(),
                comac_studies: "sig.etudes_comac".into(),
                boxes: "sig.bpe".into(),
                cable_function: "cables_zone".into(),
            },
            jobs: toggles,
            climatic_zone: ClimaticZone::Zvn,
            capacity_rule: Default::default(),
            strip_e_prefix: true,
            study_root: None,
        }
    }

    #[test]
    fn test_resolve_kinds_override() {
        let config = config_with(JobToggles::default());
        let kinds =
            resolve_kinds(&["maj".to_string(), "capft".to_string()], &config).expect("parsed");
        assert_eq!(kinds, vec![JobKind::Maj, JobKind::CapFt]);

        assert!(resolve_kinds(&["demolition".to_string()], &config).is_err());
    }

    #[test]
    fn test_resolve_kinds_from_toggles() {
        let config = config_with(JobToggles::default());
        let kinds = resolve_kinds(&[], &config).expect("parsed");
        // maj est désactivé par défaut: l'application SQL passe par `apply`
        assert!(!kinds.contains(&JobKind::Maj));
        assert!(kinds.contains(&JobKind::CapFt));
    }
}
