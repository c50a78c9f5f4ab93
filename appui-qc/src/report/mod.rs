//! Écriture des rapports d'analyse
//!
//! Un classeur de synthèse (tableau de bord des jobs en feuille 0) plus un
//! classeur détaillé par job, et un résumé JSON à côté. Les fichiers sont
//! préfixés `ANALYSE_`: la collecte des livrables les écarte d'office, une
//! sortie du moteur ne redevient jamais une entrée.
//!
//! Écriture atomique: chaque fichier est produit sous un nom temporaire puis
//! renommé. Une annulation en cours de route supprime le temporaire; aucun
//! classeur partiel ne survit.

pub mod xlsx;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use tracing::info;

use crate::jobs::{CancelFlag, JobResult};

/// Résumé d'un job pour le tableau de bord et le JSON
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job: String,
    pub outcome: String,
    pub matched: usize,
    pub source_only: usize,
    pub gis_only: usize,
    pub load_anomalies: usize,
    pub box_anomalies: usize,
    pub safety_anomalies: usize,
    pub study_duplicates: usize,
    pub out_of_perimeter: usize,
}

impl JobSummary {
    fn of(result: &JobResult) -> Self {
        let empty = Default::default();
        let ledger = result.ledger.as_ref().unwrap_or(&empty);
        Self {
            job: result.kind.as_str().to_string(),
            outcome: result.outcome.to_string(),
            matched: ledger.matched.len(),
            source_only: ledger.source_only.len(),
            gis_only: ledger.gis_only.len(),
            load_anomalies: ledger.load_anomalies.len(),
            box_anomalies: ledger.box_anomalies.len(),
            safety_anomalies: ledger.safety_anomalies.len(),
            study_duplicates: ledger.study_duplicates.len(),
            out_of_perimeter: ledger.out_of_perimeter.len(),
        }
    }

    /// Total des anomalies du job
    pub fn anomalies(&self) -> usize {
        self.source_only
            + self.gis_only
            + self.load_anomalies
            + self.box_anomalies
            + self.safety_anomalies
            + self.study_duplicates
            + self.out_of_perimeter
    }
}

/// Résumé complet d'un run, sérialisé en JSON à côté de la synthèse
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Identifiant de zone (SRO) du run
    pub study_root: String,

    /// Durée totale du run
    pub duration_secs: f64,

    pub jobs: Vec<JobSummary>,
}

impl RunSummary {
    pub fn new(study_root: &str, results: &[JobResult], duration: Duration) -> Self {
        Self {
            study_root: study_root.to_string(),
            duration_secs: duration.as_secs_f64(),
            jobs: results.iter().map(JobSummary::of).collect(),
        }
    }

    /// Affichage compact pour le log de fin de run
    pub fn summary(&self) -> String {
        let anomalies: usize = self.jobs.iter().map(JobSummary::anomalies).sum();
        let matched: usize = self.jobs.iter().map(|j| j.matched).sum();
        format!(
            "{}: {} jobs, {} matched, {} anomalies in {:.2}s",
            self.study_root,
            self.jobs.len(),
            matched,
            anomalies,
            self.duration_secs
        )
    }
}

/// Fichiers produits par un run
#[derive(Debug)]
pub struct WrittenFiles {
    /// Classeur de synthèse
    pub unified: PathBuf,

    /// Classeurs détaillés, un par job avec registre
    pub per_job: Vec<PathBuf>,

    /// Résumé JSON
    pub summary_json: PathBuf,
}

/// Écrit tous les rapports d'un run
///
/// Bloquant (I/O fichier et sérialisation xlsx): à appeler depuis un worker
/// `spawn_blocking`. L'annulation est consultée entre chaque fichier.
pub fn write_reports(
    export_dir: &Path,
    summary: &RunSummary,
    results: &[JobResult],
    cancel: &CancelFlag,
) -> Result<WrittenFiles> {
    fs::create_dir_all(export_dir).context(format!(
        "Failed to create export directory: {}",
        export_dir.display()
    ))?;

    let mut unified = xlsx::build_dashboard(summary)?;
    let unified = save_atomic(&mut unified, export_dir, "ANALYSE_SYNTHESE.xlsx", cancel)?;

    let mut per_job = Vec::new();
    for result in results {
        let Some(ledger) = &result.ledger else {
            continue;
        };
        let mut workbook = xlsx::build_job_workbook(result, ledger)?;
        let name = format!("ANALYSE_{}.xlsx", result.kind.as_str().to_uppercase());
        per_job.push(save_atomic(&mut workbook, export_dir, &name, cancel)?);
    }

    let summary_json = save_json_atomic(summary, export_dir, "ANALYSE_SYNTHESE.json", cancel)?;

    info!(
        dir = %export_dir.display(),
        files = per_job.len() + 2,
        "Reports written"
    );

    Ok(WrittenFiles {
        unified,
        per_job,
        summary_json,
    })
}

/// Sauve un classeur sous un nom temporaire puis le renomme
fn save_atomic(
    workbook: &mut Workbook,
    dir: &Path,
    name: &str,
    cancel: &CancelFlag,
) -> Result<PathBuf> {
    let tmp = dir.join(format!(".{}.tmp", name));
    workbook
        .save(&tmp)
        .context(format!("Failed to write workbook {}", name))?;

    if cancel.is_cancelled() {
        let _ = fs::remove_file(&tmp);
        anyhow::bail!("cancelled");
    }

    let path = dir.join(name);
    fs::rename(&tmp, &path).context(format!("Failed to move {} into place", name))?;
    Ok(path)
}

fn save_json_atomic(
    summary: &RunSummary,
    dir: &Path,
    name: &str,
    cancel: &CancelFlag,
) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialise run summary")?;

    let tmp = dir.join(format!(".{}.tmp", name));
    fs::write(&tmp, json).context(format!("Failed to write {}", name))?;

    if cancel.is_cancelled() {
        let _ = fs::remove_file(&tmp);
        anyhow::bail!("cancelled");
    }

    let path = dir.join(name);
    fs::rename(&tmp, &path).context(format!("Failed to move {} into place", name))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobKind, JobOutcome};
    use crate::ledger::{Ledger, MatchedEntry, OrderKey, SourceOnlyEntry};

    fn result_with_ledger() -> JobResult {
        let mut ledger = Ledger::new();
        ledger.matched.push(MatchedEntry {
            key: OrderKey::new("372300", Some("S1"), 2),
            gid: 10,
            inf_num: "372300".into(),
        });
        ledger.source_only.push(SourceOnlyEntry {
            key: OrderKey::new("372399", Some("S1"), 9),
            raw: "37 23 99".into(),
            source: "C6 annexe.xlsx".into(),
        });
        JobResult {
            kind: JobKind::CapFt,
            outcome: JobOutcome::OkWithAnomalies(1),
            ledger: Some(ledger),
            plan: Vec::new(),
        }
    }

    #[test]
    fn test_job_summary_counts() {
        let summary = JobSummary::of(&result_with_ledger());
        assert_eq!(summary.job, "capft");
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.source_only, 1);
        assert_eq!(summary.anomalies(), 1);
    }

    #[test]
    fn test_run_summary_text() {
        let results = vec![result_with_ledger()];
        let summary = RunSummary::new("38000/NGE/T01/SRO01", &results, Duration::from_secs(3));
        let text = summary.summary();
        assert!(text.contains("38000/NGE/T01/SRO01"));
        assert!(text.contains("1 matched"));
        assert!(text.contains("1 anomalies"));
    }

    #[test]
    fn test_write_reports_produces_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results = vec![result_with_ledger()];
        let summary = RunSummary::new("38000/NGE/T01/SRO01", &results, Duration::from_secs(1));

        let written = write_reports(dir.path(), &summary, &results, &CancelFlag::new())
            .expect("reports written");

        assert!(written.unified.exists());
        assert!(written.summary_json.exists());
        assert_eq!(written.per_job.len(), 1);
        assert!(written.per_job[0]
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n == "ANALYSE_CAPFT.xlsx")
            .unwrap_or(false));
        // Aucun temporaire ne traîne
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_reports_cancelled_leaves_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results = vec![result_with_ledger()];
        let summary = RunSummary::new("38000/NGE/T01/SRO01", &results, Duration::from_secs(1));

        let cancel = CancelFlag::new();
        cancel.cancel();
        let outcome = write_reports(dir.path(), &summary, &results, &cancel);

        assert!(outcome.is_err());
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .collect();
        assert!(entries.is_empty());
    }
}
