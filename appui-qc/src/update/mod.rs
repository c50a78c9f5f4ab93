//! Application transactionnelle des mises à jour
//!
//! Une transaction par run: la moindre erreur, l'annulation ou un dépassement
//! de délai annule tout. Aucun état partiel n'est jamais persisté.

pub mod plan;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use deadpool_postgres::{Pool, Transaction};
use tokio_postgres::types::ToSql;
use tracing::{error, info, warn};

pub use plan::{
    plan_bt_update, plan_ft_update, plan_run, state_of_action, BtUpdate, FtUpdate,
    PlannedStatement,
};

/// Délai maximal d'un ordre SQL
const STATEMENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Délai maximal du run complet
const BATCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Taille de lot entre deux consultations du drapeau d'annulation
const CANCEL_CHECK_INTERVAL: usize = 5;

/// Issue d'un run d'application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    /// Toutes les mises à jour sont persistées
    Committed,
    /// Transaction annulée, base inchangée
    RolledBack,
    /// Rien n'a été exécuté (mode simulation ou plan vide)
    NothingDone,
}

/// Rapport d'un run d'application
#[derive(Debug)]
pub struct ApplyReport {
    pub status: ApplyStatus,

    /// Ordres exécutés (avant commit ou rollback)
    pub statements_executed: usize,

    /// Lignes touchées, tous ordres confondus
    pub rows_touched: u64,

    /// Raison de l'annulation, le cas échéant
    pub rollback_reason: Option<String>,
}

/// Applique un plan de mises à jour dans une transaction unique
///
/// `dry_run` à vrai: le plan est tracé ordre par ordre, rien n'est exécuté.
/// Un plan vide est un no-op, sans même ouvrir de transaction.
pub async fn apply_updates(
    pool: &Pool,
    statements: &[PlannedStatement],
    cancel: &AtomicBool,
    dry_run: bool,
) -> Result<ApplyReport> {
    if statements.is_empty() {
        info!("Empty update plan, nothing to apply");
        return Ok(ApplyReport {
            status: ApplyStatus::NothingDone,
            statements_executed: 0,
            rows_touched: 0,
            rollback_reason: None,
        });
    }

    if dry_run {
        for statement in statements {
            info!(sql = %statement.render(), "Dry run");
        }
        return Ok(ApplyReport {
            status: ApplyStatus::NothingDone,
            statements_executed: 0,
            rows_touched: 0,
            rollback_reason: None,
        });
    }

    let mut client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    let transaction = client
        .transaction()
        .await
        .context("Failed to begin transaction")?;

    transaction
        .execute(
            &format!(
                "SET LOCAL statement_timeout = {}",
                STATEMENT_TIMEOUT.as_millis()
            ),
            &[],
        )
        .await
        .context("Failed to set statement timeout")?;

    info!(statements = statements.len(), "Starting update transaction");

    let outcome = tokio::time::timeout(
        BATCH_TIMEOUT,
        run_batch(&transaction, statements, cancel),
    )
    .await;

    match outcome {
        Ok(Ok(BatchOutcome::Completed { executed, rows })) => {
            transaction
                .commit()
                .await
                .context("Failed to commit update transaction")?;
            info!(executed, rows, "Update transaction committed");
            Ok(ApplyReport {
                status: ApplyStatus::Committed,
                statements_executed: executed,
                rows_touched: rows,
                rollback_reason: None,
            })
        }
        Ok(Ok(BatchOutcome::Cancelled { executed })) => {
            rollback(transaction, "cancelled by operator").await;
            warn!(executed, "Update transaction cancelled, rolled back");
            Ok(ApplyReport {
                status: ApplyStatus::RolledBack,
                statements_executed: executed,
                rows_touched: 0,
                rollback_reason: Some("cancelled by operator".to_string()),
            })
        }
        Ok(Err(e)) => {
            let reason = format!("{:#}", e);
            rollback(transaction, &reason).await;
            Ok(ApplyReport {
                status: ApplyStatus::RolledBack,
                statements_executed: 0,
                rows_touched: 0,
                rollback_reason: Some(reason),
            })
        }
        Err(_elapsed) => {
            let reason = format!("batch timeout after {:?}", BATCH_TIMEOUT);
            rollback(transaction, &reason).await;
            Ok(ApplyReport {
                status: ApplyStatus::RolledBack,
                statements_executed: 0,
                rows_touched: 0,
                rollback_reason: Some(reason),
            })
        }
    }
}

enum BatchOutcome {
    Completed { executed: usize, rows: u64 },
    Cancelled { executed: usize },
}

async fn run_batch(
    transaction: &Transaction<'_>,
    statements: &[PlannedStatement],
    cancel: &AtomicBool,
) -> Result<BatchOutcome> {
    let mut rows = 0u64;

    for (i, statement) in statements.iter().enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return Ok(BatchOutcome::Cancelled { executed: i });
        }

        let params: Vec<&(dyn ToSql + Sync)> = statement
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        rows += transaction
            .execute(&statement.sql, &params)
            .await
            .context(format!("Update statement failed: {}", statement.sql))?;
    }

    Ok(BatchOutcome::Completed {
        executed: statements.len(),
        rows,
    })
}

async fn rollback(transaction: Transaction<'_>, reason: &str) {
    error!(reason = %reason, "Rolling back update transaction");
    // Rollback explicite pour clarté (sinon implicite au drop)
    if let Err(e) = transaction.rollback().await {
        error!(error = %e, "Explicit rollback failed (will rollback on drop anyway)");
    }
}
