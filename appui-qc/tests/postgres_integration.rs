//! Tests d'intégration PostgreSQL
//!
//! Ces tests nécessitent une base PostGIS disponible.
//! Configuration via variables d'environnement:
//! - PGHOST, PGPORT, PGUSER, PGPASSWORD, PGDATABASE
//!
//! Exécution:
//! ```bash
//! # Avec PostgreSQL local
//! cargo test --test postgres_integration -- --ignored
//!
//! # Avec Docker
//! docker run -d --name postgres-test -e POSTGRES_PASSWORD=test -p 5432:5432 postgis/postgis
//! PGPASSWORD=test cargo test --test postgres_integration -- --ignored
//! ```

use std::sync::atomic::AtomicBool;

use annexes::types::KoAction;
use anyhow::Result;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;

use appui_qc::update::{
    apply_updates, plan_bt_update, plan_ft_update, ApplyStatus, BtUpdate, FtUpdate,
};

const POLES_TABLE: &str = "qc.appuis";

/// Configuration de test
fn test_config() -> Config {
    let mut cfg = Config::new();
    cfg.host = Some(std::env::var("PGHOST").unwrap_or_else(|_| "localhost".into()));
    cfg.port = Some(
        std::env::var("PGPORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432),
    );
    cfg.dbname = Some(std::env::var("PGDATABASE").unwrap_or_else(|_| "appui_qc_test".into()));
    cfg.user = Some(std::env::var("PGUSER").unwrap_or_else(|_| "postgres".into()));
    cfg.password = std::env::var("PGPASSWORD").ok();
    cfg
}

/// Crée un pool de connexions de test
async fn create_test_pool() -> Result<Pool> {
    let cfg = test_config();
    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    Ok(pool)
}

/// Configure la base de test avec le schéma des appuis
async fn setup_test_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;

    client
        .batch_execute(
            r#"
            DROP SCHEMA IF EXISTS qc CASCADE;
            CREATE SCHEMA qc;

            CREATE EXTENSION IF NOT EXISTS postgis;

            CREATE TABLE qc.appuis (
                gid BIGSERIAL PRIMARY KEY,
                inf_num TEXT,
                nommage_fibees TEXT,
                etat TEXT,
                inf_type TEXT,
                inf_propri TEXT,
                inf_mat TEXT,
                noe_usage TEXT,
                dce VARCHAR(1),
                commentair TEXT,
                geom geometry(Point, 2154)
            );

            CREATE INDEX idx_appuis_inf_num ON qc.appuis(inf_num);
            "#,
        )
        .await?;

    Ok(())
}

/// Insère un appui de test et retourne son gid
async fn insert_pole(pool: &Pool, inf_num: &str, etat: &str) -> Result<i64> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "INSERT INTO qc.appuis (inf_num, etat, inf_type, inf_propri, geom) \
             VALUES ($1, $2, 'POT-FT', 'FT', ST_SetSRID(ST_MakePoint(900000, 6450000), 2154)) \
             RETURNING gid",
            &[&inf_num, &etat],
        )
        .await?;
    Ok(row.get(0))
}

/// Test de connexion basique
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_database_connection() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    let client = pool.get().await.expect("Failed to get client");

    let row = client
        .query_one("SELECT 1 as test", &[])
        .await
        .expect("Query failed");
    let value: i32 = row.get("test");
    assert_eq!(value, 1);
}

/// Test d'application d'une implantation FT
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_apply_ft_implantation() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup_test_schema(&pool)
        .await
        .expect("Failed to setup schema");

    let gid = insert_pole(&pool, "372300", "BON")
        .await
        .expect("Failed to insert pole");

    let update = FtUpdate {
        gid,
        action: KoAction::Implantation,
        replacement_material: Some("POT10".to_string()),
        private_land: true,
        aero_underground: false,
    };
    let plan = plan_ft_update(POLES_TABLE, &update);

    let cancel = AtomicBool::new(false);
    let report = apply_updates(&pool, &plan, &cancel, false)
        .await
        .expect("Apply failed");

    assert_eq!(report.status, ApplyStatus::Committed);
    assert_eq!(report.statements_executed, plan.len());
    assert!(report.rows_touched >= 2);

    // L'ancien numéro est sauvegardé puis vidé dans le même ordre SQL
    let client = pool.get().await.expect("Failed to get client");
    let row = client
        .query_one(
            "SELECT inf_num, nommage_fibees, etat, inf_type, inf_mat, commentair \
             FROM qc.appuis WHERE gid = $1",
            &[&gid],
        )
        .await
        .expect("Query failed");

    let inf_num: Option<String> = row.get("inf_num");
    let saved: Option<String> = row.get("nommage_fibees");
    let etat: Option<String> = row.get("etat");
    let inf_type: Option<String> = row.get("inf_type");
    let inf_mat: Option<String> = row.get("inf_mat");
    let commentair: Option<String> = row.get("commentair");

    assert!(inf_num.is_none());
    assert_eq!(saved.as_deref(), Some("372300"));
    assert_eq!(etat.as_deref(), Some("FT KO"));
    assert_eq!(inf_type.as_deref(), Some("POT-AC"));
    assert_eq!(inf_mat.as_deref(), Some("POT10"));
    let commentair = commentair.expect("comment expected");
    assert!(commentair.contains("ancien nommage : 372300"));
    assert!(commentair.contains("/PRIVE"));
}

/// Test d'idempotence du marqueur de commentaire
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_comment_marker_is_idempotent() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup_test_schema(&pool)
        .await
        .expect("Failed to setup schema");

    let gid = insert_pole(&pool, "372301", "BON")
        .await
        .expect("Failed to insert pole");

    let update = FtUpdate {
        gid,
        action: KoAction::Recalage,
        replacement_material: None,
        private_land: true,
        aero_underground: false,
    };
    let plan = plan_ft_update(POLES_TABLE, &update);
    let cancel = AtomicBool::new(false);

    // Deux applications successives du même plan
    for _ in 0..2 {
        let report = apply_updates(&pool, &plan, &cancel, false)
            .await
            .expect("Apply failed");
        assert_eq!(report.status, ApplyStatus::Committed);
    }

    let client = pool.get().await.expect("Failed to get client");
    let row = client
        .query_one(
            "SELECT commentair FROM qc.appuis WHERE gid = $1",
            &[&gid],
        )
        .await
        .expect("Query failed");
    let commentair: String = row.get(0);

    assert_eq!(commentair.matches("/PRIVE").count(), 1);
}

/// Test de la pose d'appui décalé en portée molle BT
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_apply_bt_soft_span_inserts_offset_pole() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup_test_schema(&pool)
        .await
        .expect("Failed to setup schema");

    let gid = insert_pole(&pool, "E000412", "BON")
        .await
        .expect("Failed to insert pole");

    let update = BtUpdate {
        gid,
        soft_span: true,
        state: "A RECALER".to_string(),
        replacement_material: None,
        private_land: false,
    };
    let plan = plan_bt_update(POLES_TABLE, &update);

    let cancel = AtomicBool::new(false);
    let report = apply_updates(&pool, &plan, &cancel, false)
        .await
        .expect("Apply failed");
    assert_eq!(report.status, ApplyStatus::Committed);

    let client = pool.get().await.expect("Failed to get client");

    let etat: String = client
        .query_one("SELECT etat FROM qc.appuis WHERE gid = $1", &[&gid])
        .await
        .expect("Query failed")
        .get(0);
    assert_eq!(etat, "PORTEE MOLLE");

    // L'appui posé est un mètre à l'est de l'original
    let offset: f64 = client
        .query_one(
            "SELECT ST_X(n.geom) - ST_X(o.geom) \
             FROM qc.appuis n, qc.appuis o \
             WHERE o.gid = $1 AND n.gid <> $1 AND n.noe_usage = 'DI'",
            &[&gid],
        )
        .await
        .expect("Query failed")
        .get(0);
    assert!((offset - 1.0).abs() < 1e-6);
}

/// Test de rollback sur annulation
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_apply_cancelled_rolls_back() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup_test_schema(&pool)
        .await
        .expect("Failed to setup schema");

    let gid = insert_pole(&pool, "372302", "BON")
        .await
        .expect("Failed to insert pole");

    let update = FtUpdate {
        gid,
        action: KoAction::Remplacement,
        replacement_material: None,
        private_land: false,
        aero_underground: false,
    };
    let plan = plan_ft_update(POLES_TABLE, &update);

    // Drapeau levé avant l'application: rien ne doit être persisté
    let cancel = AtomicBool::new(true);
    let report = apply_updates(&pool, &plan, &cancel, false)
        .await
        .expect("Apply failed");

    assert_eq!(report.status, ApplyStatus::RolledBack);
    assert_eq!(report.rows_touched, 0);
    assert!(report
        .rollback_reason
        .as_deref()
        .map(|r| r.contains("cancelled"))
        .unwrap_or(false));

    let client = pool.get().await.expect("Failed to get client");
    let etat: String = client
        .query_one("SELECT etat FROM qc.appuis WHERE gid = $1", &[&gid])
        .await
        .expect("Query failed")
        .get(0);
    assert_eq!(etat, "BON", "Rollback should restore state");
}

/// Test de rollback sur erreur SQL
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_apply_bad_statement_rolls_back_everything() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup_test_schema(&pool)
        .await
        .expect("Failed to setup schema");

    let gid = insert_pole(&pool, "372303", "BON")
        .await
        .expect("Failed to insert pole");

    let good = FtUpdate {
        gid,
        action: KoAction::Renforcement,
        replacement_material: None,
        private_land: false,
        aero_underground: false,
    };
    let mut plan = plan_ft_update(POLES_TABLE, &good);
    // Table inexistante en fin de plan: tout le run doit être annulé
    plan.extend(plan_ft_update("qc.nexiste_pas", &good));

    let cancel = AtomicBool::new(false);
    let report = apply_updates(&pool, &plan, &cancel, false)
        .await
        .expect("Apply failed");

    assert_eq!(report.status, ApplyStatus::RolledBack);
    assert!(report.rollback_reason.is_some());

    let client = pool.get().await.expect("Failed to get client");
    let etat: String = client
        .query_one("SELECT etat FROM qc.appuis WHERE gid = $1", &[&gid])
        .await
        .expect("Query failed")
        .get(0);
    assert_eq!(etat, "BON");
}

/// Test du plan vide et du mode simulation
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_empty_plan_and_dry_run_touch_nothing() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup_test_schema(&pool)
        .await
        .expect("Failed to setup schema");

    let gid = insert_pole(&pool, "372304", "BON")
        .await
        .expect("Failed to insert pole");

    let cancel = AtomicBool::new(false);

    // Plan vide: no-op sans transaction
    let report = apply_updates(&pool, &[], &cancel, false)
        .await
        .expect("Apply failed");
    assert_eq!(report.status, ApplyStatus::NothingDone);
    assert_eq!(report.statements_executed, 0);

    // Simulation: le plan est tracé, rien n'est exécuté
    let update = FtUpdate {
        gid,
        action: KoAction::Remplacement,
        replacement_material: Some("POT12".to_string()),
        private_land: false,
        aero_underground: false,
    };
    let plan = plan_ft_update(POLES_TABLE, &update);
    let report = apply_updates(&pool, &plan, &cancel, true)
        .await
        .expect("Apply failed");
    assert_eq!(report.status, ApplyStatus::NothingDone);

    let client = pool.get().await.expect("Failed to get client");
    let etat: String = client
        .query_one("SELECT etat FROM qc.appuis WHERE gid = $1", &[&gid])
        .await
        .expect("Query failed")
        .get(0);
    assert_eq!(etat, "BON");
}
