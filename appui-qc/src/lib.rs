//! # appui-qc
//!
//! Contrôle qualité et rapprochement des appuis aériens d'un déploiement
//! FTTH: livrables de bureau d'études (annexes C6/C7/C3A, relevés COMAC,
//! listes FT-BT KO) contre le référentiel PostGIS.
//!
//! ## Features
//!
//! - Rapprochement multi-sources par empreinte d'identifiant
//! - Affectation spatiale aux polygones d'étude (R-tree, cache de session)
//! - Règles de sécurité mécanique (portées, garde au sol)
//! - Mises à jour SQL transactionnelles (une transaction par run)
//! - Rapports xlsx et résumé JSON
//!
//! ## Usage CLI
//!
//! ```bash
//! # Batch complet contre la base
//! appui-qc run --config ./run.json
//!
//! # Contrôles fichiers seuls (sans base de données)
//! appui-qc check --config ./run.json
//!
//! # Application du plan de mise à jour (simulation puis réel)
//! appui-qc apply --config ./run.json --dry-run
//! appui-qc apply --config ./run.json
//! ```

pub mod cli;
pub mod config;
pub mod fingerprint;
pub mod geometry;
pub mod jobs;
pub mod ledger;
pub mod matching;
pub mod model;
pub mod report;
pub mod resolve;
pub mod rules;
pub mod store;
pub mod update;

pub use config::RunConfig;
pub use fingerprint::Fingerprint;
pub use jobs::{run_batch, CancelFlag, JobKind, JobOutcome, JobResult};
pub use ledger::Ledger;
pub use store::{create_pool, DatabaseConfig};
