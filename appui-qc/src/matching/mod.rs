//! Rapprochement multi-sources
//!
//! `bag`: appariement stable de multi-ensembles indexés par empreinte.
//! `load`: comparaison de charge câble par appui (SIG vs annexes C6).

pub mod bag;
pub mod load;

pub use bag::{match_bags, BagMatch, MatchKey};
pub use load::{compare_load, parse_nameplates, CapacityRule, LoadDiff, Nameplate};
