//! Résolution spatiale: appuis → études, extrémités de câbles → appuis,
//! boîtiers → appuis
//!
//! Tout le travail spatial part d'index déjà construits (`geometry::index`);
//! les résolveurs ne touchent jamais la base.

pub mod boxes;
pub mod cables;
pub mod study;

pub use boxes::{verify_boxes, BoxMatchResult, DeclaredBox, BOX_TOLERANCE_M};
pub use cables::{bind_endpoints, CableBinding, ENDPOINT_TOLERANCE_M};
pub use study::{detect_study_field, duplicate_names, resolve_studies, StudyResolution};
