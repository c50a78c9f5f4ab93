//! Entités du référentiel SIG
//!
//! Les entités sont en lecture seule dans tout le moteur de rapprochement;
//! seul l'applicateur de mises à jour (`update`) écrit, dans une transaction
//! unique.

use geo::{MultiPolygon, Point};

use crate::fingerprint::Fingerprint;

/// Type d'appui
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoleType {
    /// Appui France Télécom (porte la fibre)
    Ft,
    /// Appui basse tension (réseau électrique + fibre)
    Bt,
    /// Appui à créer (POT-AC)
    Ac,
    /// Autre / inconnu
    Other,
}

impl PoleType {
    /// Déduit le type depuis la colonne `inf_type` du référentiel
    pub fn from_inf_type(inf_type: &str) -> Self {
        let upper = inf_type.trim().to_uppercase();
        if upper.contains("AC") {
            PoleType::Ac
        } else if upper.contains("FT") {
            PoleType::Ft
        } else if upper.contains("BT") {
            PoleType::Bt
        } else {
            PoleType::Other
        }
    }
}

/// Un appui du référentiel
#[derive(Debug, Clone)]
pub struct Pole {
    /// Identifiant interne SIG (colonne `gid`)
    pub gid: i64,

    /// Identifiant textuel (colonne `inf_num`)
    pub inf_num: String,

    /// Empreinte canonique de `inf_num`
    pub fingerprint: Fingerprint,

    /// Type d'appui
    pub pole_type: PoleType,

    /// Position en CRS projeté (mètres)
    pub point: Point,

    /// État courant (colonne `etat`), si renseigné
    pub state: Option<String>,

    /// Commentaire libre (colonne `commentair`), si renseigné
    pub comment: Option<String>,
}

impl Pole {
    /// Vraie si le commentaire porte le marqueur terrain privé
    pub fn is_private_land(&self) -> bool {
        self.comment
            .as_deref()
            .map_or(false, |c| c.to_uppercase().contains("/PRIVE"))
    }
}

/// Famille de polygones d'étude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StudyKind {
    CapFt,
    Comac,
}

impl StudyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyKind::CapFt => "CAP-FT",
            StudyKind::Comac => "COMAC",
        }
    }
}

/// Un polygone d'étude
#[derive(Debug, Clone)]
pub struct StudyPolygon {
    /// Identifiant interne SIG
    pub gid: i64,

    /// Nom d'étude, majuscules, sans espaces de bord
    pub name: String,

    /// Emprise multi-anneaux
    pub polygon: MultiPolygon,

    /// Famille (CAP-FT ou COMAC)
    pub kind: StudyKind,
}

/// Mode de pose d'un tronçon de câble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseMode {
    Buried,
    Aerial,
    Facade,
}

impl PoseMode {
    /// Déduit le mode depuis la valeur texte du référentiel
    pub fn from_str_loose(raw: &str) -> Self {
        let canon = raw.trim().to_uppercase();
        if canon.contains("AER") || canon.contains("AÉR") {
            PoseMode::Aerial
        } else if canon.contains("FAC") || canon.contains("FAÇ") {
            PoseMode::Facade
        } else {
            PoseMode::Buried
        }
    }

    /// Les modes aérien et façade touchent des appuis
    pub fn touches_poles(&self) -> bool {
        matches!(self, PoseMode::Aerial | PoseMode::Facade)
    }
}

/// Un tronçon de câble retourné par la fonction serveur
#[derive(Debug, Clone)]
pub struct CableSegment {
    /// Identifiant du tronçon
    pub segment_id: i64,

    /// Identifiant du câble physique parent
    pub cable_gid: i64,

    /// Capacité FO du câble
    pub capacity: u32,

    /// Mode de pose
    pub pose_mode: PoseMode,

    /// Tracé du tronçon (sommets en CRS projeté)
    pub polyline: Vec<Point>,
}

/// Une boîte de protection d'épissure (BPE)
#[derive(Debug, Clone)]
pub struct JunctionBox {
    /// Identifiant interne SIG
    pub gid: i64,

    /// Type de boîtier (texte libre)
    pub box_type: String,

    /// Position en CRS projeté
    pub point: Point,
}
