//! Registre de rapprochement
//!
//! Conteneur en mémoire des résultats d'un job. Chaque section porte une clé
//! d'ordre stable (empreinte, étude, ligne source): deux exécutions sur les
//! mêmes entrées produisent des sorties identiques octet à octet.

use serde::Serialize;

/// Clé d'ordre stable d'une entrée de registre
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct OrderKey {
    /// Empreinte canonique (vide si l'entrée n'en porte pas)
    pub fingerprint: String,

    /// Nom d'étude en majuscules (vide si inconnu)
    pub study: String,

    /// Numéro de ligne source (0 pour les entrées purement SIG)
    pub line: u32,
}

impl OrderKey {
    pub fn new(fingerprint: impl Into<String>, study: Option<&str>, line: u32) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            study: study.map(|s| s.trim().to_uppercase()).unwrap_or_default(),
            line,
        }
    }
}

/// Un appui apparié entre la source et le SIG
#[derive(Debug, Clone, Serialize)]
pub struct MatchedEntry {
    pub key: OrderKey,

    /// Identifiant SIG de l'appui apparié
    pub gid: i64,

    /// Identifiant textuel côté SIG
    pub inf_num: String,
}

/// Un item source sans contrepartie SIG
#[derive(Debug, Clone, Serialize)]
pub struct SourceOnlyEntry {
    pub key: OrderKey,

    /// Valeur brute du numéro d'appui, telle que lue
    pub raw: String,

    /// Format source (C6, C7, C3A, COMAC, ...)
    pub source: String,
}

/// Un appui SIG sans contrepartie source
#[derive(Debug, Clone, Serialize)]
pub struct GisOnlyEntry {
    pub key: OrderKey,

    pub gid: i64,
    pub inf_num: String,
}

/// Nature d'un écart de charge câble
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LoadIssue {
    /// L'appui est déclaré en C6 mais aucun sac de câbles SIG n'existe
    MissingInGis,
    /// Écart de nombre et/ou de capacités
    Mismatch {
        /// Câbles SIG moins étiquettes déclarées
        count_delta: i64,
        /// Détail du désaccord de capacités, si présent
        capacity: Option<String>,
    },
}

/// Anomalie de charge câble sur un appui
#[derive(Debug, Clone, Serialize)]
pub struct LoadAnomaly {
    pub key: OrderKey,

    /// Identifiant SIG, si l'appui est connu du référentiel
    pub gid: Option<i64>,

    pub issue: LoadIssue,
}

/// Nature d'un écart de boîtier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BoxIssue {
    /// Boîtier déclaré en C6 sans équipement SIG à moins de la tolérance
    DeclaredMissing {
        /// Type de boîtier déclaré (PB, PEO)
        declared: String,
    },
    /// Équipement SIG dans le périmètre sans appui déclarant
    Orphan {
        gid: i64,
        box_type: String,
    },
}

/// Anomalie de boîtier
#[derive(Debug, Clone, Serialize)]
pub struct BoxAnomaly {
    pub key: OrderKey,
    pub issue: BoxIssue,
}

/// Nature d'une violation de règle de sécurité mécanique
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SafetyIssue {
    /// Portée plus longue que le maximum admissible
    SpanOverLength {
        length_m: f64,
        max_m: f64,
        over_by_m: f64,
        capacity: u32,
    },
    /// Garde au sol insuffisante
    GroundClearance {
        height_m: f64,
        short_by_m: f64,
    },
}

/// Violation de sécurité sur un appui ou une portée
#[derive(Debug, Clone, Serialize)]
pub struct SafetyAnomaly {
    pub key: OrderKey,

    /// Fichier source de la mesure (nom de base, pas le chemin complet)
    pub source: String,

    pub issue: SafetyIssue,
}

/// Doublon de nom d'étude au sein d'une même famille
#[derive(Debug, Clone, Serialize)]
pub struct StudyDuplicate {
    /// Famille de polygones (CAP-FT ou COMAC)
    pub kind: String,

    /// Nom d'étude en conflit
    pub name: String,

    /// Identifiants SIG des polygones porteurs
    pub gids: Vec<i64>,
}

/// Appui hors de tout polygone d'étude de la famille considérée
#[derive(Debug, Clone, Serialize)]
pub struct OutOfPerimeterEntry {
    pub key: OrderKey,

    pub gid: i64,
    pub inf_num: String,

    /// Famille de polygones vis-à-vis de laquelle l'appui est hors périmètre
    pub kind: String,
}

/// Registre complet d'un job de rapprochement
#[derive(Debug, Clone, Default, Serialize)]
pub struct Ledger {
    pub matched: Vec<MatchedEntry>,
    pub source_only: Vec<SourceOnlyEntry>,
    pub gis_only: Vec<GisOnlyEntry>,
    pub load_anomalies: Vec<LoadAnomaly>,
    pub box_anomalies: Vec<BoxAnomaly>,
    pub safety_anomalies: Vec<SafetyAnomaly>,
    pub study_duplicates: Vec<StudyDuplicate>,
    pub out_of_perimeter: Vec<OutOfPerimeterEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nombre total d'anomalies (tout sauf `matched`)
    pub fn anomaly_count(&self) -> usize {
        self.source_only.len()
            + self.gis_only.len()
            + self.load_anomalies.len()
            + self.box_anomalies.len()
            + self.safety_anomalies.len()
            + self.study_duplicates.len()
            + self.out_of_perimeter.len()
    }

    /// Vrai si le registre ne porte aucune entrée, appariements compris
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty() && self.anomaly_count() == 0
    }

    /// Trie chaque section sur sa clé d'ordre
    ///
    /// À appeler avant toute sérialisation: c'est ce tri qui garantit des
    /// sorties stables entre deux exécutions sur les mêmes entrées.
    pub fn sort(&mut self) {
        self.matched.sort_by(|a, b| a.key.cmp(&b.key));
        self.source_only.sort_by(|a, b| a.key.cmp(&b.key));
        self.gis_only.sort_by(|a, b| a.key.cmp(&b.key));
        self.load_anomalies.sort_by(|a, b| a.key.cmp(&b.key));
        self.box_anomalies.sort_by(|a, b| a.key.cmp(&b.key));
        self.safety_anomalies.sort_by(|a, b| a.key.cmp(&b.key));
        self.study_duplicates
            .sort_by(|a, b| (a.kind.as_str(), a.name.as_str()).cmp(&(b.kind.as_str(), b.name.as_str())));
        self.out_of_perimeter.sort_by(|a, b| a.key.cmp(&b.key));
    }

    /// Fusionne un autre registre dans celui-ci (jobs combinés)
    pub fn merge(&mut self, other: Ledger) {
        self.matched.extend(other.matched);
        self.source_only.extend(other.source_only);
        self.gis_only.extend(other.gis_only);
        self.load_anomalies.extend(other.load_anomalies);
        self.box_anomalies.extend(other.box_anomalies);
        self.safety_anomalies.extend(other.safety_anomalies);
        self.study_duplicates.extend(other.study_duplicates);
        self.out_of_perimeter.extend(other.out_of_perimeter);
    }
}
