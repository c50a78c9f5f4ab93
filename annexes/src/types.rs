//! Types de données pour le crate annexes

use std::str::FromStr;

/// Boîtier à poser déclaré dans une annexe C6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseBox {
    /// Point de branchement
    Pb,
    /// Point d'éclatement optique
    Peo,
}

impl FromStr for PoseBox {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PB" => Ok(PoseBox::Pb),
            "PEO" => Ok(PoseBox::Peo),
            _ => Err(()),
        }
    }
}

/// Une ligne d'annexe C6 (un appui déclaré par le bureau d'études)
#[derive(Debug, Clone)]
pub struct C6Row {
    /// Numéro de ligne dans la feuille (1-based)
    pub line: u32,

    /// Nom d'étude, après report de la dernière valeur non vide
    pub study: Option<String>,

    /// Numéro d'appui, tel que lu (la normalisation se fait côté moteur)
    pub pole: String,

    /// Texte libre des étiquettes câbles (ex: `L192.11-26P | L193.12-6P`)
    pub cables: Option<String>,

    /// Boîtier à poser (PB, PEO ou rien)
    pub pose_box: Option<PoseBox>,

    /// Appui EDF: colonne "effort disponible" vide → exclu du rapprochement
    pub is_edf: bool,
}

/// Une ligne d'annexe C7 (commande de remplacement d'appui)
#[derive(Debug, Clone)]
pub struct C7Row {
    /// Numéro de ligne dans la feuille (1-based)
    pub line: u32,

    /// Nom d'étude, après report de la dernière valeur non vide
    pub study: Option<String>,

    /// Numéro d'appui
    pub pole: String,

    /// Type de travaux demandé
    pub work_type: Option<String>,
}

/// Référence d'appui dans une commande C3A (jusqu'à deux par commande)
#[derive(Debug, Clone)]
pub struct C3aPoleRef {
    /// Type d'appui déclaré (FT, BT, ...)
    pub pole_type: String,

    /// Numéro d'appui
    pub num: String,

    /// Remplacement demandé pour cette extrémité
    pub replace: bool,
}

/// Une commande ferme d'annexe C3A
#[derive(Debug, Clone)]
pub struct C3aOrder {
    /// Numéro de ligne dans la feuille (1-based)
    pub line: u32,

    /// Appuis référencés par la commande (0 à 2)
    pub poles: Vec<C3aPoleRef>,
}

/// Une ligne de relevé COMAC Excel (un appui avec sa portée)
#[derive(Debug, Clone)]
pub struct ComacRow {
    /// Numéro de ligne dans la feuille (1-based)
    pub line: u32,

    /// Numéro d'appui (colonne A)
    pub pole: String,

    /// Longueur de la portée partant de l'appui, en mètres
    pub span_length_m: Option<f64>,

    /// Conducteur déclaré
    pub conductor: Option<String>,

    /// Code câble FO (résolu en capacité par le catalogue de règles)
    pub fo_code: Option<String>,

    /// Hauteur câble / sol, en mètres
    pub ground_height_m: Option<f64>,
}

/// Action demandée sur un appui dans la liste de travail FT-BT KO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KoAction {
    Implantation,
    Recalage,
    Remplacement,
    Renforcement,
}

impl FromStr for KoAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Tolère accents et casse ("à recaler" vs "A RECALER")
        let canon: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(crate::xlsx::strip_accent)
            .collect();
        match canon.as_str() {
            "implantation" => Ok(KoAction::Implantation),
            "recalage" => Ok(KoAction::Recalage),
            "remplacement" => Ok(KoAction::Remplacement),
            "renforcement" => Ok(KoAction::Renforcement),
            _ => Err(()),
        }
    }
}

/// Une ligne de la liste de travail FT-BT KO (feuille FT ou BT)
#[derive(Debug, Clone)]
pub struct KoRow {
    /// Numéro de ligne dans la feuille (1-based)
    pub line: u32,

    /// Nom d'étude
    pub study: String,

    /// Numéro d'appui
    pub pole: String,

    /// Action demandée
    pub action: KoAction,

    /// Matériau de remplacement (ex: POT10), si fourni
    pub replacement_material: Option<String>,

    /// Étiquette jaune posée
    pub yellow_label: bool,

    /// Appui en terrain privé
    pub private_land: bool,

    /// Transition aéro-souterraine
    pub aero_underground: bool,

    /// Portée molle (BT uniquement en pratique)
    pub soft_span: bool,
}

/// Contenu d'un fichier FT-BT KO: deux feuilles, FT et BT
#[derive(Debug, Clone, Default)]
pub struct FtBtKoFile {
    /// Lignes de la feuille FT
    pub ft: Vec<KoRow>,

    /// Lignes de la feuille BT
    pub bt: Vec<KoRow>,
}

/// Un support (appui) déclaré dans un fichier .pcm
#[derive(Debug, Clone, Default)]
pub struct PcmSupport {
    /// Identifiant du support dans l'étude
    pub id: String,

    /// Nature du support (bois, métal, béton...)
    pub nature: String,

    /// Hauteur du support, en mètres (0.0 si absent)
    pub height_m: f64,

    /// Classe mécanique (vide si absente)
    pub class: String,

    /// Hauteur de la traverse, en mètres (0.0 si absente)
    pub traverse_height_m: f64,
}

/// Une portée d'une ligne TCF
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmSpan {
    /// Longueur de la portée, en mètres
    pub length_m: f64,
}

/// Une ligne télécom (TCF) d'un fichier .pcm
#[derive(Debug, Clone, Default)]
pub struct TcfLine {
    /// Code câble FO (ex: "F24", résolu en capacité par le catalogue)
    pub fo_code: String,

    /// Portées ordonnées de la ligne
    pub spans: Vec<PcmSpan>,
}

/// Une étude COMAC parsée depuis un fichier .pcm
#[derive(Debug, Clone, Default)]
pub struct PcmStudy {
    /// Nom de l'étude (attribut racine, vide si absent)
    pub name: String,

    /// Supports de l'étude
    pub supports: Vec<PcmSupport>,

    /// Lignes télécom avec leurs portées
    pub tcf_lines: Vec<TcfLine>,
}
