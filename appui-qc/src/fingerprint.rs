//! Empreinte canonique des numéros d'appuis
//!
//! Un même appui arrive sous des formes hétérogènes selon la source: préfixé
//! (`POT-FT-372300`, `BT-4521`, `E4521`), suffixé (`372300/2`), en entier, en
//! flottant avec un `.0` parasite, avec des espaces. L'empreinte en extrait la
//! queue numérique; c'est l'identité stable utilisée par tout le moteur.

use std::fmt;

/// Empreinte canonique d'un numéro d'appui
///
/// L'empreinte vide (entrée vide ou sans chiffre) ne compare égale à rien,
/// pas même à une autre empreinte vide: deux lignes sans numéro exploitable
/// ne doivent jamais se rapprocher entre elles.
#[derive(Debug, Clone, Eq, Hash)]
pub struct Fingerprint(String);

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        !self.0.is_empty() && self.0 == other.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Préfixes retirés avant extraction de la queue numérique
const PREFIXES: &[&str] = &["POT-FT-", "POT-BT-", "POT-AC-", "FT-", "BT-", "AC-"];

impl Fingerprint {
    /// Empreinte vide (jamais égale à une autre)
    pub fn empty() -> Self {
        Fingerprint(String::new())
    }

    /// Normalise un numéro d'appui vers sa forme canonique
    ///
    /// Idempotent: `normalise(normalise(x).render()) == normalise(x)`.
    pub fn normalise(raw: &str) -> Self {
        Self::normalise_inner(raw, false)
    }

    /// Normalise un identifiant BT, avec retrait optionnel du `E` de tête
    ///
    /// Les identifiants BT arrivent parfois préfixés d'un `E` (`E4521`).
    /// Certains flux le portent, d'autres non: le choix est explicite et
    /// appartient à l'appelant (CAP-FT et COMAC le retirent). Sans retrait,
    /// le `E` fait partie de la forme canonique (`E4521` ≠ `4521`).
    pub fn normalise_bt(raw: &str, strip_e_prefix: bool) -> Self {
        Self::normalise_inner(raw, !strip_e_prefix)
    }

    fn normalise_inner(raw: &str, keep_e_prefix: bool) -> Self {
        let mut s = raw.trim().to_uppercase();

        // Suffixe après un '/' (ex: "372300/2")
        if let Some(pos) = s.find('/') {
            s.truncate(pos);
        }

        for prefix in PREFIXES {
            if let Some(stripped) = s.strip_prefix(prefix) {
                s = stripped.to_string();
                break;
            }
        }

        // Artefact flottant: "372300.0" → "372300"
        if let Some(stripped) = s.strip_suffix(".0") {
            s = stripped.to_string();
        }

        // Queue numérique: plus longue séquence de chiffres en fin de chaîne
        let digits: String = s
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        if digits.is_empty() {
            return Fingerprint(String::new());
        }

        // Les zéros de tête sont significatifs (numérotation FT):
        // on garde la chaîne telle quelle, pas de passage par un entier
        if keep_e_prefix && s == format!("E{}", digits) {
            return Fingerprint(s);
        }

        Fingerprint(digits)
    }

    /// Forme canonique (chiffres seuls), vide pour l'empreinte vide
    pub fn render(&self) -> &str {
        &self.0
    }

    /// Vraie si l'entrée n'avait pas de queue numérique
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
