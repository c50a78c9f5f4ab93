//! Appariement de multi-ensembles par empreinte
//!
//! Deux sacs — le SIG et une source terrain — sont rapprochés empreinte par
//! empreinte, en tolérant les doublons: chaque occurrence source consomme au
//! plus une occurrence SIG de même clé. L'appariement est glouton et stable
//! (ordre d'entrée respecté) pour des rapports reproductibles octet à octet.

use std::collections::{HashMap, VecDeque};

use crate::fingerprint::Fingerprint;

/// Clé effective d'appariement
///
/// L'empreinte vide ne construit pas de clé: une ligne sans numéro
/// exploitable ne se rapproche de rien. Quand le rapprochement exige aussi
/// l'accord du nom d'étude (CAP-FT), la clé porte le nom en majuscules sans
/// espaces de bord: une différence de casse ou d'espaces ne provoque jamais
/// un raté.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    fingerprint: String,
    study: Option<String>,
}

impl MatchKey {
    /// Clé sur empreinte seule; `None` si l'empreinte est vide
    pub fn of(fingerprint: &Fingerprint) -> Option<Self> {
        if fingerprint.is_empty() {
            return None;
        }
        Some(Self {
            fingerprint: fingerprint.render().to_string(),
            study: None,
        })
    }

    /// Clé (empreinte, étude); `None` si l'empreinte est vide
    pub fn with_study(fingerprint: &Fingerprint, study: &str) -> Option<Self> {
        if fingerprint.is_empty() {
            return None;
        }
        Some(Self {
            fingerprint: fingerprint.render().to_string(),
            study: Some(study.trim().to_uppercase()),
        })
    }

    /// Empreinte portée par la clé
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Étude portée par la clé, si l'appariement l'exige
    pub fn study(&self) -> Option<&str> {
        self.study.as_deref()
    }
}

/// Résultat d'un appariement de sacs
#[derive(Debug)]
pub struct BagMatch<S, G> {
    /// Paires appariées, dans l'ordre des items source
    pub matched: Vec<(S, G)>,

    /// Items source sans contrepartie SIG, dans l'ordre d'entrée
    pub source_only: Vec<S>,

    /// Items SIG sans contrepartie source, dans l'ordre d'entrée
    pub gis_only: Vec<G>,
}

/// Apparie deux sacs
///
/// Pour chaque item source (ordre d'entrée), la première occurrence SIG
/// restante de même clé est consommée. Les items sans clé (empreinte vide)
/// ne s'apparient jamais. Lois de conservation:
/// `|matched| + |source_only| == |src|` et `|matched| + |gis_only| == |gis|`.
pub fn match_bags<S, G, KS, KG>(
    src: Vec<S>,
    gis: Vec<G>,
    src_key: KS,
    gis_key: KG,
) -> BagMatch<S, G>
where
    KS: Fn(&S) -> Option<MatchKey>,
    KG: Fn(&G) -> Option<MatchKey>,
{
    // Occurrences SIG par clé, dans l'ordre d'entrée
    let mut by_key: HashMap<MatchKey, VecDeque<usize>> = HashMap::new();
    let mut gis_items: Vec<Option<G>> = Vec::with_capacity(gis.len());

    for (idx, item) in gis.into_iter().enumerate() {
        if let Some(key) = gis_key(&item) {
            by_key.entry(key).or_default().push_back(idx);
        }
        gis_items.push(Some(item));
    }

    let mut matched = Vec::new();
    let mut source_only = Vec::new();

    for item in src {
        let taken = src_key(&item)
            .and_then(|key| by_key.get_mut(&key))
            .and_then(VecDeque::pop_front);

        // Chaque index sort d'une seule file, une seule fois: le slot est
        // encore occupé
        match taken.and_then(|gis_idx| gis_items[gis_idx].take()) {
            Some(gis_item) => matched.push((item, gis_item)),
            None => source_only.push(item),
        }
    }

    let gis_only = gis_items.into_iter().flatten().collect();

    BagMatch {
        matched,
        source_only,
        gis_only,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(raw: &str) -> Option<MatchKey> {
        MatchKey::of(&Fingerprint::normalise(raw))
    }

    #[test]
    fn test_simple_match() {
        let src = vec!["372300", "372301", "999999"];
        let gis = vec!["POT-FT-372300", "372301.0", "111111"];

        let result = match_bags(src, gis, |s| key_of(s), |g| key_of(g));

        assert_eq!(result.matched.len(), 2);
        assert_eq!(result.source_only, vec!["999999"]);
        assert_eq!(result.gis_only, vec!["111111"]);
    }

    #[test]
    fn test_duplicate_tolerant() {
        // Deux occurrences source, une seule côté SIG
        let src = vec!["372300", "372300"];
        let gis = vec!["372300"];

        let result = match_bags(src, gis, |s| key_of(s), |g| key_of(g));

        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.source_only.len(), 1);
        assert!(result.gis_only.is_empty());
    }

    #[test]
    fn test_conservation_laws() {
        let src = vec!["1", "2", "2", "3", "x"];
        let gis = vec!["2", "4", "1", "1"];
        let (n_src, n_gis) = (src.len(), gis.len());

        let result = match_bags(src, gis, |s| key_of(s), |g| key_of(g));

        assert_eq!(result.matched.len() + result.source_only.len(), n_src);
        assert_eq!(result.matched.len() + result.gis_only.len(), n_gis);
    }

    #[test]
    fn test_empty_fingerprint_never_matches() {
        let src = vec!["sans numero"];
        let gis = vec!["aucun chiffre"];

        let result = match_bags(src, gis, |s| key_of(s), |g| key_of(g));

        assert!(result.matched.is_empty());
        assert_eq!(result.source_only.len(), 1);
        assert_eq!(result.gis_only.len(), 1);
    }

    #[test]
    fn test_study_key_case_insensitive() {
        let fp = Fingerprint::normalise("372300");
        let a = MatchKey::with_study(&fp, "etude_x ").unwrap();
        let b = MatchKey::with_study(&fp, "ETUDE_X").unwrap();
        assert_eq!(a, b);

        let c = MatchKey::with_study(&fp, "ETUDE_Y").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_stability_first_gis_occurrence_wins() {
        // Deux occurrences SIG de même clé: la première (ordre d'entrée)
        // est consommée en premier
        let src = vec![("s", "372300")];
        let gis = vec![("g1", "372300"), ("g2", "372300")];

        let result = match_bags(src, gis, |s| key_of(s.1), |g| key_of(g.1));

        assert_eq!(result.matched[0].1 .0, "g1");
        assert_eq!(result.gis_only[0].0, "g2");
    }
}
