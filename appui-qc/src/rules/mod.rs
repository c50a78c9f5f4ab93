//! Catalogue statique des règles de sécurité mécanique
//!
//! Tables issues du référentiel technique: code câble FO → capacité nominale,
//! capacités admissibles par référence de câble, portée maximale par zone
//! climatique et capacité, garde au sol minimale.

use serde::{Deserialize, Serialize};

/// Zone climatique de l'étude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClimaticZone {
    /// Zone à vent normal
    #[serde(rename = "ZVN")]
    Zvn,
    /// Zone à vent fort
    #[serde(rename = "ZVF")]
    Zvf,
}

impl std::str::FromStr for ClimaticZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ZVN" => Ok(ClimaticZone::Zvn),
            "ZVF" => Ok(ClimaticZone::Zvf),
            _ => Err(format!("Invalid climatic zone: {}. Use: ZVN, ZVF", s)),
        }
    }
}

/// Garde au sol minimale d'un câble, en mètres
pub const MIN_GROUND_CLEARANCE_M: f64 = 4.0;

/// Résultat d'un contrôle de portée
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpanCheck {
    /// Portée admissible
    Ok,
    /// Dépassement de la portée maximale, en mètres
    OverBy(f64),
}

/// Résultat d'un contrôle de garde au sol
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroundCheck {
    /// Garde au sol suffisante
    Ok,
    /// Déficit de hauteur, en mètres
    ShortBy(f64),
}

/// Capacité FO nominale d'un code câble COMAC
///
/// Les codes arrivent sous la forme `F<capacité>` ou avec un libellé complet;
/// la table couvre les capacités du catalogue, le reste tombe sur
/// l'extraction numérique.
pub fn capacity_of_fo_code(code: &str) -> Option<u32> {
    let canon = code.trim().to_uppercase();
    match canon.as_str() {
        "F6" | "FO6" => Some(6),
        "F12" | "FO12" => Some(12),
        "F24" | "FO24" => Some(24),
        "F36" | "FO36" => Some(36),
        "F48" | "FO48" => Some(48),
        "F72" | "FO72" => Some(72),
        "F96" | "FO96" => Some(96),
        "F144" | "FO144" => Some(144),
        _ => {
            // Libellés longs: "CABLE 24FO", "24 FO", ...
            let digits: String = canon.chars().filter(|c| c.is_ascii_digit()).collect();
            let n: u32 = digits.parse().ok()?;
            if matches!(n, 6 | 12 | 24 | 36 | 48 | 72 | 96 | 144) {
                Some(n)
            } else {
                None
            }
        }
    }
}

/// Capacités admissibles pour une référence de câble déclarée en C6
///
/// Certaines références couvrent plusieurs capacités physiques possibles
/// (ex: `L192.11` est livré en 24 ou 36 FO): la comparaison de charge se fait
/// sur l'ensemble admissible, pas sur une seule valeur.
pub fn permitted_capacities(reference: &str, declared: u32) -> Vec<u32> {
    let canon = reference.trim().to_uppercase();
    match canon.as_str() {
        "L192.11" => vec![24, 36],
        "L193.12" => vec![6, 12],
        "L194.01" => vec![12, 24],
        _ => {
            // Référence hors catalogue: la capacité déclarée fait foi
            vec![declared]
        }
    }
}

/// Portée maximale admissible, en mètres, par zone et capacité FO
///
/// `None` pour une capacité hors table: le contrôle est alors non applicable
/// et ne produit pas d'anomalie.
pub fn max_span_m(zone: ClimaticZone, capacity: u32) -> Option<f64> {
    let m = match (zone, capacity) {
        (ClimaticZone::Zvn, 6) => 115.0,
        (ClimaticZone::Zvn, 12) => 105.0,
        (ClimaticZone::Zvn, 24) => 90.0,
        (ClimaticZone::Zvn, 36) => 80.0,
        (ClimaticZone::Zvn, 48) => 70.0,
        (ClimaticZone::Zvn, 72) => 60.0,
        (ClimaticZone::Zvn, 96) => 52.0,
        (ClimaticZone::Zvn, 144) => 45.0,
        (ClimaticZone::Zvf, 6) => 95.0,
        (ClimaticZone::Zvf, 12) => 85.0,
        (ClimaticZone::Zvf, 24) => 72.0,
        (ClimaticZone::Zvf, 36) => 64.0,
        (ClimaticZone::Zvf, 48) => 56.0,
        (ClimaticZone::Zvf, 72) => 48.0,
        (ClimaticZone::Zvf, 96) => 42.0,
        (ClimaticZone::Zvf, 144) => 36.0,
        _ => return None,
    };
    Some(m)
}

/// Contrôle d'une portée: longueur vs maximum admissible
pub fn check_span(length_m: f64, capacity: u32, zone: ClimaticZone) -> SpanCheck {
    match max_span_m(zone, capacity) {
        Some(max) if length_m > max => SpanCheck::OverBy(length_m - max),
        _ => SpanCheck::Ok,
    }
}

/// Contrôle de garde au sol
pub fn check_ground(height_m: f64) -> GroundCheck {
    if height_m < MIN_GROUND_CLEARANCE_M {
        GroundCheck::ShortBy(MIN_GROUND_CLEARANCE_M - height_m)
    } else {
        GroundCheck::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_of_fo_code() {
        assert_eq!(capacity_of_fo_code("F24"), Some(24));
        assert_eq!(capacity_of_fo_code(" fo144 "), Some(144));
        assert_eq!(capacity_of_fo_code("CABLE 36FO"), Some(36));
        assert_eq!(capacity_of_fo_code("F999"), None);
        assert_eq!(capacity_of_fo_code(""), None);
    }

    #[test]
    fn test_permitted_capacities_alternatives() {
        assert_eq!(permitted_capacities("L192.11", 24), vec![24, 36]);
        assert_eq!(permitted_capacities("l192.11", 36), vec![24, 36]);
        // Référence inconnue: la capacité déclarée fait foi
        assert_eq!(permitted_capacities("L999.99", 48), vec![48]);
    }

    #[test]
    fn test_check_span_over() {
        // 24 FO en ZVN: max 90 m → 95 m dépasse de 5
        match check_span(95.0, 24, ClimaticZone::Zvn) {
            SpanCheck::OverBy(over) => assert!((over - 5.0).abs() < 1e-9),
            SpanCheck::Ok => panic!("expected overrun"),
        }
        assert_eq!(check_span(90.0, 24, ClimaticZone::Zvn), SpanCheck::Ok);
    }

    #[test]
    fn test_check_span_zvf_stricter() {
        assert_eq!(check_span(80.0, 24, ClimaticZone::Zvn), SpanCheck::Ok);
        assert!(matches!(
            check_span(80.0, 24, ClimaticZone::Zvf),
            SpanCheck::OverBy(_)
        ));
    }

    #[test]
    fn test_check_span_unknown_capacity_not_applicable() {
        assert_eq!(check_span(500.0, 7, ClimaticZone::Zvn), SpanCheck::Ok);
    }

    #[test]
    fn test_check_ground() {
        assert_eq!(check_ground(4.0), GroundCheck::Ok);
        assert_eq!(check_ground(5.2), GroundCheck::Ok);
        match check_ground(3.5) {
            GroundCheck::ShortBy(short) => assert!((short - 0.5).abs() < 1e-9),
            GroundCheck::Ok => panic!("expected shortfall"),
        }
    }

    #[test]
    fn test_climatic_zone_parse() {
        assert_eq!("ZVN".parse::<ClimaticZone>(), Ok(ClimaticZone::Zvn));
        assert_eq!("zvf".parse::<ClimaticZone>(), Ok(ClimaticZone::Zvf));
        assert!("ZZZ".parse::<ClimaticZone>().is_err());
    }
}
