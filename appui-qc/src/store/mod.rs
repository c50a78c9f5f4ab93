//! Accès au référentiel PostGIS
//!
//! `pool`: pool de connexions (lecture) et connexion sérialisée (écriture).
//! `read`: chargement des appuis, études, boîtiers et tronçons de câbles.
//!
//! La géométrie transite en WKB (`ST_AsBinary`); aucun identifiant SQL n'est
//! interpolé sans passer par `quote_ident`.

pub mod pool;
pub mod read;

pub use pool::{create_pool, create_update_pool, test_connection, DatabaseConfig, SslMode};

/// Encadre un identifiant SQL (schéma, table, colonne) de guillemets doubles
///
/// Les guillemets doubles internes sont doublés. Un identifiant qualifié
/// (`schema.table`) est cité segment par segment.
pub fn quote_ident(ident: &str) -> String {
    ident
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Échappe une valeur texte pour interpolation SQL (apostrophes doublées)
///
/// Réservé aux rares endroits sans liaison de paramètres; partout ailleurs,
/// les valeurs passent par des requêtes préparées.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("appuis"), "\"appuis\"");
        assert_eq!(quote_ident("sig.appuis"), "\"sig\".\"appuis\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("FT KO"), "'FT KO'");
        assert_eq!(quote_literal("l'appui"), "'l''appui'");
        assert_eq!(quote_literal(""), "''");
    }
}
