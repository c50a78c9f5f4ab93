//! Traduction des lignes validées en ordres SQL
//!
//! Seule la table des appuis est touchée, uniquement en UPDATE, à une
//! exception près: la pose d'un appui décalé d'un mètre pour les portées
//! molles BT. Les identifiants numériques sont interpolés tels quels, les
//! valeurs texte passent en paramètres liés.

use annexes::types::{KoAction, KoRow};

use crate::store::quote_ident;

/// Un ordre SQL planifié: texte + paramètres texte liés (`$1`, `$2`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStatement {
    pub sql: String,
    pub params: Vec<String>,
}

impl PlannedStatement {
    fn new(sql: String) -> Self {
        Self { sql, params: Vec::new() }
    }

    /// Rendu lisible pour le mode `--dry-run`
    pub fn render(&self) -> String {
        let mut rendered = self.sql.clone();
        for (i, param) in self.params.iter().enumerate() {
            rendered = rendered.replace(
                &format!("${}", i + 1),
                &format!("'{}'", param.replace('\'', "''")),
            );
        }
        rendered
    }
}

/// Mise à jour validée d'un appui FT
#[derive(Debug, Clone)]
pub struct FtUpdate {
    /// Identifiant SIG de l'appui
    pub gid: i64,

    /// Action demandée par la liste de travail
    pub action: KoAction,

    /// Matériau de remplacement, si fourni
    pub replacement_material: Option<String>,

    /// Appui en terrain privé
    pub private_land: bool,

    /// Transition aéro-souterraine
    pub aero_underground: bool,
}

impl FtUpdate {
    pub fn from_ko_row(gid: i64, row: &KoRow) -> Self {
        Self {
            gid,
            action: row.action,
            replacement_material: row.replacement_material.clone(),
            private_land: row.private_land,
            aero_underground: row.aero_underground,
        }
    }
}

/// Mise à jour validée d'un appui BT
#[derive(Debug, Clone)]
pub struct BtUpdate {
    /// Identifiant SIG de l'appui
    pub gid: i64,

    /// Portée molle: court-circuite la mise à jour complète
    pub soft_span: bool,

    /// État cible (dérivé de l'action)
    pub state: String,

    /// Matériau de remplacement, si fourni
    pub replacement_material: Option<String>,

    /// Appui en terrain privé
    pub private_land: bool,
}

impl BtUpdate {
    pub fn from_ko_row(gid: i64, row: &KoRow) -> Self {
        Self {
            gid,
            soft_span: row.soft_span,
            state: state_of_action(row.action).to_string(),
            replacement_material: row.replacement_material.clone(),
            private_land: row.private_land,
        }
    }
}

/// État cible d'un appui selon l'action demandée
pub fn state_of_action(action: KoAction) -> &'static str {
    match action {
        KoAction::Implantation => "FT KO",
        KoAction::Recalage => "A RECALER",
        KoAction::Remplacement => "A REMPLACER",
        KoAction::Renforcement => "A RENFORCER",
    }
}

/// Suffixe de commentaire idempotent: ajouté seulement s'il est absent
fn append_comment_marker(table: &str, gid: i64, marker: &str) -> PlannedStatement {
    PlannedStatement {
        sql: format!(
            "UPDATE {t} SET commentair = concat(coalesce(commentair, ''), $1) \
             WHERE gid = {gid} AND (commentair IS NULL OR position($1 in upper(commentair)) = 0)",
            t = quote_ident(table),
            gid = gid
        ),
        params: vec![marker.to_string()],
    }
}

/// Planifie la mise à jour d'un appui FT
pub fn plan_ft_update(table: &str, update: &FtUpdate) -> Vec<PlannedStatement> {
    let t = quote_ident(table);
    let mut statements = Vec::new();

    match update.action {
        KoAction::Implantation => {
            // Toutes les colonnes lues dans le SET voient les valeurs
            // d'avant mise à jour: inf_num est sauvegardé puis vidé dans le
            // même ordre SQL, un trigger base réattribue ensuite le numéro.
            let mut sets = vec![
                "nommage_fibees = inf_num".to_string(),
                "etat = 'FT KO'".to_string(),
                "inf_type = 'POT-AC'".to_string(),
                "inf_propri = 'RAUV'".to_string(),
                "dce = 'O'".to_string(),
                "commentair = concat(coalesce(commentair, ''), \
                 ' POT FT (ancien nommage : ', coalesce(inf_num, ''), ' est FT KO)')"
                    .to_string(),
                "inf_num = NULL".to_string(),
            ];
            let mut params = Vec::new();
            if let Some(material) = &update.replacement_material {
                params.push(material.clone());
                sets.insert(4, format!("inf_mat = ${}", params.len()));
            }
            statements.push(PlannedStatement {
                sql: format!(
                    "UPDATE {t} SET {sets} WHERE gid = {gid}",
                    t = t,
                    sets = sets.join(", "),
                    gid = update.gid
                ),
                params,
            });
        }
        KoAction::Recalage | KoAction::Remplacement | KoAction::Renforcement => {
            let mut sets = vec![
                format!("etat = '{}'", state_of_action(update.action)),
                "dce = 'O'".to_string(),
            ];
            let mut params = Vec::new();
            if let Some(material) = &update.replacement_material {
                params.push(material.clone());
                sets.push(format!("inf_mat = ${}", params.len()));
            }
            statements.push(PlannedStatement {
                sql: format!(
                    "UPDATE {t} SET {sets} WHERE gid = {gid}",
                    t = t,
                    sets = sets.join(", "),
                    gid = update.gid
                ),
                params,
            });
        }
    }

    if update.private_land {
        statements.push(append_comment_marker(table, update.gid, "/PRIVE"));
    }
    if update.aero_underground {
        statements.push(append_comment_marker(table, update.gid, "/AEROSOUTRANSI"));
    }

    statements
}

/// Planifie la mise à jour d'un appui BT
pub fn plan_bt_update(table: &str, update: &BtUpdate) -> Vec<PlannedStatement> {
    let t = quote_ident(table);
    let mut statements = Vec::new();

    if update.soft_span {
        // Portée molle: état seul, plus la pose d'un appui décalé d'un
        // mètre vers l'est portant les attributs de portée molle
        statements.push(PlannedStatement::new(format!(
            "UPDATE {t} SET etat = 'PORTEE MOLLE' WHERE gid = {gid}",
            t = t,
            gid = update.gid
        )));
        statements.push(PlannedStatement::new(format!(
            "INSERT INTO {t} (geom, inf_type, inf_propri, etat, noe_usage) \
             SELECT ST_Translate(geom, 1.0, 0.0), inf_type, inf_propri, 'PORTEE MOLLE', 'DI' \
             FROM {t} WHERE gid = {gid}",
            t = t,
            gid = update.gid
        )));
    } else {
        let mut sets = vec![
            "inf_type = 'POT-BT'".to_string(),
            "inf_propri = 'ENEDIS'".to_string(),
            "noe_usage = 'DI'".to_string(),
            format!("etat = '{}'", state_of_action_escaped(&update.state)),
            "dce = 'O'".to_string(),
        ];
        let mut params = Vec::new();
        if let Some(material) = &update.replacement_material {
            params.push(material.clone());
            sets.push(format!("inf_mat = ${}", params.len()));
        }
        statements.push(PlannedStatement {
            sql: format!(
                "UPDATE {t} SET {sets} WHERE gid = {gid}",
                t = t,
                sets = sets.join(", "),
                gid = update.gid
            ),
            params,
        });
    }

    if update.private_land {
        statements.push(append_comment_marker(table, update.gid, "/PRIVE"));
    }

    statements
}

fn state_of_action_escaped(state: &str) -> String {
    state.replace('\'', "''")
}

/// Planifie un run complet: tous les FT puis tous les BT
pub fn plan_run(table: &str, ft: &[FtUpdate], bt: &[BtUpdate]) -> Vec<PlannedStatement> {
    let mut statements = Vec::new();
    for update in ft {
        statements.extend(plan_ft_update(table, update));
    }
    for update in bt {
        statements.extend(plan_bt_update(table, update));
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ft(gid: i64, action: KoAction) -> FtUpdate {
        FtUpdate {
            gid,
            action,
            replacement_material: None,
            private_land: false,
            aero_underground: false,
        }
    }

    #[test]
    fn test_implantation_saves_then_clears_inf_num() {
        let mut update = ft(99, KoAction::Implantation);
        update.replacement_material = Some("POT10".to_string());

        let statements = plan_ft_update("sig.appuis", &update);
        assert_eq!(statements.len(), 1);
        let sql = &statements[0].sql;

        assert!(sql.contains("nommage_fibees = inf_num"));
        assert!(sql.contains("etat = 'FT KO'"));
        assert!(sql.contains("inf_type = 'POT-AC'"));
        assert!(sql.contains("inf_propri = 'RAUV'"));
        assert!(sql.contains("dce = 'O'"));
        assert!(sql.contains("est FT KO)"));
        assert!(sql.contains("inf_mat = $1"));
        assert!(sql.contains("WHERE gid = 99"));
        // Le vidage vient après la sauvegarde et le commentaire
        let save = sql.find("nommage_fibees = inf_num").unwrap();
        let clear = sql.find("inf_num = NULL").unwrap();
        assert!(save < clear);
        assert_eq!(statements[0].params, vec!["POT10".to_string()]);
    }

    #[test]
    fn test_recalage_sets_state_only() {
        let statements = plan_ft_update("appuis", &ft(7, KoAction::Recalage));
        assert_eq!(statements.len(), 1);
        assert!(statements[0].sql.contains("etat = 'A RECALER'"));
        assert!(statements[0].sql.contains("dce = 'O'"));
        assert!(!statements[0].sql.contains("inf_mat"));
        assert!(!statements[0].sql.contains("nommage_fibees"));
    }

    #[test]
    fn test_private_land_marker_is_idempotent() {
        let mut update = ft(7, KoAction::Remplacement);
        update.private_land = true;
        update.aero_underground = true;

        let statements = plan_ft_update("appuis", &update);
        assert_eq!(statements.len(), 3);

        let private = &statements[1];
        assert_eq!(private.params, vec!["/PRIVE".to_string()]);
        // La clause WHERE exclut les commentaires portant déjà le marqueur
        assert!(private.sql.contains("position($1 in upper(commentair)) = 0"));

        let aero = &statements[2];
        assert_eq!(aero.params, vec!["/AEROSOUTRANSI".to_string()]);
    }

    #[test]
    fn test_bt_soft_span_short_circuits() {
        let update = BtUpdate {
            gid: 42,
            soft_span: true,
            state: "A RECALER".to_string(),
            replacement_material: Some("POT10".to_string()),
            private_land: false,
        };

        let statements = plan_bt_update("appuis", &update);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].sql.contains("etat = 'PORTEE MOLLE'"));
        // Pas de mise à jour complète en portée molle
        assert!(!statements[0].sql.contains("inf_mat"));
        // L'insert décale d'un mètre vers l'est
        assert!(statements[1].sql.starts_with("INSERT INTO"));
        assert!(statements[1].sql.contains("ST_Translate(geom, 1.0, 0.0)"));
    }

    #[test]
    fn test_bt_full_update() {
        let update = BtUpdate {
            gid: 42,
            soft_span: false,
            state: "A REMPLACER".to_string(),
            replacement_material: Some("POT10".to_string()),
            private_land: true,
        };

        let statements = plan_bt_update("appuis", &update);
        assert_eq!(statements.len(), 2);
        let sql = &statements[0].sql;
        assert!(sql.contains("noe_usage = 'DI'"));
        assert!(sql.contains("etat = 'A REMPLACER'"));
        assert!(sql.contains("inf_mat = $1"));
        assert_eq!(statements[1].params, vec!["/PRIVE".to_string()]);
    }

    #[test]
    fn test_render_for_dry_run() {
        let statement = PlannedStatement {
            sql: "UPDATE \"appuis\" SET inf_mat = $1 WHERE gid = 7".to_string(),
            params: vec!["POT10".to_string()],
        };
        assert_eq!(
            statement.render(),
            "UPDATE \"appuis\" SET inf_mat = 'POT10' WHERE gid = 7"
        );
    }

    #[test]
    fn test_plan_run_order() {
        let ft_updates = vec![ft(1, KoAction::Recalage)];
        let bt_updates = vec![BtUpdate {
            gid: 2,
            soft_span: false,
            state: "A RECALER".to_string(),
            replacement_material: None,
            private_land: false,
        }];

        let statements = plan_run("appuis", &ft_updates, &bt_updates);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].sql.contains("gid = 1"));
        assert!(statements[1].sql.contains("gid = 2"));
    }
}
