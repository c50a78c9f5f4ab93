//! Tests d'intégration des lecteurs de classeurs
//!
//! Les fixtures sont générées à la volée avec rust_xlsxwriter dans un dossier
//! temporaire, puis relues par les lecteurs du crate.

use std::path::PathBuf;

use rust_xlsxwriter::Workbook;
use tempfile::TempDir;

use annexes::{KoAction, PoseBox};

fn temp_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

/// Construit une annexe C6 réaliste: deux lignes de métadonnées, en-tête
/// accentué, numéros d'appuis mixtes (texte / flottant), étude en report.
fn write_c6(path: &PathBuf) {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();

    ws.write_string(0, 0, "ANNEXE C6 - Relevé terrain").unwrap();
    ws.write_string(1, 0, "Version 3.2").unwrap();

    ws.write_string(3, 0, "Etude").unwrap();
    ws.write_string(3, 1, "N° Appui").unwrap();
    ws.write_string(3, 2, "Câbles").unwrap();
    ws.write_string(3, 3, "Pose boîtier").unwrap();
    ws.write_string(3, 4, "Effort disponible").unwrap();

    // Ligne 5: appui en texte, étude fournie
    ws.write_string(4, 0, "nge-1").unwrap();
    ws.write_string(4, 1, "372300").unwrap();
    ws.write_string(4, 2, "L192.11-24P").unwrap();
    ws.write_string(4, 3, "PB").unwrap();
    ws.write_string(4, 4, "250 daN").unwrap();

    // Ligne 6: appui en flottant (artefact Excel), étude reportée
    ws.write_number(5, 1, 372301.0).unwrap();
    ws.write_string(5, 2, "L192.11-36P | L193.12-6P").unwrap();
    ws.write_string(5, 4, "180 daN").unwrap();

    // Ligne 7: effort vide → appui EDF
    ws.write_number(6, 1, 372302.0).unwrap();
    ws.write_string(6, 2, "L194.01-12P").unwrap();

    // Ligne 8: pas de numéro d'appui → abandonnée
    ws.write_string(7, 2, "L195.01-6P").unwrap();

    wb.save(path).unwrap();
}

#[test]
fn c6_reader_finds_header_and_rows() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "ANNEXE_C6_NGE1.xlsx");
    write_c6(&path);

    let rows = annexes::c6::read(&path).unwrap();
    assert_eq!(rows.len(), 3);

    assert_eq!(rows[0].pole, "372300");
    assert_eq!(rows[0].study.as_deref(), Some("NGE-1"));
    assert_eq!(rows[0].cables.as_deref(), Some("L192.11-24P"));
    assert_eq!(rows[0].pose_box, Some(PoseBox::Pb));
    assert!(!rows[0].is_edf);

    // Artefact flottant nettoyé, étude reportée depuis la ligne précédente
    assert_eq!(rows[1].pole, "372301");
    assert_eq!(rows[1].study.as_deref(), Some("NGE-1"));
    assert_eq!(rows[1].pose_box, None);

    // Effort disponible vide → EDF
    assert!(rows[2].is_edf);
}

#[test]
fn c6_reader_rejects_workbook_without_header() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "pas_une_c6.xlsx");

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.write_string(0, 0, "Inventaire").unwrap();
    ws.write_string(1, 0, "Divers").unwrap();
    wb.save(&path).unwrap();

    assert!(matches!(
        annexes::c6::read(&path),
        Err(annexes::AnnexeError::HeaderNotFound { .. })
    ));
}

#[test]
fn c7_reader_targets_commande_sheet() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "NGE1_C7.xlsx");

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Commande").unwrap();

    // En-tête en ligne 17 comme dans le modèle officiel
    ws.write_string(16, 0, "Etude").unwrap();
    ws.write_string(16, 1, "N° Appui").unwrap();
    ws.write_string(16, 2, "Type de travaux").unwrap();

    ws.write_string(17, 0, "NGE-1").unwrap();
    ws.write_number(17, 1, 372300.0).unwrap();
    ws.write_string(17, 2, "Remplacement").unwrap();

    wb.save(&path).unwrap();

    let rows = annexes::c7::read(&path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].pole, "372300");
    assert_eq!(rows[0].work_type.as_deref(), Some("Remplacement"));
}

#[test]
fn c7_reader_requires_commande_sheet() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "sans_commande.xlsx");

    let mut wb = Workbook::new();
    wb.add_worksheet();
    wb.save(&path).unwrap();

    assert!(matches!(
        annexes::c7::read(&path),
        Err(annexes::AnnexeError::MissingSheet { .. })
    ));
}

#[test]
fn c3a_reader_extracts_both_pole_refs() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "C3A_NGE1.xlsx");

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Commandes Fermes").unwrap();

    // En-tête en ligne 14
    ws.write_string(13, 0, "Type appui 1").unwrap();
    ws.write_string(13, 1, "N° appui 1").unwrap();
    ws.write_string(13, 2, "Remplacement 1").unwrap();
    ws.write_string(13, 3, "Type appui 2").unwrap();
    ws.write_string(13, 4, "N° appui 2").unwrap();
    ws.write_string(13, 5, "Remplacement 2").unwrap();

    ws.write_string(14, 0, "FT").unwrap();
    ws.write_number(14, 1, 372300.0).unwrap();
    ws.write_string(14, 2, "X").unwrap();
    ws.write_string(14, 3, "BT").unwrap();
    ws.write_string(14, 4, "E4521").unwrap();

    // Commande à un seul appui
    ws.write_string(15, 0, "FT").unwrap();
    ws.write_number(15, 1, 372301.0).unwrap();

    wb.save(&path).unwrap();

    let orders = annexes::c3a::read(&path).unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].poles.len(), 2);
    assert_eq!(orders[0].poles[0].pole_type, "FT");
    assert_eq!(orders[0].poles[0].num, "372300");
    assert!(orders[0].poles[0].replace);
    assert_eq!(orders[0].poles[1].num, "E4521");
    assert!(!orders[0].poles[1].replace);
    assert_eq!(orders[1].poles.len(), 1);
}

#[test]
fn comac_reader_scans_column_a() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "COMAC_NGE1.xlsx");

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();

    ws.write_string(0, 0, "Appui").unwrap();
    ws.write_string(0, 1, "Portée (m)").unwrap();
    ws.write_string(0, 2, "Conducteur").unwrap();
    ws.write_string(0, 3, "Câble FO").unwrap();
    ws.write_string(0, 4, "Hauteur câble/sol").unwrap();

    ws.write_number(1, 0, 372300.0).unwrap();
    ws.write_number(1, 1, 95.0).unwrap();
    ws.write_string(1, 2, "CU 14.4").unwrap();
    ws.write_string(1, 3, "F24").unwrap();
    ws.write_number(1, 4, 5.2).unwrap();

    // Hauteur en texte à virgule française
    ws.write_number(2, 0, 372301.0).unwrap();
    ws.write_string(2, 1, "42,5").unwrap();
    ws.write_string(2, 4, "3,9").unwrap();

    wb.save(&path).unwrap();

    let rows = annexes::comac::read(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].pole, "372300");
    assert_eq!(rows[0].span_length_m, Some(95.0));
    assert_eq!(rows[0].fo_code.as_deref(), Some("F24"));
    assert_eq!(rows[1].span_length_m, Some(42.5));
    assert_eq!(rows[1].ground_height_m, Some(3.9));
}

fn write_ko_sheet(ws: &mut rust_xlsxwriter::Worksheet) {
    ws.write_string(0, 0, "Etude").unwrap();
    ws.write_string(0, 1, "N° Appui").unwrap();
    ws.write_string(0, 2, "Action").unwrap();
    ws.write_string(0, 3, "Matériau").unwrap();
    ws.write_string(0, 4, "Etiquette jaune").unwrap();
    ws.write_string(0, 5, "Terrain privé").unwrap();
    ws.write_string(0, 6, "Aéro-souterrain").unwrap();
    ws.write_string(0, 7, "Portée molle").unwrap();
}

#[test]
fn ftbtko_reader_parses_both_sheets() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "FT_BT_KO_NGE1.xlsx");

    let mut wb = Workbook::new();

    let ft = wb.add_worksheet();
    ft.set_name("FT").unwrap();
    write_ko_sheet(ft);
    ft.write_string(1, 0, "NGE-1").unwrap();
    ft.write_number(1, 1, 12345.0).unwrap();
    ft.write_string(1, 2, "Implantation").unwrap();
    ft.write_string(1, 3, "POT10").unwrap();
    ft.write_string(1, 5, "X").unwrap();

    let bt = wb.add_worksheet();
    bt.set_name("BT").unwrap();
    write_ko_sheet(bt);
    bt.write_number(2, 1, 4521.0).unwrap(); // étude vide, pas de report → ignorée
    bt.write_string(2, 2, "Recalage").unwrap();
    bt.write_string(3, 0, "NGE-2").unwrap();
    bt.write_number(3, 1, 4522.0).unwrap();
    bt.write_string(3, 2, "Renforcement").unwrap();
    bt.write_string(3, 7, "X").unwrap();

    wb.save(&path).unwrap();

    let file = annexes::ftbtko::read(&path).unwrap();

    assert_eq!(file.ft.len(), 1);
    assert_eq!(file.ft[0].study, "NGE-1");
    assert_eq!(file.ft[0].pole, "12345");
    assert_eq!(file.ft[0].action, KoAction::Implantation);
    assert_eq!(file.ft[0].replacement_material.as_deref(), Some("POT10"));
    assert!(file.ft[0].private_land);
    assert!(!file.ft[0].soft_span);

    // La ligne BT sans étude (et sans report antérieur) est écartée
    assert_eq!(file.bt.len(), 1);
    assert_eq!(file.bt[0].pole, "4522");
    assert!(file.bt[0].soft_span);
}

#[test]
fn ftbtko_reader_fails_on_missing_required_column() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "FT_BT_KO_invalide.xlsx");

    let mut wb = Workbook::new();
    let ft = wb.add_worksheet();
    ft.set_name("FT").unwrap();
    // Colonne "Action" absente
    ft.write_string(0, 0, "Etude").unwrap();
    ft.write_string(0, 1, "N° Appui").unwrap();
    ft.write_string(0, 2, "Matériau").unwrap();
    ft.write_string(0, 3, "Etiquette jaune").unwrap();
    ft.write_string(0, 4, "Terrain privé").unwrap();
    ft.write_string(0, 5, "Aéro-souterrain").unwrap();
    ft.write_string(0, 6, "Portée molle").unwrap();
    let bt = wb.add_worksheet();
    bt.set_name("BT").unwrap();
    wb.save(&path).unwrap();

    match annexes::ftbtko::read(&path) {
        Err(annexes::AnnexeError::MissingColumn { column, .. }) => {
            assert_eq!(column, "action");
        }
        other => panic!("expected MissingColumn, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn collect_workbooks_filters_and_sorts() {
    let dir = TempDir::new().unwrap();
    for name in [
        "ANNEXE_C6_B.xlsx",
        "ANNEXE_C6_A.xlsx",
        "~$ANNEXE_C6_A.xlsx",
        "ANALYSE_NGE1.xlsx",
        "FicheAppui_1.xlsx",
        "NGE1_C7_v2.xlsx",
        "notes.txt",
    ] {
        std::fs::write(dir.path().join(name), b"stub").unwrap();
    }
    let sub = dir.path().join("sous_dossier");
    std::fs::create_dir(&sub).unwrap();
    std::fs::write(sub.join("ANNEXE_C6_C.xlsx"), b"stub").unwrap();

    let files = annexes::collect_workbooks(dir.path(), annexes::C6_EXCLUDE).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();

    assert_eq!(names, vec!["ANNEXE_C6_A.xlsx", "ANNEXE_C6_B.xlsx", "ANNEXE_C6_C.xlsx"]);
}
