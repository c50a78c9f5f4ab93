//! Construction des classeurs xlsx
//!
//! Feuilles à en-tête figée, largeurs de colonnes fixes, autofiltre. Les
//! remplissages signalent la sévérité: vert pour les appariements, ambre
//! pour les écarts à instruire, rouge pour les violations dures.

use anyhow::Result;
use rust_xlsxwriter::{Format, Workbook, Worksheet};

use super::{JobSummary, RunSummary};
use crate::jobs::JobResult;
use crate::ledger::{BoxIssue, Ledger, LoadIssue, OrderKey, SafetyIssue};

pub const FILL_OK: &str = "#DCFCE7";
pub const FILL_WARN: &str = "#FEB24C";
pub const FILL_ALERT: &str = "#FC4E2A";

fn header_format() -> Format {
    Format::new().set_bold()
}

fn fill(color: &str) -> Format {
    Format::new().set_background_color(color)
}

/// Couleur de la ligne de tableau de bord d'un job
fn outcome_color(job: &JobSummary) -> &'static str {
    if job.outcome.starts_with("Error") {
        FILL_ALERT
    } else if job.anomalies() > 0 {
        FILL_WARN
    } else {
        FILL_OK
    }
}

/// Crée une feuille avec sa ligne d'en-tête figée et ses largeurs
fn sheet_with_headers<'a>(
    workbook: &'a mut Workbook,
    name: &str,
    headers: &[(&str, f64)],
) -> Result<&'a mut Worksheet> {
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(name)?;

    let format = header_format();
    for (col, (title, width)) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &format)?;
        worksheet.set_column_width(col as u16, *width)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(worksheet)
}

/// Pose l'autofiltre sur la plage remplie
fn finish_sheet(worksheet: &mut Worksheet, rows: u32, cols: u16) -> Result<()> {
    if rows > 0 && cols > 0 {
        worksheet.autofilter(0, 0, rows, cols - 1)?;
    }
    Ok(())
}

fn write_key(worksheet: &mut Worksheet, row: u32, key: &OrderKey, format: &Format) -> Result<()> {
    worksheet.write_string_with_format(row, 0, key.fingerprint.as_str(), format)?;
    worksheet.write_string_with_format(row, 1, key.study.as_str(), format)?;
    worksheet.write_number_with_format(row, 2, key.line as f64, format)?;
    Ok(())
}

/// Classeur de synthèse: le tableau de bord des jobs en feuille 0
pub fn build_dashboard(summary: &RunSummary) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let headers: &[(&str, f64)] = &[
        ("Job", 14.0),
        ("Issue", 30.0),
        ("Apparies", 11.0),
        ("Anomalies", 11.0),
        ("Source seule", 13.0),
        ("SIG seul", 11.0),
        ("Charge", 11.0),
        ("Boitiers", 11.0),
        ("Securite", 11.0),
        ("Etudes", 11.0),
        ("Hors perimetre", 15.0),
    ];
    let cols = headers.len() as u16;
    let worksheet = sheet_with_headers(&mut workbook, "Synthese", headers)?;

    for (i, job) in summary.jobs.iter().enumerate() {
        let row = (i + 1) as u32;
        let format = fill(outcome_color(job));
        worksheet.write_string_with_format(row, 0, job.job.as_str(), &format)?;
        worksheet.write_string_with_format(row, 1, job.outcome.as_str(), &format)?;
        worksheet.write_number(row, 2, job.matched as f64)?;
        worksheet.write_number(row, 3, job.anomalies() as f64)?;
        worksheet.write_number(row, 4, job.source_only as f64)?;
        worksheet.write_number(row, 5, job.gis_only as f64)?;
        worksheet.write_number(row, 6, job.load_anomalies as f64)?;
        worksheet.write_number(row, 7, job.box_anomalies as f64)?;
        worksheet.write_number(row, 8, job.safety_anomalies as f64)?;
        worksheet.write_number(row, 9, job.study_duplicates as f64)?;
        worksheet.write_number(row, 10, job.out_of_perimeter as f64)?;
    }
    finish_sheet(worksheet, summary.jobs.len() as u32, cols)?;

    Ok(workbook)
}

/// Classeur détaillé d'un job: résumé en feuille 0, une feuille par section
/// non vide du registre
pub fn build_job_workbook(result: &JobResult, ledger: &Ledger) -> Result<Workbook> {
    let mut workbook = Workbook::new();

    let summary = JobSummary::of(result);
    let worksheet = sheet_with_headers(
        &mut workbook,
        "Resume",
        &[("Job", 14.0), ("Issue", 30.0), ("Apparies", 11.0), ("Anomalies", 11.0)],
    )?;
    let format = fill(outcome_color(&summary));
    worksheet.write_string_with_format(1, 0, summary.job.as_str(), &format)?;
    worksheet.write_string_with_format(1, 1, summary.outcome.as_str(), &format)?;
    worksheet.write_number(1, 2, summary.matched as f64)?;
    worksheet.write_number(1, 3, summary.anomalies() as f64)?;

    append_ledger_sheets(&mut workbook, ledger)?;
    Ok(workbook)
}

fn append_ledger_sheets(workbook: &mut Workbook, ledger: &Ledger) -> Result<()> {
    if !ledger.matched.is_empty() {
        let headers: &[(&str, f64)] = &[
            ("Empreinte", 14.0),
            ("Etude", 20.0),
            ("Ligne", 8.0),
            ("GID", 10.0),
            ("INF_NUM", 16.0),
        ];
        let worksheet = sheet_with_headers(workbook, "Apparies", headers)?;
        let format = fill(FILL_OK);
        for (i, entry) in ledger.matched.iter().enumerate() {
            let row = (i + 1) as u32;
            write_key(worksheet, row, &entry.key, &format)?;
            worksheet.write_number(row, 3, entry.gid as f64)?;
            worksheet.write_string(row, 4, entry.inf_num.as_str())?;
        }
        finish_sheet(worksheet, ledger.matched.len() as u32, headers.len() as u16)?;
    }

    if !ledger.source_only.is_empty() {
        let headers: &[(&str, f64)] = &[
            ("Empreinte", 14.0),
            ("Etude", 20.0),
            ("Ligne", 8.0),
            ("Valeur brute", 18.0),
            ("Source", 36.0),
        ];
        let worksheet = sheet_with_headers(workbook, "Source seule", headers)?;
        let format = fill(FILL_WARN);
        for (i, entry) in ledger.source_only.iter().enumerate() {
            let row = (i + 1) as u32;
            write_key(worksheet, row, &entry.key, &format)?;
            worksheet.write_string(row, 3, entry.raw.as_str())?;
            worksheet.write_string(row, 4, entry.source.as_str())?;
        }
        finish_sheet(worksheet, ledger.source_only.len() as u32, headers.len() as u16)?;
    }

    if !ledger.gis_only.is_empty() {
        let headers: &[(&str, f64)] = &[
            ("Empreinte", 14.0),
            ("Etude", 20.0),
            ("GID", 10.0),
            ("INF_NUM", 16.0),
        ];
        let worksheet = sheet_with_headers(workbook, "SIG seul", headers)?;
        let format = fill(FILL_WARN);
        for (i, entry) in ledger.gis_only.iter().enumerate() {
            let row = (i + 1) as u32;
            worksheet.write_string_with_format(row, 0, entry.key.fingerprint.as_str(), &format)?;
            worksheet.write_string_with_format(row, 1, entry.key.study.as_str(), &format)?;
            worksheet.write_number(row, 2, entry.gid as f64)?;
            worksheet.write_string(row, 3, entry.inf_num.as_str())?;
        }
        finish_sheet(worksheet, ledger.gis_only.len() as u32, headers.len() as u16)?;
    }

    if !ledger.load_anomalies.is_empty() {
        let headers: &[(&str, f64)] = &[
            ("Empreinte", 14.0),
            ("Etude", 20.0),
            ("Ligne", 8.0),
            ("GID", 10.0),
            ("Ecart nombre", 13.0),
            ("Detail", 50.0),
        ];
        let worksheet = sheet_with_headers(workbook, "Charge cables", headers)?;
        for (i, entry) in ledger.load_anomalies.iter().enumerate() {
            let row = (i + 1) as u32;
            let (color, delta, detail) = match &entry.issue {
                LoadIssue::MissingInGis => {
                    (FILL_ALERT, None, "declared in C6, no GIS cable bag".to_string())
                }
                LoadIssue::Mismatch { count_delta, capacity } => (
                    FILL_WARN,
                    Some(*count_delta),
                    capacity.clone().unwrap_or_default(),
                ),
            };
            let format = fill(color);
            write_key(worksheet, row, &entry.key, &format)?;
            if let Some(gid) = entry.gid {
                worksheet.write_number(row, 3, gid as f64)?;
            }
            if let Some(delta) = delta {
                worksheet.write_number(row, 4, delta as f64)?;
            }
            worksheet.write_string(row, 5, detail)?;
        }
        finish_sheet(worksheet, ledger.load_anomalies.len() as u32, headers.len() as u16)?;
    }

    if !ledger.box_anomalies.is_empty() {
        let headers: &[(&str, f64)] = &[
            ("Empreinte", 14.0),
            ("Etude", 20.0),
            ("Ligne", 8.0),
            ("Anomalie", 20.0),
            ("Detail", 30.0),
        ];
        let worksheet = sheet_with_headers(workbook, "Boitiers", headers)?;
        let format = fill(FILL_WARN);
        for (i, entry) in ledger.box_anomalies.iter().enumerate() {
            let row = (i + 1) as u32;
            write_key(worksheet, row, &entry.key, &format)?;
            match &entry.issue {
                BoxIssue::DeclaredMissing { declared } => {
                    worksheet.write_string(row, 3, "declared, not in GIS")?;
                    worksheet.write_string(row, 4, declared.as_str())?;
                }
                BoxIssue::Orphan { gid, box_type } => {
                    worksheet.write_string(row, 3, "GIS box without declaration")?;
                    worksheet.write_string(row, 4, format!("gid={} {}", gid, box_type))?;
                }
            }
        }
        finish_sheet(worksheet, ledger.box_anomalies.len() as u32, headers.len() as u16)?;
    }

    if !ledger.safety_anomalies.is_empty() {
        let headers: &[(&str, f64)] = &[
            ("Empreinte", 14.0),
            ("Etude", 20.0),
            ("Ligne", 8.0),
            ("Source", 30.0),
            ("Anomalie", 22.0),
            ("Mesure (m)", 12.0),
            ("Limite (m)", 12.0),
            ("Ecart (m)", 12.0),
        ];
        let worksheet = sheet_with_headers(workbook, "Securite", headers)?;
        let format = fill(FILL_ALERT);
        for (i, entry) in ledger.safety_anomalies.iter().enumerate() {
            let row = (i + 1) as u32;
            write_key(worksheet, row, &entry.key, &format)?;
            worksheet.write_string(row, 3, entry.source.as_str())?;
            match &entry.issue {
                SafetyIssue::SpanOverLength { length_m, max_m, over_by_m, capacity } => {
                    worksheet
                        .write_string(row, 4, format!("span over length ({} FO)", capacity))?;
                    worksheet.write_number(row, 5, *length_m)?;
                    worksheet.write_number(row, 6, *max_m)?;
                    worksheet.write_number(row, 7, *over_by_m)?;
                }
                SafetyIssue::GroundClearance { height_m, short_by_m } => {
                    worksheet.write_string(row, 4, "ground clearance")?;
                    worksheet.write_number(row, 5, *height_m)?;
                    worksheet.write_number(row, 6, crate::rules::MIN_GROUND_CLEARANCE_M)?;
                    worksheet.write_number(row, 7, *short_by_m)?;
                }
            }
        }
        finish_sheet(worksheet, ledger.safety_anomalies.len() as u32, headers.len() as u16)?;
    }

    if !ledger.study_duplicates.is_empty() {
        let headers: &[(&str, f64)] =
            &[("Famille", 12.0), ("Nom", 28.0), ("GIDs", 30.0)];
        let worksheet = sheet_with_headers(workbook, "Etudes en doublon", headers)?;
        let format = fill(FILL_ALERT);
        for (i, entry) in ledger.study_duplicates.iter().enumerate() {
            let row = (i + 1) as u32;
            worksheet.write_string_with_format(row, 0, entry.kind.as_str(), &format)?;
            worksheet.write_string_with_format(row, 1, entry.name.as_str(), &format)?;
            let gids = entry
                .gids
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            worksheet.write_string(row, 2, gids)?;
        }
        finish_sheet(worksheet, ledger.study_duplicates.len() as u32, headers.len() as u16)?;
    }

    if !ledger.out_of_perimeter.is_empty() {
        let headers: &[(&str, f64)] = &[
            ("Empreinte", 14.0),
            ("GID", 10.0),
            ("INF_NUM", 16.0),
            ("Famille", 12.0),
        ];
        let worksheet = sheet_with_headers(workbook, "Hors perimetre", headers)?;
        let format = fill(FILL_WARN);
        for (i, entry) in ledger.out_of_perimeter.iter().enumerate() {
            let row = (i + 1) as u32;
            worksheet.write_string_with_format(row, 0, entry.key.fingerprint.as_str(), &format)?;
            worksheet.write_number(row, 1, entry.gid as f64)?;
            worksheet.write_string(row, 2, entry.inf_num.as_str())?;
            worksheet.write_string(row, 3, entry.kind.as_str())?;
        }
        finish_sheet(worksheet, ledger.out_of_perimeter.len() as u32, headers.len() as u16)?;
    }

    Ok(())
}
