//! Spreadsheet collaborators: the `.xlsx` metadata reader and the `.xlsx`
//! report writer.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use tracing::{debug, info, warn};

use crate::contract::{MetadataRow, MetadataSource, ReportSink, UploadOutcome};
use crate::error::{MetadataError, ReportError};
use crate::metadata::REPORT_HEADERS;

pub const REPORT_SHEET_NAME: &str = "Document Upload Report";
pub const REPORT_FILE_NAME: &str = "Data.xlsx";

/// Reads the first sheet of a workbook. Row 0 is the header, column 0 the
/// document identifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxMetadataSource;

impl MetadataSource for XlsxMetadataSource {
    fn read_rows(&self, path: &Path) -> Result<Vec<MetadataRow>, MetadataError> {
        let open_err = |message: String| MetadataError::Open {
            path: path.to_path_buf(),
            message,
        };
        let mut workbook = open_workbook_auto(path).map_err(|e| open_err(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| MetadataError::EmptySheet(path.to_path_buf()))?
            .map_err(|e| open_err(e.to_string()))?;

        let mut rows = range.rows();
        let header: Vec<String> = rows
            .next()
            .ok_or_else(|| MetadataError::MissingHeader(path.to_path_buf()))?
            .iter()
            .map(|cell| cell_text(cell).trim().to_string())
            .collect();

        let mut out = Vec::new();
        for row in rows {
            let identifier = row
                .first()
                .map(|cell| cell_text(cell).trim().to_string())
                .unwrap_or_default();
            if identifier.is_empty() {
                continue;
            }
            let fields: HashMap<String, String> = row
                .iter()
                .enumerate()
                .skip(1)
                .filter_map(|(col, cell)| {
                    let name = header.get(col).filter(|name| !name.is_empty())?;
                    Some((name.clone(), cell_text(cell).trim().to_string()))
                })
                .collect();
            out.push((identifier, fields));
        }

        debug!(path = %path.display(), rows = out.len(), "Read metadata rows");
        Ok(out)
    }
}

/// Cell value as text. Whole numbers lose the `.0`; other numbers keep their
/// decimals.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Writes one row per outcome under the fixed [`REPORT_HEADERS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxReportWriter;

impl ReportSink for XlsxReportWriter {
    fn write_report(
        &self,
        outcomes: &[UploadOutcome],
        destination: &Path,
    ) -> Result<(), ReportError> {
        if outcomes.is_empty() {
            warn!(report = %destination.display(), "No metadata to generate a report");
            return Ok(());
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        build_workbook(outcomes)
            .and_then(|mut workbook| workbook.save(destination))
            .map_err(|e| ReportError::Spreadsheet(e.to_string()))?;

        info!(report = %destination.display(), rows = outcomes.len(), "Excel report generated");
        Ok(())
    }
}

fn build_workbook(outcomes: &[UploadOutcome]) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(REPORT_SHEET_NAME)?;

    let bold = Format::new().set_bold();
    for (col, header) in REPORT_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    for (i, outcome) in outcomes.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, value) in outcome.record.report_row().iter().enumerate() {
            sheet.write_string(row, col as u16, value)?;
        }
    }
    Ok(workbook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::OutcomeStatus;
    use crate::metadata::MetadataRecord;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_metadata_sheet(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let header = ["name", "doc_type", "cch_contract_no", "cch_customer_account", "cch_sim_no"];
        for (col, h) in header.iter().enumerate() {
            sheet.write_string(0, col as u16, *h).unwrap();
        }
        sheet.write_string(1, 0, " DOC-1 ").unwrap();
        sheet.write_string(1, 1, "contract").unwrap();
        sheet.write_number(1, 2, 778899.0).unwrap();
        sheet.write_string(1, 3, "1.34086595").unwrap();
        sheet.write_number(1, 4, 1.5).unwrap();
        // A row without an identifier is ignored.
        sheet.write_string(2, 1, "orphan").unwrap();
        sheet.write_string(3, 0, "DOC-2").unwrap();
        workbook.save(path).unwrap();
    }

    #[test]
    fn reads_header_keyed_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.xlsx");
        write_metadata_sheet(&path);

        let rows = XlsxMetadataSource.read_rows(&path).expect("sheet should parse");
        assert_eq!(rows.len(), 2);

        let (id, fields) = &rows[0];
        assert_eq!(id, "DOC-1");
        assert_eq!(fields["doc_type"], "contract");
        assert_eq!(fields["cch_contract_no"], "778899");
        assert_eq!(fields["cch_customer_account"], "1.34086595");
        assert_eq!(fields["cch_sim_no"], "1.5");
        assert_eq!(rows[1].0, "DOC-2");
    }

    #[test]
    fn unreadable_file_is_an_open_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        fs::write(&path, b"definitely not a zip").unwrap();

        let err = XlsxMetadataSource.read_rows(&path).unwrap_err();
        assert!(matches!(err, MetadataError::Open { .. }), "got {err:?}");
    }

    #[test]
    fn report_has_header_and_one_row_per_outcome() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("processed/01-01-2024").join(REPORT_FILE_NAME);
        let outcome = UploadOutcome {
            status: OutcomeStatus::Succeeded,
            record: MetadataRecord {
                document_id: "DOC-9".into(),
                document_type: "form".into(),
                mobile_numbers: vec!["0100".into()],
                ..Default::default()
            },
            document: PathBuf::from("DOC-9.pdf"),
            batch_folder: PathBuf::from("01-01-2024"),
            attempts: 1,
            last_failure: None,
        };

        XlsxReportWriter
            .write_report(&[outcome], &destination)
            .expect("report should be written");

        let mut workbook = open_workbook_auto(&destination).unwrap();
        let range = workbook.worksheet_range(REPORT_SHEET_NAME).unwrap();
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| r.iter().map(cell_text).collect())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "object_name");
        assert_eq!(rows[1][0], "DOC-9");
        assert_eq!(rows[1][1], "form");
        assert_eq!(rows[1][9], "0100");
    }

    #[test]
    fn empty_report_writes_nothing() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join(REPORT_FILE_NAME);
        XlsxReportWriter.write_report(&[], &destination).unwrap();
        assert!(!destination.exists());
    }
}
