//! Spreadsheet-style CSV export of the clearance data set.

mod sheets;

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use crate::workflows::clearance::catalog::ClearanceCatalog;
use crate::workflows::clearance::domain::Student;

#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(err) => write!(f, "failed to write export: {}", err),
            ExportError::Csv(err) => write!(f, "failed to encode CSV: {}", err),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(err) => Some(err),
            ExportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// One logical sheet: a header row plus data rows of equal width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSheet {
    pub name: &'static str,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl ExportSheet {
    pub(crate) fn new(
        name: &'static str,
        headers: Vec<&'static str>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            name,
            headers,
            rows,
        }
    }

    /// `Student Overview` on 2024-01-16 becomes `Student_Overview_2024-01-16.csv`.
    pub fn file_name(&self, date: NaiveDate) -> String {
        let stem = self.name.split_whitespace().collect::<Vec<_>>().join("_");
        format!("{}_{}.csv", stem, date.format("%Y-%m-%d"))
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut csv_writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        csv_writer.write_record(&self.headers)?;
        for row in &self.rows {
            csv_writer.write_record(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn to_csv(&self) -> Result<String, ExportError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        String::from_utf8(buffer).map_err(|err| {
            ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
        })
    }
}

pub struct ClearanceExport {
    sheets: Vec<ExportSheet>,
}

impl ClearanceExport {
    pub fn build(students: &[Student], catalog: &ClearanceCatalog) -> Self {
        Self {
            sheets: vec![
                sheets::student_overview(students, catalog),
                sheets::item_returns(students, catalog),
                sheets::assigned_items(students),
                sheets::subject_materials(students),
                sheets::financial_status(students),
                sheets::approval_status(students),
            ],
        }
    }

    pub fn sheets(&self) -> &[ExportSheet] {
        &self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&ExportSheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    /// Write one file per sheet into `dir`, creating it if needed.
    pub fn write_sheets<P: AsRef<Path>>(
        &self,
        dir: P,
        date: NaiveDate,
    ) -> Result<Vec<PathBuf>, ExportError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(self.sheets.len());
        for sheet in &self.sheets {
            let path = dir.join(sheet.file_name(date));
            sheet.write_to(File::create(&path)?)?;
            info!(sheet = sheet.name, rows = sheet.rows.len(), path = %path.display(), "sheet exported");
            written.push(path);
        }
        Ok(written)
    }

    /// All sheets in a single document, each introduced by `### <name> ###`.
    pub fn combined_export(&self) -> Result<String, ExportError> {
        let mut combined = String::new();
        for (index, sheet) in self.sheets.iter().enumerate() {
            if index > 0 {
                combined.push('\n');
            }
            combined.push_str(&format!("### {} ###\n", sheet.name));
            combined.push_str(&sheet.to_csv()?);
        }
        Ok(combined)
    }

    pub fn combined_file_name(date: NaiveDate) -> String {
        format!("Clearance_Data_{}.csv", date.format("%Y-%m-%d"))
    }
}
