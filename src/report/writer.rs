//! Report output
//!
//! A [`ReportWriter`] persists a [`Report`] below the output directory as
//! `<out-dir>/<report-id>/<report-id>.<ext>`. The CSV implementation builds a `polars`
//! [`DataFrame`] with `time` as first column and serializes it with [`CsvWriter`].
//!
//! Files are written to a temporary file in the report directory first and renamed
//! into place once complete, so a report file is either absent or fully written.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use polars::{
    frame::DataFrame,
    io::SerWriter,
    prelude::{CsvWriter, NamedFrom},
    series::Series,
};
use tempfile::NamedTempFile;

use crate::simulation::result::{Report, TIME_COLUMN};

use super::error::ReportError;

/// Persists reports below an output directory
pub trait ReportWriter {
    /// Writes `report` below `out_dir` and returns the path of the written file
    fn write(&self, report: &Report, out_dir: &Path) -> Result<PathBuf, ReportError>;
}

/// Writes reports as CSV with a `time,<column…>` header
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReportWriter;

impl CsvReportWriter {
    /// Path the report is written to below `out_dir`
    pub fn report_path(report: &Report, out_dir: &Path) -> PathBuf {
        out_dir
            .join(&report.id)
            .join(format!("{}.csv", report.id))
    }

    fn write_into(&self, report: &Report, directory: &Path, path: &Path) -> Result<(), ReportError> {
        let mut df = to_dataframe(report)?;

        let mut file = NamedTempFile::new_in(directory).map_err(|source| ReportError::Io {
            path: directory.to_path_buf(),
            source,
        })?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|source| ReportError::Serialization {
                id: report.id.clone(),
                source,
            })?;

        file.persist(path).map_err(|err| ReportError::Io {
            path: path.to_path_buf(),
            source: err.error,
        })?;

        Ok(())
    }
}

impl ReportWriter for CsvReportWriter {
    fn write(&self, report: &Report, out_dir: &Path) -> Result<PathBuf, ReportError> {
        report.validate()?;

        let path = Self::report_path(report, out_dir);
        let directory = out_dir.join(&report.id);
        let created = !directory.exists();

        fs::create_dir_all(&directory).map_err(|source| ReportError::Io {
            path: directory.clone(),
            source,
        })?;

        if let Err(err) = self.write_into(report, &directory, &path) {
            // Leave no empty report directory behind
            if created {
                if let Err(cleanup) = fs::remove_dir(&directory) {
                    warn!("Could not remove {}: {}", directory.display(), cleanup);
                }
            }
            return Err(err);
        }

        debug!(
            "Wrote {} rows x {} columns to {}",
            report.time.len(),
            report.columns.len() + 1,
            path.display()
        );

        Ok(path)
    }
}

/// Converts a report into a data frame with `time` as first column
pub fn to_dataframe(report: &Report) -> Result<DataFrame, ReportError> {
    let series = std::iter::once(Series::new(TIME_COLUMN, &report.time))
        .chain(
            report
                .columns
                .iter()
                .map(|column| Series::new(&column.id, &column.values)),
        )
        .collect::<Vec<_>>();

    DataFrame::new(series).map_err(|source| ReportError::Serialization {
        id: report.id.clone(),
        source,
    })
}
