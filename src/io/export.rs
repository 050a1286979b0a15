//! CSV export of a finished recording
//!
//! Each stop writes a new `data<N>.csv` into the export directory, where N is
//! the number of `.csv` files already there, stepped upward past names that are
//! taken. The file is written to a temp file in the same directory and linked
//! into place without replacing an existing file.

use crate::domain::sample::{Sample, CSV_HEADER};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Taken names skipped before an export gives up
const MAX_NAME_ATTEMPTS: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to create export directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to list export directory {path}: {source}")]
    ListDir { path: PathBuf, source: io::Error },

    #[error("Failed to write export file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Rendered CSV body plus row accounting
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCsv {
    pub body: String,
    pub rows: usize,
    /// Samples left out because a field was never produced
    pub incomplete: usize,
}

/// Writes sorted samples to numbered CSV files
#[derive(Debug, Clone)]
pub struct CsvExporter {
    dir: PathBuf,
}

impl CsvExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        info!(dir = %dir.display(), "exporter_initialized");
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the next export. A missing directory counts as empty.
    pub fn next_export_path(&self) -> Result<PathBuf, ExportError> {
        let (_, path) = self.first_free_from(self.csv_count()?);
        Ok(path)
    }

    fn csv_count(&self) -> Result<usize, ExportError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(ExportError::ListDir { path: self.dir.clone(), source }),
        };

        Ok(entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".csv"))
            .count())
    }

    /// First `data<N>.csv` at or above `index` that does not exist yet
    fn first_free_from(&self, mut index: usize) -> (usize, PathBuf) {
        loop {
            let path = self.dir.join(format!("data{index}.csv"));
            if !path.exists() {
                return (index, path);
            }
            index += 1;
        }
    }

    /// Header plus one row per complete sample, in the given order, `\n`-joined
    pub fn render(samples: &[Sample]) -> RenderedCsv {
        let mut body = String::with_capacity(CSV_HEADER.len() + samples.len() * 128);
        body.push_str(CSV_HEADER);

        let mut rows = 0;
        for row in samples.iter().filter_map(Sample::to_csv_row) {
            body.push('\n');
            body.push_str(&row);
            rows += 1;
        }

        RenderedCsv { body, rows, incomplete: samples.len() - rows }
    }

    /// Write samples to the next numbered file, returning its path and row counts.
    ///
    /// Never replaces an existing file: a name taken between the directory scan
    /// and the final link (a concurrent export) moves on to the next free index.
    pub fn export(&self, samples: &[Sample]) -> Result<(PathBuf, RenderedCsv), ExportError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .map_err(|source| ExportError::CreateDir { path: self.dir.clone(), source })?;
        }

        let rendered = Self::render(samples);
        let mut tmp = self
            .write_temp(rendered.body.as_bytes())
            .map_err(|source| ExportError::Write { path: self.dir.clone(), source })?;

        let (mut index, mut path) = self.first_free_from(self.csv_count()?);
        let mut attempts = 0;
        loop {
            match tmp.persist_noclobber(&path) {
                Ok(_) => break,
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    attempts += 1;
                    if attempts >= MAX_NAME_ATTEMPTS {
                        return Err(ExportError::Write { path, source: e.error });
                    }
                    warn!(path = %path.display(), "export_name_taken");
                    tmp = e.file;
                    (index, path) = self.first_free_from(index + 1);
                }
                Err(e) => return Err(ExportError::Write { path, source: e.error }),
            }
        }

        debug!(path = %path.display(), bytes = rendered.body.len(), "export_written");
        Ok((path, rendered))
    }

    fn write_temp(&self, contents: &[u8]) -> io::Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }
}
