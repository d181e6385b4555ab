//! Raw wide-table loading from CSV files.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{RaterError, Result};

/// One source row, cells aligned to [`RawTable::columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub source_file: String,
    pub cells: Vec<String>,
}

/// The wide source table exactly as published: one row per (date, hour),
/// one column per zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().trim().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the column count.
    pub fn push_row<S: AsRef<str>>(&mut self, source_file: &str, cells: &[S]) {
        let mut cells: Vec<String> = cells.iter().map(|c| c.as_ref().to_string()).collect();
        cells.resize(self.columns.len(), String::new());
        self.rows.push(RawRow {
            source_file: source_file.to_string(),
            cells,
        });
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Case-insensitive column lookup returning the actual header.
    pub fn find_column_ci(&self, name: &str) -> Option<&str> {
        let wanted = name.to_lowercase();
        self.columns
            .iter()
            .find(|c| c.to_lowercase() == wanted)
            .map(String::as_str)
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows[row].cells.get(col).map(String::as_str).unwrap_or("")
    }

    /// Concatenates `other` below `self`, taking the union of both column
    /// sets. Cells a file does not have are left empty.
    pub fn append(&mut self, other: RawTable) {
        for col in &other.columns {
            if self.column_index(col).is_none() {
                self.columns.push(col.clone());
                for row in &mut self.rows {
                    row.cells.push(String::new());
                }
            }
        }

        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|c| other.column_index(c))
            .collect();

        for row in other.rows {
            let cells = mapping
                .iter()
                .map(|m| m.and_then(|i| row.cells.get(i).cloned()).unwrap_or_default())
                .collect();
            self.rows.push(RawRow {
                source_file: row.source_file,
                cells,
            });
        }
    }

    /// Parses CSV content with a header row. Short rows are padded.
    pub fn from_csv_reader<R: Read>(reader: R, source_file: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut table = RawTable::new(&headers);

        for record in rdr.records() {
            let record = record?;
            let cells: Vec<&str> = record.iter().collect();
            table.push_row(source_file, &cells);
        }

        Ok(table)
    }
}

/// Reads a single CSV file, tagging rows with the file's base name.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn read_csv(path: &Path) -> Result<RawTable> {
    let source_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let file = File::open(path)?;
    let table = RawTable::from_csv_reader(file, &source_file)?;
    debug!(rows = table.rows.len(), columns = table.columns.len(), "CSV loaded");
    Ok(table)
}

/// Expands glob patterns, then de-duplicates and sorts the result. A pattern
/// that matches nothing (or is not a valid pattern) is kept as a literal
/// path so that reading it reports the real I/O error.
pub fn resolve_inputs<P: AsRef<Path>>(patterns: &[P]) -> Vec<PathBuf> {
    let mut paths = BTreeSet::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let matches: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map(|entries| entries.flatten().collect())
            .unwrap_or_default();
        if matches.is_empty() {
            paths.insert(pattern.to_path_buf());
        } else {
            debug!(pattern = %pattern.display(), matched = matches.len(), "Input pattern expanded");
            paths.extend(matches);
        }
    }
    paths.into_iter().collect()
}

/// Reads every input file and concatenates them into one table.
pub fn read_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<RawTable> {
    let paths = resolve_inputs(paths);
    if paths.is_empty() {
        return Err(RaterError::NoInputs);
    }

    let mut combined: Option<RawTable> = None;
    for path in &paths {
        let table = read_csv(path)?;
        match combined.as_mut() {
            Some(acc) => acc.append(table),
            None => combined = Some(table),
        }
    }

    let combined = combined.ok_or(RaterError::NoInputs)?;
    info!(files = paths.len(), rows = combined.rows.len(), "Inputs loaded");
    Ok(combined)
}
