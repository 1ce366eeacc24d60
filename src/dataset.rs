//! CSV supplied field values.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};

/// Columns of a CSV file with a header row, kept in row order.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    columns: HashMap<String, Vec<String>>,
    rows: usize,
}

impl Dataset {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = csv::Reader::from_path(path)?;
        let dataset = Self::load(reader)?;
        debug!("Loaded {} rows from {}", dataset.rows, path.display());
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::load(csv::Reader::from_reader(reader))
    }

    fn load<R: Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut columns: HashMap<String, Vec<String>> =
            headers.iter().map(|h| (h.clone(), Vec::new())).collect();

        let mut rows = 0;
        for record in reader.records() {
            let record = record?;
            for (header, value) in headers.iter().zip(record.iter()) {
                if let Some(column) = columns.get_mut(header) {
                    column.push(value.to_string());
                }
            }
            rows += 1;
        }
        Ok(Dataset { columns, rows })
    }

    /// Values of `name`, in file order.
    pub fn column(&self, name: &str) -> Result<&[String]> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}
