use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read table {path:?}: {source}")]
    Read { path: PathBuf, source: csv::Error },
    #[error("Failed to write table {path:?}: {source}")]
    Write { path: PathBuf, source: csv::Error },
    #[error("Malformed table")]
    Csv(#[from] csv::Error),
    #[error("Failed to flush table")]
    Io(#[from] std::io::Error),
}

/// A flat CSV table with a header row, cells are kept as read
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        csv::Reader::from_path(path)
            .and_then(|mut reader| Self::from_csv(&mut reader))
            .map_err(|source| TableError::Read {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        Ok(Self::from_csv(&mut csv::Reader::from_reader(reader))?)
    }

    fn from_csv<R: Read>(reader: &mut csv::Reader<R>) -> Result<Self, csv::Error> {
        let headers = reader.headers()?.iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|record| record.map(|record| record.iter().map(String::from).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;

        Ok(Self { headers, rows })
    }

    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        csv::Writer::from_path(path)
            .map_err(TableError::from)
            .and_then(|mut writer| self.to_csv(&mut writer))
            .map_err(|error| match error {
                TableError::Csv(source) => TableError::Write {
                    path: path.to_path_buf(),
                    source,
                },
                other => other,
            })
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), TableError> {
        self.to_csv(&mut csv::Writer::from_writer(writer))
    }

    fn to_csv<W: Write>(&self, writer: &mut csv::Writer<W>) -> Result<(), TableError> {
        writer.write_record(&self.headers)?;
        for row in self.rows.iter() {
            writer.write_record(row)?;
        }
        writer.flush()?;

        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }
}
