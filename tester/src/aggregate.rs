use crate::{
    numfmt::format_shortest,
    table::{Table, TableError},
};
use clap::ValueEnum;
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use std::{
    fmt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};


/// only columns with this marker in their name are reduced
pub const TIME_MARKER: &str = "Time";

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("No files matching {0}-<N>-statistics.csv found")]
    NoInput(String),
    #[error("Failed to load statistics")]
    Table(#[from] TableError),
    #[error("{path:?} lacks column {column}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("{path:?} has {found} rows but {expected} were expected")]
    RowMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("{path:?} row {row} column {column}: '{value}' is not a number")]
    NonNumeric {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
}

/// Reduction applied to timings across runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// minimum over all runs
    #[default]
    Min,
    /// arithmetic mean over all runs
    Mean,
    /// mean excluding the fastest and slowest run
    TrimmedMean,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Min => "min",
            Self::Mean => "mean",
            Self::TrimmedMean => "trimmed-mean",
        })
    }
}

/// per-column, per-row state of a running reduction
#[derive(Debug, Clone)]
enum Accumulator {
    Min(Vec<Vec<f64>>),
    Mean { sum: Vec<Vec<f64>>, count: usize },
    TrimmedMean(Vec<Vec<Vec<f64>>>),
}

/// Combines the timing columns of several runs into the first run's table
#[derive(Debug, Clone)]
pub struct Aggregation {
    base: Table,
    // (index in base, column name)
    columns: Vec<(usize, String)>,
    accumulator: Accumulator,
}

fn parse_column(
    table: &Table,
    index: usize,
    name: &str,
    path: &Path,
) -> Result<Vec<f64>, AggregateError> {
    table
        .rows
        .iter()
        .enumerate()
        .map(|(row, cells)| {
            let value = cells.get(index).map(String::as_str).unwrap_or("");
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| AggregateError::NonNumeric {
                    path: path.to_path_buf(),
                    row,
                    column: name.to_string(),
                    value: value.to_string(),
                })
        })
        .collect()
}

fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// mean without the single lowest and highest sample, plain mean for two or fewer samples
pub fn trimmed_mean(samples: &[f64]) -> f64 {
    if samples.len() <= 2 {
        return mean(samples);
    }

    let sorted = samples.iter().copied().sorted_by(f64::total_cmp).collect_vec();
    mean(&sorted[1..sorted.len() - 1])
}

impl Aggregation {
    /// start a reduction from the first run, `path` is only used for error reporting
    pub fn new(base: Table, method: Method, path: &Path) -> Result<Self, AggregateError> {
        let columns = base
            .headers
            .iter()
            .enumerate()
            .filter(|(_, name)| name.contains(TIME_MARKER))
            .map(|(index, name)| (index, name.clone()))
            .collect_vec();

        let values = columns
            .iter()
            .map(|(index, name)| parse_column(&base, *index, name, path))
            .collect::<Result<Vec<_>, _>>()?;

        let accumulator = match method {
            Method::Min => Accumulator::Min(values),
            Method::Mean => Accumulator::Mean {
                sum: values,
                count: 1,
            },
            Method::TrimmedMean => Accumulator::TrimmedMean(
                values
                    .into_iter()
                    .map(|column| column.into_iter().map(|value| vec![value]).collect())
                    .collect(),
            ),
        };

        Ok(Self {
            base,
            columns,
            accumulator,
        })
    }

    /// fold another run into the reduction, columns are matched by name
    pub fn add(&mut self, table: &Table, path: &Path) -> Result<(), AggregateError> {
        if table.rows.len() != self.base.rows.len() {
            return Err(AggregateError::RowMismatch {
                path: path.to_path_buf(),
                expected: self.base.rows.len(),
                found: table.rows.len(),
            });
        }

        for (position, (_, name)) in self.columns.iter().enumerate() {
            let index = table
                .column(name)
                .ok_or_else(|| AggregateError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.clone(),
                })?;
            let values = parse_column(table, index, name, path)?;

            match self.accumulator {
                Accumulator::Min(ref mut minima) => minima[position]
                    .iter_mut()
                    .zip(values)
                    .for_each(|(current, value)| *current = current.min(value)),
                Accumulator::Mean { ref mut sum, .. } => sum[position]
                    .iter_mut()
                    .zip(values)
                    .for_each(|(current, value)| *current += value),
                Accumulator::TrimmedMean(ref mut samples) => samples[position]
                    .iter_mut()
                    .zip(values)
                    .for_each(|(cell, value)| cell.push(value)),
            }
        }

        if let Accumulator::Mean { ref mut count, .. } = self.accumulator {
            *count += 1;
        }

        Ok(())
    }

    /// finalize the reduction and write it into the base table
    pub fn finish(self) -> Table {
        let Self {
            mut base,
            columns,
            accumulator,
        } = self;

        let reduced: Vec<Vec<f64>> = match accumulator {
            Accumulator::Min(minima) => minima,
            Accumulator::Mean { sum, count } => sum
                .into_iter()
                .map(|column| column.into_iter().map(|sum| sum / count as f64).collect())
                .collect(),
            Accumulator::TrimmedMean(samples) => samples
                .into_iter()
                .map(|column| column.iter().map(|cell| trimmed_mean(cell)).collect())
                .collect(),
        };

        for ((index, _), column) in columns.iter().zip(reduced) {
            for (row, value) in base.rows.iter_mut().zip(column) {
                // cells whose value did not change keep their text
                if let Some(cell) = row
                    .get_mut(*index)
                    .filter(|cell| cell.trim().parse::<f64>().ok() != Some(value))
                {
                    *cell = format_shortest(value);
                }
            }
        }

        base
    }
}

/// find `<base>-<N>-statistics.csv` in `folder`, ordered by N. The base name is matched
/// literally.
pub fn discover(folder: &Path, base: &str) -> Vec<PathBuf> {
    let prefix = format!("{base}-");

    WalkBuilder::new(folder)
        .standard_filters(false)
        .max_depth(Some(1))
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to list {folder:?}: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_file()))
        .map(DirEntry::into_path)
        .filter_map(|path| {
            let run = path
                .file_name()?
                .to_str()?
                .strip_prefix(prefix.as_str())?
                .strip_suffix("-statistics.csv")?;

            if !run.is_empty() && run.bytes().all(|byte| byte.is_ascii_digit()) {
                Some((run.parse::<u64>().ok()?, path))
            } else {
                debug!("Skipping {path:?}, run id '{run}' is not numeric");
                None
            }
        })
        .sorted_by_key(|(run, _)| *run)
        .map(|(_, path)| path)
        .collect_vec()
}

/// aggregate all runs of `base` in `folder` into `output`, returns the number of runs
#[instrument(level = "info", skip(folder, output))]
pub fn aggregate_times(
    folder: &Path,
    base: &str,
    output: &Path,
    method: Method,
) -> Result<usize, AggregateError> {
    let files = discover(folder, base);
    let (first, others) = files
        .split_first()
        .ok_or_else(|| AggregateError::NoInput(base.to_string()))?;

    info!("Aggregating {} runs of {base} with {method}", files.len());

    debug!("Base run {first:?}");
    let mut aggregation = Aggregation::new(Table::load(first)?, method, first)?;
    for file in others {
        debug!("Adding run {file:?}");
        aggregation.add(&Table::load(file)?, file)?;
    }

    aggregation.finish().save(output)?;
    info!("Wrote {output:?}");

    Ok(files.len())
}
