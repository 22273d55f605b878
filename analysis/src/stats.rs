use itertools::Itertools;
use mapping_tester::table::{Table, TableError};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub const MAPPING: &str = "mapping";
pub const MESH_A: &str = "mesh A";
pub const MESH_B: &str = "mesh B";
pub const RANKS_B: &str = "ranks B";

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Failed to load the gathered statistics")]
    Table(#[from] TableError),
    #[error("Column '{0}' is missing from the statistics")]
    MissingColumn(&'static str),
    #[error("There are {0} to-meshes but only 1 is allowed")]
    TargetMeshes(usize),
}

/// Quantity on the horizontal axis of all charts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XAxis {
    RanksB,
    MeshA,
}

impl XAxis {
    pub fn column(&self) -> &'static str {
        match self {
            Self::RanksB => RANKS_B,
            Self::MeshA => MESH_A,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::RanksB => "ranks of participant B",
            Self::MeshA => "edge length(h) of mesh A",
        }
    }
}

/// A plotted quantity, either a single column or the sum of several
#[derive(Clone, Copy, Debug)]
pub enum Metric {
    Column(&'static str),
    Sum(&'static [&'static str]),
}

impl Metric {
    pub fn name(&self) -> String {
        match self {
            Self::Column(column) => column.to_string(),
            Self::Sum(columns) => columns.join(" + "),
        }
    }
}

/// Points of one mapping for one metric, ordered along the x axis
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub name: String,
    // index of the mapping among all mappings, stable across charts
    pub group: usize,
    pub points: Vec<(f64, f64)>,
}

/// The table written by the gatherer
#[derive(Debug, Clone)]
pub struct Stats {
    table: Table,
}

fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

impl Stats {
    pub fn load(path: &Path) -> Result<Self, StatsError> {
        Self::from_table(Table::load(path)?)
    }

    pub fn from_table(table: Table) -> Result<Self, StatsError> {
        for column in [MAPPING, MESH_A, MESH_B, RANKS_B] {
            if table.column(column).is_none() {
                return Err(StatsError::MissingColumn(column));
            }
        }

        let stats = Self { table };
        let targets = stats.distinct(MESH_B);
        if targets != 1 {
            return Err(StatsError::TargetMeshes(targets));
        }

        info!("Loaded {} cases", stats.table.rows.len());
        Ok(stats)
    }

    fn cell<'a>(&self, row: &'a [String], column: &str) -> Option<&'a str> {
        self.table
            .column(column)
            .and_then(|index| row.get(index))
            .map(String::as_str)
    }

    fn number(&self, row: &[String], column: &str) -> Option<f64> {
        self.cell(row, column).and_then(parse_number)
    }

    fn value(&self, row: &[String], metric: &Metric) -> Option<f64> {
        match metric {
            Metric::Column(column) => self.number(row, column),
            Metric::Sum(columns) => columns
                .iter()
                .map(|column| self.number(row, column))
                .sum::<Option<f64>>(),
        }
    }

    fn distinct(&self, column: &str) -> usize {
        self.table
            .rows
            .iter()
            .filter_map(|row| self.cell(row, column))
            .unique()
            .count()
    }

    /// scale over ranks if only the rank count varies, over the edge length otherwise
    pub fn x_axis(&self) -> XAxis {
        if self.distinct(MESH_A) == 1 && self.distinct(RANKS_B) > 1 {
            XAxis::RanksB
        } else {
            XAxis::MeshA
        }
    }

    /// all mapping names, sorted
    pub fn groups(&self) -> Vec<&str> {
        self.table
            .rows
            .iter()
            .filter_map(|row| self.cell(row, MAPPING))
            .unique()
            .sorted()
            .collect()
    }

    /// One series per mapping. Series that are all zero or absent are dropped, as are rows
    /// without a value.
    pub fn series(&self, axis: XAxis, metric: &Metric) -> Vec<Series> {
        let rows = self
            .table
            .rows
            .iter()
            .filter_map(|row| Some((self.number(row, axis.column())?, row)))
            .sorted_by(|(left, _), (right, _)| left.total_cmp(right))
            .collect_vec();

        self.groups()
            .into_iter()
            .enumerate()
            .filter_map(|(group, name)| {
                let points = rows
                    .iter()
                    .filter(|(_, row)| self.cell(row, MAPPING) == Some(name))
                    .filter_map(|(x, row)| Some((*x, self.value(row, metric)?)))
                    .collect_vec();

                if points.iter().all(|(_, y)| *y == 0.0) {
                    debug!("Dropping {}-series {name} as all 0", metric.name());
                    None
                } else {
                    Some(Series {
                        name: name.to_string(),
                        group,
                        points,
                    })
                }
            })
            .collect()
    }
}
