pub mod memory;
pub mod profiling;

#[cfg(test)]
mod gather_test;

use crate::config::{ConfigErrors, EventMatcher, GatherConfig};
use globset::GlobBuilder;
use ignore::{DirEntry, WalkBuilder};
use indexmap::IndexSet;
use itertools::Itertools;
use profiling::Profiler;
use serde_json::{Map, Value};
use std::{
    fs,
    io::Write,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// per-case statistics files written by the test runner
pub const STATS_GLOB: &str = "*.stats.json";

/// Flat record of one case, fields keep their insertion order
pub type CaseRecord = Map<String, Value>;

#[derive(Debug, Error)]
pub enum GatherError {
    #[error("Failed to read {path:?}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path:?} is not valid json")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{0:?} does not contain a json object")]
    NotAnObject(PathBuf),
    #[error("{0:?} does not follow <mapping>/<constraint>/<meshA>-<meshB>/<ranksA>-<ranksB>/<file>")]
    MalformedCasePath(PathBuf),
    #[error("No statistics found below {0:?}")]
    NoCases(PathBuf),
    #[error("Invalid statistics glob")]
    Glob(#[from] globset::Error),
    #[error("Configuration rejected")]
    Config(#[from] ConfigErrors),
    #[error("Failed to write the statistics table")]
    Csv(#[from] csv::Error),
    #[error("Failed to write the statistics table")]
    Io(#[from] std::io::Error),
}

/// Metadata encoded in the directory layout of a case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseMeta {
    pub mapping: String,
    pub constraint: String,
    pub mesh_a: String,
    pub mesh_b: String,
    pub ranks_a: String,
    pub ranks_b: String,
}

fn split_pair(value: &str) -> Option<(String, String)> {
    match value.split('-').collect_vec().as_slice() {
        [first, second] => Some((first.to_string(), second.to_string())),
        _ => None,
    }
}

impl CaseMeta {
    /// parse `.../<mapping>/<constraint>/<meshA>-<meshB>/<ranksA>-<ranksB>/<file>`
    pub fn from_path(relative: &Path) -> Result<Self, GatherError> {
        let malformed = || GatherError::MalformedCasePath(relative.to_path_buf());
        let parts = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect_vec();

        let [mapping, constraint, meshes, ranks, _file] = parts
            .len()
            .checked_sub(5)
            .and_then(|start| <[&str; 5]>::try_from(&parts[start..]).ok())
            .ok_or_else(malformed)?;
        let (mesh_a, mesh_b) = split_pair(meshes).ok_or_else(malformed)?;
        let (ranks_a, ranks_b) = split_pair(ranks).ok_or_else(malformed)?;

        Ok(Self {
            mapping: mapping.to_string(),
            constraint: constraint.to_string(),
            mesh_a,
            mesh_b,
            ranks_a,
            ranks_b,
        })
    }

    fn insert_into(&self, record: &mut CaseRecord) {
        for (field, value) in [
            ("mapping", &self.mapping),
            ("constraint", &self.constraint),
            ("mesh A", &self.mesh_a),
            ("mesh B", &self.mesh_b),
            ("ranks A", &self.ranks_a),
            ("ranks B", &self.ranks_b),
        ] {
            record.insert(field.to_string(), Value::String(value.clone()));
        }
    }
}

fn insert_numbers(record: &mut CaseRecord, values: Vec<(String, f64)>) {
    for (field, value) in values {
        record.insert(field, Value::from(value));
    }
}

/// Collects the statistics of all cases below an output directory
#[derive(Debug)]
pub struct Gatherer {
    outdir: PathBuf,
    profiler: Option<Profiler>,
    events: Vec<EventMatcher>,
    participants: Vec<String>,
}

impl Gatherer {
    /// Validate the config and locate the profiling tool. Without `timings` no tool is needed
    /// and no timing fields are produced.
    pub fn load(outdir: &Path, config: &GatherConfig, timings: bool) -> Result<Self, GatherError> {
        if config.preflight_checks() {
            return Err(ConfigErrors::Preflight.into());
        }

        let (profiler, events) = if timings {
            let profiler = Profiler::load(&config.profiling)?;
            let events = config.compile_events().map_err(|errors| {
                for (field, err) in errors {
                    error!("Failed to compile events.{field}: {err}");
                }
                ConfigErrors::Preflight
            })?;

            (Some(profiler), events)
        } else {
            info!("Skipping timings, only memory statistics are gathered");
            (None, Vec::new())
        };

        Ok(Self {
            outdir: outdir.to_path_buf(),
            profiler,
            events,
            participants: config.memory.participants.clone(),
        })
    }

    /// all statistics files relative to the output directory, sorted
    pub fn discover(&self) -> Result<Vec<PathBuf>, GatherError> {
        let matcher = GlobBuilder::new(STATS_GLOB).build()?.compile_matcher();

        let files = WalkBuilder::new(&self.outdir)
            .standard_filters(false)
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Failed to search for statistics: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_file()))
            .filter(|entry| matcher.is_match(entry.file_name()))
            .map(DirEntry::into_path)
            .filter_map(|path| {
                path.strip_prefix(&self.outdir)
                    .map(Path::to_path_buf)
                    .ok()
            })
            .sorted()
            .collect_vec();

        Ok(files)
    }

    /// build the record of a single case from its statistics file
    #[instrument(level = "info", skip(self))]
    pub fn gather_case(&self, relative: &Path) -> Result<CaseRecord, GatherError> {
        let path = self.outdir.join(relative);
        let case = path.parent().unwrap_or(&self.outdir).to_path_buf();
        let meta = CaseMeta::from_path(relative)?;

        let content = fs::read_to_string(&path).map_err(|source| GatherError::Read {
            path: path.clone(),
            source,
        })?;
        let mut record = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(record)) => record,
            Ok(_) => return Err(GatherError::NotAnObject(path)),
            Err(source) => return Err(GatherError::Json { path, source }),
        };

        meta.insert_into(&mut record);
        if let Some(profiler) = self.profiler.as_ref() {
            insert_numbers(&mut record, profiler.timings(&case, &self.events));
        }
        insert_numbers(
            &mut record,
            memory::memory_stats(&case, &self.participants),
        );

        debug!("Gathered {} fields", record.len());
        Ok(record)
    }

    /// gather every discovered case, in discovery order
    pub fn gather(&self) -> Result<Vec<CaseRecord>, GatherError> {
        let files = self.discover()?;
        if files.is_empty() {
            return Err(GatherError::NoCases(self.outdir.clone()));
        }

        files
            .iter()
            .map(|file| {
                info!("Found: {}", file.display());
                self.gather_case(file)
            })
            .collect()
    }
}

/// union of all fields in first-seen order
pub fn fields(records: &[CaseRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|record| record.keys().cloned())
        .collect::<IndexSet<String>>()
        .into_iter()
        .collect()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(value)) => value.clone(),
        Some(Value::Bool(value)) => value.to_string(),
        Some(Value::Number(value)) => value.to_string(),
        Some(nested) => nested.to_string(),
    }
}

/// write the records as one table, fields missing in a record are left empty
pub fn write_records<W: Write>(records: &[CaseRecord], writer: W) -> Result<(), GatherError> {
    let fields = fields(records);
    let mut writer = csv::Writer::from_writer(writer);

    writer.write_record(&fields)?;
    for record in records {
        writer.write_record(fields.iter().map(|field| cell(record.get(field))))?;
    }
    writer.flush()?;

    Ok(())
}

pub fn write_stats(records: &[CaseRecord], path: &Path) -> Result<(), GatherError> {
    write_records(records, fs::File::create(path)?)?;
    info!("Wrote {} cases to {path:?}", records.len());

    Ok(())
}
