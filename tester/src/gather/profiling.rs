use crate::config::{resolve_executable, ConfigErrors, EventMatcher, ProfilingConfig};
use regex::Regex;
use std::{
    ffi::OsStr,
    fs,
    io::Read,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

pub const GLOBAL_EVENT: &str = "_GLOBAL";
pub const INITIALIZE_EVENT: &str = "initialize";

#[derive(Debug, Error)]
pub enum ProfilingError {
    #[error("Failed to spawn the profiling tool")]
    Spawn(std::io::Error),
    #[error("I/O with the profiling tool failed")]
    Io(#[from] std::io::Error),
    #[error("Profiling tool did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Profiling tool failed with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("No event matching {0} in the merged event log")]
    EventNotFound(String),
    #[error("Failed to read the analyzed timings")]
    Timings(#[from] csv::Error),
}

/// Wrapper around the external profiling tool
#[derive(Debug, Clone)]
pub struct Profiler {
    executable: PathBuf,
    participant: String,
    timeout: Duration,
    event_dir: String,
    merged: String,
}

/// first exact event name matching `search` in a merged event log
pub fn find_event_name<'a>(log: &'a str, search: &Regex) -> Option<&'a str> {
    search.find(log).map(|found| found.as_str())
}

fn parse_duration(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

/// Extract durations of `matcher`'s family from an analyzed timings table.
///
/// The table's first column is the event name. Parallel runs do not include the primary rank in
/// the aggregated columns, so the family duration is the larger of column 5 and the last column.
/// Later rows overwrite earlier ones.
pub fn parse_timings<R: Read>(
    reader: R,
    matcher: &EventMatcher,
) -> Result<Vec<(String, f64)>, ProfilingError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut timings = Vec::new();

    for record in reader.records() {
        let record = record?;
        let (Some(label), Some(last)) = (record.get(0), record.iter().last()) else {
            continue;
        };

        let extracted = if matcher.summary && label == GLOBAL_EVENT {
            parse_duration(last).map(|value| ("globalTime".to_string(), value))
        } else if matcher.summary && label == INITIALIZE_EVENT {
            parse_duration(last).map(|value| ("initializeTime".to_string(), value))
        } else if matcher.matches_row(label) {
            let candidates = [record.get(5), Some(last)];
            candidates
                .into_iter()
                .flatten()
                .filter_map(parse_duration)
                .reduce(f64::max)
                .map(|value| (matcher.field.clone(), value))
        } else {
            None
        };

        match extracted {
            Some((field, value)) => {
                timings.retain(|(existing, _): &(String, f64)| *existing != field);
                timings.push((field, value));
            }
            None if matcher.matches_row(label) => {
                debug!("Row {label} has no numeric duration");
            }
            None => {}
        }
    }

    Ok(timings)
}

/// `timings-computeMapping.csv` for `computeMappingTime`
fn timings_file(field: &str) -> String {
    format!("timings-{}.csv", field.strip_suffix("Time").unwrap_or(field))
}

impl Profiler {
    /// locate the tool, fails if it is not installed
    pub fn load(config: &ProfilingConfig) -> Result<Self, ConfigErrors> {
        let executable = resolve_executable(&config.executable)?;
        debug!("Using profiling tool {executable:?}");

        Ok(Self {
            executable,
            participant: config.participant.clone(),
            timeout: config.timeout(),
            event_dir: config.event_dir.clone(),
            merged: config.merged.clone(),
        })
    }

    fn run<I, S>(&self, args: I) -> Result<(), ProfilingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut handle = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ProfilingError::Spawn)?;

        // drained concurrently, a full pipe would block the tool until the timeout
        let stderr = handle.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buffer = Vec::new();
                let _ = pipe.read_to_end(&mut buffer);
                String::from_utf8_lossy(&buffer).into_owned()
            })
        });

        debug!("Profiling tool waiting on {}", handle.id());
        let status = match handle.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                // the child has to be reaped, otherwise it lingers as a zombie
                handle.kill()?;
                handle.wait()?;

                // descendants may still hold the pipe, the reader is left detached
                return Err(ProfilingError::Timeout(self.timeout));
            }
        };

        if status.success() {
            Ok(())
        } else {
            let stderr = stderr
                .and_then(|reader| reader.join().ok())
                .unwrap_or_default();

            Err(ProfilingError::Failed {
                status,
                stderr: stderr.trim().to_string(),
            })
        }
    }

    /// merge the raw event logs of a case, returns the merged log
    pub fn merge(&self, case: &Path) -> Result<PathBuf, ProfilingError> {
        let merged = case.join(&self.merged);
        self.run([
            OsStr::new("merge"),
            OsStr::new("--output"),
            merged.as_os_str(),
            case.join(&self.event_dir).as_os_str(),
        ])?;

        Ok(merged)
    }

    /// write the per-rank statistics of `event` into `output`
    pub fn analyze(&self, event: &str, output: &Path, merged: &Path) -> Result<(), ProfilingError> {
        self.run([
            OsStr::new("analyze"),
            OsStr::new("--event"),
            OsStr::new(event),
            OsStr::new("--output"),
            output.as_os_str(),
            OsStr::new(&self.participant),
            merged.as_os_str(),
        ])
    }

    fn event_timings(
        &self,
        case: &Path,
        log: &str,
        merged: &Path,
        matcher: &EventMatcher,
    ) -> Result<Vec<(String, f64)>, ProfilingError> {
        let event = find_event_name(log, &matcher.search)
            .ok_or_else(|| ProfilingError::EventNotFound(matcher.search.to_string()))?;
        debug!("Found event {event}");

        let output = case.join(timings_file(&matcher.field));
        self.analyze(event, &output, merged)?;

        parse_timings(fs::File::open(&output)?, matcher)
    }

    /// Best effort extraction of all event families of a case; failures are logged and the
    /// corresponding fields left out.
    #[instrument(level = "debug", skip(self, events))]
    pub fn timings(&self, case: &Path, events: &[EventMatcher]) -> Vec<(String, f64)> {
        if events.is_empty() {
            return Vec::new();
        }

        let merged = match self.merge(case) {
            Ok(merged) => merged,
            Err(error) => {
                warn!("Failed to merge events of {case:?}: {error}");
                return Vec::new();
            }
        };

        let log = match fs::read_to_string(&merged) {
            Ok(log) => log,
            Err(error) => {
                warn!("Failed to read merged events {merged:?}: {error}");
                return Vec::new();
            }
        };

        events
            .iter()
            .flat_map(
                |matcher| match self.event_timings(case, &log, &merged, matcher) {
                    Ok(timings) => timings,
                    Err(error) => {
                        warn!("Skipping {} for {case:?}: {error}", matcher.field);
                        Vec::new()
                    }
                },
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{find_event_name, parse_timings, timings_file};
    use crate::config::GatherConfig;

    const TIMINGS: &str = "\
name,count,total,min,max,rank0,avg
_GLOBAL,1,120.5,120.5,120.5,120.5,120.5
initialize,1,40,40,40,40,41
initialize/map.pou.computeMapping.FromA-MeshToB-Mesh,4,80,10,30,35,20
advance/map.pou.mapData.FromA-MeshToB-Mesh,4,8,1,3,2,2.5
";

    #[test]
    fn extracts_family_and_summary() {
        let matchers = GatherConfig::default().compile_events().unwrap();

        let compute = parse_timings(TIMINGS.as_bytes(), &matchers[0]).unwrap();
        assert_eq!(
            compute,
            vec![
                ("globalTime".to_string(), 120.5),
                ("initializeTime".to_string(), 41.0),
                ("computeMappingTime".to_string(), 35.0),
            ]
        );

        let map_data = parse_timings(TIMINGS.as_bytes(), &matchers[1]).unwrap();
        assert_eq!(map_data, vec![("mapDataTime".to_string(), 2.5)]);
    }

    #[test]
    fn compares_numerically() {
        let matchers = GatherConfig::default().compile_events().unwrap();
        let table = "advance/map.x.mapData.FromA-MeshToB-Mesh,1,1,1,1,9,10\n";

        assert_eq!(
            parse_timings(table.as_bytes(), &matchers[1]).unwrap(),
            vec![("mapDataTime".to_string(), 10.0)]
        );
    }

    #[test]
    fn finds_exact_event_names() {
        let matchers = GatherConfig::default().compile_events().unwrap();
        let log = r#"{"eventNames": ["_GLOBAL", "initialize/map.pou.computeMapping.FromA-MeshToB-Mesh", "advance/map.pou.mapData.FromA-MeshToB-Mesh"]}"#;

        assert_eq!(
            find_event_name(log, &matchers[0].search),
            Some("initialize/map.pou.computeMapping.FromA-MeshToB-Mesh")
        );
        assert_eq!(
            find_event_name(log, &matchers[1].search),
            Some("advance/map.pou.mapData.FromA-MeshToB-Mesh")
        );
        assert_eq!(find_event_name("{}", &matchers[1].search), None);
    }

    #[test]
    fn timings_file_names() {
        assert_eq!(timings_file("computeMappingTime"), "timings-computeMapping.csv");
        assert_eq!(timings_file("custom"), "timings-custom.csv");
    }
}
