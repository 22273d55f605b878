use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

/// resolve a tool either as explicit path or by searching `PATH`
pub fn resolve_executable(executable: &Path) -> Result<PathBuf, ConfigErrors> {
    if executable.components().count() > 1 {
        return match check_executable(executable)? {
            true => Ok(executable.to_path_buf()),
            false => Err(ConfigErrors::NotExecutable(executable.to_path_buf())),
        };
    }

    env::var_os("PATH")
        .iter()
        .flat_map(env::split_paths)
        .map(|dir| dir.join(executable))
        .find(|candidate| matches!(check_executable(candidate), Ok(true)))
        .ok_or_else(|| ConfigErrors::ToolNotFound(executable.to_path_buf()))
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config")]
    Io(#[from] std::io::Error),
    #[error("Config is not valid yaml")]
    Parse(#[from] serde_yaml::Error),
    #[error("Config contains errors, see above")]
    Preflight,
    #[error("File {0:?} not found")]
    FileNotFound(PathBuf),
    #[error("{0:?} is not executable")]
    NotExecutable(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(std::io::Error),
    #[error("Could not find the profiling tool {0:?}, it has to be on PATH")]
    ToolNotFound(PathBuf),
}

/// Settings for the gatherer, every field has a default so an empty file is valid
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GatherConfig {
    #[serde(default)]
    pub profiling: ProfilingConfig,
    // event families to extract timings for
    #[serde(default = "default_events")]
    pub events: Vec<EventConfig>,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfilingConfig {
    // name on PATH or explicit path of the profiling tool
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    // participant whose events are analyzed
    #[serde(default = "default_participant")]
    pub participant: String,
    // per invocation, in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    // directory of raw event logs inside a case
    #[serde(default = "default_event_dir")]
    pub event_dir: String,
    // merged event log written into a case
    #[serde(default = "default_merged")]
    pub merged: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EventConfig {
    /// output field the duration is stored in
    pub field: String,
    /// regex locating the full event name in the merged log
    pub search: String,
    pub prefix: String,
    pub suffix: String,
    /// also extract `_GLOBAL` and `initialize` from this event's table
    #[serde(default)]
    pub summary: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    #[serde(default = "default_participants")]
    pub participants: Vec<String>,
}

/// An event family with its search pattern compiled
#[derive(Clone, Debug)]
pub struct EventMatcher {
    pub field: String,
    pub search: Regex,
    pub prefix: String,
    pub suffix: String,
    pub summary: bool,
}

impl EventMatcher {
    /// does a row label of the analyzed table belong to this family
    pub fn matches_row(&self, label: &str) -> bool {
        label.starts_with(&self.prefix) && label.ends_with(&self.suffix)
    }
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            profiling: ProfilingConfig::default(),
            events: default_events(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            participant: default_participant(),
            timeout: default_timeout(),
            event_dir: default_event_dir(),
            merged: default_merged(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            participants: default_participants(),
        }
    }
}

impl ProfilingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

impl GatherConfig {
    /// load the config from `path`, or the defaults if there is none
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigErrors> {
        match path {
            Some(path) => {
                debug!("Loading config from {path:?}");
                Self::parse(&fs::read_to_string(path)?)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigErrors> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(content)?)
    }

    /// Compile the search patterns of all event families
    pub fn compile_events(&self) -> Result<Vec<EventMatcher>, Vec<(String, regex::Error)>> {
        let mut errors = Vec::new();
        let mut matchers = Vec::new();

        self.events
            .iter()
            .for_each(|event| match Regex::new(&event.search) {
                Ok(search) => {
                    matchers.push(EventMatcher {
                        field: event.field.clone(),
                        search,
                        prefix: event.prefix.clone(),
                        suffix: event.suffix.clone(),
                        summary: event.summary,
                    });
                }
                Err(error) => {
                    errors.push((event.field.clone(), error));
                }
            });

        if errors.is_empty() {
            Ok(matchers)
        } else {
            Err(errors)
        }
    }

    /// returns true if the config contains errors, all of them are logged
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.profiling.timeout == 0 {
            error!("profiling.timeout cannot be 0, every tool invocation would time out");
            contains_error = true;
        }

        if self.profiling.participant.trim().is_empty() {
            error!("profiling.participant must name the participant to analyze");
            contains_error = true;
        }

        if self.events.is_empty() {
            warn!("No events are configured, only memory statistics will be gathered");
        }

        if let Err(compile_errors) = self.compile_events() {
            for (field, err) in compile_errors {
                error!("events.{field}.search is not a valid pattern: {err}");
            }
            contains_error = true;
        }

        for field in self.events.iter().map(|event| &event.field).duplicates() {
            error!("events.{field} is defined more than once");
            contains_error = true;
        }

        for event in self.events.iter() {
            if event.prefix.is_empty() && event.suffix.is_empty() {
                warn!(
                    "events.{} has neither prefix nor suffix and matches every row",
                    event.field
                );
            }
        }

        if self.memory.participants.is_empty() {
            warn!("memory.participants is empty, no memory statistics will be gathered");
        }

        contains_error
    }
}

fn default_executable() -> PathBuf {
    PathBuf::from("precice-profiling")
}

fn default_participant() -> String {
    "B".to_string()
}

fn default_timeout() -> u64 {
    60_000
}

fn default_event_dir() -> String {
    "precice-profiling".to_string()
}

fn default_merged() -> String {
    "profiling.json".to_string()
}

fn default_participants() -> Vec<String> {
    vec!["A".to_string(), "B".to_string()]
}

fn default_events() -> Vec<EventConfig> {
    vec![
        EventConfig {
            field: "computeMappingTime".to_string(),
            search: r#"initialize/map\.[^"]*computeMapping\.FromA-MeshToB-Mesh"#.to_string(),
            prefix: "initialize/map".to_string(),
            suffix: "computeMapping.FromA-MeshToB-Mesh".to_string(),
            summary: true,
        },
        EventConfig {
            field: "mapDataTime".to_string(),
            search: r#"advance[^"]*mapData\.FromA-MeshToB-Mesh"#.to_string(),
            prefix: "advance/map".to_string(),
            suffix: "mapData.FromA-MeshToB-Mesh".to_string(),
            summary: false,
        },
    ]
}
