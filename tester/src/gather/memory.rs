use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Failed to read memory log")]
    Io(#[from] std::io::Error),
    #[error("Line {line}: '{value}' is not a number")]
    Parse { line: usize, value: String },
}

/// sum of all values in a memory log, one value per line
pub fn memory_total(path: &Path) -> Result<f64, MemoryError> {
    fs::read_to_string(path)?
        .lines()
        .enumerate()
        .filter(|(_, value)| !value.trim().is_empty())
        .try_fold(0.0, |total, (line, value)| {
            value
                .trim()
                .parse::<f64>()
                .map(|value| total + value)
                .map_err(|_| MemoryError::Parse {
                    line: line + 1,
                    value: value.to_string(),
                })
        })
}

/// `peakMem<P>` for every participant whose log can be summed
pub fn memory_stats(case: &Path, participants: &[String]) -> Vec<(String, f64)> {
    participants
        .iter()
        .filter_map(|participant| {
            let path = case.join(format!("memory-{participant}.log"));
            if !path.is_file() {
                debug!("No memory log {path:?}");
                return None;
            }

            match memory_total(&path) {
                Ok(total) => Some((format!("peakMem{participant}"), total)),
                Err(error) => {
                    warn!("Skipping memory of {participant} in {case:?}: {error}");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{memory_stats, memory_total, MemoryError};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn sums_lines() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("memory-A.log");
        fs::write(&log, "1024\n2048.5\n\n512\n").unwrap();

        assert_eq!(memory_total(&log).unwrap(), 3584.5);
    }

    #[test]
    fn malformed_logs_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("memory-A.log"), "100\n200\n").unwrap();
        fs::write(dir.path().join("memory-B.log"), "100\nkilled\n").unwrap();

        assert!(matches!(
            memory_total(&dir.path().join("memory-B.log")),
            Err(MemoryError::Parse { line: 2, .. })
        ));

        let participants = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        assert_eq!(
            memory_stats(dir.path(), &participants),
            vec![("peakMemA".to_string(), 300.0)]
        );
    }
}
