use super::{fields, write_records, CaseMeta, GatherError, Gatherer};
use crate::config::{ConfigErrors, GatherConfig};
use serde_json::{json, Value};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tempfile::TempDir;

fn write_case(root: &Path, case: &str, stats: Value) -> PathBuf {
    let dir = root.join(case);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("B.stats.json"), stats.to_string()).unwrap();
    dir
}

fn memory_only(root: &Path) -> Gatherer {
    Gatherer::load(root, &GatherConfig::default(), false).unwrap()
}

#[test]
pub fn case_meta_from_path() {
    let meta =
        CaseMeta::from_path(Path::new("run/rbf-gaussian/consistent/0.01-0.005/2-4/B.stats.json"))
            .unwrap();

    assert_eq!(
        meta,
        CaseMeta {
            mapping: "rbf-gaussian".into(),
            constraint: "consistent".into(),
            mesh_a: "0.01".into(),
            mesh_b: "0.005".into(),
            ranks_a: "2".into(),
            ranks_b: "4".into(),
        }
    );
}

#[test]
pub fn malformed_case_paths() {
    for path in [
        "consistent/0.01-0.005/2-4/B.stats.json",
        "nn/consistent/0.01/2-4/B.stats.json",
        "nn/consistent/0.01-0.005/2-4-8/B.stats.json",
    ] {
        assert!(matches!(
            CaseMeta::from_path(Path::new(path)),
            Err(GatherError::MalformedCasePath(_))
        ));
    }
}

#[test]
pub fn gathers_every_case() {
    let root = TempDir::new().unwrap();
    let rbf = write_case(
        root.path(),
        "rbf/consistent/0.1-0.05/1-1",
        json!({"relative-l2": 1e-3, "count": 10}),
    );
    fs::write(rbf.join("memory-A.log"), "100\n200\n").unwrap();
    fs::write(rbf.join("memory-B.log"), "50\n").unwrap();
    let nn = write_case(
        root.path(),
        "nn/conservative/0.1-0.05/2-4",
        json!({"relative-l2": 0.5}),
    );
    fs::write(nn.join("memory-B.log"), "oom\n").unwrap();
    fs::write(nn.join("unrelated.json"), "{}").unwrap();

    let gatherer = memory_only(root.path());
    let records = gatherer.gather().unwrap();
    assert_eq!(records.len(), 2);

    // sorted discovery: nn before rbf
    let nn = &records[0];
    assert_eq!(nn["mapping"], "nn");
    assert_eq!(nn["constraint"], "conservative");
    assert_eq!(nn["ranks A"], "2");
    assert_eq!(nn["ranks B"], "4");
    assert!(!nn.contains_key("peakMemA"));
    assert!(!nn.contains_key("peakMemB"));

    let rbf = &records[1];
    assert_eq!(rbf["mapping"], "rbf");
    assert_eq!(rbf["mesh A"], "0.1");
    assert_eq!(rbf["mesh B"], "0.05");
    assert_eq!(rbf["count"], 10);
    assert_eq!(rbf["peakMemA"], 300.0);
    assert_eq!(rbf["peakMemB"], 50.0);
    assert!(!rbf.contains_key("computeMappingTime"));
}

#[test]
pub fn empty_tree_is_an_error() {
    let root = TempDir::new().unwrap();

    assert!(matches!(
        memory_only(root.path()).gather(),
        Err(GatherError::NoCases(_))
    ));
}

#[test]
pub fn non_object_stats_are_rejected() {
    let root = TempDir::new().unwrap();
    write_case(root.path(), "nn/consistent/0.1-0.05/1-1", json!([1, 2]));

    assert!(matches!(
        memory_only(root.path()).gather(),
        Err(GatherError::NotAnObject(_))
    ));
}

#[test]
pub fn table_has_union_of_fields() {
    let records = vec![
        json!({"mapping": "nn", "relative-l2": 0.5})
            .as_object()
            .cloned()
            .unwrap(),
        json!({"mapping": "rbf", "peakMemB": 300.0, "note": "a, b"})
            .as_object()
            .cloned()
            .unwrap(),
    ];

    assert_eq!(fields(&records), vec!["mapping", "relative-l2", "peakMemB", "note"]);

    let mut output = Vec::new();
    write_records(&records, &mut output).unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "mapping,relative-l2,peakMemB,note\nnn,0.5,,\nrbf,,300.0,\"a, b\"\n"
    );
}

// stands in for the profiling tool: `merge --output <json> <dir>` and
// `analyze --event <name> --output <csv> <participant> <json>`
#[cfg(unix)]
const FAKE_TOOL: &str = r#"command="$1"
shift
case "$command" in
  merge)
    printf '{"names": ["initialize/map.pou.computeMapping.FromA-MeshToB-Mesh", "advance/map.pou.mapData.FromA-MeshToB-Mesh"]}' > "$2"
    ;;
  analyze)
    {
      echo "name,count,total,min,max,rank0,avg"
      echo "_GLOBAL,1,100,100,100,100,100"
      echo "initialize,1,40,40,40,40,40"
      echo "$2,4,10,1,3,12,9"
    } > "$4"
    ;;
  *)
    exit 3
    ;;
esac
"#;

/// write an executable shell script, `prelude` runs before the fake tool
#[cfg(unix)]
fn install_tool(dir: &Path, prelude: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let tool = dir.join("fake-profiling");
    fs::write(&tool, format!("#!/bin/sh\n{prelude}\n{FAKE_TOOL}")).unwrap();
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
    tool
}

#[cfg(unix)]
fn gather_with_tool(prelude: &str, timeout: u64) -> (TempDir, Vec<super::CaseRecord>) {
    let tools = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write_case(
        root.path(),
        "rbf/consistent/0.1-0.05/1-1",
        json!({"relative-l2": 1e-3}),
    );

    let mut config = GatherConfig::default();
    config.profiling.executable = install_tool(tools.path(), prelude);
    config.profiling.timeout = timeout;
    let records = Gatherer::load(root.path(), &config, true)
        .unwrap()
        .gather()
        .unwrap();

    (root, records)
}

#[cfg(unix)]
#[test]
pub fn timings_from_profiling_tool() {
    let (root, records) = gather_with_tool("", 60_000);
    let case = root.path().join("rbf/consistent/0.1-0.05/1-1");

    let record = &records[0];
    assert_eq!(record["globalTime"], 100.0);
    assert_eq!(record["initializeTime"], 40.0);
    assert_eq!(record["computeMappingTime"], 12.0);
    assert_eq!(record["mapDataTime"], 12.0);
    assert!(case.join("profiling.json").is_file());
    assert!(case.join("timings-computeMapping.csv").is_file());
    assert!(case.join("timings-mapData.csv").is_file());
}

#[cfg(unix)]
#[test]
pub fn verbose_tool_does_not_stall() {
    let started = Instant::now();
    let (_root, records) = gather_with_tool("head -c 200000 /dev/zero >&2", 2_000);

    assert_eq!(records[0]["computeMappingTime"], 12.0);
    assert_eq!(records[0]["mapDataTime"], 12.0);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[cfg(unix)]
#[test]
pub fn hanging_tool_is_killed() {
    let started = Instant::now();
    let (_root, records) = gather_with_tool("exec sleep 5", 200);

    let record = &records[0];
    assert_eq!(record["relative-l2"], 1e-3);
    assert_eq!(record["mapping"], "rbf");
    assert!(!record.contains_key("computeMappingTime"));
    assert!(!record.contains_key("globalTime"));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
pub fn missing_tool_is_fatal_with_timings() {
    let root = TempDir::new().unwrap();

    for (executable, expected_path) in [
        ("/surely/not/a/profiling-tool", true),
        ("surely-not-an-installed-profiling-tool", false),
    ] {
        let mut config = GatherConfig::default();
        config.profiling.executable = PathBuf::from(executable);

        match Gatherer::load(root.path(), &config, true) {
            Err(GatherError::Config(ConfigErrors::FileNotFound(_))) => assert!(expected_path),
            Err(GatherError::Config(ConfigErrors::ToolNotFound(_))) => assert!(!expected_path),
            other => panic!("unexpected {other:?}"),
        }

        // no tool needed when timings are skipped
        assert!(Gatherer::load(root.path(), &config, false).is_ok());
    }
}
