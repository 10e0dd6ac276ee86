use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::module_config_file;
use crate::error::ConfigError;

pub const DEFAULT_TIMEOUT_S: f64 = 600.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StudentSpec {
    pub name: String,
    pub folder: String,
    #[serde(alias = "github", default, skip_serializing_if = "Option::is_none")]
    pub git: Option<String>,
    /// Anything else the roster carries (email, group, ...).
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl StudentSpec {
    pub fn new(name: &str, folder: &str) -> Self {
        StudentSpec {
            name: name.to_string(),
            folder: folder.to_string(),
            git: None,
            extra: IndexMap::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Roster {
    pub students: IndexMap<String, StudentSpec>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModuleSpec {
    pub name: String,
    pub folder: String,
    pub test_location: PathBuf,
}

impl ModuleSpec {
    pub fn config_file(&self) -> PathBuf {
        module_config_file(&self.test_location, &self.name)
    }
}

pub type Modules = IndexMap<String, ModuleSpec>;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ModuleConfig {
    pub tests: IndexMap<String, TestSpec>,
    #[serde(default)]
    pub extra_files: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestSpec {
    pub testfile: String,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Seconds.
    #[serde(default = "default_timeout", deserialize_with = "positive_seconds")]
    pub timeout: f64,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

fn default_required() -> bool {
    true
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_S
}

fn positive_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let seconds = f64::deserialize(deserializer)?;
    if seconds.is_finite() && seconds > 0.0 {
        Ok(seconds)
    } else {
        Err(D::Error::custom(format!("timeout must be a positive number of seconds, got {}", seconds)))
    }
}

impl TestSpec {
    pub fn new(testfile: &str) -> Self {
        TestSpec {
            testfile: testfile.to_string(),
            required: true,
            timeout: DEFAULT_TIMEOUT_S,
            params: Map::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout)
            .ok()
            .filter(|limit| !limit.is_zero())
            .unwrap_or_else(|| {
                warn!("Invalid timeout {}s for {}, using {}s", self.timeout, self.testfile, DEFAULT_TIMEOUT_S);
                Duration::from_secs_f64(DEFAULT_TIMEOUT_S)
            })
    }

    /// The test file name without its extension; this is what runners are
    /// registered under.
    pub fn testfile_stem(&self) -> &str {
        Path::new(&self.testfile)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.testfile)
    }

    pub fn outputs(&self) -> Option<Vec<String>> {
        let outputs = self.params.get("outputs")?.as_array()?;
        Some(
            outputs
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
        )
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_roster(path: &Path) -> Result<Roster, ConfigError> {
    read_json(path)
}

pub fn read_modules(path: &Path) -> Result<Modules, ConfigError> {
    read_json(path)
}

pub fn read_module_config(module: &ModuleSpec) -> Result<ModuleConfig, ConfigError> {
    read_json(&module.config_file())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    use super::*;

    #[test]
    fn roster_accepts_github_alias_and_keeps_extras() {
        let roster: Roster = serde_json::from_str(
            r#"{"students": {
                "b": {"name": "Bo", "folder": "bo_repo", "github": "https://example.org/bo.git", "group": 3},
                "a": {"name": "Al", "folder": "al_repo", "git": "", "email": "al@example.org"}
            }}"#,
        )
        .unwrap();

        let ids: Vec<&String> = roster.students.keys().collect();
        assert_eq!(ids, vec!["b", "a"]);
        let bo = &roster.students["b"];
        assert_eq!(bo.git.as_deref(), Some("https://example.org/bo.git"));
        assert_eq!(bo.extra["group"], serde_json::json!(3));
        assert_eq!(roster.students["a"].extra["email"], serde_json::json!("al@example.org"));
    }

    #[test]
    fn test_spec_defaults_and_params() {
        let spec: TestSpec = serde_json::from_str(
            r#"{"testfile": "test_csvtospace.py", "outputs": ["{data}/out.txt"], "note": 1}"#,
        )
        .unwrap();
        assert!(spec.required);
        assert_eq!(spec.timeout(), Duration::from_secs(600));
        assert_eq!(spec.testfile_stem(), "test_csvtospace");
        assert_eq!(spec.outputs(), Some(vec!["{data}/out.txt".to_string()]));
        assert_eq!(spec.params["note"], serde_json::json!(1));
    }

    #[test]
    fn module_config_is_located_by_module_name() {
        let dir = TempDir::new().unwrap();
        dir.child("week1_config.json")
            .write_str(r#"{"tests": {"countlines.sh": {"testfile": "test_countlines.py", "timeout": 5}}}"#)
            .unwrap();
        let module = ModuleSpec {
            name: "week1".to_string(),
            folder: "Week1".to_string(),
            test_location: dir.path().to_path_buf(),
        };

        let config = read_module_config(&module).unwrap();
        assert!(config.extra_files.is_empty());
        assert_eq!(config.tests["countlines.sh"].timeout(), Duration::from_secs(5));
    }

    #[test]
    fn non_positive_timeouts_are_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let module = ModuleSpec {
            name: "week1".to_string(),
            folder: "week1".to_string(),
            test_location: dir.path().to_path_buf(),
        };
        for timeout in ["0", "-5", "0.0"] {
            dir.child("week1_config.json")
                .write_str(&format!(
                    r#"{{"tests": {{"countlines.sh": {{"testfile": "test_countlines.py", "timeout": {}}}}}}}"#,
                    timeout
                ))
                .unwrap();
            let err = read_module_config(&module).unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }), "timeout {} accepted", timeout);
        }
    }

    #[test]
    fn missing_and_malformed_files_are_config_errors() {
        let dir = TempDir::new().unwrap();
        let missing = read_roster(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));

        dir.child("bad.json").write_str("{ not json").unwrap();
        let bad = read_modules(&dir.path().join("bad.json")).unwrap_err();
        assert!(matches!(bad, ConfigError::Parse { .. }));
    }
}
