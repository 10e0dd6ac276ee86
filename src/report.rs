use std::collections::BTreeMap;
use std::io::Result;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::deductions::{Deductions, Reason};
use crate::error::ConfigError;
use crate::marking_config::{read_json, write_json};

pub const EXEC_TIME_KEY: &str = "exectime_s";
pub const FILE_MISSING_TEXT: &str = "File missing!";

pub type Report = IndexMap<String, StudentReport>;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StudentReport {
    pub repo_results: RepoResults,
    /// Module id -> results, one entry per module that was attempted.
    #[serde(flatten)]
    pub modules: IndexMap<String, ModuleReport>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RepoResults {
    pub deductions: Deductions,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ModuleReport {
    pub structure_results: StructureResults,
    /// Target file -> result. Empty when the structure check was fatal.
    #[serde(flatten)]
    pub targets: IndexMap<String, TestResult>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StructureResults {
    pub deductions: Deductions,
    #[serde(default, skip_serializing_if = "is_false")]
    pub fatal: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TestResult {
    pub stdout: String,
    #[serde(rename = "linterout")]
    pub linter_out: String,
    pub deductions: Deductions,
    #[serde(default)]
    pub other: BTreeMap<String, f64>,
}

impl TestResult {
    pub fn file_missing(points: f64) -> Self {
        TestResult {
            stdout: FILE_MISSING_TEXT.to_string(),
            linter_out: FILE_MISSING_TEXT.to_string(),
            deductions: Deductions::single(points, Reason::FileMissing),
            other: BTreeMap::new(),
        }
    }

    pub fn exec_time(&self) -> Option<f64> {
        self.other.get(EXEC_TIME_KEY).copied()
    }
}

impl StudentReport {
    pub fn total(&self) -> f64 {
        self.all_deductions().map(|d| d.value).sum()
    }

    pub fn all_deductions(&self) -> impl Iterator<Item = &Deductions> {
        std::iter::once(&self.repo_results.deductions).chain(self.modules.values().flat_map(|module| {
            std::iter::once(&module.structure_results.deductions)
                .chain(module.targets.values().map(|target| &target.deductions))
        }))
    }
}

pub fn save_report(path: &Path, report: &Report) -> Result<()> {
    write_json(path, report)
}

pub fn load_report(path: &Path) -> std::result::Result<Report, ConfigError> {
    read_json(path)
}
