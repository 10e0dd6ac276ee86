use std::collections::BTreeSet;
use std::fs::create_dir;
use std::io::Result;
use std::path::Path;

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::submission_dir;
use crate::deductions::{Deductions, Reason};
use crate::marking_config::{ModuleConfig, ModuleSpec};
use crate::resolve::{find_containing, list_children, resolve_dir};

pub const NO_FOLDER_POINTS: f64 = 100.0;
pub const NO_README_POINTS: f64 = 1.0;
pub const NO_DATA_FOLDER_POINTS: f64 = 1.0;
pub const EXTRA_FILE_POINTS: f64 = 0.5;

const RESULTS_ALLOWED: [&str; 2] = [".gitkeep", ".gitignore"];
const CODE_ALWAYS_EXPECTED: [&str; 4] = [".gitignore", "readme.md", "readme.txt", "readme.gitkeep"];

/// Where a module actually lives inside one student's submission. Produced
/// once by [`check_module`] and handed by reference to every test runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub id: String,
    pub name: String,
    pub folder: String,
    pub code: String,
    pub data: String,
    pub results: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureCheck {
    pub deductions: Deductions,
    /// `None` when the check was fatal; no tests may run for the module then.
    pub resolved: Option<ResolvedModule>,
}

impl StructureCheck {
    pub fn is_fatal(&self) -> bool {
        self.resolved.is_none()
    }

    fn fatal(deductions: Deductions) -> Self {
        StructureCheck {
            deductions,
            resolved: None,
        }
    }
}

pub fn check_module(
    fileloc: &Path,
    student_folder: &str,
    module_id: &str,
    module: &ModuleSpec,
    module_config: &ModuleConfig,
) -> Result<StructureCheck> {
    let student_dir = submission_dir(fileloc, student_folder);
    info!("General check of {}...", student_dir.join(&module.folder).display());

    let folder = match resolve_dir(&student_dir, &module.folder) {
        Some(folder) => {
            if folder != module.folder {
                warn!("{} does not exist, found probable alternate folder {}", module.folder, folder);
            }
            folder
        }
        None => {
            error!("Could not find an appropriate folder for {}!", module.folder);
            return Ok(StructureCheck::fatal(Deductions::single(NO_FOLDER_POINTS, Reason::NoFolder)));
        }
    };
    let module_path = student_dir.join(&folder);
    let children = list_children(&module_path)?;
    let mut deductions = Deductions::new();

    match find_containing(&children.files, "readme") {
        Some(readme) => info!("Found module-level readme: {}", readme),
        None => {
            warn!("No module-level readme detected!");
            deductions.deduct(NO_README_POINTS, Reason::NoReadme);
        }
    }

    let Some(code) = find_containing(&children.dirs, "code").cloned() else {
        // Fatal, but worth no points of its own.
        error!("No code folder detected in {}!", module_path.display());
        return Ok(StructureCheck::fatal(Deductions::new()));
    };

    let data = match find_containing(&children.dirs, "data") {
        Some(data) => data.clone(),
        None => {
            warn!("No data folder detected!");
            deductions.deduct(NO_DATA_FOLDER_POINTS, Reason::NoDataFolder);
            conventional_name(&code, "data")
        }
    };

    let results = match find_containing(&children.dirs, "results") {
        Some(results) => results.clone(),
        None => {
            warn!("No results folder detected!");
            let results = conventional_name(&code, "results");
            warn!("Creating results folder '{}' based on assumed folder naming scheme...", results);
            create_dir(module_path.join(&results))?;
            results
        }
    };

    let stray_results: Vec<String> = list_children(&module_path.join(&results))?
        .names()
        .filter(|name| !RESULTS_ALLOWED.contains(&name.as_str()))
        .cloned()
        .collect();
    if stray_results.is_empty() {
        info!("Results folder empty, good!");
    } else {
        let points = EXTRA_FILE_POINTS * stray_results.len() as f64;
        warn!("Found {} file/s in results folder: {:?}", stray_results.len(), stray_results);
        warn!("Docking {}pts for results files", points);
        deductions.deduct(points, Reason::ExtraResultsFiles);
    }

    let extra_code = extra_code_files(&module_path.join(&code), module_config)?;
    if !extra_code.is_empty() {
        let points = EXTRA_FILE_POINTS * extra_code.len() as f64;
        warn!("Found {} extra file/s in code folder: {:?}", extra_code.len(), extra_code);
        warn!("Docking {}pts for extra code files", points);
        deductions.deduct(points, Reason::ExtraCodeFiles);
    }

    debug!("Resolved {}: code={}, data={}, results={}", folder, code, data, results);
    Ok(StructureCheck {
        deductions,
        resolved: Some(ResolvedModule {
            id: module_id.to_string(),
            name: module.name.clone(),
            folder,
            code,
            data,
            results,
        }),
    })
}

fn extra_code_files(code_dir: &Path, module_config: &ModuleConfig) -> Result<Vec<String>> {
    let expected: BTreeSet<String> = CODE_ALWAYS_EXPECTED
        .iter()
        .map(|name| name.to_string())
        .chain(module_config.tests.keys().cloned())
        .chain(module_config.extra_files.iter().cloned())
        .map(|name| name.to_lowercase())
        .collect();

    let mut found = BTreeSet::new();
    for entry in WalkDir::new(code_dir).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !name.starts_with('.') {
            found.insert(name);
        }
    }

    Ok(found.difference(&expected).cloned().collect())
}

fn conventional_name(code: &str, base: &str) -> String {
    let mut letters = code.chars().filter(|c| c.is_alphabetic()).peekable();
    if letters.peek().is_some() && letters.all(char::is_uppercase) {
        return base.to_uppercase();
    }
    if code.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = base.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    base.to_string()
}
