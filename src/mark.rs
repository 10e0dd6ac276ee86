use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::{debug, error, info, info_span, warn};

use crate::config::{logs_dir, overall_results_file};
use crate::logging;
use crate::marking_config::{read_module_config, read_modules, read_roster, ModuleConfig, ModuleSpec, Modules, Roster, StudentSpec};
use crate::repo::check_repo;
use crate::report::{save_report, ModuleReport, RepoResults, Report, StructureResults, StudentReport};
use crate::structure::check_module;
use crate::test_runner::Registry;

#[derive(Debug, Clone)]
pub struct MarkArgs {
    pub students: PathBuf,
    pub modules: PathBuf,
    pub fileloc: PathBuf,
    pub output: PathBuf,
    pub debug: bool,
    pub noweekcheck: bool,
}

/// A full marking run: every student against every module, written to
/// `<output>/overall_results.json`.
pub fn mark(args: &MarkArgs) -> Result<Report> {
    let start = Instant::now();
    let logs = logs_dir(&args.output);
    create_dir_all(&logs).with_context(|| format!("Failed to create {}", logs.display()))?;
    logging::init(&args.output, args.debug)?;

    if args.noweekcheck {
        warn!("--noweekcheck is ignored, structure checks always run");
    }

    let report = mark_with(args, Registry::builtin())?;
    info!("Marking took {:?}", start.elapsed());
    Ok(report)
}

/// Marks with the given runners. Nothing is written if any runner fails.
pub fn mark_with(args: &MarkArgs, registry: Registry) -> Result<Report> {
    let roster = read_roster(&args.students)?;
    let modules = read_modules(&args.modules)?;
    info!(
        "Marking {} student/s against {} module/s from {}",
        roster.students.len(),
        modules.len(),
        args.fileloc.display()
    );

    let marker = Marker::new(&args.fileloc, modules, registry);
    let report = marker.mark_students(&roster)?;

    let results = overall_results_file(&args.output);
    save_report(&results, &report)
        .with_context(|| format!("Failed to write {}", results.display()))?;
    info!("Wrote {}", results.display());
    Ok(report)
}

pub struct Marker<'a> {
    fileloc: &'a Path,
    modules: Modules,
    configs: IndexMap<String, ModuleConfig>,
    registry: Registry,
}

impl<'a> Marker<'a> {
    /// Loads every module's test configuration up front. Modules whose
    /// configuration can't be loaded, and targets with no runner, are logged
    /// here and skipped later.
    pub fn new(fileloc: &'a Path, modules: Modules, registry: Registry) -> Self {
        let mut configs = IndexMap::new();
        for (id, module) in &modules {
            match read_module_config(module) {
                Ok(config) => {
                    debug!("Loaded {} target/s for {}", config.tests.len(), id);
                    configs.insert(id.clone(), config);
                }
                Err(e) => error!("Skipping module {}: {}", id, e),
            }
        }
        for e in registry.check(&modules, &configs) {
            error!("{}; target will be skipped", e);
        }
        Marker {
            fileloc,
            modules,
            configs,
            registry,
        }
    }

    pub fn mark_students(&self, roster: &Roster) -> Result<Report> {
        let mut report = Report::new();
        for (id, student) in &roster.students {
            let span = info_span!("student", id = %id);
            let _entered = span.enter();
            let result = self.mark_student(student)?;
            info!("{} lost {} point/s in total", id, result.total());
            report.insert(id.clone(), result);
        }
        Ok(report)
    }

    pub fn mark_student(&self, student: &StudentSpec) -> Result<StudentReport> {
        info!("Marking {} ({})", student.name, student.folder);
        let repo = check_repo(self.fileloc, &student.folder)
            .with_context(|| format!("Repo check of {} failed", student.folder))?;
        let mut report = StudentReport {
            repo_results: RepoResults {
                deductions: repo.deductions,
            },
            modules: IndexMap::new(),
        };
        if repo.fatal {
            error!("Skipping every module for {}", student.name);
            return Ok(report);
        }

        for (module_id, module) in &self.modules {
            let Some(config) = self.configs.get(module_id) else {
                continue;
            };
            let span = info_span!("module", id = %module_id);
            let _entered = span.enter();
            let result = self.mark_module(student, module_id, module, config)?;
            report.modules.insert(module_id.clone(), result);
        }
        Ok(report)
    }

    fn mark_module(
        &self,
        student: &StudentSpec,
        module_id: &str,
        module: &ModuleSpec,
        config: &ModuleConfig,
    ) -> Result<ModuleReport> {
        let structure = check_module(self.fileloc, &student.folder, module_id, module, config)
            .with_context(|| format!("Structure check of {} for {} failed", module.folder, student.folder))?;
        let fatal = structure.is_fatal();
        let mut report = ModuleReport {
            structure_results: StructureResults {
                deductions: structure.deductions,
                fatal,
            },
            targets: IndexMap::new(),
        };
        let Some(resolved) = structure.resolved else {
            error!("Skipping tests for {}", module.name);
            return Ok(report);
        };

        for (target, spec) in &config.tests {
            let Some(runner) = self.registry.get(&module.name, spec) else {
                debug!("No runner for {}, skipped", target);
                continue;
            };
            let span = info_span!("target", file = %target);
            let _entered = span.enter();
            let result = runner
                .run(self.fileloc, target, student, &resolved, spec)
                .map_err(|e| {
                    error!("Marker error while testing {}: {}", target, e);
                    e
                })
                .with_context(|| {
                    format!("{} failed on {} for {}", runner.name(), target, student.folder)
                })?;
            report.targets.insert(target.clone(), result);
        }
        Ok(report)
    }
}
