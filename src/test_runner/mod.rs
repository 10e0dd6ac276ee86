use std::collections::BTreeMap;
use std::fs::{create_dir, remove_dir_all, remove_file};
use std::io::{ErrorKind, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::config::module_dir;
use crate::deductions::{Deductions, Reason};
use crate::error::ConfigError;
use crate::marking_config::{ModuleConfig, Modules, StudentSpec, TestSpec};
use crate::process::{run_with_timeout, Execution};
use crate::report::{TestResult, EXEC_TIME_KEY};
use crate::resolve::resolve;
use crate::structure::ResolvedModule;

pub mod week1;

pub const FILE_MISSING_POINTS: f64 = 1.0;
pub const TIMEOUT_POINTS: f64 = 1.0;
pub const RUN_ERROR_POINTS: f64 = 1.0;

const LINTER: &str = "shellcheck";
const SHELL: &str = "bash";

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Mismatch { points: f64, detail: String },
}

#[derive(Debug)]
pub struct TestContext<'a> {
    pub module_dir: PathBuf,
    pub module: &'a ResolvedModule,
    /// The target as found on disk, or as configured when absent but optional.
    pub target: String,
    pub spec: &'a TestSpec,
}

impl TestContext<'_> {
    pub fn code_dir(&self) -> PathBuf {
        self.module_dir.join(&self.module.code)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.module_dir.join(&self.module.data)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.module_dir.join(&self.module.results)
    }

    pub fn target_path(&self) -> PathBuf {
        self.code_dir().join(&self.target)
    }

    pub fn data_rel(&self, name: &str) -> String {
        format!("../{}/{}", self.module.data, name)
    }

    /// Files the script may have written its output to. Configured `outputs`
    /// win over `defaults`; both are relative to the module folder and may use
    /// `{code}`, `{data}` and `{results}`.
    pub fn candidates(&self, defaults: &[&str]) -> Vec<PathBuf> {
        let patterns = self
            .spec
            .outputs()
            .unwrap_or_else(|| defaults.iter().map(|s| s.to_string()).collect());
        patterns
            .iter()
            .map(|pattern| {
                let relative = pattern
                    .replace("{code}", &self.module.code)
                    .replace("{data}", &self.module.data)
                    .replace("{results}", &self.module.results);
                self.module_dir.join(relative)
            })
            .collect()
    }
}

/// One exercise's test, assembled from hooks around a shared locate, lint,
/// set up, execute, verify, clean up sequence.
#[derive(Clone)]
pub struct TestRunner {
    name: &'static str,
    linter: Option<&'static str>,
    artifacts: &'static [&'static str],
    setup_fn: fn(&TestContext) -> Result<()>,
    args_fn: fn(&TestContext) -> Vec<String>,
    verify_fn: fn(&TestContext, &Execution) -> Result<Verdict>,
}

impl std::fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRunner")
            .field("name", &self.name)
            .field("linter", &self.linter)
            .field("artifacts", &self.artifacts)
            .finish()
    }
}

pub fn shell_runner(name: &'static str) -> TestRunner {
    TestRunner {
        name,
        linter: Some(LINTER),
        artifacts: &[],
        setup_fn: no_setup,
        args_fn: target_only,
        verify_fn: exit_status_only,
    }
}

fn no_setup(_: &TestContext) -> Result<()> {
    Ok(())
}

fn target_only(ctx: &TestContext) -> Vec<String> {
    vec![ctx.target.clone()]
}

fn exit_status_only(_: &TestContext, _: &Execution) -> Result<Verdict> {
    Ok(Verdict::Pass)
}

impl TestRunner {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn with_setup(mut self, setup_fn: fn(&TestContext) -> Result<()>) -> Self {
        self.setup_fn = setup_fn;
        self
    }

    pub fn with_args(mut self, args_fn: fn(&TestContext) -> Vec<String>) -> Self {
        self.args_fn = args_fn;
        self
    }

    pub fn with_verify(mut self, verify_fn: fn(&TestContext, &Execution) -> Result<Verdict>) -> Self {
        self.verify_fn = verify_fn;
        self
    }

    pub fn with_artifacts(mut self, artifacts: &'static [&'static str]) -> Self {
        self.artifacts = artifacts;
        self
    }

    #[cfg(test)]
    pub fn without_linter(mut self) -> Self {
        self.linter = None;
        self
    }

    /// Timeouts, failing scripts and wrong output are scored, not returned as
    /// errors. An `Err` means the harness itself broke.
    pub fn run(
        &self,
        fileloc: &Path,
        target: &str,
        student: &StudentSpec,
        module: &ResolvedModule,
        spec: &TestSpec,
    ) -> Result<TestResult> {
        info!("Testing {}", target);
        let module_dir = module_dir(fileloc, &student.folder, &module.folder);
        let code_dir = module_dir.join(&module.code);

        let target = match resolve(&code_dir, target) {
            Some(found) => {
                if found == target {
                    debug!("File {} present!", target);
                } else {
                    warn!("Inferred target file as {}", found);
                }
                found
            }
            None if spec.required => {
                error!("File {} absent! -{} point", target, FILE_MISSING_POINTS);
                return Ok(TestResult::file_missing(FILE_MISSING_POINTS));
            }
            None => {
                warn!("File {} absent but not required!", target);
                target.to_string()
            }
        };

        let ctx = TestContext {
            module_dir,
            module,
            target,
            spec,
        };

        let linter_out = match self.linter {
            Some(linter) => lint(linter, &ctx),
            None => String::new(),
        };

        // A missing data folder only exists while the test runs.
        let borrowed_data = !ctx.data_dir().is_dir();
        if borrowed_data {
            debug!("Creating {} for the duration of the test", ctx.data_dir().display());
            create_dir(ctx.data_dir())?;
        }

        let outcome = self.exercise(&ctx);
        self.cleanup(&ctx, borrowed_data);
        let (stdout, deductions, other) = outcome?;

        Ok(TestResult {
            stdout,
            linter_out,
            deductions,
            other,
        })
    }

    fn exercise(&self, ctx: &TestContext) -> Result<(String, Deductions, BTreeMap<String, f64>)> {
        (self.setup_fn)(ctx)?;

        let args = (self.args_fn)(ctx);
        info!("Running {} using following command: {} {}", ctx.target, SHELL, args.join(" "));
        let exec = run_with_timeout(SHELL, &args, &ctx.code_dir(), ctx.spec.timeout())?;

        let mut other = BTreeMap::new();
        other.insert(EXEC_TIME_KEY.to_string(), exec.elapsed.as_secs_f64());
        info!("Ran {} in {:?}", ctx.target, exec.elapsed);

        let mut deductions = Deductions::new();
        if exec.timed_out() {
            error!("{} timed out! -{} point", ctx.target, TIMEOUT_POINTS);
            deductions.deduct(TIMEOUT_POINTS, Reason::Timeout);
        } else if !exec.success() {
            error!("{} errored! -{} point", ctx.target, RUN_ERROR_POINTS);
            error!("Error:\n{}", exec.output);
            deductions.deduct(RUN_ERROR_POINTS, Reason::RunError);
        } else {
            match (self.verify_fn)(ctx, &exec)? {
                Verdict::Pass => debug!("{} output verified", ctx.target),
                Verdict::Mismatch { points, detail } => {
                    warn!("{} gave incorrect output: {}. -{} points", ctx.target, detail, points);
                    deductions.deduct(points, Reason::ResultError);
                }
            }
        }

        Ok((exec.output, deductions, other))
    }

    fn cleanup(&self, ctx: &TestContext, borrowed_data: bool) {
        for dir in [ctx.data_dir(), ctx.results_dir(), ctx.code_dir()] {
            for artifact in self.artifacts {
                let path = dir.join(artifact);
                match remove_file(&path) {
                    Ok(()) => debug!("Removed {}", path.display()),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }
        if borrowed_data {
            if let Err(e) = remove_dir_all(ctx.data_dir()) {
                warn!("Failed to remove {}: {}", ctx.data_dir().display(), e);
            }
        }
    }
}

const LINT_TIMEOUT: Duration = Duration::from_secs(60);

/// Linter output is informational only; if the linter can't run, the reason
/// is the output.
fn lint(linter: &str, ctx: &TestContext) -> String {
    let limit = LINT_TIMEOUT.min(ctx.spec.timeout());
    match run_with_timeout(linter, &[&ctx.target], &ctx.code_dir(), limit) {
        Ok(exec) => {
            if exec.timed_out() {
                warn!("{} timed out on {}", linter, ctx.target);
            }
            exec.output
        }
        Err(e) => {
            warn!("Could not run {} on {}: {}", linter, ctx.target, e);
            format!("{}: {}", linter, e)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    runners: IndexMap<(String, String), TestRunner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Registry::new();
        for runner in week1::runners() {
            registry.register(week1::MODULE, runner);
        }
        registry.register("templates", shell_runner("test_shell"));
        registry
    }

    pub fn register(&mut self, module: &str, runner: TestRunner) {
        let key = (module.to_string(), runner.name.to_string());
        if let Some(old) = self.runners.insert(key, runner) {
            warn!("Replaced runner {}/{}", module, old.name);
        }
    }

    pub fn get(&self, module: &str, spec: &TestSpec) -> Option<&TestRunner> {
        self.runners
            .get(&(module.to_string(), spec.testfile_stem().to_string()))
    }

    pub fn check(&self, modules: &Modules, configs: &IndexMap<String, ModuleConfig>) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        for (id, module) in modules {
            let Some(config) = configs.get(id) else {
                continue;
            };
            for (target, spec) in &config.tests {
                if self.get(&module.name, spec).is_none() {
                    errors.push(ConfigError::Unregistered {
                        module: module.name.clone(),
                        target: target.clone(),
                        testfile: spec.testfile.clone(),
                    });
                }
            }
        }
        errors
    }
}
