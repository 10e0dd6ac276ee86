use std::fs;
use std::io::{ErrorKind, Result};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{shell_runner, TestContext, TestRunner, Verdict};
use crate::process::Execution;

pub const MODULE: &str = "week1";

const CONCAT_OUT: &str = "testout.demo";
const TSV_FIXTURE: &str = "testtsv.tsv";
const TSV_CONTENTS: &str = "1\thello\tgoodbye\thmm\n5\t6\t7\t8\n";
const CSV_FIXTURE: &str = "testcsv.csv";
const CSV_CONTENTS: &str = "1,hello,goodbye,hmm\n5,6,7,8\n";
const TIFF_FIXTURE: &str = "test.tif";
const TIFF_BYTES: &[u8] = include_bytes!("../../assets/test.tif");
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

const CONCAT_POINTS: f64 = 1.0;
const CONVERSION_POINTS: f64 = 0.5;

pub fn runners() -> Vec<TestRunner> {
    vec![
        shell_runner("test_countlines").with_args(script_and_itself),
        shell_runner("test_ConcatenateTwoFiles")
            .with_args(concat_args)
            .with_verify(verify_concat)
            .with_artifacts(&[CONCAT_OUT]),
        shell_runner("test_tabtocsv")
            .with_setup(write_tsv)
            .with_args(tsv_args)
            .with_verify(verify_tsv)
            .with_artifacts(&[TSV_FIXTURE, "testtsv.csv", "testtsv.tsv.csv"]),
        shell_runner("test_csvtospace")
            .with_setup(write_csv)
            .with_args(csv_args)
            .with_verify(verify_csv)
            .with_artifacts(&[CSV_FIXTURE, "testcsv.txt", "testcsv.csv.txt"]),
        shell_runner("test_tiff2png")
            .with_setup(write_tiff)
            .with_args(tiff_args)
            .with_verify(verify_png)
            .with_artifacts(&[TIFF_FIXTURE, "test.png"]),
    ]
}

fn script_and_itself(ctx: &TestContext) -> Vec<String> {
    vec![ctx.target.clone(), ctx.target.clone()]
}

fn concat_args(ctx: &TestContext) -> Vec<String> {
    vec![
        ctx.target.clone(),
        ctx.target.clone(),
        ctx.target.clone(),
        ctx.data_rel(CONCAT_OUT),
    ]
}

/// `wc -l`: newline bytes, a missing file has none.
fn count_lines(path: &Path) -> Result<usize> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes.iter().filter(|b| **b == b'\n').count()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("{} not found!", path.display());
            Ok(0)
        }
        Err(e) => Err(e),
    }
}

fn verify_concat(ctx: &TestContext, _: &Execution) -> Result<Verdict> {
    let target_lines = count_lines(&ctx.target_path())?;
    let final_lines = count_lines(&ctx.data_dir().join(CONCAT_OUT))?;
    debug!("{} lines in target, {} lines in final", target_lines, final_lines);
    if final_lines == target_lines * 2 {
        Ok(Verdict::Pass)
    } else {
        Ok(Verdict::Mismatch {
            points: CONCAT_POINTS,
            detail: format!("expected {} lines, got {} lines", target_lines * 2, final_lines),
        })
    }
}

fn write_tsv(ctx: &TestContext) -> Result<()> {
    fs::write(ctx.data_dir().join(TSV_FIXTURE), TSV_CONTENTS)
}

fn tsv_args(ctx: &TestContext) -> Vec<String> {
    vec![ctx.target.clone(), ctx.data_rel(TSV_FIXTURE)]
}

fn verify_tsv(ctx: &TestContext, _: &Execution) -> Result<Verdict> {
    let candidates = ctx.candidates(&["{data}/testtsv.csv", "{data}/testtsv.tsv.csv"]);
    any_candidate(&candidates, |contents| !contents.contains(&b'\t'), "no tabs")
}

fn write_csv(ctx: &TestContext) -> Result<()> {
    fs::write(ctx.data_dir().join(CSV_FIXTURE), CSV_CONTENTS)
}

fn csv_args(ctx: &TestContext) -> Vec<String> {
    vec![ctx.target.clone(), ctx.data_rel(CSV_FIXTURE)]
}

fn verify_csv(ctx: &TestContext, _: &Execution) -> Result<Verdict> {
    let candidates = ctx.candidates(&[
        "{data}/testcsv.txt",
        "{data}/testcsv.csv.txt",
        "{results}/testcsv.txt",
        "{results}/testcsv.csv.txt",
        "{code}/testcsv.txt",
        "{code}/testcsv.csv.txt",
    ]);
    any_candidate(&candidates, |contents| !contents.contains(&b','), "no commas")
}

fn write_tiff(ctx: &TestContext) -> Result<()> {
    fs::write(ctx.code_dir().join(TIFF_FIXTURE), TIFF_BYTES)
}

fn tiff_args(ctx: &TestContext) -> Vec<String> {
    vec![ctx.target.clone(), TIFF_FIXTURE.to_string()]
}

fn verify_png(ctx: &TestContext, _: &Execution) -> Result<Verdict> {
    let candidates = ctx.candidates(&["{data}/test.png", "{code}/test.png"]);
    any_candidate(&candidates, |contents| contents.starts_with(PNG_SIGNATURE), "a PNG image")
}

fn any_candidate<F>(candidates: &[PathBuf], accept: F, expected: &str) -> Result<Verdict>
where
    F: Fn(&[u8]) -> bool,
{
    for candidate in candidates {
        match fs::read(candidate) {
            Ok(contents) if accept(&contents) => {
                debug!("{} holds {}", candidate.display(), expected);
                return Ok(Verdict::Pass);
            }
            Ok(_) => info!("{} exists but does not hold {}", candidate.display(), expected),
            Err(e) if e.kind() == ErrorKind::NotFound => debug!("{} not produced", candidate.display()),
            Err(e) => warn!("Could not read {}: {}", candidate.display(), e),
        }
    }
    let names: Vec<String> = candidates
        .iter()
        .map(|c| c.display().to_string())
        .collect();
    Ok(Verdict::Mismatch {
        points: CONVERSION_POINTS,
        detail: format!("none of {} holds {}", names.join(", "), expected),
    })
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use predicates::prelude::*;

    use super::super::tests::{resolved, script, submission};
    use super::*;
    use crate::deductions::{Deductions, Reason};
    use crate::marking_config::{StudentSpec, TestSpec};
    use crate::report::TestResult;

    fn runner(name: &str) -> TestRunner {
        runners()
            .into_iter()
            .find(|r| r.name() == name)
            .unwrap()
            .without_linter()
    }

    fn run(name: &str, root: &TempDir, target: &str) -> TestResult {
        runner(name)
            .run(
                root.path(),
                target,
                &StudentSpec::new("Alice", "alice"),
                &resolved(),
                &TestSpec::new(&format!("{}.py", name)),
            )
            .unwrap()
    }

    fn week(root: &TempDir) -> assert_fs::fixture::ChildPath {
        root.child("alice").child("week1")
    }

    #[test]
    fn countlines_receives_itself() {
        let root = TempDir::new().unwrap();
        submission(&root);
        script(&root, "countlines.sh", "wc -l < \"$1\"\n");
        let result = run("test_countlines", &root, "countlines.sh");
        assert!(result.deductions.is_empty());
        assert_eq!(result.stdout.trim(), "1");
    }

    #[test]
    fn concatenation_must_double_the_lines() {
        let root = TempDir::new().unwrap();
        submission(&root);
        script(&root, "concat.sh", "cat \"$1\" \"$2\" > \"$3\"\n");
        let result = run("test_ConcatenateTwoFiles", &root, "concat.sh");
        assert!(result.deductions.is_empty());
        week(&root).child("data").child(CONCAT_OUT).assert(predicate::path::missing());
    }

    #[test]
    fn short_concatenation_loses_a_point() {
        let root = TempDir::new().unwrap();
        submission(&root);
        script(&root, "concat.sh", "cat \"$1\" > \"$3\"\n# second line\n");
        let result = run("test_ConcatenateTwoFiles", &root, "concat.sh");
        assert_eq!(result.deductions, Deductions::single(1.0, Reason::ResultError));
    }

    #[test]
    fn tab_to_csv_conversion_passes() {
        let root = TempDir::new().unwrap();
        submission(&root);
        script(&root, "tabtocsv.sh", "tr '\\t' ',' < \"$1\" > \"${1%.tsv}.csv\"\n");
        let result = run("test_tabtocsv", &root, "tabtocsv.sh");
        assert!(result.deductions.is_empty());
        week(&root).child("data").child(TSV_FIXTURE).assert(predicate::path::missing());
        week(&root).child("data").child("testtsv.csv").assert(predicate::path::missing());
    }

    #[test]
    fn tab_to_csv_without_output_loses_half_a_point() {
        let root = TempDir::new().unwrap();
        submission(&root);
        script(&root, "tabtocsv.sh", "cat \"$1\"\n");
        let result = run("test_tabtocsv", &root, "tabtocsv.sh");
        assert_eq!(result.deductions, Deductions::single(0.5, Reason::ResultError));
        assert_eq!(result.stdout, TSV_CONTENTS);
    }

    #[test]
    fn csv_to_space_output_may_land_in_results() {
        let root = TempDir::new().unwrap();
        submission(&root);
        script(&root, "csvtospace.sh", "tr ',' ' ' < \"$1\" > ../results/testcsv.txt\n");
        let result = run("test_csvtospace", &root, "csvtospace.sh");
        assert!(result.deductions.is_empty());
        week(&root).child("results").child("testcsv.txt").assert(predicate::path::missing());
    }

    #[test]
    fn csv_left_unconverted_loses_half_a_point() {
        let root = TempDir::new().unwrap();
        submission(&root);
        script(&root, "csvtospace.sh", "cp \"$1\" ../data/testcsv.txt\n");
        let result = run("test_csvtospace", &root, "csvtospace.sh");
        assert_eq!(result.deductions, Deductions::single(0.5, Reason::ResultError));
    }

    #[test]
    fn tiff_fixture_is_provided_and_png_checked() {
        let root = TempDir::new().unwrap();
        submission(&root);
        script(
            &root,
            "tiff2png.sh",
            "head -c 3 \"$1\"\nprintf '\\x89PNG\\r\\n\\x1a\\n' > ../data/test.png\n",
        );
        let result = run("test_tiff2png", &root, "tiff2png.sh");
        assert!(result.deductions.is_empty());
        assert!(result.stdout.starts_with("II*"));
        week(&root).child("code").child(TIFF_FIXTURE).assert(predicate::path::missing());
        week(&root).child("data").child("test.png").assert(predicate::path::missing());
    }

    #[test]
    fn non_png_output_loses_half_a_point() {
        let root = TempDir::new().unwrap();
        submission(&root);
        script(&root, "tiff2png.sh", "cp \"$1\" test.png\n");
        let result = run("test_tiff2png", &root, "tiff2png.sh");
        assert_eq!(result.deductions, Deductions::single(0.5, Reason::ResultError));
    }

    #[test]
    fn embedded_tiff_is_little_endian_tiff() {
        assert!(TIFF_BYTES.starts_with(b"II*\0"));
    }
}
