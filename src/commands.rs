use std::fs::File;
use std::io::{stdout, BufWriter};
use std::path::Path;

use tracing::info;

use crate::clone::clone_all;
use crate::logging::init_console;
use crate::mark::{self, MarkArgs};
use crate::marking_config::{read_roster, write_json};
use crate::report::load_report;
use crate::roster;
use crate::summary::{summarize, write_summary};

pub fn mark(args: &MarkArgs) -> bool {
    match mark::mark(args) {
        Ok(report) => {
            println!("Marked {} student/s", report.len());
            true
        }
        Err(e) => {
            eprintln!("Marking aborted: {:#}", e);
            false
        }
    }
}

pub fn clone(students: &Path, datafolder: &Path, threads: Option<usize>) -> bool {
    init_console();
    let roster = match read_roster(students) {
        Ok(roster) => roster,
        Err(e) => {
            eprintln!("{}", e);
            return false;
        }
    };
    let threads = threads.unwrap_or_else(num_cpus::get);
    info!("Cloning with {} thread/s", threads);
    match clone_all(&roster, datafolder, threads) {
        Ok(summary) => {
            println!(
                "Cloned: {}, Failed: {}, Skipped: {}",
                summary.cloned, summary.failed, summary.skipped
            );
            summary.failed == 0
        }
        Err(e) => {
            eprintln!("Error while cloning: {}", e);
            false
        }
    }
}

pub fn roster_from_dir(dir: &Path, outfile: &Path) -> bool {
    init_console();
    match roster::roster_from_dir(dir).and_then(|roster| {
        write_json(outfile, &roster)?;
        Ok(roster.students.len())
    }) {
        Ok(n) => {
            println!("Wrote {} student/s to {}", n, outfile.display());
            true
        }
        Err(e) => {
            eprintln!("Failed to build roster from {}: {}", dir.display(), e);
            false
        }
    }
}

pub fn roster_from_csv(csv: &Path, outfile: &Path) -> bool {
    init_console();
    match roster::roster_from_csv(csv).and_then(|roster| {
        write_json(outfile, &roster)?;
        Ok(roster.students.len())
    }) {
        Ok(n) => {
            println!("Wrote {} student/s to {}", n, outfile.display());
            true
        }
        Err(e) => {
            eprintln!("Failed to build roster from {}: {}", csv.display(), e);
            false
        }
    }
}

pub fn summary(results: &Path, out: Option<&Path>) -> bool {
    let report = match load_report(results) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}", e);
            return false;
        }
    };
    let summary = summarize(&report);
    let written = match out {
        Some(out) => File::create(out).and_then(|f| write_summary(&summary, BufWriter::new(f))),
        None => write_summary(&summary, stdout().lock()),
    };
    if let Err(e) = written {
        eprintln!("Failed to write summary: {}", e);
        return false;
    }
    true
}
