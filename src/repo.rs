use std::io::Result;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::submission_dir;
use crate::deductions::{Deductions, Reason};
use crate::resolve::{find_containing, list_children};

pub const MISSING_REPO_POINTS: f64 = 100.0;
pub const MISSING_FILE_POINTS: f64 = 1.0;
pub const LARGE_FILE_POINTS: f64 = 1.0;
pub const LARGE_FILE_BYTES: u64 = 100_000_000;

const VCS_DIR: &str = ".git";

#[derive(Debug, Clone, PartialEq)]
pub struct RepoCheck {
    pub fatal: bool,
    pub deductions: Deductions,
}

pub fn check_repo(fileloc: &Path, student_folder: &str) -> Result<RepoCheck> {
    let repo = submission_dir(fileloc, student_folder);
    if !repo.is_dir() {
        error!("Repo {} missing entirely!", repo.display());
        return Ok(RepoCheck {
            fatal: true,
            deductions: Deductions::single(MISSING_REPO_POINTS, Reason::MissingRepo),
        });
    }

    let mut deductions = Deductions::new();
    let files = list_children(&repo)?.files;

    match find_containing(&files, "readme") {
        Some(readme) => info!("Found repo-level readme: {}", readme),
        None => {
            warn!("No repo-level readme detected!");
            deductions.deduct(MISSING_FILE_POINTS, Reason::NoRepoReadme);
        }
    }

    match find_containing(&files, ".gitignore") {
        Some(gitignore) => info!("Found repo-level gitignore: {}", gitignore),
        None => {
            warn!("No repo-level gitignore detected!");
            deductions.deduct(MISSING_FILE_POINTS, Reason::NoRepoGitignore);
        }
    }

    let large = large_files(&repo)?;
    if !large.is_empty() {
        warn!(
            "Found {} large file/s in repo folder (>100MB), -1pt per file: {:?}",
            large.len(),
            large
        );
        deductions.deduct(LARGE_FILE_POINTS * large.len() as f64, Reason::LargeFiles);
    }

    Ok(RepoCheck {
        fatal: false,
        deductions,
    })
}

/// Paths, relative to `repo`, of files over [`LARGE_FILE_BYTES`], skipping
/// version-control internals.
fn large_files(repo: &Path) -> Result<Vec<PathBuf>> {
    let mut large = Vec::new();
    let walker = WalkDir::new(repo)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != VCS_DIR);
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && entry.metadata()?.len() > LARGE_FILE_BYTES {
            let relative = entry.path().strip_prefix(repo).unwrap_or(entry.path());
            large.push(relative.to_path_buf());
        }
    }
    Ok(large)
}
