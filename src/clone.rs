use std::fs::remove_dir_all;
use std::io::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

use threadpool::ThreadPool;
use tracing::{error, info, warn};

use crate::marking_config::Roster;
use crate::process::run_with_timeout;

pub const CLONE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CloneSummary {
    pub cloned: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Clones every student with a repository URL into `datafolder`, replacing
/// any earlier copy. One job per student; failures are counted, not fatal.
pub fn clone_all(roster: &Roster, datafolder: &Path, threads: usize) -> Result<CloneSummary> {
    if !datafolder.is_dir() {
        return Err(Error::new(
            ErrorKind::NotFound,
            format!("{} is not a directory", datafolder.display()),
        ));
    }

    let pool = ThreadPool::new(threads.max(1));
    let (tx, rx) = channel();
    let mut summary = CloneSummary::default();
    let mut jobs = 0;

    for (id, student) in &roster.students {
        let url = match student.git.as_deref() {
            Some(url) if !url.trim().is_empty() => url.to_string(),
            _ => {
                info!("{} has no repository, skipping", id);
                summary.skipped += 1;
                continue;
            }
        };
        let id = id.clone();
        let folder = student.folder.clone();
        let datafolder = datafolder.to_path_buf();
        let tx = tx.clone();
        pool.execute(move || {
            let result = clone_one(&url, &folder, &datafolder);
            if let Err(e) = &result {
                error!("Failed to clone {} for {}: {}", url, id, e);
            }
            let _ = tx.send(result.is_ok());
        });
        jobs += 1;
    }
    drop(tx);

    for ok in rx.iter().take(jobs) {
        if ok {
            summary.cloned += 1;
        } else {
            summary.failed += 1;
        }
    }
    pool.join();

    info!(
        "Cloned {}, failed {}, skipped {}",
        summary.cloned, summary.failed, summary.skipped
    );
    Ok(summary)
}

fn clone_one(url: &str, folder: &str, datafolder: &Path) -> Result<PathBuf> {
    let dest = datafolder.join(folder);
    if dest.is_dir() {
        warn!("Removing existing {}", dest.display());
        remove_dir_all(&dest)?;
    }

    let exec = run_with_timeout("git", &["clone", url, folder], datafolder, CLONE_TIMEOUT)?;
    if exec.timed_out() {
        return Err(Error::new(
            ErrorKind::TimedOut,
            format!("git clone timed out after {:?}", CLONE_TIMEOUT),
        ));
    }
    if !exec.success() {
        return Err(Error::new(ErrorKind::Other, format!("git clone failed:\n{}", exec.output)));
    }
    info!("Cloned {} into {}", url, dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use predicates::prelude::*;

    use super::*;
    use crate::marking_config::StudentSpec;

    #[test]
    fn students_without_repository_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mut roster = Roster::default();
        roster.students.insert("a".to_string(), StudentSpec::new("A", "a"));
        let mut blank = StudentSpec::new("B", "b");
        blank.git = Some("  ".to_string());
        roster.students.insert("b".to_string(), blank);

        let summary = clone_all(&roster, dir.path(), 2).unwrap();
        assert_eq!(
            summary,
            CloneSummary {
                cloned: 0,
                failed: 0,
                skipped: 2
            }
        );
    }

    #[test]
    fn failed_clone_is_counted_and_old_copy_removed() {
        let dir = TempDir::new().unwrap();
        dir.child("stale").child("old.txt").touch().unwrap();
        let mut student = StudentSpec::new("Stale", "stale");
        student.git = Some(dir.child("no-such-remote").path().display().to_string());
        let mut roster = Roster::default();
        roster.students.insert("stale".to_string(), student);

        let summary = clone_all(&roster, dir.path(), 4).unwrap();
        assert_eq!(summary.failed, 1);
        dir.child("stale").child("old.txt").assert(predicate::path::missing());
    }

    #[test]
    fn datafolder_must_exist() {
        let dir = TempDir::new().unwrap();
        let err = clone_all(&Roster::default(), &dir.path().join("absent"), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
