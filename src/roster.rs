use std::io::Result;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::marking_config::{Roster, StudentSpec};
use crate::resolve::list_children;

/// One row of the course export: `username,firstname,surname,email,group,git`.
#[derive(Debug, Deserialize)]
struct CsvStudent {
    username: String,
    firstname: String,
    surname: String,
    email: String,
    group: String,
    git: String,
}

impl CsvStudent {
    fn full_name(&self) -> String {
        format!("{} {}", self.firstname.trim(), self.surname.trim())
    }
}

pub fn roster_from_dir(dir: &Path) -> Result<Roster> {
    let folders = list_children(dir)?.dirs;
    info!("Found {} student/s", folders.len());

    let mut roster = Roster::default();
    for folder in folders {
        let id = folder.trim_matches('_').to_string();
        let student = StudentSpec::new(&id, &folder);
        if roster.students.insert(id.clone(), student).is_some() {
            warn!("Two folders map to student {}; keeping {}", id, folder);
        }
    }
    Ok(roster)
}

pub fn roster_from_csv(path: &Path) -> Result<Roster> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut roster = Roster::default();
    for row in reader.deserialize() {
        let row: CsvStudent = row?;
        let name = row.full_name();
        let id: String = name.split_whitespace().collect();
        debug!("{} is {}", row.username, id);

        let mut student = StudentSpec::new(&name, &id);
        student.git = Some(row.git);
        student.extra.insert("email".to_string(), Value::String(row.email));
        student.extra.insert("group".to_string(), Value::String(row.group));
        roster.students.insert(id, student);
    }
    info!("Read {} student/s from {}", roster.students.len(), path.display());
    Ok(roster)
}
