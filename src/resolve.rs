use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Children {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

impl Children {
    pub fn names(&self) -> impl Iterator<Item = &String> + Clone {
        self.dirs.iter().chain(self.files.iter())
    }
}

pub fn list_children(dir: &Path) -> io::Result<Children> {
    let mut children = Children::default();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        // Follows symlinks, so a linked folder counts as a folder.
        if entry.path().is_dir() {
            children.dirs.push(name);
        } else {
            children.files.push(name);
        }
    }
    children.dirs.sort();
    children.files.sort();
    Ok(children)
}

/// An exact match wins; otherwise the first child whose lowercase form equals
/// `expected` lowercased. Never recurses. A container that cannot be listed
/// resolves to nothing.
pub fn resolve(container: &Path, expected: &str) -> Option<String> {
    let children = match list_children(container) {
        Ok(children) => children,
        Err(e) => {
            debug!("Could not list {}: {}", container.display(), e);
            return None;
        }
    };
    resolve_among(children.names(), expected)
}

pub fn resolve_dir(container: &Path, expected: &str) -> Option<String> {
    let children = list_children(container).ok()?;
    resolve_among(children.dirs.iter(), expected)
}

fn resolve_among<'a>(names: impl Iterator<Item = &'a String> + Clone, expected: &str) -> Option<String> {
    if let Some(exact) = names.clone().find(|name| *name == expected) {
        return Some(exact.clone());
    }
    let wanted = expected.to_lowercase();
    names.into_iter().find(|name| name.to_lowercase() == wanted).cloned()
}

pub fn find_containing<'a>(names: &'a [String], needle: &str) -> Option<&'a String> {
    let needle = needle.to_lowercase();
    names.iter().find(|name| name.to_lowercase().contains(&needle))
}
