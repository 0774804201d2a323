//! Data directory scanning.
//!
//! Only regular files directly inside the directory are considered. Office
//! lock files, names on the ignore list, and unknown extensions are skipped.

use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use log::debug;

/// File filters applied when scanning the data directory.
#[derive(Debug, Clone)]
pub struct DiscoveryRules {
    pub extensions: Vec<String>,
    pub ignore_files: Vec<String>,
    pub lock_prefix: String,
}

impl DiscoveryRules {
    pub fn accepts(&self, file_name: &str) -> bool {
        if !self.lock_prefix.is_empty() && file_name.starts_with(&self.lock_prefix) {
            return false;
        }
        if self.ignore_files.iter().any(|ignored| ignored == file_name) {
            return false;
        }
        let Some((_, ext)) = file_name.rsplit_once('.') else {
            return false;
        };
        self.extensions
            .iter()
            .map(|allowed| allowed.trim_start_matches('.'))
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}

/// Lists accepted files directly inside `dir`, sorted by name.
pub fn discover_files(dir: &Path, rules: &DiscoveryRules) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Reading data directory {dir:?}"))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Listing {dir:?}"))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if rules.accepts(&name) {
            files.push(path);
        } else {
            debug!("Skipping {name}");
        }
    }
    files.sort();
    Ok(files)
}
