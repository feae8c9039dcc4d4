//! Chain-of-custody primitives: audit trail, content hashing, manifest seal.
//!
//! The audit trail and the manifest are the two artifacts an examiner hands
//! to a reviewer. The trail records every action as it happens; the manifest
//! binds every produced file to a SHA-256 at the end of the session.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use sha2::{Digest, Sha256};

const HASH_CHUNK: usize = 4096;

/// File name of the integrity manifest inside the logs folder.
pub const MANIFEST_NAME: &str = "manifest.json";

/// Append-only custody log, one line per action:
/// `[timestamp] [COMPONENT] ACTION: <action> | DETAILS: <details>`
#[derive(Clone, Debug)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry with millisecond precision. Write failures are
    /// surfaced; a session without custody records is not defensible.
    pub fn append(&self, component: &str, action: &str, details: &str) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening audit log {}", self.path.display()))?;
        writeln!(
            file,
            "[{timestamp}] [{component}] ACTION: {action} | DETAILS: {details}"
        )?;
        Ok(())
    }
}

/// SHA-256 of a file, streamed in 4 KiB chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; HASH_CHUNK];
    loop {
        let read = file.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of an in-memory buffer.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash every file under `case_dir` (relative path -> SHA-256), excluding
/// any previous manifest, and write the result to `manifest_path`.
pub fn seal_case(case_dir: &Path, manifest_path: &Path) -> Result<BTreeMap<String, String>> {
    let mut entries = BTreeMap::new();
    let mut files = Vec::new();
    collect_files(case_dir, &mut files)
        .with_context(|| format!("walking case folder {}", case_dir.display()))?;

    for file in files {
        if file.file_name().is_some_and(|name| name == MANIFEST_NAME) {
            continue;
        }
        let rel = file
            .strip_prefix(case_dir)
            .unwrap_or(&file)
            .to_string_lossy()
            .into_owned();
        entries.insert(rel, sha256_file(&file)?);
    }

    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(manifest_path, json)
        .with_context(|| format!("writing manifest {}", manifest_path.display()))?;
    Ok(entries)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
