//! Per-case evidence workspace.
//!
//! Every session gets a fresh timestamped folder tree; nothing is ever
//! reused across runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::audit::MANIFEST_NAME;

/// Folder layout for one acquisition session:
/// `<root>/<ID>_<YYYYmmdd_HHMMSS>/{01_Evidence,02_Logs,03_Report,04_Media}`.
#[derive(Clone, Debug)]
pub struct CaseFolders {
    base: PathBuf,
}

impl CaseFolders {
    pub fn create(root: &Path, case_id: &str) -> Result<Self> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let base = root.join(format!("{}_{stamp}", sanitize_case_id(case_id)));
        let folders = Self { base };
        for dir in [
            folders.screenshots(),
            folders.logs(),
            folders.report(),
            folders.media(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating case folder {}", dir.display()))?;
        }
        Ok(folders)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn evidence(&self) -> PathBuf {
        self.base.join("01_Evidence")
    }

    pub fn screenshots(&self) -> PathBuf {
        self.evidence().join("Screenshots")
    }

    pub fn logs(&self) -> PathBuf {
        self.base.join("02_Logs")
    }

    pub fn report(&self) -> PathBuf {
        self.base.join("03_Report")
    }

    pub fn media(&self) -> PathBuf {
        self.base.join("04_Media")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.logs().join("audit.log")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.logs().join(MANIFEST_NAME)
    }

    pub fn chat_data_path(&self) -> PathBuf {
        self.evidence().join("chat_data.json")
    }

    pub fn device_metadata_path(&self) -> PathBuf {
        self.logs().join("device_metadata.json")
    }
}

/// Keep alphanumerics, `-` and `_`; drop the rest. Empty input falls back
/// to a neutral id so the folder name stays valid.
pub fn sanitize_case_id(raw: &str) -> String {
    let safe: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if safe.is_empty() {
        String::from("CASE")
    } else {
        safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn test_sanitize_case_id() {
        assert_eq!(sanitize_case_id("EXP-2024_113"), "EXP-2024_113");
        assert_eq!(sanitize_case_id("case 12/3!"), "case123");
        assert_eq!(sanitize_case_id("  "), "CASE");
    }

    #[test]
    fn test_create_builds_layout() {
        let temp = TempDir::new().unwrap();
        let folders = CaseFolders::create(temp.path(), "EXP-7").unwrap();

        let name = folders
            .base()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(name.starts_with("EXP-7_"), "folder name: {name}");

        assert!(folders.screenshots().is_dir());
        assert!(folders.logs().is_dir());
        assert!(folders.report().is_dir());
        assert!(folders.media().is_dir());
        assert!(folders.audit_log_path().starts_with(folders.logs()));
        assert!(folders.chat_data_path().starts_with(folders.evidence()));
    }
}
