//! Bulk preservation of the target app's public media trees.
//!
//! Modern Android keeps the app's media under scoped storage; older layouts
//! used a top-level folder. Both locations are probed and the first readable
//! one is pulled wholesale. Newer devices sometimes refuse the recursive
//! pull, so a per-subfolder fallback keeps partial preservation possible.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::adb::AdbExecutor;
use crate::audit::AuditLog;
use crate::case::CaseFolders;
use crate::config::Config;
use crate::error::Result;

/// Known public media tree locations, most specific first.
pub fn media_tree_candidates(package: &str) -> Vec<String> {
    vec![
        format!("/sdcard/Android/media/{package}/WhatsApp/Media"),
        String::from("/sdcard/WhatsApp/Media"),
    ]
}

/// Console activity indicator for the long-running copy. The worker owns
/// nothing but an atomic stop flag and is joined on drop, so no exit path
/// can leak the thread.
struct Spinner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    fn start(message: &str) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let message = message.to_string();
        let handle = thread::spawn(move || {
            let glyphs = ['|', '/', '-', '\\'];
            let mut idx = 0usize;
            while !flag.load(Ordering::Relaxed) {
                print!("\r[*] {message} {} ", glyphs[idx % glyphs.len()]);
                let _ = io::stdout().flush();
                idx += 1;
                thread::sleep(Duration::from_millis(100));
            }
            print!("\r{}\r", " ".repeat(message.len() + 20));
            let _ = io::stdout().flush();
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn finish(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.finish();
    }
}

pub struct MediaExtractor<'a> {
    adb: &'a AdbExecutor,
    audit: &'a AuditLog,
    package: String,
    media_dir: PathBuf,
}

impl<'a> MediaExtractor<'a> {
    pub fn new(
        adb: &'a AdbExecutor,
        audit: &'a AuditLog,
        folders: &CaseFolders,
        cfg: &Config,
    ) -> Self {
        Self {
            adb,
            audit,
            package: cfg.package.clone(),
            media_dir: folders.media(),
        }
    }

    /// Preserve whatever media the device exposes. Returns the number of
    /// files that landed locally; zero means nothing could be preserved.
    pub fn run(&self) -> Result<u64> {
        info!("starting media preservation phase");

        let Some(remote) = self.find_active_tree() else {
            warn!("no readable media tree on the device");
            return Ok(0);
        };
        self.audit
            .append("MEDIA", "EXTRACTION_START", &format!("Source: {remote}"))?;

        let media_str = self.media_dir.to_string_lossy().into_owned();
        let mut spinner = Spinner::start("Preserving media files...");
        let bulk = self.adb.execute_unbounded(&["pull", &remote, &media_str]);
        spinner.finish();

        if !bulk.is_success() {
            warn!("bulk pull rejected, falling back to per-folder transfers");
            if self.pull_subfolders(&remote)? == 0 {
                self.audit.append(
                    "MEDIA",
                    "EXTRACTION_FAIL",
                    "bulk and per-folder pulls both rejected",
                )?;
                return Ok(0);
            }
        }

        let files = count_files(&self.media_dir);
        if files > 0 {
            info!(files, "media preserved");
            self.audit.append(
                "MEDIA",
                "EXTRACTION_COMPLETE",
                &format!("Total files: {files}"),
            )?;
        } else {
            warn!("media tree processed but no files were recovered");
        }
        Ok(files)
    }

    /// First candidate the device will actually list. The quoted remote path
    /// survives the on-device shell even with spaces in folder names.
    fn find_active_tree(&self) -> Option<String> {
        for candidate in media_tree_candidates(&self.package) {
            let probe = format!("ls -d '{candidate}'");
            if let Some(out) = self
                .adb
                .execute_with_retries(&["shell", &probe], 1)
                .output()
            {
                if !out.contains("No such") {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Compatibility path: list the tree and pull each child on its own.
    fn pull_subfolders(&self, remote: &str) -> Result<u32> {
        let listing = format!("ls '{remote}'");
        let Some(out) = self
            .adb
            .execute_with_retries(&["shell", &listing], 1)
            .output()
            .map(String::from)
        else {
            return Ok(0);
        };

        let mut pulled = 0;
        for folder in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let remote_sub = format!("{remote}/{folder}");
            let local_sub = self.media_dir.join(folder);
            let local_str = local_sub.to_string_lossy().into_owned();
            if self
                .adb
                .execute_unbounded(&["pull", &remote_sub, &local_str])
                .is_success()
            {
                pulled += 1;
            }
        }
        Ok(pulled)
    }
}

fn count_files(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            count += count_files(&path);
        } else {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    fn stub_adb(dir: &Path, body: &str) -> AdbExecutor {
        let path = dir.join("adb-stub");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        AdbExecutor::new(path.to_string_lossy(), Duration::from_secs(5), 1)
    }

    fn setup(temp: &TempDir) -> (CaseFolders, AuditLog, Config) {
        let folders = CaseFolders::create(temp.path(), "MEDIA-T").unwrap();
        let audit = AuditLog::new(folders.audit_log_path());
        (folders, audit, Config::default())
    }

    #[test]
    fn test_candidates_follow_the_target_package() {
        let candidates = media_tree_candidates("com.example.chat");
        assert_eq!(
            candidates[0],
            "/sdcard/Android/media/com.example.chat/WhatsApp/Media"
        );
        assert_eq!(candidates[1], "/sdcard/WhatsApp/Media");
    }

    #[test]
    fn test_no_readable_tree_preserves_nothing() {
        let temp = TempDir::new().unwrap();
        let (folders, audit, cfg) = setup(&temp);
        // Device answers but every candidate is absent.
        let adb = stub_adb(
            temp.path(),
            "echo \"ls: No such file or directory\"; exit 0",
        );

        let files = MediaExtractor::new(&adb, &audit, &folders, &cfg)
            .run()
            .unwrap();

        assert_eq!(files, 0);
        let trail = fs::read_to_string(audit.path()).unwrap_or_default();
        assert!(!trail.contains("EXTRACTION_START"));
    }

    #[test]
    fn test_bulk_pull_counts_preserved_files() {
        let temp = TempDir::new().unwrap();
        let (folders, audit, cfg) = setup(&temp);
        let adb = stub_adb(
            temp.path(),
            r#"case "$1" in
shell) echo ok; exit 0 ;;
pull) mkdir -p "$3/WhatsApp Images" && printf a > "$3/WhatsApp Images/IMG-1.jpg" && printf b > "$3/VID-1.mp4"; exit 0 ;;
*) exit 0 ;;
esac"#,
        );

        let files = MediaExtractor::new(&adb, &audit, &folders, &cfg)
            .run()
            .unwrap();

        assert_eq!(files, 2);
        let trail = fs::read_to_string(audit.path()).unwrap();
        assert!(trail.contains("EXTRACTION_START"));
        assert!(trail.contains("Total files: 2"));
    }

    #[test]
    fn test_per_folder_fallback_when_bulk_rejected() {
        let temp = TempDir::new().unwrap();
        let (folders, audit, cfg) = setup(&temp);
        let adb = stub_adb(
            temp.path(),
            r#"case "$1" in
shell)
  case "$2" in
    "ls -d "*) echo ok ;;
    "ls "*) echo "WhatsApp Images"; echo "WhatsApp Video" ;;
  esac
  exit 0 ;;
pull)
  case "$2" in
    */Media) exit 1 ;;
    *) mkdir -p "$3" && printf x > "$3/file.jpg"; exit 0 ;;
  esac ;;
*) exit 0 ;;
esac"#,
        );

        let files = MediaExtractor::new(&adb, &audit, &folders, &cfg)
            .run()
            .unwrap();

        // One file per subfolder pulled by the compatibility path.
        assert_eq!(files, 2);
        assert!(folders.media().join("WhatsApp Images/file.jpg").exists());
        assert!(folders.media().join("WhatsApp Video/file.jpg").exists());
    }

    #[test]
    fn test_spinner_joins_on_drop() {
        let spinner = Spinner::start("working");
        thread::sleep(Duration::from_millis(150));
        drop(spinner);
        // Reaching this line means the worker thread terminated.
    }
}
