//! Vector B: staged reinstall of a legacy build to re-open the backup path.
//!
//! Modern builds of the target app refuse `adb backup`. Swapping in a legacy
//! build while keeping user data re-enables the unencrypted backup flow on
//! devices below the enforcement SDK. The swap is loud and touches the
//! device heavily, so every step lands in the audit trail.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::adb::{AdbExecutor, ExecOutcome};
use crate::audit::AuditLog;
use crate::config::{Config, DEVICE_TMP_DIR, LEGACY_APK_NAME, MIN_BACKUP_BYTES};
use crate::error::Result;
use crate::vectors::{pause_for_operator, Attempt, Reason, Vector};

/// Settle after the uninstall so the package manager catches up.
const SWAP_SETTLE: Duration = Duration::from_secs(2);
/// Settle after a successful install before triggering the backup.
const INSTALL_SETTLE: Duration = Duration::from_secs(3);

pub struct StagedReinstall<'a> {
    adb: &'a AdbExecutor,
    audit: &'a AuditLog,
    package: String,
    legacy_apk: PathBuf,
    backup_extractor: PathBuf,
    no_prompt: bool,
}

impl<'a> StagedReinstall<'a> {
    pub fn new(adb: &'a AdbExecutor, audit: &'a AuditLog, cfg: &Config) -> Self {
        Self {
            adb,
            audit,
            package: cfg.package.clone(),
            legacy_apk: cfg.legacy_apk.clone(),
            backup_extractor: cfg.backup_extractor.clone(),
            no_prompt: cfg.no_prompt,
        }
    }

    /// Run the full staged-reinstall protocol against the attached device.
    ///
    /// Device-side failures come back as a `Failed`/`Skipped` attempt so the
    /// cascade can move on; only host-side custody problems raise.
    pub fn run(&self, evidence_dir: &Path) -> Result<Attempt> {
        let component = Vector::StagedReinstall.as_str();

        for (label, path) in [
            ("unpack utility", &self.backup_extractor),
            ("legacy package", &self.legacy_apk),
        ] {
            if !path.exists() {
                warn!(%label, path = %path.display(), "reinstall dependency missing");
                self.audit.append(
                    component,
                    "VECTOR_SKIP",
                    &format!("missing {label}: {}", path.display()),
                )?;
                return Ok(Attempt::skipped(
                    Vector::StagedReinstall,
                    Reason::DependencyMissing,
                ));
            }
        }

        self.audit.append(
            component,
            "VECTOR_START",
            &format!("legacy swap of {}", self.package),
        )?;
        info!(package = %self.package, "starting staged reinstall, keep the cable connected");

        // Uninstall keeping user data. A failure here is survivable: the
        // install fallbacks cope with both present and absent packages.
        let removed = self.single(&["shell", "pm", "uninstall", "-k", &self.package]);
        self.audit.append(
            component,
            "UNINSTALL_KEEP_DATA",
            &format!("{} -> {}", self.package, removed.as_str()),
        )?;
        thread::sleep(SWAP_SETTLE);

        if !self.install_legacy(component)? {
            self.audit
                .append(component, "VECTOR_FAIL", "all install paths rejected")?;
            return Ok(Attempt::failed(
                Vector::StagedReinstall,
                Reason::InstallPathsExhausted,
            ));
        }
        thread::sleep(INSTALL_SETTLE);

        if !self.no_prompt {
            pause_for_operator("Accept the backup on the device screen. Leave the password empty.");
        }

        let backup_path = evidence_dir.join("backup.ab");
        let backup_str = backup_path.to_string_lossy().into_owned();
        self.audit
            .append(component, "BACKUP_TRIGGER", &backup_str)?;
        // Blocks until the operator confirms at the device, so no deadline.
        let backup = self
            .adb
            .execute_unbounded(&["backup", "-f", &backup_str, "-noapk", &self.package]);
        if !backup.is_success() {
            self.audit
                .append(component, "VECTOR_FAIL", "backup command did not complete")?;
            return Ok(Attempt::failed(
                Vector::StagedReinstall,
                Reason::ArtifactPullFailed,
            ));
        }

        let backup_bytes = fs::metadata(&backup_path).map(|m| m.len()).unwrap_or(0);
        if backup_bytes <= MIN_BACKUP_BYTES {
            warn!(backup_bytes, "backup archive absent or too small to hold data");
            self.audit.append(
                component,
                "VECTOR_FAIL",
                &format!("backup of {backup_bytes} bytes rejected"),
            )?;
            return Ok(Attempt::failed(
                Vector::StagedReinstall,
                Reason::BackupTooSmall,
            ));
        }
        self.audit.append(
            component,
            "BACKUP_CAPTURED",
            &format!("{backup_str} ({backup_bytes} bytes)"),
        )?;

        let tar_path = evidence_dir.join("backup.tar");
        if !self.unpack_backup(&backup_path, &tar_path) {
            self.audit
                .append(component, "VECTOR_FAIL", "backup archive unpack failed")?;
            return Ok(Attempt::failed(
                Vector::StagedReinstall,
                Reason::UnpackFailed,
            ));
        }
        self.audit.append(
            component,
            "VECTOR_SUCCESS",
            &format!("key material recovered into {}", tar_path.display()),
        )?;

        Ok(Attempt::succeeded(
            Vector::StagedReinstall,
            Reason::BackupRecovered,
            vec![backup_path, tar_path],
        ))
    }

    /// Three install fallbacks, strongest first. True once any sticks.
    fn install_legacy(&self, component: &str) -> Result<bool> {
        let apk = self.legacy_apk.to_string_lossy().into_owned();

        let reinstall = self.single(&["install", "-r", "-d", &apk]);
        self.audit.append(
            component,
            "INSTALL_PATH",
            &format!("install -r -d -> {}", reinstall.as_str()),
        )?;
        if reinstall.is_success() {
            return Ok(true);
        }

        let downgrade = self.single(&["install", "-d", &apk]);
        self.audit.append(
            component,
            "INSTALL_PATH",
            &format!("install -d -> {}", downgrade.as_str()),
        )?;
        if downgrade.is_success() {
            return Ok(true);
        }

        // Last resort: stage the package on the device and let the on-device
        // package manager do the install. Its exit status is unreliable, the
        // textual Success marker is not.
        let file_name = self
            .legacy_apk
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| LEGACY_APK_NAME.to_string());
        let remote = format!("{DEVICE_TMP_DIR}/{file_name}");

        let pushed = self.single(&["push", &apk, &remote]);
        if !pushed.is_success() {
            self.audit.append(
                component,
                "INSTALL_PATH",
                &format!("push to {remote} -> {}", pushed.as_str()),
            )?;
            return Ok(false);
        }
        let shell_install = self.single(&["shell", "pm", "install", "-r", "-d", &remote]);
        let accepted = shell_install
            .output()
            .is_some_and(|out| out.contains("Success"));
        self.audit.append(
            component,
            "INSTALL_PATH",
            &format!(
                "on-device pm install -> {}",
                if accepted { "SUCCESS" } else { "REJECTED" }
            ),
        )?;
        Ok(accepted)
    }

    fn unpack_backup(&self, backup: &Path, tar: &Path) -> bool {
        info!(archive = %backup.display(), "unpacking backup archive");
        let status = Command::new("java")
            .arg("-jar")
            .arg(&self.backup_extractor)
            .arg("unpack")
            .arg(backup)
            .arg(tar)
            .status();
        match status {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!(code = ?status.code(), "backup extractor exited non-zero");
                false
            }
            Err(err) => {
                warn!(%err, "could not launch the backup extractor");
                false
            }
        }
    }

    /// One attempt, no backoff. Install and transfer steps are not retried;
    /// a rejection is a real answer, not a transient fault.
    fn single(&self, args: &[&str]) -> ExecOutcome {
        self.adb.execute_with_retries(args, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use crate::vectors::Outcome;

    fn stub_adb(dir: &Path, body: &str) -> AdbExecutor {
        let path = dir.join("adb-stub");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        AdbExecutor::new(path.to_string_lossy(), Duration::from_secs(5), 1)
    }

    fn test_config(temp: &TempDir) -> Config {
        Config {
            legacy_apk: temp.path().join("LegacyWhatsApp.apk"),
            backup_extractor: temp.path().join("abe.jar"),
            no_prompt: true,
            ..Config::default()
        }
    }

    fn write_payloads(cfg: &Config) {
        fs::write(&cfg.legacy_apk, b"apk").unwrap();
        fs::write(&cfg.backup_extractor, b"jar").unwrap();
    }

    #[test]
    fn test_missing_dependencies_skip_the_vector() {
        let temp = TempDir::new().unwrap();
        let cfg = test_config(&temp);
        let audit = AuditLog::new(temp.path().join("audit.log"));
        // The device must never be touched on the skip path.
        let adb = AdbExecutor::new("/nonexistent/adb", Duration::from_secs(1), 1);

        let attempt = StagedReinstall::new(&adb, &audit, &cfg)
            .run(temp.path())
            .unwrap();

        assert_eq!(attempt.outcome, Outcome::Skipped);
        assert_eq!(attempt.reason, Reason::DependencyMissing);
        let trail = fs::read_to_string(audit.path()).unwrap();
        assert!(trail.contains("VECTOR_SKIP"));
    }

    #[test]
    fn test_all_install_paths_rejected() {
        let temp = TempDir::new().unwrap();
        let cfg = test_config(&temp);
        write_payloads(&cfg);
        let audit = AuditLog::new(temp.path().join("audit.log"));
        let adb = stub_adb(temp.path(), "exit 1");

        let attempt = StagedReinstall::new(&adb, &audit, &cfg)
            .run(temp.path())
            .unwrap();

        assert_eq!(attempt.outcome, Outcome::Failed);
        assert_eq!(attempt.reason, Reason::InstallPathsExhausted);
        let trail = fs::read_to_string(audit.path()).unwrap();
        assert_eq!(trail.matches("INSTALL_PATH").count(), 3);
    }

    #[test]
    fn test_undersized_backup_fails_the_vector() {
        let temp = TempDir::new().unwrap();
        let cfg = test_config(&temp);
        write_payloads(&cfg);
        let audit = AuditLog::new(temp.path().join("audit.log"));
        // Installs succeed; the backup produces a near-empty archive.
        let adb = stub_adb(
            temp.path(),
            "case \"$1\" in backup) printf declined > \"$3\" ;; esac\nexit 0",
        );

        let attempt = StagedReinstall::new(&adb, &audit, &cfg)
            .run(temp.path())
            .unwrap();

        assert_eq!(attempt.outcome, Outcome::Failed);
        assert_eq!(attempt.reason, Reason::BackupTooSmall);
        assert!(temp.path().join("backup.ab").exists());
        let trail = fs::read_to_string(audit.path()).unwrap();
        assert!(trail.contains("bytes rejected"));
    }

    #[test]
    fn test_shell_injection_requires_success_marker() {
        let temp = TempDir::new().unwrap();
        let cfg = test_config(&temp);
        write_payloads(&cfg);
        let audit = AuditLog::new(temp.path().join("audit.log"));
        // Host installs rejected; push works; on-device pm exits zero but
        // without the textual marker, which must not count as installed.
        let adb = stub_adb(
            temp.path(),
            r#"case "$1" in
install) exit 1 ;;
push) exit 0 ;;
shell)
  case "$2" in
    pm) echo "Failure [INSTALL_FAILED_VERSION_DOWNGRADE]"; exit 0 ;;
    *) exit 0 ;;
  esac ;;
*) exit 0 ;;
esac"#,
        );

        let attempt = StagedReinstall::new(&adb, &audit, &cfg)
            .run(temp.path())
            .unwrap();

        assert_eq!(attempt.outcome, Outcome::Failed);
        assert_eq!(attempt.reason, Reason::InstallPathsExhausted);
    }
}
