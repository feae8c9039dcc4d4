//! Acquisition vector taxonomy and the session attempt trail.
//!
//! Four strategies exist in strict priority order. The orchestrator walks
//! them A through D, records one [`Attempt`] per vector it touches, and
//! stops at the first success. The trail is append-only and is the
//! authoritative record of what was tried on the device.

pub mod escalate;
pub mod reinstall;
pub mod scrape;

use std::path::PathBuf;

use serde::Serialize;

/// One of the four acquisition strategies, in cascade priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Vector {
    /// A — direct pull over an already-privileged shell.
    #[serde(rename = "ROOT_ACCESS")]
    RootAccess,
    /// B — legacy reinstall to re-enable the unencrypted backup path.
    #[serde(rename = "DOWNGRADE_ATTACK")]
    StagedReinstall,
    /// C — push and run a local privilege escalation payload.
    #[serde(rename = "LPE_EXPLOIT")]
    PrivilegeEscalation,
    /// D — screenshot plus accessibility-tree scraping; last resort.
    #[serde(rename = "UI_SCRAPING")]
    UiScraping,
}

impl Vector {
    /// Cascade letter, A through D.
    pub fn letter(&self) -> char {
        match self {
            Vector::RootAccess => 'A',
            Vector::StagedReinstall => 'B',
            Vector::PrivilegeEscalation => 'C',
            Vector::UiScraping => 'D',
        }
    }

    /// Stable method label used in audit entries and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Vector::RootAccess => "ROOT_ACCESS",
            Vector::StagedReinstall => "DOWNGRADE_ATTACK",
            Vector::PrivilegeEscalation => "LPE_EXPLOIT",
            Vector::UiScraping => "UI_SCRAPING",
        }
    }

    /// Examiner-facing description for banners and the summary.
    pub fn describe(&self) -> &'static str {
        match self {
            Vector::RootAccess => "privileged filesystem pull",
            Vector::StagedReinstall => "staged legacy reinstall and backup",
            Vector::PrivilegeEscalation => "local privilege escalation",
            Vector::UiScraping => "screen capture and UI-tree scraping",
        }
    }
}

/// How an attempted vector ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        }
    }
}

/// Why a vector ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// A: the shell already had root and the pull went through.
    PrivilegeConfirmed,
    /// A: probe showed an unprivileged shell.
    NoPrivilege,
    /// B: device SDK is at or above the downgrade ceiling.
    SdkCeilingExceeded,
    /// B or C: a required local file (legacy APK, unpack utility,
    /// exploit payload) is absent.
    DependencyMissing,
    /// B: all three install fallbacks were rejected.
    InstallPathsExhausted,
    /// B: backup completed but is too small to hold real data.
    BackupTooSmall,
    /// B: the backup archive could not be unpacked.
    UnpackFailed,
    /// B: backup captured, validated and unpacked.
    BackupRecovered,
    /// C: payload ran but the shell stayed unprivileged.
    EscalationIneffective,
    /// A or C: elevated copy of the key file failed on-device.
    KeyCopyFailed,
    /// Device-to-host transfer of a recovered artifact failed.
    ArtifactPullFailed,
    /// D: page loop completed (zero messages still counts).
    PagesCaptured,
    /// Device vanished or the operator aborted mid-vector.
    Disrupted,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::PrivilegeConfirmed => "PRIVILEGE_CONFIRMED",
            Reason::NoPrivilege => "NO_PRIVILEGE",
            Reason::SdkCeilingExceeded => "SDK_CEILING_EXCEEDED",
            Reason::DependencyMissing => "DEPENDENCY_MISSING",
            Reason::InstallPathsExhausted => "INSTALL_PATHS_EXHAUSTED",
            Reason::BackupTooSmall => "BACKUP_TOO_SMALL",
            Reason::UnpackFailed => "UNPACK_FAILED",
            Reason::BackupRecovered => "BACKUP_RECOVERED",
            Reason::EscalationIneffective => "ESCALATION_INEFFECTIVE",
            Reason::KeyCopyFailed => "KEY_COPY_FAILED",
            Reason::ArtifactPullFailed => "ARTIFACT_PULL_FAILED",
            Reason::PagesCaptured => "PAGES_CAPTURED",
            Reason::Disrupted => "DISRUPTED",
        }
    }
}

/// One entry in the attempt trail. Never mutated after it is recorded.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub vector: Vector,
    pub outcome: Outcome,
    pub reason: Reason,
    /// Host-side evidence files this vector produced.
    pub artifacts: Vec<PathBuf>,
}

impl Attempt {
    pub fn succeeded(vector: Vector, reason: Reason, artifacts: Vec<PathBuf>) -> Self {
        Self {
            vector,
            outcome: Outcome::Succeeded,
            reason,
            artifacts,
        }
    }

    pub fn failed(vector: Vector, reason: Reason) -> Self {
        Self {
            vector,
            outcome: Outcome::Failed,
            reason,
            artifacts: Vec::new(),
        }
    }

    pub fn skipped(vector: Vector, reason: Reason) -> Self {
        Self {
            vector,
            outcome: Outcome::Skipped,
            reason,
            artifacts: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// One-line rendering for the audit trail and the summary.
    pub fn describe(&self) -> String {
        format!(
            "Vector {} ({}) {} [{}]",
            self.vector.letter(),
            self.vector.as_str(),
            self.outcome.as_str(),
            self.reason.as_str()
        )
    }
}

/// The successful attempt, if the cascade produced one.
pub fn chosen_method(trail: &[Attempt]) -> Option<&Attempt> {
    trail.iter().find(|attempt| attempt.is_success())
}

/// Block until the operator confirms the device is staged for the next step.
pub(crate) fn pause_for_operator(message: &str) {
    println!("[!] {message}");
    println!("[>] Press ENTER to continue...");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}
