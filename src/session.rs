//! Acquisition session orchestration.
//!
//! One session is one device, one case folder, one walk of the vector
//! cascade. The cascade is a small state machine driven by an explicit
//! transition function: the current phase plus the recorded outcome decide
//! the next phase, and the first success ends the walk. Post-processing
//! (keyword pass, reports, manifest seal) only runs for a won session; the
//! media preservation phase runs regardless because it needs no privilege.

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::adb::AdbExecutor;
use crate::analysis;
use crate::audit::{seal_case, sha256_file, AuditLog};
use crate::case::CaseFolders;
use crate::config::Config;
use crate::crypto;
use crate::error::{AcquireError, Result};
use crate::media::MediaExtractor;
use crate::probe::{DeviceProbe, DeviceProfile};
use crate::report::{self, SummaryInputs};
use crate::uitree::MessageRecord;
use crate::vectors::escalate::PrivilegeEscalation;
use crate::vectors::reinstall::StagedReinstall;
use crate::vectors::scrape::UiScrapeAgent;
use crate::vectors::{chosen_method, Attempt, Outcome, Reason, Vector};

/// Cascade phases. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    TryVectorA,
    TryVectorB,
    TryVectorC,
    TryVectorD,
    Done,
}

impl Phase {
    /// The vector this phase attempts, if any.
    fn vector(self) -> Option<Vector> {
        match self {
            Phase::TryVectorA => Some(Vector::RootAccess),
            Phase::TryVectorB => Some(Vector::StagedReinstall),
            Phase::TryVectorC => Some(Vector::PrivilegeEscalation),
            Phase::TryVectorD => Some(Vector::UiScraping),
            Phase::Done => None,
        }
    }
}

/// Transition function of the cascade. Success is terminal from any phase;
/// anything else falls through to the next vector in priority order.
fn next_phase(current: Phase, outcome: Outcome) -> Phase {
    if outcome == Outcome::Succeeded {
        return Phase::Done;
    }
    match current {
        Phase::TryVectorA => Phase::TryVectorB,
        Phase::TryVectorB => Phase::TryVectorC,
        Phase::TryVectorC => Phase::TryVectorD,
        Phase::TryVectorD | Phase::Done => Phase::Done,
    }
}

/// What a finished session hands back to the caller.
#[derive(Debug)]
pub struct SessionReport {
    pub base_dir: PathBuf,
    pub profile: DeviceProfile,
    pub trail: Vec<Attempt>,
    pub method: Option<Vector>,
    pub messages: usize,
    pub media_files: u64,
    pub keyword_hits: usize,
    pub manifest_sha256: Option<String>,
    pub decrypted_db: Option<PathBuf>,
}

pub struct AcquisitionSession {
    cfg: Config,
}

impl AcquisitionSession {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    /// Run the full session: probe, cascade, media, post-processing, seal.
    pub fn run(&self) -> Result<SessionReport> {
        let folders = CaseFolders::create(&self.cfg.case_root, &self.cfg.case_id)?;
        let audit = AuditLog::new(folders.audit_log_path());
        audit.append(
            "SYSTEM",
            "SESSION_START",
            &format!("Examiner: {} | Case: {}", self.cfg.examiner, self.cfg.case_id),
        )?;
        info!(base = %folders.base().display(), "session opened");

        let adb = AdbExecutor::from_config(&self.cfg);
        if !adb.device_ready() {
            audit.append("SYSTEM", "SESSION_ABORT", "no authorized device attached")?;
            return Err(AcquireError::DeviceNotDetected);
        }

        let profile = DeviceProbe::new(&adb, &self.cfg.package).snapshot();
        let metadata_path = folders.device_metadata_path();
        let metadata = serde_json::to_string_pretty(&profile).map_err(anyhow::Error::from)?;
        fs::write(&metadata_path, metadata)
            .map_err(|err| AcquireError::from_io_error(metadata_path.display().to_string(), err))?;
        audit.append("TRIAGE", "DEVICE_PROFILE", &profile.triage_line())?;
        info!(triage = %profile.triage_line(), "device profiled");

        let mut trail: Vec<Attempt> = Vec::new();
        let mut phase = Phase::TryVectorA;
        while let Some(vector) = phase.vector() {
            println!("[*]  Vector {}: {}", vector.letter(), vector.describe());
            let attempt = self.attempt_vector(vector, &profile, &adb, &audit, &folders)?;
            audit.append("STRATEGY", "VECTOR_OUTCOME", &attempt.describe())?;
            phase = next_phase(phase, attempt.outcome);
            trail.push(attempt);
        }

        let trail_path = folders.logs().join("attempt_trail.json");
        let trail_json = serde_json::to_string_pretty(&trail).map_err(anyhow::Error::from)?;
        fs::write(&trail_path, trail_json)
            .map_err(|err| AcquireError::from_io_error(trail_path.display().to_string(), err))?;

        let method = chosen_method(&trail).map(|attempt| attempt.vector);
        let decrypted_db = self.recover_database(method, &adb, &audit, &folders)?;

        let media_files = if self.cfg.skip_media {
            info!("media preservation skipped by configuration");
            0
        } else {
            MediaExtractor::new(&adb, &audit, &folders, &self.cfg).run()?
        };

        let (messages, keyword_hits, manifest_sha256) = match method {
            Some(chosen) => {
                info!(method = chosen.as_str(), "acquisition achieved");
                let records = load_chat_records(&folders);
                let hits = analysis::run(&folders, &self.cfg.keywords, &audit)?;
                report::write_html_report(&folders, &profile, &records, &hits, media_files)?;

                audit.append("SYSTEM", "SESSION_END", &format!("Method: {}", chosen.as_str()))?;
                seal_case(folders.base(), &folders.manifest_path())?;
                let manifest_hash = sha256_file(&folders.manifest_path())?;

                report::write_executive_summary(
                    &folders,
                    &SummaryInputs {
                        case_id: &self.cfg.case_id,
                        examiner: &self.cfg.examiner,
                        trail: &trail,
                        manifest_sha256: &manifest_hash,
                        messages: records.len(),
                        media_files,
                        keyword_hits: hits.len(),
                    },
                )?;
                (records.len(), hits.len(), Some(manifest_hash))
            }
            None => {
                warn!("acquisition failed, no vector succeeded");
                audit.append("SYSTEM", "SESSION_END", "Method: NONE")?;
                (0, 0, None)
            }
        };

        Ok(SessionReport {
            base_dir: folders.base().to_path_buf(),
            profile,
            trail,
            method,
            messages,
            media_files,
            keyword_hits,
            manifest_sha256,
            decrypted_db,
        })
    }

    fn attempt_vector(
        &self,
        vector: Vector,
        profile: &DeviceProfile,
        adb: &AdbExecutor,
        audit: &AuditLog,
        folders: &CaseFolders,
    ) -> Result<Attempt> {
        match vector {
            Vector::RootAccess => {
                if profile.rooted {
                    audit.append(
                        Vector::RootAccess.as_str(),
                        "VECTOR_SUCCESS",
                        "privileged shell already present",
                    )?;
                    Ok(Attempt::succeeded(
                        Vector::RootAccess,
                        Reason::PrivilegeConfirmed,
                        vec![],
                    ))
                } else {
                    Ok(Attempt::skipped(Vector::RootAccess, Reason::NoPrivilege))
                }
            }
            Vector::StagedReinstall => {
                if profile.sdk_level >= self.cfg.sdk_ceiling {
                    info!(
                        sdk = profile.sdk_level,
                        ceiling = self.cfg.sdk_ceiling,
                        "reinstall vector incompatible with this OS level"
                    );
                    audit.append(
                        Vector::StagedReinstall.as_str(),
                        "VECTOR_SKIP",
                        &format!("SDK {} at or above ceiling {}", profile.sdk_level, self.cfg.sdk_ceiling),
                    )?;
                    return Ok(Attempt::skipped(
                        Vector::StagedReinstall,
                        Reason::SdkCeilingExceeded,
                    ));
                }
                StagedReinstall::new(adb, audit, &self.cfg).run(&folders.evidence())
            }
            Vector::PrivilegeEscalation => {
                PrivilegeEscalation::new(adb, audit, &self.cfg).run(&folders.evidence())
            }
            Vector::UiScraping => UiScrapeAgent::new(adb, audit, folders, &self.cfg).run(),
        }
    }

    /// After a reinstall or escalation win, fetch the encrypted database
    /// from the public storage locations and decrypt it if key material is
    /// already in evidence. Best effort; absence is not a failure.
    fn recover_database(
        &self,
        method: Option<Vector>,
        adb: &AdbExecutor,
        audit: &AuditLog,
        folders: &CaseFolders,
    ) -> Result<Option<PathBuf>> {
        if !matches!(
            method,
            Some(Vector::StagedReinstall) | Some(Vector::PrivilegeEscalation)
        ) {
            return Ok(None);
        }

        let container = folders.evidence().join("msgstore.db.crypt14");
        let container_str = container.to_string_lossy().into_owned();
        let mut pulled = false;
        for candidate in database_candidates(&self.cfg.package) {
            if adb
                .execute_unbounded(&["pull", &candidate, &container_str])
                .is_success()
                && container.exists()
            {
                audit.append("EVIDENCE", "DB_PULL", &candidate)?;
                pulled = true;
                break;
            }
        }
        if !pulled {
            info!("encrypted database not reachable over public storage");
            return Ok(None);
        }

        let key = folders.evidence().join("key");
        if !key.exists() {
            return Ok(None);
        }
        let plaintext = folders.evidence().join("msgstore.db");
        match crypto::decrypt_file(&key, &container, &plaintext) {
            Ok(summary) => {
                audit.append(
                    "EVIDENCE",
                    "DB_DECRYPTED",
                    &format!(
                        "{} ({} bytes, sha256 {})",
                        plaintext.display(),
                        summary.plaintext_bytes,
                        summary.plaintext_sha256
                    ),
                )?;
                Ok(Some(plaintext))
            }
            Err(err) if err.is_integrity() => {
                warn!("recovered key does not open the pulled container");
                audit.append("EVIDENCE", "DB_DECRYPT_FAIL", "tag verification failed")?;
                Ok(None)
            }
            // Junk pulled off the device must not cost the session either;
            // only host-side I/O propagates.
            Err(AcquireError::TruncatedInput { what, need, got }) => {
                warn!(what, need, got, "pulled artifact too short to decrypt");
                audit.append(
                    "EVIDENCE",
                    "DB_DECRYPT_FAIL",
                    &format!("{what} truncated: {got} of {need} bytes"),
                )?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Known public storage locations of the encrypted database.
fn database_candidates(package: &str) -> Vec<String> {
    vec![
        format!("/sdcard/Android/media/{package}/WhatsApp/Databases/msgstore.db.crypt14"),
        String::from("/sdcard/WhatsApp/Databases/msgstore.db.crypt14"),
    ]
}

/// Captured chat records, or empty when the winning vector produced none.
fn load_chat_records(folders: &CaseFolders) -> Vec<MessageRecord> {
    let path = folders.chat_data_path();
    let Ok(raw) = fs::read_to_string(&path) else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_default()
}
