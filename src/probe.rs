//! Device identity and capability probing.
//!
//! One snapshot per session. Individual probes that fail leave their field
//! at a documented fallback instead of aborting, so a half-reachable device
//! still yields a usable triage picture.

use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::adb::{AdbExecutor, ExecOutcome};

/// Immutable device snapshot built once at session start.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceProfile {
    pub manufacturer: String,
    pub model: String,
    pub code_name: String,
    pub serial: String,
    pub os_version: String,
    pub sdk_level: u32,
    pub security_patch: String,
    pub kernel: String,
    pub rooted: bool,
    pub imei_raw: String,
    pub sim_state: String,
    pub operator: String,
    pub battery_level: Option<u8>,
    pub uptime: String,
    pub data_partition: String,
    pub target_app_version: String,
    pub accessibility_services: String,
}

impl DeviceProfile {
    /// One-line triage summary for the examiner console.
    pub fn triage_line(&self) -> String {
        format!(
            "{} {} | SDK {} | root: {}",
            self.manufacturer, self.model, self.sdk_level, self.rooted
        )
    }
}

pub struct DeviceProbe<'a> {
    adb: &'a AdbExecutor,
    package: String,
}

impl<'a> DeviceProbe<'a> {
    pub fn new(adb: &'a AdbExecutor, package: impl Into<String>) -> Self {
        Self {
            adb,
            package: package.into(),
        }
    }

    /// Collect the full identity snapshot.
    pub fn snapshot(&self) -> DeviceProfile {
        info!("collecting device identity snapshot");

        let battery_dump = self.text(&["shell", "dumpsys", "battery"]);
        let package_dump = self.text(&["shell", "dumpsys", "package", &self.package]);
        let storage = self.text(&["shell", "df", "-h", "/data"]);
        let imei_raw = self.text(&["shell", "service", "call", "iphonesubinfo", "1"]);

        DeviceProfile {
            manufacturer: self.getprop("ro.product.manufacturer"),
            model: self.getprop("ro.product.model"),
            code_name: self.getprop("ro.product.name"),
            serial: self.getprop("ro.serialno"),
            os_version: self.getprop("ro.build.version.release"),
            sdk_level: parse_sdk_level(&self.getprop("ro.build.version.sdk")),
            security_patch: self.getprop("ro.build.version.security_patch"),
            kernel: self.text(&["shell", "uname", "-r"]),
            rooted: self.is_rooted(),
            imei_raw: classify_imei(&imei_raw),
            sim_state: self.getprop("gsm.sim.state"),
            operator: self.getprop("gsm.operator.alpha"),
            battery_level: parse_battery_level(&battery_dump),
            uptime: self.text(&["shell", "uptime"]),
            data_partition: summarize_storage(&storage),
            target_app_version: parse_app_version(&package_dump),
            accessibility_services: self.text(&[
                "shell",
                "settings",
                "get",
                "secure",
                "enabled_accessibility_services",
            ]),
        }
    }

    /// `su -c id` answering with uid 0 is the privilege signal. Single
    /// attempt; unrooted devices fail this fast and a retry won't change it.
    pub fn is_rooted(&self) -> bool {
        matches!(
            self.adb.execute_with_retries(&["shell", "su", "-c", "id"], 1),
            ExecOutcome::Success(out) if out.contains("uid=0(root)")
        )
    }

    fn getprop(&self, key: &str) -> String {
        self.text(&["shell", "getprop", key])
    }

    fn text(&self, args: &[&str]) -> String {
        match self.adb.execute(args) {
            ExecOutcome::Success(out) => out,
            _ => String::from("unknown"),
        }
    }
}

fn parse_sdk_level(raw: &str) -> u32 {
    raw.trim().parse().unwrap_or(0)
}

fn parse_battery_level(dump: &str) -> Option<u8> {
    let caps = Regex::new(r"level: (\d+)").unwrap().captures(dump)?;
    caps.get(1)?.as_str().parse().ok()
}

fn parse_app_version(dump: &str) -> String {
    Regex::new(r"versionName=([\d.]+)")
        .unwrap()
        .captures(dump)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| String::from("NOT_INSTALLED"))
}

/// Keep only the data row of `df -h /data`; a header-only answer means the
/// partition was not readable.
fn summarize_storage(df_output: &str) -> String {
    let mut lines = df_output.lines();
    lines.next();
    lines
        .last()
        .map(|row| row.trim().to_string())
        .unwrap_or_else(|| String::from("N/A"))
}

fn classify_imei(raw: &str) -> String {
    if raw.contains("Result") {
        raw.to_string()
    } else {
        String::from("RESTRICTED/UNAVAILABLE")
    }
}
