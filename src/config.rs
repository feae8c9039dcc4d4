use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ADB_PROGRAM: &str = "adb";
pub const DEFAULT_TARGET_PACKAGE: &str = "com.whatsapp";
pub const DEFAULT_CASE_ROOT: &str = "cases";
pub const DEFAULT_PAYLOAD_DIR: &str = "bin/payloads";
pub const LEGACY_APK_NAME: &str = "LegacyWhatsApp.apk";
pub const BACKUP_EXTRACTOR_NAME: &str = "abe.jar";
pub const EXPLOIT_PAYLOAD_NAME: &str = "exploit_lpe";
pub const DEVICE_TMP_DIR: &str = "/data/local/tmp";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SDK_CEILING: u32 = 31;
pub const MIN_BACKUP_BYTES: u64 = 1000;
pub const ESCALATION_SETTLE_SECS: u64 = 5;
pub const DEFAULT_PAGE_COUNT: u32 = 15;
pub const DEFAULT_SELF_COLUMN_PX: i32 = 200;
pub const DEFAULT_DEDUP_LOOKBACK: usize = 15;
pub const DEFAULT_SETTLE_MS: u64 = 1500;
pub const DEFAULT_NTP_SERVER: &str = "pool.ntp.org:123";
pub const DEFAULT_NTP_TIMEOUT_SECS: u64 = 2;

/// Tunables for the UI scraping agent.
#[derive(Clone, Debug)]
pub struct ScrapeConfig {
    /// Number of capture pages (screenshot + tree dump + scroll) per run.
    pub pages: u32,
    /// Left bounds-origin above which a bubble is treated as self-authored.
    /// Resolution dependent; 200 matches common 1080p layouts.
    pub self_column_px: i32,
    /// How many recently accepted records are checked for duplicates.
    pub dedup_lookback: usize,
    /// Pause after each scroll gesture so the UI can settle.
    pub settle: Duration,
    /// Chrome strings discarded outright (placeholders, icons, day labels).
    pub chrome_denylist: Vec<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            pages: DEFAULT_PAGE_COUNT,
            self_column_px: DEFAULT_SELF_COLUMN_PX,
            dedup_lookback: DEFAULT_DEDUP_LOOKBACK,
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            chrome_denylist: default_chrome_denylist(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Case identifier used for the evidence folder name.
    pub case_id: String,
    /// Examiner responsible for the session, recorded in the audit trail.
    pub examiner: String,
    /// Directory under which per-case folders are created.
    pub case_root: PathBuf,
    /// Package name of the target application on the device.
    pub package: String,
    /// Device control program, normally `adb` from PATH.
    pub adb_program: String,
    /// Per-call wall clock limit for bounded device commands.
    pub command_timeout: Duration,
    /// Retry cap for bounded device commands.
    pub max_retries: u32,
    /// SDK level at or above which the staged reinstall vector is skipped.
    pub sdk_ceiling: u32,
    /// Legacy downgrade package for the staged reinstall vector.
    pub legacy_apk: PathBuf,
    /// Android backup extractor jar used to unpack the captured backup.
    pub backup_extractor: PathBuf,
    /// Local privilege escalation payload for the exploit vector.
    pub exploit_payload: PathBuf,
    /// NTP endpoints tried in order for the anchored timestamp.
    pub ntp_servers: Vec<String>,
    /// Socket read timeout for each NTP query.
    pub ntp_timeout: Duration,
    /// Keywords flagged by the post-acquisition intelligence pass.
    pub keywords: Vec<String>,
    /// Skip the bulk media preservation phase.
    pub skip_media: bool,
    /// Suppress interactive pauses (unattended runs).
    pub no_prompt: bool,
    pub scrape: ScrapeConfig,
}

impl Default for Config {
    fn default() -> Self {
        let payload_dir = PathBuf::from(DEFAULT_PAYLOAD_DIR);
        Self {
            case_id: String::from("CASE"),
            examiner: String::from("unassigned"),
            case_root: PathBuf::from(DEFAULT_CASE_ROOT),
            package: String::from(DEFAULT_TARGET_PACKAGE),
            adb_program: String::from(DEFAULT_ADB_PROGRAM),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            sdk_ceiling: DEFAULT_SDK_CEILING,
            legacy_apk: payload_dir.join(LEGACY_APK_NAME),
            backup_extractor: payload_dir.join(BACKUP_EXTRACTOR_NAME),
            exploit_payload: payload_dir.join(EXPLOIT_PAYLOAD_NAME),
            ntp_servers: vec![String::from(DEFAULT_NTP_SERVER)],
            ntp_timeout: Duration::from_secs(DEFAULT_NTP_TIMEOUT_SECS),
            keywords: default_keywords(),
            skip_media: false,
            no_prompt: false,
            scrape: ScrapeConfig::default(),
        }
    }
}

/// Interface chrome seen in the Spanish-language target app. Matched
/// exactly, so localized deployments should override via the CLI.
pub fn default_chrome_denylist() -> Vec<String> {
    ["WhatsApp", "Escribe un mensaje", "Cámara", "Micrófono", "Hoy", "Ayer"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Default watch list for the keyword pass over captured text.
pub fn default_keywords() -> Vec<String> {
    [
        "drogas",
        "arma",
        "dinero",
        "pago",
        "matar",
        "ubicación",
        "location",
        "transferencia",
        "cbu",
        "alias",
        "banco",
        "meet",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
