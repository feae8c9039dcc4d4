use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{
    Config, BACKUP_EXTRACTOR_NAME, EXPLOIT_PAYLOAD_NAME, LEGACY_APK_NAME,
};

#[derive(Parser, Debug)]
#[command(
    name = "chatseize",
    about = "Adaptive forensic acquisition of Android messaging evidence",
    version,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full acquisition session against the attached device.
    Acquire(AcquireCommand),
    /// Print the device identity snapshot and exit.
    Probe(ProbeCommand),
    /// Decrypt a database container with recovered key material.
    Decrypt(DecryptCommand),
}

#[derive(Args, Debug, Clone)]
pub struct AcquireCommand {
    /// Case identifier used for the evidence folder and custody records.
    #[arg(long = "case", value_name = "ID")]
    pub case_id: String,

    /// Examiner name recorded in the audit trail.
    #[arg(long, value_name = "NAME")]
    pub examiner: String,

    /// Directory under which the case folder is created.
    #[arg(long = "out", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Target application package name.
    #[arg(long, value_name = "PACKAGE")]
    pub package: Option<String>,

    /// Device control program to invoke.
    #[arg(long = "adb", value_name = "PROGRAM")]
    pub adb_program: Option<String>,

    /// Per-command timeout for bounded device calls (seconds).
    #[arg(long = "timeout", value_name = "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// Retry cap for bounded device calls.
    #[arg(long = "retries", value_name = "COUNT")]
    pub retries: Option<u32>,

    /// Number of capture pages for the UI scraping vector.
    #[arg(long, value_name = "COUNT")]
    pub pages: Option<u32>,

    /// Left-origin pixel threshold separating own bubbles from received.
    #[arg(long = "self-column", value_name = "PX")]
    pub self_column: Option<i32>,

    /// Pause after each scroll gesture (milliseconds).
    #[arg(long = "settle-ms", value_name = "MILLIS")]
    pub settle_ms: Option<u64>,

    /// SDK level at or above which the staged reinstall vector is skipped.
    #[arg(long = "sdk-ceiling", value_name = "LEVEL")]
    pub sdk_ceiling: Option<u32>,

    /// Directory holding the payload artifacts under their default names.
    #[arg(long = "payloads", value_name = "DIR")]
    pub payload_dir: Option<PathBuf>,

    /// Legacy downgrade package (overrides the payload directory).
    #[arg(long = "legacy-apk", value_name = "PATH")]
    pub legacy_apk: Option<PathBuf>,

    /// Backup extractor jar (overrides the payload directory).
    #[arg(long = "abe", value_name = "PATH")]
    pub backup_extractor: Option<PathBuf>,

    /// Privilege escalation payload (overrides the payload directory).
    #[arg(long = "exploit", value_name = "PATH")]
    pub exploit_payload: Option<PathBuf>,

    /// NTP endpoint for anchored timestamps; repeatable, tried in order.
    #[arg(long = "ntp-server", value_name = "HOST:PORT")]
    pub ntp_servers: Vec<String>,

    /// Keyword for the intelligence pass; repeatable, replaces the defaults.
    #[arg(long = "keyword", value_name = "WORD")]
    pub keywords: Vec<String>,

    /// Skip the bulk media preservation phase.
    #[arg(long = "skip-media", action = ArgAction::SetTrue)]
    pub skip_media: bool,

    /// Run unattended without operator pauses.
    #[arg(long = "no-prompt", action = ArgAction::SetTrue)]
    pub no_prompt: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeCommand {
    /// Target application package name.
    #[arg(long, value_name = "PACKAGE")]
    pub package: Option<String>,

    /// Device control program to invoke.
    #[arg(long = "adb", value_name = "PROGRAM")]
    pub adb_program: Option<String>,

    /// Also write the profile as JSON to this path.
    #[arg(long = "json", value_name = "PATH")]
    pub json_out: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DecryptCommand {
    /// Key material blob recovered from the application sandbox.
    #[arg(value_name = "KEY")]
    pub key: PathBuf,

    /// Encrypted database container.
    #[arg(value_name = "CONTAINER")]
    pub container: PathBuf,

    /// Output path for the decrypted database.
    #[arg(long = "out", value_name = "PATH")]
    pub out: Option<PathBuf>,
}

impl AcquireCommand {
    pub fn to_config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.case_id = self.case_id.clone();
        cfg.examiner = self.examiner.clone();

        if let Some(dir) = &self.out_dir {
            cfg.case_root = dir.clone();
        }
        if let Some(package) = &self.package {
            cfg.package = package.clone();
        }
        if let Some(program) = &self.adb_program {
            cfg.adb_program = program.clone();
        }
        if let Some(secs) = self.timeout_secs {
            cfg.command_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(retries) = self.retries {
            cfg.max_retries = retries.max(1);
        }
        if let Some(pages) = self.pages {
            cfg.scrape.pages = pages;
        }
        if let Some(px) = self.self_column {
            cfg.scrape.self_column_px = px;
        }
        if let Some(ms) = self.settle_ms {
            cfg.scrape.settle = Duration::from_millis(ms);
        }
        if let Some(ceiling) = self.sdk_ceiling {
            cfg.sdk_ceiling = ceiling;
        }

        if let Some(dir) = &self.payload_dir {
            cfg.legacy_apk = dir.join(LEGACY_APK_NAME);
            cfg.backup_extractor = dir.join(BACKUP_EXTRACTOR_NAME);
            cfg.exploit_payload = dir.join(EXPLOIT_PAYLOAD_NAME);
        }
        if let Some(path) = &self.legacy_apk {
            cfg.legacy_apk = path.clone();
        }
        if let Some(path) = &self.backup_extractor {
            cfg.backup_extractor = path.clone();
        }
        if let Some(path) = &self.exploit_payload {
            cfg.exploit_payload = path.clone();
        }

        if !self.ntp_servers.is_empty() {
            cfg.ntp_servers = self.ntp_servers.clone();
        }
        if !self.keywords.is_empty() {
            cfg.keywords = self.keywords.clone();
        }

        cfg.skip_media = self.skip_media;
        cfg.no_prompt = self.no_prompt;
        cfg
    }
}

impl DecryptCommand {
    /// Default output drops the container's trailing extension, so
    /// `msgstore.db.crypt14` decrypts to `msgstore.db` next to it.
    pub fn output_path(&self) -> PathBuf {
        self.out
            .clone()
            .unwrap_or_else(|| self.container.with_extension(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;

    fn parse_acquire(args: &[&str]) -> (AcquireCommand, Config) {
        let mut argv = vec!["chatseize", "acquire", "--case", "EXP-1", "--examiner", "perez"];
        argv.extend(args);
        let cli = Cli::try_parse_from(&argv).expect("parse acquire command");
        match cli.command {
            Commands::Acquire(cmd) => {
                let cfg = cmd.to_config();
                (cmd, cfg)
            }
            _ => panic!("expected acquire command"),
        }
    }

    #[test]
    fn acquire_options_map_into_config() {
        let (_, cfg) = parse_acquire(&[
            "--out",
            "/tmp/cases",
            "--package",
            "com.example.chat",
            "--adb",
            "/opt/platform-tools/adb",
            "--timeout",
            "20",
            "--retries",
            "5",
            "--pages",
            "30",
            "--self-column",
            "340",
            "--settle-ms",
            "900",
            "--sdk-ceiling",
            "33",
            "--skip-media",
            "--no-prompt",
        ]);

        assert_eq!(cfg.case_id, "EXP-1");
        assert_eq!(cfg.examiner, "perez");
        assert_eq!(cfg.case_root, PathBuf::from("/tmp/cases"));
        assert_eq!(cfg.package, "com.example.chat");
        assert_eq!(cfg.adb_program, "/opt/platform-tools/adb");
        assert_eq!(cfg.command_timeout, Duration::from_secs(20));
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.scrape.pages, 30);
        assert_eq!(cfg.scrape.self_column_px, 340);
        assert_eq!(cfg.scrape.settle, Duration::from_millis(900));
        assert_eq!(cfg.sdk_ceiling, 33);
        assert!(cfg.skip_media);
        assert!(cfg.no_prompt);
    }

    #[test]
    fn payload_dir_fills_artifacts_and_explicit_paths_override() {
        let (_, cfg) = parse_acquire(&[
            "--payloads",
            "/evidence/payloads",
            "--exploit",
            "/evidence/custom_lpe",
        ]);

        assert_eq!(
            cfg.legacy_apk,
            PathBuf::from("/evidence/payloads").join(LEGACY_APK_NAME)
        );
        assert_eq!(
            cfg.backup_extractor,
            PathBuf::from("/evidence/payloads").join(BACKUP_EXTRACTOR_NAME)
        );
        assert_eq!(cfg.exploit_payload, PathBuf::from("/evidence/custom_lpe"));
    }

    #[test]
    fn repeatable_flags_replace_defaults() {
        let (_, cfg) = parse_acquire(&[
            "--ntp-server",
            "0.pool.ntp.org:123",
            "--ntp-server",
            "1.pool.ntp.org:123",
            "--keyword",
            "efectivo",
            "--keyword",
            "entrega",
        ]);

        assert_eq!(
            cfg.ntp_servers,
            vec!["0.pool.ntp.org:123".to_string(), "1.pool.ntp.org:123".to_string()]
        );
        assert_eq!(cfg.keywords, vec!["efectivo".to_string(), "entrega".to_string()]);

        // Without the flags the built-in lists survive.
        let (_, defaults) = parse_acquire(&[]);
        assert!(!defaults.keywords.is_empty());
        assert!(!defaults.ntp_servers.is_empty());
    }

    #[test]
    fn case_and_examiner_are_required() {
        assert!(Cli::try_parse_from(["chatseize", "acquire", "--case", "X"]).is_err());
        assert!(Cli::try_parse_from(["chatseize", "acquire", "--examiner", "Y"]).is_err());
    }

    #[test]
    fn decrypt_defaults_output_next_to_container() {
        let cli = Cli::try_parse_from([
            "chatseize",
            "decrypt",
            "/evidence/key",
            "/evidence/msgstore.db.crypt14",
        ])
        .expect("parse decrypt command");
        match cli.command {
            Commands::Decrypt(cmd) => {
                assert_eq!(cmd.output_path(), PathBuf::from("/evidence/msgstore.db"));
            }
            _ => panic!("expected decrypt command"),
        }

        let cli = Cli::try_parse_from([
            "chatseize",
            "decrypt",
            "key",
            "container.crypt14",
            "--out",
            "/tmp/plain.db",
        ])
        .expect("parse decrypt with --out");
        match cli.command {
            Commands::Decrypt(cmd) => {
                assert_eq!(cmd.output_path(), PathBuf::from("/tmp/plain.db"));
            }
            _ => panic!("expected decrypt command"),
        }
    }

    #[test]
    fn probe_accepts_json_target() {
        let cli = Cli::try_parse_from(["chatseize", "probe", "--json", "/tmp/profile.json"])
            .expect("parse probe command");
        match cli.command {
            Commands::Probe(cmd) => {
                assert_eq!(cmd.json_out, Some(PathBuf::from("/tmp/profile.json")));
                assert_eq!(cmd.package, None);
            }
            _ => panic!("expected probe command"),
        }
    }
}
