//! Vector D: screen capture plus UI-tree scraping.
//!
//! The fallback that always runs when every privileged path failed. It
//! never fails the session: each page is screenshot, hashed, dumped and
//! parsed independently, and a device hiccup costs that page only. Zero
//! captured messages is still a completed acquisition.

use std::fs;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::adb::{AdbExecutor, ExecOutcome};
use crate::audit::{sha256_file, AuditLog};
use crate::case::CaseFolders;
use crate::config::{Config, ScrapeConfig};
use crate::error::{AcquireError, Result};
use crate::timesync;
use crate::uitree::{DedupWindow, ElementClassifier, MessageRecord, UiTreeParser};
use crate::vectors::{pause_for_operator, Attempt, Reason, Vector};

const REMOTE_SCREENSHOT: &str = "/data/local/tmp/screen.png";
const REMOTE_TREE: &str = "/data/local/tmp/view.xml";
/// Upward swipe that walks the conversation back in time.
const SCROLL_GESTURE: [&str; 8] = ["shell", "input", "swipe", "500", "500", "500", "1500", "400"];

pub struct UiScrapeAgent<'a> {
    adb: &'a AdbExecutor,
    audit: &'a AuditLog,
    folders: &'a CaseFolders,
    scrape: ScrapeConfig,
    ntp_servers: Vec<String>,
    ntp_timeout: Duration,
    no_prompt: bool,
}

impl<'a> UiScrapeAgent<'a> {
    pub fn new(
        adb: &'a AdbExecutor,
        audit: &'a AuditLog,
        folders: &'a CaseFolders,
        cfg: &Config,
    ) -> Self {
        Self {
            adb,
            audit,
            folders,
            scrape: cfg.scrape.clone(),
            ntp_servers: cfg.ntp_servers.clone(),
            ntp_timeout: cfg.ntp_timeout,
            no_prompt: cfg.no_prompt,
        }
    }

    /// Walk the conversation page by page. Completes even when the device
    /// fights back; the attempt is `Succeeded` once the loop finishes.
    pub fn run(&self) -> Result<Attempt> {
        let component = Vector::UiScraping.as_str();
        self.audit.append(
            component,
            "VECTOR_START",
            &format!("{} pages", self.scrape.pages),
        )?;

        if !self.no_prompt {
            println!();
            println!("{}", "=".repeat(60));
            println!(" PREPARATION:");
            println!(" 1. Unlock the device.");
            println!(" 2. Open the target conversation.");
            println!("{}", "=".repeat(60));
            pause_for_operator("Scraping starts on confirmation.");
        }

        let parser = UiTreeParser::new();
        let classifier = ElementClassifier::from_config(&self.scrape);
        let mut window = DedupWindow::new(self.scrape.dedup_lookback);
        let mut records: Vec<MessageRecord> = Vec::new();

        for page in 0..self.scrape.pages {
            match self.capture_page(page, &parser, &classifier, &mut window, &mut records)? {
                Some(added) => info!(page, added, total = records.len(), "page captured"),
                None => {
                    warn!(page, "device capture failed, page dropped");
                    self.audit
                        .append(component, "PAGE_SKIP", &format!("page {page} not captured"))?;
                }
            }
            // Progress regardless of how the page went.
            self.single(&SCROLL_GESTURE);
            thread::sleep(self.scrape.settle);
        }

        let chat_path = self.folders.chat_data_path();
        let json = serde_json::to_string_pretty(&records).map_err(anyhow::Error::from)?;
        fs::write(&chat_path, json)
            .map_err(|err| AcquireError::from_io_error(chat_path.display().to_string(), err))?;
        self.audit.append(
            component,
            "CHAT_DATA_WRITTEN",
            &format!("{} records -> {}", records.len(), chat_path.display()),
        )?;
        self.audit.append(
            component,
            "VECTOR_SUCCESS",
            &format!(
                "{} messages across {} pages",
                records.len(),
                self.scrape.pages
            ),
        )?;

        Ok(Attempt::succeeded(
            Vector::UiScraping,
            Reason::PagesCaptured,
            vec![chat_path],
        ))
    }

    /// One page: timestamps, screenshot, tree dump, classify, dedup.
    /// `None` means the page was dropped; the caller still scrolls.
    fn capture_page(
        &self,
        page: u32,
        parser: &UiTreeParser,
        classifier: &ElementClassifier,
        window: &mut DedupWindow,
        records: &mut Vec<MessageRecord>,
    ) -> Result<Option<usize>> {
        let network_time =
            timesync::render(timesync::network_time(&self.ntp_servers, self.ntp_timeout));
        let device_time = self.device_clock();

        let Some((shot_name, shot_hash)) = self.capture_screenshot(page)? else {
            return Ok(None);
        };
        let Some(xml) = self.fetch_tree() else {
            return Ok(None);
        };
        let elements = match parser.parse(&xml) {
            Ok(elements) => elements,
            Err(err) => {
                warn!(page, %err, "discarding unparseable tree dump");
                return Ok(None);
            }
        };

        let mut added = 0;
        for element in &elements {
            let Some(sender) = classifier.classify(element) else {
                continue;
            };
            if !window.admit(sender, &element.text) {
                continue;
            }
            records.push(MessageRecord {
                sender,
                text: element.text.clone(),
                screenshot: shot_name.clone(),
                screenshot_sha256: shot_hash.clone(),
                device_time: device_time.clone(),
                network_time: network_time.clone(),
                page,
            });
            added += 1;
        }
        Ok(Some(added))
    }

    /// Screenshot the current screen and pull it into evidence, hashed and
    /// logged the moment it lands.
    fn capture_screenshot(&self, page: u32) -> Result<Option<(String, String)>> {
        let filename = format!("SC_{page:04}.png");
        let local = self.folders.screenshots().join(&filename);
        let local_str = local.to_string_lossy().into_owned();

        let shot = self.single(&["shell", "screencap", "-p", REMOTE_SCREENSHOT]);
        if !shot.is_success() {
            return Ok(None);
        }
        let pulled = self.single(&["pull", REMOTE_SCREENSHOT, &local_str]);
        if !pulled.is_success() || !local.exists() {
            return Ok(None);
        }

        let hash = sha256_file(&local)?;
        self.audit.append(
            Vector::UiScraping.as_str(),
            "SCREENSHOT",
            &format!("File: {filename} | Hash: {hash}"),
        )?;
        Ok(Some((filename, hash)))
    }

    /// Dump the accessibility tree and bring it to the host. The host copy
    /// lives only long enough to be read; any failure costs this page only.
    fn fetch_tree(&self) -> Option<String> {
        let dump = self.single(&["shell", "uiautomator", "dump", REMOTE_TREE]);
        if !dump.is_success() {
            return None;
        }

        let local = self.folders.logs().join("ui_dump.xml");
        let local_str = local.to_string_lossy().into_owned();
        let pulled = self.single(&["pull", REMOTE_TREE, &local_str]);
        if !pulled.is_success() || !local.exists() {
            return None;
        }

        let raw = fs::read(&local);
        let _ = fs::remove_file(&local);
        match raw {
            // A pull cut mid-codepoint decodes lossily; the parser decides
            // what survives.
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) => {
                warn!(path = %local.display(), %err, "pulled tree dump unreadable");
                None
            }
        }
    }

    fn device_clock(&self) -> String {
        match self.single(&["shell", "date", "+%Y-%m-%dT%H:%M:%S"]) {
            ExecOutcome::Success(out) => out,
            _ => String::from("unknown"),
        }
    }

    fn single(&self, args: &[&str]) -> ExecOutcome {
        self.adb.execute_with_retries(args, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::uitree::Sender;
    use crate::vectors::Outcome;

    const PAGE_HOLA: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<hierarchy rotation="0">
  <node index="0" text="Hola" class="android.widget.TextView" bounds="[54,1050][400,1150]"/>
  <node index="1" text="14:30" class="android.widget.TextView" bounds="[60,1160][160,1200]"/>
</hierarchy>"#;

    const PAGE_DUPLICATE: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<hierarchy rotation="0">
  <node index="0" text="Hola" class="android.widget.TextView" bounds="[54,1050][400,1150]"/>
  <node index="1" text="WhatsApp" class="android.widget.TextView" bounds="[55,120][300,190]"/>
</hierarchy>"#;

    const PAGE_REPLY: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<hierarchy rotation="0">
  <node index="0" text="Nos vemos a las 5" class="android.widget.TextView" bounds="[420,1250][1020,1350]"/>
</hierarchy>"#;

    const PAGE_EMPTY: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<hierarchy rotation="0"></hierarchy>"#;

    fn stub_adb(dir: &Path, body: &str) -> AdbExecutor {
        let path = dir.join("adb-stub");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        AdbExecutor::new(path.to_string_lossy(), Duration::from_secs(5), 1)
    }

    /// Stub that serves one fixture page per tree pull, counting pages in a
    /// state file, and unique screenshot bytes per page.
    fn paging_stub(dir: &Path, fixtures: &Path) -> AdbExecutor {
        let state = dir.join("page-counter");
        let body = format!(
            r#"case "$1" in
shell)
  if [ "$2" = "date" ]; then echo "2024-05-01T10:00:00"; fi
  exit 0 ;;
pull)
  n=$(cat "{state}" 2>/dev/null || echo 0)
  if [ "$2" = "{screen}" ]; then
    printf "PNG-%s" "$n" > "$3"
  elif [ "$2" = "{tree}" ]; then
    cp "{fixtures}/page$n.xml" "$3"
    echo $((n+1)) > "{state}"
  fi
  exit 0 ;;
*) exit 0 ;;
esac"#,
            state = state.display(),
            screen = REMOTE_SCREENSHOT,
            tree = REMOTE_TREE,
            fixtures = fixtures.display(),
        );
        stub_adb(dir, &body)
    }

    fn scrape_config(pages: u32) -> Config {
        let mut cfg = Config {
            ntp_servers: vec![String::from("127.0.0.1:9")],
            ntp_timeout: Duration::from_millis(50),
            no_prompt: true,
            ..Config::default()
        };
        cfg.scrape.pages = pages;
        cfg.scrape.settle = Duration::ZERO;
        cfg
    }

    fn case_folders(temp: &TempDir) -> CaseFolders {
        CaseFolders::create(temp.path(), "SCRAPE-T").unwrap()
    }

    #[test]
    fn test_three_page_walk_dedups_and_classifies() {
        let temp = TempDir::new().unwrap();
        let fixtures = temp.path().join("fixtures");
        fs::create_dir(&fixtures).unwrap();
        fs::write(fixtures.join("page0.xml"), PAGE_HOLA).unwrap();
        fs::write(fixtures.join("page1.xml"), PAGE_DUPLICATE).unwrap();
        fs::write(fixtures.join("page2.xml"), PAGE_REPLY).unwrap();

        let folders = case_folders(&temp);
        let audit = AuditLog::new(folders.audit_log_path());
        let adb = paging_stub(temp.path(), &fixtures);
        let cfg = scrape_config(3);

        let attempt = UiScrapeAgent::new(&adb, &audit, &folders, &cfg)
            .run()
            .unwrap();

        assert_eq!(attempt.outcome, Outcome::Succeeded);
        assert_eq!(attempt.reason, Reason::PagesCaptured);

        let raw = fs::read_to_string(folders.chat_data_path()).unwrap();
        let records: Vec<MessageRecord> = serde_json::from_str(&raw).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].sender, Sender::Counterparty);
        assert_eq!(records[0].text, "Hola");
        assert_eq!(records[0].page, 0);
        assert_eq!(records[0].screenshot, "SC_0000.png");

        assert_eq!(records[1].sender, Sender::SelfAuthored);
        assert_eq!(records[1].text, "Nos vemos a las 5");
        assert_eq!(records[1].page, 2);
        assert_eq!(records[1].screenshot, "SC_0002.png");

        // Per-page screenshots with distinct content, hence distinct hashes.
        assert_ne!(records[0].screenshot_sha256, records[1].screenshot_sha256);
        for name in ["SC_0000.png", "SC_0001.png", "SC_0002.png"] {
            assert!(folders.screenshots().join(name).exists());
        }
        assert_eq!(records[0].device_time, "2024-05-01T10:00:00");
        assert_eq!(records[0].network_time, timesync::UNAVAILABLE);
    }

    #[test]
    fn test_zero_messages_still_succeeds() {
        let temp = TempDir::new().unwrap();
        let fixtures = temp.path().join("fixtures");
        fs::create_dir(&fixtures).unwrap();
        for page in 0..2 {
            fs::write(fixtures.join(format!("page{page}.xml")), PAGE_EMPTY).unwrap();
        }

        let folders = case_folders(&temp);
        let audit = AuditLog::new(folders.audit_log_path());
        let adb = paging_stub(temp.path(), &fixtures);
        let cfg = scrape_config(2);

        let attempt = UiScrapeAgent::new(&adb, &audit, &folders, &cfg)
            .run()
            .unwrap();

        assert_eq!(attempt.outcome, Outcome::Succeeded);
        let raw = fs::read_to_string(folders.chat_data_path()).unwrap();
        assert_eq!(raw.trim(), "[]");
    }

    #[test]
    fn test_capture_failures_drop_pages_not_the_vector() {
        let temp = TempDir::new().unwrap();
        let folders = case_folders(&temp);
        let audit = AuditLog::new(folders.audit_log_path());
        // Screenshot pull always fails; every page is dropped.
        let adb = stub_adb(temp.path(), "if [ \"$1\" = \"pull\" ]; then exit 1; fi\nexit 0");
        let cfg = scrape_config(2);

        let attempt = UiScrapeAgent::new(&adb, &audit, &folders, &cfg)
            .run()
            .unwrap();

        assert_eq!(attempt.outcome, Outcome::Succeeded);
        let trail = fs::read_to_string(audit.path()).unwrap();
        assert_eq!(trail.matches("PAGE_SKIP").count(), 2);
        let raw = fs::read_to_string(folders.chat_data_path()).unwrap();
        assert_eq!(raw.trim(), "[]");
    }

    #[test]
    fn test_mangled_tree_dump_drops_the_page_not_the_vector() {
        let temp = TempDir::new().unwrap();
        let fixtures = temp.path().join("fixtures");
        fs::create_dir(&fixtures).unwrap();
        // A transfer cut mid-codepoint: neither valid UTF-8 nor valid XML.
        fs::write(
            fixtures.join("page0.xml"),
            b"<hierarchy><node text=\"x\"\x80\x81",
        )
        .unwrap();
        fs::write(fixtures.join("page1.xml"), PAGE_HOLA).unwrap();

        let folders = case_folders(&temp);
        let audit = AuditLog::new(folders.audit_log_path());
        let adb = paging_stub(temp.path(), &fixtures);
        let cfg = scrape_config(2);

        let attempt = UiScrapeAgent::new(&adb, &audit, &folders, &cfg)
            .run()
            .unwrap();

        assert_eq!(attempt.outcome, Outcome::Succeeded);
        let trail = fs::read_to_string(audit.path()).unwrap();
        assert_eq!(trail.matches("PAGE_SKIP").count(), 1);

        // The clean page behind the mangled one still lands.
        let raw = fs::read_to_string(folders.chat_data_path()).unwrap();
        let records: Vec<MessageRecord> = serde_json::from_str(&raw).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Hola");
        assert_eq!(records[0].page, 1);
    }
}
