//! Keyword spotting over the captured conversation.
//!
//! A plain case-insensitive substring pass. One message can produce several
//! hits, one per matching keyword, so the report preserves every lead.

use std::fs;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::case::CaseFolders;
use crate::error::{AcquireError, Result};
use crate::uitree::{MessageRecord, Sender};

pub const KEYWORD_HITS_NAME: &str = "keyword_hits.json";

/// One keyword match, carrying enough context to find the source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHit {
    pub keyword: String,
    pub text: String,
    pub sender: Sender,
    pub device_time: String,
    pub screenshot: String,
}

/// Scan records against a keyword list. Keywords are trimmed and lowercased
/// before matching; empty entries are dropped.
pub fn scan_records(records: &[MessageRecord], keywords: &[String]) -> Vec<KeywordHit> {
    let needles: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    let mut hits = Vec::new();
    for record in records {
        let haystack = record.text.to_lowercase();
        for needle in &needles {
            if haystack.contains(needle.as_str()) {
                hits.push(KeywordHit {
                    keyword: needle.clone(),
                    text: record.text.clone(),
                    sender: record.sender,
                    device_time: record.device_time.clone(),
                    screenshot: record.screenshot.clone(),
                });
            }
        }
    }
    hits
}

/// Load the captured chat data, scan it, and write the findings report.
///
/// Only the scraping vector produces chat data; sessions won by another
/// vector simply have nothing to scan and return empty.
pub fn run(folders: &CaseFolders, keywords: &[String], audit: &AuditLog) -> Result<Vec<KeywordHit>> {
    let chat_path = folders.chat_data_path();
    if !chat_path.exists() {
        info!("no chat data captured, skipping keyword pass");
        return Ok(Vec::new());
    }

    let raw = fs::read_to_string(&chat_path)
        .map_err(|err| AcquireError::from_io_error(chat_path.display().to_string(), err))?;
    let records: Vec<MessageRecord> = match serde_json::from_str(&raw) {
        Ok(records) => records,
        Err(err) => {
            warn!(%err, "chat data unreadable, keyword pass abandoned");
            return Ok(Vec::new());
        }
    };

    let hits = scan_records(&records, keywords);
    if hits.is_empty() {
        info!("keyword pass completed without findings");
        return Ok(hits);
    }

    let out_path = folders.report().join(KEYWORD_HITS_NAME);
    let json = serde_json::to_string_pretty(&hits).map_err(anyhow::Error::from)?;
    fs::write(&out_path, json)
        .map_err(|err| AcquireError::from_io_error(out_path.display().to_string(), err))?;
    audit.append(
        "ANALYST",
        "KEYWORD_HITS",
        &format!("{} hits -> {}", hits.len(), out_path.display()),
    )?;
    info!(hits = hits.len(), "keyword findings written");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::config::default_keywords;

    fn record(sender: Sender, text: &str) -> MessageRecord {
        MessageRecord {
            sender,
            text: text.to_string(),
            screenshot: "SC_0000.png".to_string(),
            screenshot_sha256: "00".repeat(32),
            device_time: "2024-05-01T10:00:00".to_string(),
            network_time: "unavailable".to_string(),
            page: 0,
        }
    }

    #[test]
    fn test_scan_is_case_insensitive_substring() {
        let records = vec![record(Sender::Counterparty, "Mandame el DINERO al banco")];
        let hits = scan_records(&records, &default_keywords());
        let keywords: Vec<&str> = hits.iter().map(|h| h.keyword.as_str()).collect();
        // Both keywords in the one message are reported.
        assert_eq!(keywords, vec!["dinero", "banco"]);
        assert_eq!(hits[0].text, "Mandame el DINERO al banco");
    }

    #[test]
    fn test_scan_trims_and_lowercases_keywords() {
        let records = vec![record(Sender::SelfAuthored, "el pago ya salió")];
        let hits = scan_records(
            &records,
            &[String::from("  PAGO "), String::new(), String::from("arma")],
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].keyword, "pago");
    }

    #[test]
    fn test_no_chat_data_is_an_empty_pass() {
        let temp = TempDir::new().unwrap();
        let folders = CaseFolders::create(temp.path(), "AN-T").unwrap();
        let audit = AuditLog::new(folders.audit_log_path());

        let hits = run(&folders, &default_keywords(), &audit).unwrap();
        assert!(hits.is_empty());
        assert!(!folders.report().join(KEYWORD_HITS_NAME).exists());
    }

    #[test]
    fn test_findings_are_written_and_audited() {
        let temp = TempDir::new().unwrap();
        let folders = CaseFolders::create(temp.path(), "AN-T").unwrap();
        let audit = AuditLog::new(folders.audit_log_path());

        let records = vec![
            record(Sender::Counterparty, "Transferencia al banco ya"),
            record(Sender::SelfAuthored, "ok nos vemos"),
        ];
        let json = serde_json::to_string_pretty(&records).unwrap();
        fs::write(folders.chat_data_path(), json).unwrap();

        let hits = run(&folders, &default_keywords(), &audit).unwrap();
        assert_eq!(hits.len(), 2);

        let written = fs::read_to_string(folders.report().join(KEYWORD_HITS_NAME)).unwrap();
        let parsed: Vec<KeywordHit> = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, hits);

        let trail = fs::read_to_string(audit.path()).unwrap();
        assert!(trail.contains("KEYWORD_HITS"));
    }
}
