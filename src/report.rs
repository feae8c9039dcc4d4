//! Examiner-facing outputs: executive summary and the static HTML report.
//!
//! The HTML file is self-contained (inline CSS, relative links into the
//! evidence folders) so it can travel with the case directory and open
//! anywhere. All free text that originated on the device is escaped before
//! it reaches the markup.

use std::fs;
use std::path::PathBuf;

use chrono::Local;
use tracing::info;

use crate::analysis::KeywordHit;
use crate::case::CaseFolders;
use crate::error::{AcquireError, Result};
use crate::probe::DeviceProfile;
use crate::uitree::{MessageRecord, Sender};
use crate::vectors::{chosen_method, Attempt};

pub const HTML_REPORT_NAME: &str = "acquisition_report.html";
pub const SUMMARY_NAME: &str = "executive_summary.txt";

const CSS: &str = "\
body { font-family: Helvetica, Arial, sans-serif; color: #333; font-size: 12px; line-height: 1.5; }\n\
.header { border-bottom: 2px solid #000; padding-bottom: 10px; margin-bottom: 20px; }\n\
.header h1 { margin: 0; font-size: 22px; text-transform: uppercase; }\n\
.header .sub { font-size: 10px; color: #666; }\n\
h2 { background: #2c3e50; color: #fff; padding: 5px 10px; font-size: 15px; margin-top: 30px; }\n\
table.meta { width: 100%; border-collapse: collapse; margin-bottom: 20px; }\n\
table.meta th { background: #f8f9fa; text-align: left; padding: 8px; border: 1px solid #ddd; }\n\
table.meta td { border: 1px solid #ddd; padding: 8px; }\n\
table.chat { width: 100%; border-collapse: collapse; }\n\
table.chat td { padding: 10px; vertical-align: top; border-bottom: 1px solid #ccc; }\n\
.col-info { width: 25%; font-size: 10px; color: #555; }\n\
.col-evidence { width: 30%; text-align: center; background: #fafafa; }\n\
.sender-self { color: #27ae60; font-weight: bold; }\n\
.sender-other { color: #2980b9; font-weight: bold; }\n\
.hash { font-family: monospace; font-size: 8px; word-break: break-all; color: #7f8c8d; }\n\
.alert { border: 1px solid #e74c3c; border-left: 5px solid #e74c3c; background: #fdedec; padding: 10px; margin-bottom: 5px; }\n\
.img-preview { max-width: 100%; max-height: 150px; border: 1px solid #999; }\n";

/// Everything the executive summary reports about a closed session.
pub struct SummaryInputs<'a> {
    pub case_id: &'a str,
    pub examiner: &'a str,
    pub trail: &'a [Attempt],
    pub manifest_sha256: &'a str,
    pub messages: usize,
    pub media_files: u64,
    pub keyword_hits: usize,
}

/// Write the closing plain-text summary into the report folder.
pub fn write_executive_summary(folders: &CaseFolders, inputs: &SummaryInputs) -> Result<PathBuf> {
    let method = chosen_method(inputs.trail)
        .map(|attempt| attempt.vector.as_str())
        .unwrap_or("NONE");

    let mut body = String::new();
    body.push_str("DIGITAL FORENSIC ACQUISITION SUMMARY\n");
    body.push_str("====================================\n");
    body.push_str(&format!("CASE ID: {}\n", inputs.case_id));
    body.push_str(&format!("EXAMINER: {}\n", inputs.examiner));
    body.push_str(&format!(
        "DATE: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    body.push_str(&format!("ACQUISITION METHOD: {method}\n"));
    body.push_str(&format!("EVIDENCE ROOT: {}\n", folders.base().display()));
    body.push_str(&format!("MESSAGES CAPTURED: {}\n", inputs.messages));
    body.push_str(&format!("MEDIA FILES PRESERVED: {}\n", inputs.media_files));
    body.push_str(&format!("KEYWORD HITS: {}\n", inputs.keyword_hits));
    body.push_str(&format!(
        "MANIFEST INTEGRITY (SHA-256): {}\n",
        inputs.manifest_sha256
    ));
    body.push_str("ATTEMPT TRAIL:\n");
    for attempt in inputs.trail {
        body.push_str(&format!("  {}\n", attempt.describe()));
    }
    body.push_str("====================================\n");

    let path = folders.report().join(SUMMARY_NAME);
    fs::write(&path, body)
        .map_err(|err| AcquireError::from_io_error(path.display().to_string(), err))?;
    info!(path = %path.display(), "executive summary written");
    Ok(path)
}

/// Render and write the full HTML report.
pub fn write_html_report(
    folders: &CaseFolders,
    profile: &DeviceProfile,
    records: &[MessageRecord],
    hits: &[KeywordHit],
    media_files: u64,
) -> Result<PathBuf> {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><head><meta charset='UTF-8'>");
    html.push_str("<title>Acquisition Report</title><style>");
    html.push_str(CSS);
    html.push_str("</style></head><body>\n");

    html.push_str("<div class=\"header\">");
    html.push_str("<h1>Digital Forensic Acquisition Report</h1>");
    html.push_str("<div class=\"sub\">Automated chain-of-custody acquisition</div></div>\n");

    html.push_str("<table class=\"meta\">\n");
    meta_row(
        &mut html,
        "Device",
        &format!("{} {}", profile.manufacturer, profile.model),
    );
    meta_row(&mut html, "Serial (S/N)", &profile.serial);
    meta_row(
        &mut html,
        "Operating system",
        &format!("Android {} (SDK {})", profile.os_version, profile.sdk_level),
    );
    meta_row(&mut html, "Target app version", &profile.target_app_version);
    meta_row(
        &mut html,
        "Privileged shell",
        if profile.rooted { "yes" } else { "no" },
    );
    meta_row(
        &mut html,
        "Acquisition date",
        &Local::now().format("%d/%m/%Y %H:%M:%S").to_string(),
    );
    html.push_str("</table>\n");

    if !hits.is_empty() {
        html.push_str("<h2>1. Intelligence findings (keywords)</h2>\n");
        for hit in hits {
            html.push_str(&format!(
                "<div class=\"alert\"><strong>KEYWORD: {}</strong><br>\
                 Context: \"{}\"<br><small>Sender: {} | Time: {}</small></div>\n",
                escape(&hit.keyword.to_uppercase()),
                escape(&hit.text),
                hit.sender.as_str(),
                escape(&hit.device_time),
            ));
        }
    }

    html.push_str(&format!(
        "<h2>2. Message log ({} events)</h2>\n<table class=\"chat\">\n",
        records.len()
    ));
    for record in records {
        let img_href = format!("../01_Evidence/Screenshots/{}", record.screenshot);
        let sender_class = match record.sender {
            Sender::SelfAuthored => "sender-self",
            _ => "sender-other",
        };
        html.push_str(&format!(
            "<tr><td class=\"col-info\"><strong>Device:</strong> {}<br>\
             <strong>Network:</strong> {}<br><strong>Capture:</strong> {}</td>\
             <td><span class=\"{}\">{}</span><br>{}</td>\
             <td class=\"col-evidence\"><a href=\"{}\" target=\"_blank\">\
             <img src=\"{}\" class=\"img-preview\"></a>\
             <span class=\"hash\">SHA256: {}</span></td></tr>\n",
            escape(&record.device_time.replace('T', " ")),
            escape(&record.network_time.replace('T', " ")),
            escape(&record.screenshot),
            sender_class,
            record.sender.as_str(),
            escape(&record.text),
            img_href,
            img_href,
            escape(&record.screenshot_sha256),
        ));
    }
    html.push_str("</table>\n");

    html.push_str("<h2>3. Media preservation</h2>\n");
    if media_files > 0 {
        html.push_str(&format!(
            "<p>{media_files} files preserved under <code>04_Media/</code>. \
             Per-file integrity is recorded in the case manifest.</p>\n"
        ));
    } else {
        html.push_str("<p>No media files could be preserved from this device.</p>\n");
    }

    html.push_str(
        "<div style=\"margin-top: 50px; border-top: 2px solid #000; padding-top: 10px;\">\
         <p><strong>END OF REPORT</strong></p>\
         <p style=\"font-size: 10px;\">Generated automatically by a preservation tool. \
         The integrity of this report is bound to the case closing manifest.</p>\
         </div></body></html>\n",
    );

    let path = folders.report().join(HTML_REPORT_NAME);
    fs::write(&path, html)
        .map_err(|err| AcquireError::from_io_error(path.display().to_string(), err))?;
    info!(path = %path.display(), "html report written");
    Ok(path)
}

fn meta_row(html: &mut String, label: &str, value: &str) {
    html.push_str(&format!(
        "<tr><th>{}</th><td>{}</td></tr>\n",
        escape(label),
        escape(value)
    ));
}

/// Minimal HTML escape for device-originated text.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
