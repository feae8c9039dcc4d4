//! UI tree parsing, noise filtering and sender attribution.
//!
//! A `uiautomator` dump is a nested `<node .../>` hierarchy whose payload
//! lives entirely in attributes. Message text sits next to interface chrome
//! (headers, prompts, bare clock strings), so every text-bearing node runs
//! through the classifier before it can become a [`MessageRecord`].

use std::collections::VecDeque;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ScrapeConfig;
use crate::error::{AcquireError, Result};

/// Bubble attribution derived from the horizontal position of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    /// Right-aligned bubble, authored on the examined device.
    #[serde(rename = "self")]
    SelfAuthored,
    /// Left-aligned bubble from the remote party.
    #[serde(rename = "counterparty")]
    Counterparty,
    /// Bounds attribute missing or malformed.
    #[serde(rename = "unknown")]
    Unknown,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::SelfAuthored => "self",
            Sender::Counterparty => "counterparty",
            Sender::Unknown => "unknown",
        }
    }
}

/// One scraped message, bound to the screenshot that proves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub sender: Sender,
    pub text: String,
    pub screenshot: String,
    pub screenshot_sha256: String,
    pub device_time: String,
    pub network_time: String,
    pub page: u32,
}

/// Element bounding box, `[left,top][right,bottom]` in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// A text-bearing node lifted out of the dump, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct UiElement {
    pub text: String,
    pub bounds: Option<Bounds>,
}

/// Extractor for `uiautomator` dumps. Holds its compiled pattern so a
/// multi-page walk reuses it, the way [`ElementClassifier`] holds its own.
pub struct UiTreeParser {
    digits: Regex,
}

impl UiTreeParser {
    pub fn new() -> Self {
        Self {
            digits: Regex::new(r"\d+").unwrap(),
        }
    }

    /// Extract every node that carries a non-empty `text` attribute.
    pub fn parse(&self, xml: &str) -> Result<Vec<UiElement>> {
        let mut reader = Reader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        let mut elements = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    if e.name().as_ref() != b"node" {
                        buf.clear();
                        continue;
                    }
                    let mut text: Option<String> = None;
                    let mut bounds_raw: Option<String> = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"text" => {
                                text = attr.unescape_value().ok().map(|v| v.into_owned());
                            }
                            b"bounds" => {
                                bounds_raw = attr.unescape_value().ok().map(|v| v.into_owned());
                            }
                            _ => {}
                        }
                    }
                    if let Some(text) = text {
                        if !text.is_empty() {
                            elements.push(UiElement {
                                text,
                                bounds: bounds_raw
                                    .as_deref()
                                    .and_then(|raw| self.parse_bounds(raw)),
                            });
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(AcquireError::ParseNoise(err.to_string())),
            }
            buf.clear();
        }

        Ok(elements)
    }

    /// Tolerant bounds parse: any four integers in the attribute, in order.
    fn parse_bounds(&self, raw: &str) -> Option<Bounds> {
        let nums: Vec<i32> = self
            .digits
            .find_iter(raw)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        if nums.len() != 4 {
            return None;
        }
        Some(Bounds {
            left: nums[0],
            top: nums[1],
            right: nums[2],
            bottom: nums[3],
        })
    }
}

impl Default for UiTreeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Noise filter plus sender heuristic.
pub struct ElementClassifier {
    time_pattern: Regex,
    denylist: Vec<String>,
    self_column_px: i32,
}

impl ElementClassifier {
    pub fn new(denylist: Vec<String>, self_column_px: i32) -> Self {
        Self {
            // Bare clock strings: "14:30", "2:05 pm", "2:05p.m."
            time_pattern: Regex::new(r"^\d{1,2}:\d{2}(\s?[ap]\.?m\.?)?$").unwrap(),
            denylist,
            self_column_px,
        }
    }

    pub fn from_config(cfg: &ScrapeConfig) -> Self {
        Self::new(cfg.chrome_denylist.clone(), cfg.self_column_px)
    }

    /// `None` for chrome and noise; otherwise the attributed sender.
    ///
    /// The column split is resolution dependent: an origin strictly right
    /// of `self_column_px` reads as a self-authored bubble, at or left of
    /// it as the counterparty.
    pub fn classify(&self, element: &UiElement) -> Option<Sender> {
        if element.text.trim().is_empty() {
            return None;
        }
        if self.denylist.iter().any(|entry| entry == &element.text) {
            return None;
        }
        if self.is_bare_time(&element.text) {
            return None;
        }
        Some(match element.bounds {
            Some(b) if b.left > self.self_column_px => Sender::SelfAuthored,
            Some(_) => Sender::Counterparty,
            None => Sender::Unknown,
        })
    }

    fn is_bare_time(&self, text: &str) -> bool {
        self.time_pattern.is_match(&text.trim().to_lowercase())
    }
}

/// Bounded lookback of recently accepted (sender, text) pairs. Re-sampling
/// the same visible content across scroll steps lands here and is dropped.
#[derive(Debug)]
pub struct DedupWindow {
    window: VecDeque<(Sender, String)>,
    capacity: usize,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// True when the pair is new within the window and was admitted.
    pub fn admit(&mut self, sender: Sender, text: &str) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self
            .window
            .iter()
            .any(|(seen_sender, seen_text)| *seen_sender == sender && seen_text == text)
        {
            return false;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back((sender, text.to_string()));
        true
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
