//! File-edit payload detection in free-form model output.
//!
//! Models asked to edit files usually answer with JSON, but rarely with
//! *only* JSON: the payload arrives bare, fenced, or buried in prose.
//! Detection tries progressively messier recoveries, then scores the
//! structural match before trusting it — a reply that merely looks like
//! JSON must not hijack rendering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::{ParsedBlock, parse_blocks};

// Additive confidence weights, in hundredths. The rule ordering matters
// more than the exact values: attachment-context match > shape match >
// summary co-occurrence.
const BASE_CONFIDENCE: u32 = 30;
const ATTACHMENT_SHAPE_BONUS: u32 = 30;
const COMPLETE_ENTRIES_BONUS: u32 = 20;
const SUMMARY_SHAPE_BONUS: u32 = 20;
const ACCEPT_THRESHOLD: u32 = 70;

/// One file the model wants written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileEdit {
    pub filename: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// A structured edit response recovered from model output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileEditPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub files: Vec<FileEdit>,
}

/// Decides file-edit vs. ordinary rendering for a completed response.
///
/// Returns `Some` only when a candidate structurally matches the edit
/// shape *and* the confidence rules accept it; anything else falls through
/// to ordinary rendering. Never panics, never errors.
pub fn detect_file_edit(text: &str, had_attachments: bool) -> Option<FileEditPayload> {
    for candidate in candidates(text) {
        let Ok(value) = serde_json::from_str::<Value>(&candidate) else {
            continue;
        };
        let Some(shaped) = interpret(&value) else {
            continue;
        };
        // First structural success decides; later candidates are narrower
        // slices of the same text.
        return accept(&shaped, had_attachments).then_some(shaped.payload);
    }
    None
}

/// Candidate JSON sources, cleanest first: the whole text, fenced code
/// block contents (json-tagged or untagged), balanced `{…}` spans widest
/// first, then balanced `[…]` spans.
fn candidates(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    for block in parse_blocks(text) {
        if let ParsedBlock::Code { language, content } = block
            && language.as_deref().is_none_or(|l| l.eq_ignore_ascii_case("json"))
        {
            let content = content.trim();
            if !content.is_empty() {
                out.push(content.to_string());
            }
        }
    }
    out.extend(balanced_spans(text, b'{', b'}'));
    out.extend(balanced_spans(text, b'[', b']'));
    out
}

struct ShapedPayload {
    payload: FileEditPayload,
    /// The JSON itself carried a `files` array (not synthesized).
    has_files_array: bool,
    /// The JSON itself carried a `summary` string.
    has_summary: bool,
    /// Every raw entry had both `filename` and `content`.
    all_entries_complete: bool,
}

/// Maps parsed JSON onto the edit shape, or `None` when it does not match.
fn interpret(value: &Value) -> Option<ShapedPayload> {
    match value {
        Value::Object(map) => {
            if let Some(files_value) = map.get("files") {
                let entries = files_value.as_array()?;
                let (files, all_complete) = parse_file_entries(entries);
                if files.is_empty() {
                    return None;
                }
                let summary = map
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let has_summary = summary.is_some();
                Some(ShapedPayload {
                    payload: FileEditPayload { summary, files },
                    has_files_array: true,
                    has_summary,
                    all_entries_complete: all_complete,
                })
            } else {
                // A bare {filename, content} object is normalized into a
                // single-file payload.
                let file = parse_file_entry(value)?;
                let summary = format!("File: {}", file.filename);
                let complete = value.get("content").is_some();
                Some(ShapedPayload {
                    payload: FileEditPayload {
                        summary: Some(summary),
                        files: vec![file],
                    },
                    has_files_array: false,
                    has_summary: false,
                    all_entries_complete: complete,
                })
            }
        }
        Value::Array(items) => {
            // Bare arrays are accepted only when every element is a file
            // entry; a list of anything else is ordinary content.
            let (files, all_complete) = parse_file_entries(items);
            if files.is_empty() || files.len() != items.len() {
                return None;
            }
            Some(ShapedPayload {
                payload: FileEditPayload {
                    summary: None,
                    files,
                },
                has_files_array: true,
                has_summary: false,
                all_entries_complete: all_complete,
            })
        }
        _ => None,
    }
}

fn parse_file_entries(entries: &[Value]) -> (Vec<FileEdit>, bool) {
    let mut files = Vec::new();
    let mut all_complete = !entries.is_empty();
    for entry in entries {
        match parse_file_entry(entry) {
            Some(file) => {
                if entry.get("content").is_none() {
                    all_complete = false;
                }
                files.push(file);
            }
            None => all_complete = false,
        }
    }
    (files, all_complete)
}

fn parse_file_entry(value: &Value) -> Option<FileEdit> {
    let filename = value.get("filename")?.as_str()?.trim();
    if filename.is_empty() {
        return None;
    }
    let content = value
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let path = value
        .get("path")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(FileEdit {
        filename: filename.to_string(),
        content: content.to_string(),
        path,
    })
}

fn accept(shaped: &ShapedPayload, had_attachments: bool) -> bool {
    // Attachment context plus real content is the strongest signal.
    if had_attachments
        && shaped
            .payload
            .files
            .iter()
            .any(|file| !file.content.is_empty())
    {
        return true;
    }

    let mut confidence = BASE_CONFIDENCE;
    if shaped.has_files_array && had_attachments {
        confidence += ATTACHMENT_SHAPE_BONUS;
    }
    if shaped.all_entries_complete {
        confidence += COMPLETE_ENTRIES_BONUS;
    }
    if shaped.has_summary && shaped.has_files_array {
        confidence += SUMMARY_SHAPE_BONUS;
    }
    if confidence >= ACCEPT_THRESHOLD {
        return true;
    }

    shaped.has_summary && had_attachments
}

/// All balanced spans of `open…close`, widest first. The depth counter
/// skips delimiters inside quoted, escape-aware strings.
fn balanced_spans(text: &str, open: u8, close: u8) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for start in 0..bytes.len() {
        if bytes[start] != open {
            continue;
        }
        if let Some(end) = matching_close(bytes, start, open, close) {
            spans.push((start, end));
        }
    }
    spans.sort_by_key(|&(start, end)| std::cmp::Reverse(end - start));
    spans
        .into_iter()
        .map(|(start, end)| text[start..=end].to_string())
        .collect()
}

fn matching_close(bytes: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        if b == b'"' {
            in_string = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}
