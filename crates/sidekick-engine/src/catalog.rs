//! Model-catalog cleanup shared by every adapter.
//!
//! Vendor catalogs are noisy: one base model shows up as a clean id plus a
//! spread of dated, preview, and numbered revisions, next to non-chat
//! variants (vision, embedding, instruct). The panel wants one entry per
//! usable base model.

use std::collections::HashMap;

/// Trailing id tokens that mark a revision of a base model rather than a
/// different model.
const REVISION_TOKENS: [&str; 4] = ["preview", "latest", "exp", "beta"];

/// Filters, collapses, and sorts raw catalog names.
///
/// Names containing any of `excluded_markers` (case-insensitive substring
/// match) are dropped. Remaining names are grouped by base id; the clean
/// unsuffixed variant wins when present, otherwise the first suffixed
/// variant encountered. The result is de-duplicated and sorted
/// case-insensitively.
pub fn normalize_model_names<I>(names: I, excluded_markers: &[&str]) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut chosen: Vec<String> = Vec::new();
    let mut index_by_base: HashMap<String, usize> = HashMap::new();

    for name in names {
        let name = name.trim().to_string();
        if name.is_empty() || is_excluded(&name, excluded_markers) {
            continue;
        }
        let base = base_id(&name);
        let is_clean = name.eq_ignore_ascii_case(&base);
        match index_by_base.get(&base.to_ascii_lowercase()) {
            Some(&index) => {
                // A clean variant supersedes whichever revision got there first.
                if is_clean {
                    chosen[index] = name;
                }
            }
            None => {
                index_by_base.insert(base.to_ascii_lowercase(), chosen.len());
                chosen.push(name);
            }
        }
    }

    chosen.sort_by(|a, b| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()));
    chosen.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    chosen
}

fn is_excluded(name: &str, excluded_markers: &[&str]) -> bool {
    let lowered = name.to_ascii_lowercase();
    excluded_markers
        .iter()
        .any(|marker| lowered.contains(&marker.to_ascii_lowercase()))
}

/// Strips trailing revision tokens (`-preview`, `-latest`, dates, numeric
/// revisions) off an id, leaving the base model name.
fn base_id(name: &str) -> String {
    let mut tokens: Vec<&str> = name.split('-').collect();
    while tokens.len() > 1 {
        let last = tokens[tokens.len() - 1];
        if is_revision_token(last) {
            tokens.pop();
        } else {
            break;
        }
    }
    tokens.join("-")
}

fn is_revision_token(token: &str) -> bool {
    let lowered = token.to_ascii_lowercase();
    if REVISION_TOKENS.contains(&lowered.as_str()) {
        return true;
    }
    // Date parts and revision numbers ("2024", "01", "002"). Single digits
    // stay: "4" in gpt-4 is part of the model name, not a revision.
    token.len() >= 2 && token.bytes().all(|b| b.is_ascii_digit())
}
