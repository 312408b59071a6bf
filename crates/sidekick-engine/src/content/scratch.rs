//! Scratch ("thinking") filtering for streamed responses.
//!
//! Models emit reasoning the transcript must not show: tagged
//! `<think>…</think>` spans or a line starting with `thinking:`. Closed
//! spans are cut out; an unclosed span is withheld to the end of the buffer
//! because the close marker may simply not have streamed in yet.
//!
//! Filtering a growing buffer can make visible text shrink (a marker
//! arrives that swallows text already shown). The filter therefore
//! remembers the last successfully-cleaned text and refuses to regress:
//! within one response, visible content only grows.

/// Placeholder shown while the model has produced nothing visible yet.
pub const THINKING_PLACEHOLDER: &str = "Thinking…";

const TAG_MARKERS: [(&str, &str); 2] = [
    ("<think>", "</think>"),
    ("<thinking>", "</thinking>"),
];
const LINE_PREFIX: &str = "thinking:";

/// Result of one cleaning pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cleaned {
    /// Text safe to render.
    Visible(String),
    /// Nothing visible yet; render the transient placeholder.
    Pending,
}

/// Stateful pass 1 of the content parser. One instance per response.
#[derive(Debug, Default)]
pub struct ScratchFilter {
    last_clean: Option<String>,
}

impl ScratchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cleans the full accumulated buffer as of the latest delta.
    pub fn clean(&mut self, raw: &str) -> Cleaned {
        let stripped = strip_scratch(raw);
        if stripped.trim().is_empty() {
            return match &self.last_clean {
                Some(previous) => Cleaned::Visible(previous.clone()),
                None => Cleaned::Pending,
            };
        }
        match &self.last_clean {
            // The new pass lost text that was already on screen; keep the
            // remembered version instead.
            Some(previous) if !stripped.contains(previous.as_str()) => {
                Cleaned::Visible(previous.clone())
            }
            _ => {
                self.last_clean = Some(stripped.clone());
                Cleaned::Visible(stripped)
            }
        }
    }
}

/// Removes closed thinking spans and withholds from an unclosed marker to
/// the end of the buffer. Pure.
fn strip_scratch(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(marker) = find_marker(rest) {
        out.push_str(&rest[..marker.start]);
        let Some(close_tag) = marker.close else {
            // The line-prefix form has no close marker.
            return out;
        };
        match find_ci(&rest[marker.body_start..], close_tag) {
            Some(idx) => rest = &rest[marker.body_start + idx + close_tag.len()..],
            None => return out,
        }
    }
    out.push_str(rest);
    // An open tag split across deltas ("<thi") is not yet a marker; withhold
    // it so it cannot flash as text and then vanish when the ">" arrives.
    strip_partial_open_tag(&mut out);
    out
}

fn strip_partial_open_tag(out: &mut String) {
    let Some(pos) = out.rfind('<') else {
        return;
    };
    let tail = out[pos..].to_ascii_lowercase();
    if tail.len() < "<thinking>".len()
        && ("<think>".starts_with(&tail) || "<thinking>".starts_with(&tail))
    {
        out.truncate(pos);
    }
}

struct Marker {
    start: usize,
    body_start: usize,
    close: Option<&'static str>,
}

fn find_marker(text: &str) -> Option<Marker> {
    let mut best: Option<Marker> = None;
    for (open, close) in TAG_MARKERS {
        if let Some(start) = find_ci(text, open) {
            let candidate = Marker {
                start,
                body_start: start + open.len(),
                close: Some(close),
            };
            if best.as_ref().is_none_or(|b| candidate.start < b.start) {
                best = Some(candidate);
            }
        }
    }
    if let Some(start) = find_line_prefix_ci(text, LINE_PREFIX) {
        let candidate = Marker {
            start,
            body_start: start + LINE_PREFIX.len(),
            close: None,
        };
        if best.as_ref().is_none_or(|b| candidate.start < b.start) {
            best = Some(candidate);
        }
    }
    best
}

/// ASCII case-insensitive substring search. Needles are ASCII, so byte
/// offsets stay valid char boundaries.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Like `find_ci` but only matches at the start of a line.
fn find_line_prefix_ci(haystack: &str, prefix: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = prefix.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| {
        (i == 0 || h[i - 1] == b'\n') && h[i..i + n.len()].eq_ignore_ascii_case(n)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_markers_passes_through() {
        let mut filter = ScratchFilter::new();
        assert_eq!(
            filter.clean("plain answer"),
            Cleaned::Visible("plain answer".into())
        );
    }

    #[test]
    fn closed_span_is_removed_and_answer_kept() {
        let mut filter = ScratchFilter::new();
        assert_eq!(
            filter.clean("<think>hmm, let me see</think>The answer is 4."),
            Cleaned::Visible("The answer is 4.".into())
        );
    }

    #[test]
    fn unclosed_span_is_withheld_with_placeholder() {
        let mut filter = ScratchFilter::new();
        assert_eq!(filter.clean("<think>hmm, let me"), Cleaned::Pending);
    }

    #[test]
    fn line_prefix_marker_withholds_to_end() {
        let mut filter = ScratchFilter::new();
        assert_eq!(
            filter.clean("Hello.\nthinking: maybe I should"),
            Cleaned::Visible("Hello.\n".into())
        );
    }

    #[test]
    fn prefix_marker_mid_line_is_not_a_marker() {
        let mut filter = ScratchFilter::new();
        assert_eq!(
            filter.clean("I was thinking: about lunch"),
            Cleaned::Visible("I was thinking: about lunch".into())
        );
    }

    #[test]
    fn resumed_thinking_after_close_is_also_stripped() {
        let mut filter = ScratchFilter::new();
        assert_eq!(
            filter.clean("<think>a</think>First.<think>b</think>Second."),
            Cleaned::Visible("First.Second.".into())
        );
    }

    #[test]
    fn visible_text_is_monotonic_across_growing_prefixes() {
        let full = "<think>step one\nstep two</think>The answer is 4.";
        let mut filter = ScratchFilter::new();
        let mut last_visible = String::new();
        for end in 1..=full.len() {
            if !full.is_char_boundary(end) {
                continue;
            }
            let visible = match filter.clean(&full[..end]) {
                Cleaned::Visible(text) => text,
                Cleaned::Pending => continue,
            };
            assert!(
                visible.len() >= last_visible.len(),
                "visible text shrank at prefix {end}: {last_visible:?} -> {visible:?}"
            );
            last_visible = visible;
        }
        assert_eq!(last_visible, "The answer is 4.");
    }

    #[test]
    fn late_marker_does_not_erase_shown_text() {
        let mut filter = ScratchFilter::new();
        assert_eq!(
            filter.clean("Sure, here it is."),
            Cleaned::Visible("Sure, here it is.".into())
        );
        // A marker arrives that swallows everything; remembered text wins.
        assert_eq!(
            filter.clean("<think>Sure, here it is. Wait, no"),
            Cleaned::Visible("Sure, here it is.".into())
        );
    }

    #[test]
    fn open_tag_split_across_deltas_never_flashes() {
        let mut filter = ScratchFilter::new();
        assert_eq!(filter.clean("<thi"), Cleaned::Pending);
        assert_eq!(filter.clean("<think>hm"), Cleaned::Pending);
        assert_eq!(
            filter.clean("<think>hm</think>ok"),
            Cleaned::Visible("ok".into())
        );
    }

    #[test]
    fn markers_are_case_insensitive() {
        let mut filter = ScratchFilter::new();
        assert_eq!(
            filter.clean("<THINK>loud reasoning</THINK>done"),
            Cleaned::Visible("done".into())
        );
    }
}
