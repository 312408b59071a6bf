//! Pure block decomposition of response text.
//!
//! Fenced code is carved out first (an unterminated fence spans to the end
//! of the buffer, so a code block streaming in never collapses back into
//! prose). The remaining lines are classified in priority order: heading,
//! horizontal rule, blockquote, ordered list, unordered list, running text.

/// One ordered-list entry. The source numbering is preserved so a list the
/// model starts at 3 renders as 3, 4, 5.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderedItem {
    pub number: u64,
    pub text: String,
}

/// A renderable block, in document order.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedBlock {
    Text(String),
    Heading { level: u8, text: String },
    Blockquote(String),
    OrderedList(Vec<OrderedItem>),
    UnorderedList(Vec<String>),
    Code {
        language: Option<String>,
        content: String,
    },
    HorizontalRule,
}

/// Decomposes `text` into ordered blocks.
///
/// Pure and deterministic: identical input yields identical output, so the
/// caller can re-run it on every delta of a growing buffer.
pub fn parse_blocks(text: &str) -> Vec<ParsedBlock> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(language) = fence_open(line) {
            flush_paragraph(&mut blocks, &mut paragraph);
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() && !is_fence_close(lines[i]) {
                body.push(lines[i]);
                i += 1;
            }
            if i < lines.len() {
                i += 1;
            }
            blocks.push(ParsedBlock::Code {
                language,
                content: body.join("\n"),
            });
            continue;
        }

        if let Some((level, text)) = heading(line) {
            flush_paragraph(&mut blocks, &mut paragraph);
            blocks.push(ParsedBlock::Heading { level, text });
            i += 1;
            continue;
        }

        if is_horizontal_rule(line) {
            flush_paragraph(&mut blocks, &mut paragraph);
            blocks.push(ParsedBlock::HorizontalRule);
            i += 1;
            continue;
        }

        if let Some(first) = blockquote_text(line) {
            flush_paragraph(&mut blocks, &mut paragraph);
            let mut parts = vec![first];
            i += 1;
            while i < lines.len() {
                match blockquote_text(lines[i]) {
                    Some(part) => {
                        parts.push(part);
                        i += 1;
                    }
                    None => break,
                }
            }
            blocks.push(ParsedBlock::Blockquote(parts.join("\n")));
            continue;
        }

        if let Some(item) = ordered_item(line) {
            flush_paragraph(&mut blocks, &mut paragraph);
            let mut items = vec![item];
            i += 1;
            while i < lines.len() {
                match ordered_item(lines[i]) {
                    Some(item) => {
                        items.push(item);
                        i += 1;
                    }
                    None => break,
                }
            }
            blocks.push(ParsedBlock::OrderedList(items));
            continue;
        }

        if let Some(item) = unordered_item(line) {
            flush_paragraph(&mut blocks, &mut paragraph);
            let mut items = vec![item];
            i += 1;
            while i < lines.len() {
                match unordered_item(lines[i]) {
                    Some(item) => {
                        items.push(item);
                        i += 1;
                    }
                    None => break,
                }
            }
            blocks.push(ParsedBlock::UnorderedList(items));
            continue;
        }

        paragraph.push(line);
        i += 1;
    }

    flush_paragraph(&mut blocks, &mut paragraph);
    blocks
}

fn flush_paragraph(blocks: &mut Vec<ParsedBlock>, paragraph: &mut Vec<&str>) {
    if paragraph.is_empty() {
        return;
    }
    let joined = paragraph.join("\n");
    paragraph.clear();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        blocks.push(ParsedBlock::Text(trimmed.to_string()));
    }
}

/// Fence opener: ``` with an optional language tag on the same line.
fn fence_open(line: &str) -> Option<Option<String>> {
    let rest = line.trim_start().strip_prefix("```")?;
    let language = rest.trim();
    Some((!language.is_empty()).then(|| language.to_string()))
}

fn is_fence_close(line: &str) -> bool {
    line.trim() == "```"
}

fn heading(line: &str) -> Option<(u8, String)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if rest.is_empty() {
        Some((hashes as u8, String::new()))
    } else if rest.starts_with(' ') {
        Some((hashes as u8, rest.trim().to_string()))
    } else {
        None
    }
}

/// 3+ repetitions of the same rule character, alone on a line.
fn is_horizontal_rule(line: &str) -> bool {
    let trimmed = line.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first @ ('-' | '*' | '_')) => {
            trimmed.chars().count() >= 3 && chars.all(|c| c == first)
        }
        _ => false,
    }
}

fn blockquote_text(line: &str) -> Option<&str> {
    line.strip_prefix("> ").or((line == ">").then_some(""))
}

fn ordered_item(line: &str) -> Option<OrderedItem> {
    let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix(". ")?;
    let number = line[..digits].parse().ok()?;
    Some(OrderedItem {
        number,
        text: rest.trim().to_string(),
    })
}

fn unordered_item(line: &str) -> Option<String> {
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (Some('-' | '*' | '+'), Some(' ')) => Some(chars.as_str().trim().to_string()),
        _ => None,
    }
}
