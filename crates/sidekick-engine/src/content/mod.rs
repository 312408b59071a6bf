//! Turns a growing response buffer into ordered, renderable blocks.
//!
//! Two cooperating passes: [`ScratchFilter`] withholds model "thinking"
//! scratch output, then [`parse_blocks`] decomposes what remains. Both are
//! safe to re-run on every delta of a streaming response; visible content
//! never flickers backwards.

mod blocks;
mod scratch;

pub use blocks::{OrderedItem, ParsedBlock, parse_blocks};
pub use scratch::{Cleaned, ScratchFilter, THINKING_PLACEHOLDER};

/// Live parser for one streaming response: scratch filtering plus block
/// decomposition. Create a fresh instance per response so the anti-flicker
/// memory does not leak across turns.
#[derive(Debug, Default)]
pub struct ContentParser {
    filter: ScratchFilter,
}

impl ContentParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the full accumulated buffer as of the latest delta.
    ///
    /// While nothing visible has arrived, the result is a single transient
    /// placeholder text block.
    pub fn parse(&mut self, raw: &str) -> Vec<ParsedBlock> {
        match self.filter.clean(raw) {
            Cleaned::Visible(text) => parse_blocks(&text),
            Cleaned::Pending => vec![ParsedBlock::Text(THINKING_PLACEHOLDER.to_string())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_while_only_scratch_has_arrived() {
        let mut parser = ContentParser::new();
        let blocks = parser.parse("<think>still going");
        assert_eq!(blocks, vec![ParsedBlock::Text(THINKING_PLACEHOLDER.into())]);
    }

    #[test]
    fn placeholder_is_replaced_once_answer_arrives() {
        let mut parser = ContentParser::new();
        parser.parse("<think>mulling");
        let blocks = parser.parse("<think>mulling</think># Done\nanswer");
        assert_eq!(
            blocks,
            vec![
                ParsedBlock::Heading {
                    level: 1,
                    text: "Done".into()
                },
                ParsedBlock::Text("answer".into()),
            ]
        );
    }

    #[test]
    fn visible_blocks_reconstruct_unmarked_input() {
        let mut parser = ContentParser::new();
        let blocks = parser.parse("# Title\nbody line");
        assert_eq!(
            blocks,
            vec![
                ParsedBlock::Heading {
                    level: 1,
                    text: "Title".into()
                },
                ParsedBlock::Text("body line".into()),
            ]
        );
    }
}
