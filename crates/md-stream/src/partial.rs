//! Partial state tracking for blocks that are still open while text
//! streams in.

/// Fence that opened a code block. The closing fence must use the same
/// character and be at least as long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fence {
    pub ch: u8,
    pub len: usize,
}

/// The block currently receiving content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenBlock {
    #[default]
    None,
    Paragraph,
    Heading,
    CodeBlock(Fence),

    /// A list with one open item. `gap` is set after a blank line: the list
    /// only continues if the next line is another item of the same kind.
    List { ordered: bool, gap: bool },
}

/// Where the parser is within the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinePhase {
    /// Nothing of the current line has been consumed yet
    #[default]
    LineStart,

    /// Inline content of a paragraph, heading or list item.
    Inline {
        /// Still dropping the whitespace that starts the content
        skip_ws: bool,
        /// Last consumed character on this line
        prev: Option<char>,
    },

    /// Literal content line inside a code block
    Code,
}

impl LinePhase {
    pub fn inline() -> Self {
        LinePhase::Inline {
            skip_ws: true,
            prev: None,
        }
    }
}

/// How a line starts, decided from as little of it as possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineStart {
    /// Whitespace-only line; `len` includes the newline
    Blank { len: usize },
    Heading { level: u8, consumed: usize },
    Fence {
        fence: Fence,
        language: Option<String>,
        consumed: usize,
    },
    ThematicBreak { consumed: usize },
    Item {
        ordered: bool,
        number: u32,
        consumed: usize,
    },
    Text,
}

/// How a line inside a code block starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodeLineStart {
    Closing { consumed: usize },
    Content,
}
