//! Markdown elements and the commit events that describe them.

use bitflags::bitflags;

bitflags! {
    /// Inline constructs that may be recognized inside an element.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Nesting: u8 {
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
        const CODE = 1 << 2;
        const LINK = 1 << 3;
    }
}

/// The kind of element opened by a [`Commit::Open`] event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Paragraph,

    /// ATX heading, level 1-6
    Heading(u8),

    /// Fenced code block with its optional info string
    CodeBlock { language: Option<String> },

    UnorderedList,

    /// Ordered list and the number of its first item
    OrderedList { start: u32 },

    ListItem,

    /// Void element: always followed directly by a `Close`
    ThematicBreak,

    /// Void element: always followed directly by a `Close`
    LineBreak,

    Bold,
    Italic,
    InlineCode,
    Link { href: String },
}

impl ElementKind {
    /// Inline constructs parsed inside this element. Anything else is
    /// taken literally.
    pub fn nested(&self) -> Nesting {
        match self {
            ElementKind::Paragraph | ElementKind::Heading(_) | ElementKind::ListItem => {
                Nesting::all()
            }
            ElementKind::Bold => Nesting::ITALIC | Nesting::CODE | Nesting::LINK,
            ElementKind::Italic => Nesting::BOLD | Nesting::CODE | Nesting::LINK,
            ElementKind::Link { .. } => Nesting::BOLD | Nesting::ITALIC | Nesting::CODE,
            ElementKind::InlineCode
            | ElementKind::CodeBlock { .. }
            | ElementKind::UnorderedList
            | ElementKind::OrderedList { .. }
            | ElementKind::ThematicBreak
            | ElementKind::LineBreak => Nesting::empty(),
        }
    }

    /// Whether the element may sit directly at the document root.
    pub fn can_be_root(&self) -> bool {
        matches!(
            self,
            ElementKind::Paragraph
                | ElementKind::Heading(_)
                | ElementKind::CodeBlock { .. }
                | ElementKind::UnorderedList
                | ElementKind::OrderedList { .. }
                | ElementKind::ThematicBreak
        )
    }

    /// Void elements never carry children.
    pub fn is_void(&self) -> bool {
        matches!(self, ElementKind::ThematicBreak | ElementKind::LineBreak)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Paragraph => "paragraph",
            ElementKind::Heading(_) => "heading",
            ElementKind::CodeBlock { .. } => "code-block",
            ElementKind::UnorderedList => "unordered-list",
            ElementKind::OrderedList { .. } => "ordered-list",
            ElementKind::ListItem => "list-item",
            ElementKind::ThematicBreak => "thematic-break",
            ElementKind::LineBreak => "line-break",
            ElementKind::Bold => "bold",
            ElementKind::Italic => "italic",
            ElementKind::InlineCode => "inline-code",
            ElementKind::Link { .. } => "link",
        }
    }
}

/// An irreversible output instruction. Consumers apply these in order,
/// appending to the current container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    Open(ElementKind),
    Text(String),
    Close,
}

impl Commit {
    pub fn text(s: impl Into<String>) -> Self {
        Commit::Text(s.into())
    }
}

/// Merge adjacent `Text` events.
///
/// Two event sequences describing the same tree may split text differently
/// depending on how the input arrived; coalescing gives a canonical form.
pub fn coalesce(events: impl IntoIterator<Item = Commit>) -> Vec<Commit> {
    let mut out: Vec<Commit> = Vec::new();
    for event in events {
        match event {
            Commit::Text(t) if t.is_empty() => {}
            Commit::Text(t) => match out.last_mut() {
                Some(Commit::Text(prev)) => prev.push_str(&t),
                _ => out.push(Commit::Text(t)),
            },
            event => out.push(event),
        }
    }
    out
}
