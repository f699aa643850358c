//! In-memory render tree built by applying commit events in order.

use std::fmt;

use crate::element::{Commit, ElementKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element {
        kind: ElementKind,
        children: Vec<Node>,
    },
    Text(String),
}

/// The rendered output of one parser.
///
/// Applies commits the way a DOM consumer would: `Open` appends a new
/// element to the current container and enters it, `Text` appends to the
/// current container (merging with a preceding text node), `Close` leaves
/// the current element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    root: Vec<Node>,

    /// Child indices from the root down to the element being filled
    open: Vec<usize>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, commit: Commit) {
        match commit {
            Commit::Open(kind) => {
                let container = self.container_mut();
                container.push(Node::Element {
                    kind,
                    children: Vec::new(),
                });
                let idx = container.len() - 1;
                self.open.push(idx);
            }

            Commit::Text(text) => {
                if text.is_empty() {
                    return;
                }
                let container = self.container_mut();
                match container.last_mut() {
                    Some(Node::Text(prev)) => prev.push_str(&text),
                    _ => container.push(Node::Text(text)),
                }
            }

            Commit::Close => {
                if self.open.pop().is_none() {
                    tracing::warn!("close commit with no open element");
                }
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.root
    }

    /// True when every opened element has been closed.
    pub fn is_balanced(&self) -> bool {
        self.open.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn clear(&mut self) {
        self.root.clear();
        self.open.clear();
    }

    /// Plain text content. Line breaks and block boundaries become newlines.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, node) in self.root.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            collect_text(node, &mut out);
        }
        out
    }

    fn container_mut(&mut self) -> &mut Vec<Node> {
        let mut nodes = &mut self.root;
        for &idx in &self.open {
            nodes = match &mut nodes[idx] {
                Node::Element { children, .. } => children,
                Node::Text(_) => unreachable!("open path always points at elements"),
            };
        }
        nodes
    }
}

impl Extend<Commit> for Document {
    fn extend<T: IntoIterator<Item = Commit>>(&mut self, iter: T) {
        for commit in iter {
            self.apply(commit);
        }
    }
}

impl FromIterator<Commit> for Document {
    fn from_iter<T: IntoIterator<Item = Commit>>(iter: T) -> Self {
        let mut doc = Document::new();
        doc.extend(iter);
        doc
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Element { kind, children } => {
            if kind.is_void() {
                out.push('\n');
                return;
            }
            for (i, child) in children.iter().enumerate() {
                if i > 0 && matches!(kind, ElementKind::UnorderedList | ElementKind::OrderedList { .. })
                {
                    out.push('\n');
                }
                collect_text(child, out);
            }
        }
    }
}

/// Indented outline, one node per line. Used by the replay tool and handy
/// in test failure output.
impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.root {
            fmt_node(node, 0, f)?;
        }
        Ok(())
    }
}

fn fmt_node(node: &Node, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let indent = depth * 2;
    match node {
        Node::Text(text) => writeln!(f, "{:indent$}{:?}", "", text),
        Node::Element { kind, children } => {
            match kind {
                ElementKind::Heading(level) => writeln!(f, "{:indent$}heading({level})", "")?,
                ElementKind::CodeBlock {
                    language: Some(lang),
                } => writeln!(f, "{:indent$}code-block({lang})", "")?,
                ElementKind::OrderedList { start } => {
                    writeln!(f, "{:indent$}ordered-list({start})", "")?
                }
                ElementKind::Link { href } => writeln!(f, "{:indent$}link({href})", "")?,
                other => writeln!(f, "{:indent$}{}", "", other.name())?,
            }
            for child in children {
                fmt_node(child, depth + 1, f)?;
            }
            Ok(())
        }
    }
}
