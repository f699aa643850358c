//! Core streaming parser implementation.

use std::collections::VecDeque;

use crate::element::{Commit, ElementKind, Nesting};
use crate::inline;
use crate::partial::{CodeLineStart, Fence, LinePhase, LineStart, OpenBlock};

/// Incremental markdown parser for streaming input.
///
/// Text is fed in arbitrary fragments. Each call emits the commit events
/// that the text seen so far fully determines; nothing already emitted is
/// ever revisited. The events produced for a text never depend on how it
/// was split into fragments.
#[derive(Debug, Default)]
pub struct StreamParser {
    /// Input not yet turned into commits
    buf: String,

    /// Offset of the first unprocessed byte in `buf`
    cursor: usize,

    block: OpenBlock,
    phase: LinePhase,

    /// Commits not yet handed to the caller
    out: VecDeque<Commit>,

    /// A fragment ended in `\r`; whether it starts a CRLF is still unknown
    held_cr: bool,

    finished: bool,
}

/// Lazy sequence of commit events.
///
/// Events are popped from the parser's queue as the iterator advances.
/// Events left unconsumed stay queued and come first on the next call.
pub struct Commits<'a> {
    queue: &'a mut VecDeque<Commit>,
}

impl Iterator for Commits<'_> {
    type Item = Commit;

    fn next(&mut self) -> Option<Commit> {
        self.queue.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.queue.len(), Some(self.queue.len()))
    }
}

impl ExactSizeIterator for Commits<'_> {}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new fragment and return the commits it resolved.
    pub fn feed(&mut self, fragment: &str) -> Commits<'_> {
        if self.finished {
            tracing::warn!("ignoring {} bytes fed after finalize", fragment.len());
        } else if !fragment.is_empty() {
            self.push_input(fragment);
            self.process(false);
            self.compact();
        }

        Commits {
            queue: &mut self.out,
        }
    }

    /// End of input. Resolves everything still held, degrading unmatched
    /// delimiters to text, and closes every open element.
    pub fn finalize(&mut self) -> Commits<'_> {
        if !self.finished {
            // a trailing `\r` ends the last line
            self.held_cr = false;
            self.process(true);
            debug_assert_eq!(self.cursor, self.buf.len());
            self.close_block();
            self.buf.clear();
            self.cursor = 0;
            self.phase = LinePhase::LineStart;
            self.finished = true;
        }

        Commits {
            queue: &mut self.out,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Check if we're currently inside a code block.
    pub fn in_code_block(&self) -> bool {
        matches!(self.block, OpenBlock::CodeBlock(_))
    }

    /// Text received but not yet committed, for speculative rendering.
    pub fn pending(&self) -> &str {
        &self.buf[self.cursor..]
    }

    /// Append input with CRLF line endings folded to `\n`.
    fn push_input(&mut self, fragment: &str) {
        let mut text = fragment;
        if std::mem::take(&mut self.held_cr) && !text.starts_with('\n') {
            self.buf.push('\r');
        }
        if let Some(stripped) = text.strip_suffix('\r') {
            self.held_cr = true;
            text = stripped;
        }

        if text.contains("\r\n") {
            self.buf.push_str(&text.replace("\r\n", "\n"));
        } else {
            self.buf.push_str(text);
        }
    }

    fn process(&mut self, eof: bool) {
        while self.step(eof) {}
    }

    /// Drop consumed input.
    fn compact(&mut self) {
        if self.cursor > 0 {
            self.buf.drain(..self.cursor);
            self.cursor = 0;
        }
    }

    /// Make one decision. Returns false when the remaining input can't be
    /// decided without more text.
    fn step(&mut self, eof: bool) -> bool {
        if self.cursor >= self.buf.len() {
            return false;
        }

        match self.phase {
            LinePhase::LineStart => self.line_start(eof),
            LinePhase::Inline { skip_ws, prev } => self.inline_content(eof, skip_ws, prev),
            LinePhase::Code => self.code_content(),
        }
    }

    fn line_start(&mut self, eof: bool) -> bool {
        let rest = &self.buf[self.cursor..];

        if let OpenBlock::CodeBlock(fence) = self.block {
            return match classify_code_line(rest, eof, fence) {
                None => false,
                Some(CodeLineStart::Closing { consumed }) => {
                    self.close_block();
                    self.cursor += consumed;
                    true
                }
                Some(CodeLineStart::Content) => {
                    self.phase = LinePhase::Code;
                    true
                }
            };
        }

        let Some(start) = classify_line(rest, eof) else {
            return false;
        };

        match start {
            LineStart::Blank { len } => {
                match self.block {
                    OpenBlock::Paragraph => self.close_block(),
                    OpenBlock::List { ordered, .. } => {
                        self.block = OpenBlock::List { ordered, gap: true };
                    }
                    _ => {}
                }
                self.cursor += len;
            }

            LineStart::Heading { level, consumed } => {
                self.close_block();
                self.open(ElementKind::Heading(level));
                self.block = OpenBlock::Heading;
                self.phase = LinePhase::inline();
                self.cursor += consumed;
            }

            LineStart::Fence {
                fence,
                language,
                consumed,
            } => {
                self.close_block();
                self.open(ElementKind::CodeBlock { language });
                self.block = OpenBlock::CodeBlock(fence);
                self.cursor += consumed;
            }

            LineStart::ThematicBreak { consumed } => {
                self.close_block();
                self.open(ElementKind::ThematicBreak);
                self.out.push_back(Commit::Close);
                self.cursor += consumed;
            }

            LineStart::Item {
                ordered,
                number,
                consumed,
            } => {
                match self.block {
                    OpenBlock::List { ordered: open, .. } if open == ordered => {
                        // next item of the same list
                        self.out.push_back(Commit::Close);
                    }
                    _ => {
                        self.close_block();
                        self.open(if ordered {
                            ElementKind::OrderedList { start: number }
                        } else {
                            ElementKind::UnorderedList
                        });
                    }
                }
                self.open(ElementKind::ListItem);
                self.block = OpenBlock::List {
                    ordered,
                    gap: false,
                };
                self.phase = LinePhase::inline();
                self.cursor += consumed;
            }

            LineStart::Text => {
                match self.block {
                    OpenBlock::Paragraph | OpenBlock::List { gap: false, .. } => {
                        self.line_break();
                    }
                    _ => {
                        self.close_block();
                        self.open(ElementKind::Paragraph);
                        self.block = OpenBlock::Paragraph;
                    }
                }
                self.phase = LinePhase::inline();
            }
        }

        true
    }

    fn inline_content(&mut self, eof: bool, mut skip_ws: bool, mut prev: Option<char>) -> bool {
        let rest = &self.buf[self.cursor..];
        let (line, has_newline) = match rest.find('\n') {
            Some(nl) => (&rest[..nl], true),
            None => (rest, false),
        };
        let complete = has_newline || eof;

        let mut start = 0;
        if skip_ws {
            let content = line.trim_start_matches(|c: char| c == ' ' || c == '\t');
            start = line.len() - content.len();
            if start < line.len() {
                skip_ws = false;
            }
        }

        let scanned = inline::scan(
            &line[start..],
            complete,
            Nesting::all(),
            prev,
            &mut self.out,
        );
        if scanned > 0 {
            prev = line[..start + scanned].chars().next_back();
        }
        let consumed = start + scanned;

        if complete {
            debug_assert_eq!(consumed, line.len());
            self.cursor += consumed + usize::from(has_newline);
            if self.block == OpenBlock::Heading {
                self.close_block();
            }
            self.phase = LinePhase::LineStart;
            return true;
        }

        self.cursor += consumed;
        self.phase = LinePhase::Inline { skip_ws, prev };
        consumed > 0
    }

    fn code_content(&mut self) -> bool {
        let rest = &self.buf[self.cursor..];
        let (text, consumed, line_done) = match rest.find('\n') {
            Some(nl) => (&rest[..=nl], nl + 1, true),
            None => (rest, rest.len(), false),
        };

        self.out.push_back(Commit::text(text));
        self.cursor += consumed;
        if line_done {
            self.phase = LinePhase::LineStart;
        }
        true
    }

    fn open(&mut self, kind: ElementKind) {
        self.out.push_back(Commit::Open(kind));
    }

    fn line_break(&mut self) {
        self.open(ElementKind::LineBreak);
        self.out.push_back(Commit::Close);
    }

    /// Close the open block and everything inside it.
    fn close_block(&mut self) {
        match std::mem::take(&mut self.block) {
            OpenBlock::None => {}
            OpenBlock::Paragraph | OpenBlock::Heading | OpenBlock::CodeBlock(_) => {
                self.out.push_back(Commit::Close);
            }
            OpenBlock::List { .. } => {
                // item, then list
                self.out.push_back(Commit::Close);
                self.out.push_back(Commit::Close);
            }
        }
    }
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn run_of(bytes: &[u8], b: u8) -> usize {
    bytes.iter().take_while(|&&c| c == b).count()
}

/// Decide how a line starts. `None` means more text is needed.
fn classify_line(rest: &str, eof: bool) -> Option<LineStart> {
    let bytes = rest.as_bytes();
    let ws = bytes.iter().take_while(|&&b| is_blank(b)).count();

    if ws == bytes.len() {
        return eof.then_some(LineStart::Blank { len: rest.len() });
    }
    if bytes[ws] == b'\n' {
        return Some(LineStart::Blank { len: ws + 1 });
    }
    if ws > 3 {
        return Some(LineStart::Text);
    }

    let line = &bytes[ws..];
    match line[0] {
        b'#' => classify_heading(line, ws, eof),
        b'`' | b'~' => classify_fence(&rest[ws..], ws, eof),
        b'-' | b'*' | b'_' | b'+' => classify_marker(line, ws, eof),
        b'0'..=b'9' => classify_ordered(&rest[ws..], ws, eof),
        _ => Some(LineStart::Text),
    }
}

fn classify_heading(line: &[u8], indent: usize, eof: bool) -> Option<LineStart> {
    let level = run_of(line, b'#');
    if level > 6 {
        return Some(LineStart::Text);
    }

    match line.get(level) {
        None if !eof => None,
        None | Some(b'\n') => Some(LineStart::Heading {
            level: level as u8,
            consumed: indent + level,
        }),
        Some(&b) if is_blank(b) => Some(LineStart::Heading {
            level: level as u8,
            consumed: indent + level + 1,
        }),
        Some(_) => Some(LineStart::Text),
    }
}

fn classify_fence(line: &str, indent: usize, eof: bool) -> Option<LineStart> {
    let bytes = line.as_bytes();
    let ch = bytes[0];
    let len = run_of(bytes, ch);

    if len == bytes.len() && !eof {
        return None;
    }
    if len < 3 {
        return Some(LineStart::Text);
    }

    let (info, consumed) = match line[len..].find('\n') {
        Some(nl) => (&line[len..len + nl], indent + len + nl + 1),
        None if eof => (&line[len..], indent + line.len()),
        None => return None,
    };

    if ch == b'`' && info.contains('`') {
        return Some(LineStart::Text);
    }

    let info = info.trim();
    Some(LineStart::Fence {
        fence: Fence { ch, len },
        language: (!info.is_empty()).then(|| info.to_string()),
        consumed,
    })
}

/// `-`, `*`, `_` or `+` at line start: thematic break, bullet item or text.
fn classify_marker(line: &[u8], indent: usize, eof: bool) -> Option<LineStart> {
    let marker = line[0];

    if marker != b'+' {
        let mut count = 0;
        let mut end = None;
        let mut broken = false;
        for (i, &b) in line.iter().enumerate() {
            if b == marker {
                count += 1;
            } else if b == b'\n' {
                end = Some(i + 1);
                break;
            } else if !is_blank(b) {
                broken = true;
                break;
            }
        }

        if !broken {
            match end {
                Some(len) if count >= 3 => {
                    return Some(LineStart::ThematicBreak {
                        consumed: indent + len,
                    })
                }
                None if !eof => return None,
                None if count >= 3 => {
                    return Some(LineStart::ThematicBreak {
                        consumed: indent + line.len(),
                    })
                }
                _ => {}
            }
        }
    }

    if marker == b'_' {
        return Some(LineStart::Text);
    }

    match line.get(1) {
        None if !eof => None,
        Some(&b) if is_blank(b) => Some(LineStart::Item {
            ordered: false,
            number: 1,
            consumed: indent + 2,
        }),
        _ => Some(LineStart::Text),
    }
}

fn classify_ordered(line: &str, indent: usize, eof: bool) -> Option<LineStart> {
    let bytes = line.as_bytes();
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();

    if digits > 9 {
        return Some(LineStart::Text);
    }

    match bytes.get(digits) {
        None if !eof => return None,
        Some(b'.') | Some(b')') => {}
        _ => return Some(LineStart::Text),
    }

    match bytes.get(digits + 1) {
        None if !eof => None,
        Some(&b) if is_blank(b) => {
            let number = line[..digits].parse().ok()?;
            Some(LineStart::Item {
                ordered: true,
                number,
                consumed: indent + digits + 2,
            })
        }
        _ => Some(LineStart::Text),
    }
}

/// Inside a code block a line is either the closing fence or content.
fn classify_code_line(rest: &str, eof: bool, fence: Fence) -> Option<CodeLineStart> {
    let bytes = rest.as_bytes();
    let ws = run_of(bytes, b' ');

    if ws > 3 {
        return Some(CodeLineStart::Content);
    }
    if ws == bytes.len() {
        return eof.then_some(CodeLineStart::Content);
    }

    let line = &bytes[ws..];
    if line[0] != fence.ch {
        return Some(CodeLineStart::Content);
    }

    let len = run_of(line, fence.ch);
    if len == line.len() && !eof {
        return None;
    }
    if len < fence.len {
        return Some(CodeLineStart::Content);
    }

    for (i, &b) in line[len..].iter().enumerate() {
        if b == b'\n' {
            return Some(CodeLineStart::Closing {
                consumed: ws + len + i + 1,
            });
        }
        if !is_blank(b) {
            return Some(CodeLineStart::Content);
        }
    }

    eof.then_some(CodeLineStart::Closing {
        consumed: rest.len(),
    })
}
