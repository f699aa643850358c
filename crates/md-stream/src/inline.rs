//! Inline element scanning for bold, italic, code and links.
//!
//! Inline constructs never span lines. The scanner is handed the current
//! line (or the part of it that has arrived) and emits commits for the
//! longest prefix it can resolve. Everything from the first unresolved
//! delimiter onward is left for the next call.

use std::collections::VecDeque;

use crate::element::{Commit, ElementKind, Nesting};

/// Result of trying to resolve a construct starting at a delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolve {
    /// Construct is complete. `content` is its inner byte range and `end`
    /// is the offset just past the closing delimiter.
    Found {
        content: (usize, usize),
        end: usize,
    },
    /// Not a construct; the delimiter run of this many bytes is plain text.
    Literal(usize),
    /// The text seen so far can't decide it.
    NeedMore,
}

/// Scan `text` and push commits for everything that can be resolved.
///
/// `complete` means no more text will follow on this line, so every
/// delimiter gets resolved. `prev` is the character just before `text`,
/// used by the `_` word-boundary rules.
///
/// Returns the number of bytes consumed. When `complete` is set, that is
/// always `text.len()`.
pub(crate) fn scan(
    text: &str,
    complete: bool,
    nesting: Nesting,
    prev: Option<char>,
    out: &mut VecDeque<Commit>,
) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut plain = 0;

    while i < text.len() {
        match bytes[i] {
            b'\\' => match text[i + 1..].chars().next() {
                None if !complete => return hold(text, plain, i, out),
                Some(c) if c.is_ascii_punctuation() => {
                    flush(text, plain, i, out);
                    out.push_back(Commit::Text(c.to_string()));
                    i += 1 + c.len_utf8();
                    plain = i;
                }
                _ => i += 1,
            },

            b'`' if nesting.contains(Nesting::CODE) => match code_span(text, i, complete) {
                Resolve::Found { content, end } => {
                    flush(text, plain, i, out);
                    out.push_back(Commit::Open(ElementKind::InlineCode));
                    out.push_back(Commit::text(strip_code_padding(
                        &text[content.0..content.1],
                    )));
                    out.push_back(Commit::Close);
                    i = end;
                    plain = i;
                }
                Resolve::Literal(len) => i += len,
                Resolve::NeedMore => return hold(text, plain, i, out),
            },

            b'*' | b'_' => {
                let before = if i == 0 {
                    prev
                } else {
                    text[..i].chars().next_back()
                };

                match emphasis(text, i, complete, nesting, before) {
                    Resolve::Found { content, end } => {
                        flush(text, plain, i, out);
                        let run = content.0 - i;
                        let kinds = emphasis_kinds(run);
                        let mut inner = nesting;
                        for kind in kinds {
                            inner &= kind.nested();
                            out.push_back(Commit::Open(kind.clone()));
                        }
                        let inner_prev = text[..content.0].chars().next_back();
                        scan(
                            &text[content.0..content.1],
                            true,
                            inner,
                            inner_prev,
                            out,
                        );
                        for _ in kinds {
                            out.push_back(Commit::Close);
                        }
                        i = end;
                        plain = i;
                    }
                    Resolve::Literal(len) => i += len,
                    Resolve::NeedMore => return hold(text, plain, i, out),
                }
            }

            b'[' if nesting.contains(Nesting::LINK) => match link(text, i, complete) {
                Resolve::Found { content, end } => {
                    flush(text, plain, i, out);
                    // content covers the link text; the href sits between "](" and ")"
                    let href = &text[content.1 + 2..end - 1];
                    let kind = ElementKind::Link {
                        href: href.to_string(),
                    };
                    let inner = nesting & kind.nested();
                    out.push_back(Commit::Open(kind));
                    scan(
                        &text[content.0..content.1],
                        true,
                        inner,
                        Some('['),
                        out,
                    );
                    out.push_back(Commit::Close);
                    i = end;
                    plain = i;
                }
                Resolve::Literal(len) => i += len,
                Resolve::NeedMore => return hold(text, plain, i, out),
            },

            _ => i += char_len(text, i),
        }
    }

    flush(text, plain, text.len(), out);
    text.len()
}

static BOLD_ITALIC: [ElementKind; 2] = [ElementKind::Bold, ElementKind::Italic];

fn emphasis_kinds(run: usize) -> &'static [ElementKind] {
    match run {
        1 => &BOLD_ITALIC[1..],
        2 => &BOLD_ITALIC[..1],
        _ => &BOLD_ITALIC,
    }
}

fn flush(text: &str, from: usize, to: usize, out: &mut VecDeque<Commit>) {
    if to > from {
        out.push_back(Commit::text(&text[from..to]));
    }
}

/// Emit the plain text before `at` and stop there.
fn hold(text: &str, plain: usize, at: usize, out: &mut VecDeque<Commit>) -> usize {
    flush(text, plain, at, out);
    at
}

fn char_len(text: &str, at: usize) -> usize {
    text[at..].chars().next().map(char::len_utf8).unwrap_or(1)
}

fn run_len(text: &str, at: usize, marker: u8) -> usize {
    text.as_bytes()[at..]
        .iter()
        .take_while(|&&b| b == marker)
        .count()
}

/// A single leading and trailing space is stripped when both are present
/// and the span isn't all spaces.
fn strip_code_padding(content: &str) -> &str {
    if content.len() > 2
        && content.starts_with(' ')
        && content.ends_with(' ')
        && !content.bytes().all(|b| b == b' ')
    {
        &content[1..content.len() - 1]
    } else {
        content
    }
}

/// Code span opened by the backtick run at `at`, closed by a run of the
/// same length.
fn code_span(text: &str, at: usize, complete: bool) -> Resolve {
    let bytes = text.as_bytes();
    let n = run_len(text, at, b'`');
    let after = at + n;
    if after == text.len() && !complete {
        return Resolve::NeedMore;
    }

    let mut k = after;
    while k < text.len() {
        if bytes[k] == b'`' {
            let r = run_len(text, k, b'`');
            if k + r == text.len() && !complete {
                return Resolve::NeedMore;
            }
            if r == n {
                return Resolve::Found {
                    content: (after, k),
                    end: k + r,
                };
            }
            k += r;
        } else {
            k += 1;
        }
    }

    if complete {
        Resolve::Literal(n)
    } else {
        Resolve::NeedMore
    }
}

fn emphasis(
    text: &str,
    at: usize,
    complete: bool,
    nesting: Nesting,
    before: Option<char>,
) -> Resolve {
    let marker = text.as_bytes()[at];
    let run = run_len(text, at, marker);
    let after = at + run;
    if after == text.len() && !complete {
        return Resolve::NeedMore;
    }

    let required = match run {
        1 => Nesting::ITALIC,
        2 => Nesting::BOLD,
        3 => Nesting::BOLD | Nesting::ITALIC,
        _ => return Resolve::Literal(run),
    };
    if !nesting.contains(required) {
        return Resolve::Literal(run);
    }

    // opener must be followed by something other than whitespace
    match text[after..].chars().next() {
        Some(c) if !c.is_whitespace() => {}
        _ => return Resolve::Literal(run),
    }

    if marker == b'_' && before.is_some_and(char::is_alphanumeric) {
        return Resolve::Literal(run);
    }

    match find_closer(text, after, marker, run, complete) {
        Resolve::Found { content, .. } => Resolve::Found {
            content,
            end: content.1 + run,
        },
        other => other,
    }
}

/// Find a closing run of exactly `run` markers. Code spans and escapes
/// inside the content are skipped over.
fn find_closer(text: &str, from: usize, marker: u8, run: usize, complete: bool) -> Resolve {
    let bytes = text.as_bytes();
    let mut k = from;

    while k < text.len() {
        match bytes[k] {
            b'\\' => {
                if k + 1 >= text.len() {
                    if !complete {
                        return Resolve::NeedMore;
                    }
                    k += 1;
                } else {
                    k += 1 + char_len(text, k + 1);
                }
            }

            b'`' => match code_span(text, k, complete) {
                Resolve::Found { end, .. } => k = end,
                Resolve::Literal(n) => k += n,
                Resolve::NeedMore => return Resolve::NeedMore,
            },

            b if b == marker => {
                let r = run_len(text, k, marker);
                if k + r == text.len() && !complete {
                    return Resolve::NeedMore;
                }

                let after_ws = text[..k].chars().next_back().map_or(true, char::is_whitespace);
                let followed_by_word = marker == b'_'
                    && text[k + r..]
                        .chars()
                        .next()
                        .is_some_and(char::is_alphanumeric);

                if r == run && k > from && !after_ws && !followed_by_word {
                    return Resolve::Found {
                        content: (from, k),
                        end: k + r,
                    };
                }
                k += r;
            }

            _ => k += char_len(text, k),
        }
    }

    if complete {
        Resolve::Literal(run)
    } else {
        Resolve::NeedMore
    }
}

/// `[text](href)` starting at `at`. The href may not contain whitespace.
fn link(text: &str, at: usize, complete: bool) -> Resolve {
    let bytes = text.as_bytes();
    let undecided = if complete {
        Resolve::Literal(1)
    } else {
        Resolve::NeedMore
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut k = at;
    while k < text.len() {
        match bytes[k] {
            b'\\' => k += 1,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(k);
                    break;
                }
            }
            _ => {}
        }
        k += 1;
    }

    let Some(close) = close else {
        return undecided;
    };

    match bytes.get(close + 1) {
        None => return undecided,
        Some(b'(') => {}
        Some(_) => return Resolve::Literal(1),
    }

    for (offset, c) in text[close + 2..].char_indices() {
        if c == ')' {
            return Resolve::Found {
                content: (at + 1, close),
                end: close + 2 + offset + 1,
            };
        }
        if c.is_whitespace() {
            return Resolve::Literal(1);
        }
    }

    undecided
}
