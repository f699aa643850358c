//! Incremental markdown parser for streaming LLM output.
//!
//! Designed for chat interfaces where markdown arrives token-by-token
//! and needs to be rendered progressively. The parser emits a sequence of
//! [`Commit`] events (open element, append text, close element) that a
//! renderer applies in order. Events are only emitted once the text that
//! decides them has arrived, so nothing ever has to be re-rendered.

mod document;
mod element;
mod inline;
mod parser;
mod partial;

pub use document::{Document, Node};
pub use element::{coalesce, Commit, ElementKind, Nesting};
pub use parser::{Commits, StreamParser};
