//! Turning feed items into note files.
//!
//! - `sanitize` - ordered markup cleanup rules
//! - `format` - cleaned HTML, fenced block or callout
//! - `template` - `{{placeholder}}` substitution
//! - `path` - collision-free note paths inside the vault

mod format;
mod path;
mod sanitize;
mod template;

pub use format::format_content;
pub use path::{normalize_path, note_stem, resolve_note_path, NOTE_EXTENSION};
pub use sanitize::{clean_html, rules as sanitizer_rules, Rule};
pub use template::{render, NoteFields, DEFAULT_TEMPLATE};

/// A fully rendered note and where it goes. Written once, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNote {
    pub path: String,
    pub body: String,
}
