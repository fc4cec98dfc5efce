//! Common utility functions shared across the syntax and semantic layers
//!
//! Byte-safe slicing of tree-sitter spans, repository-relative labels, and
//! the column conversions needed to talk to language servers (which count
//! UTF-16 code units) about tree-sitter positions (which count bytes).

use std::path::{Component, Path};

/// Safely extract a byte slice from source with bounds checking
///
/// Returns None if the slice range is invalid or exceeds source length.
/// Use this instead of direct slicing to prevent panics on malformed input.
///
/// # Example
/// ```rust
/// use codegraph_core::common::safe_slice;
/// let source = b"hello world";
/// assert_eq!(safe_slice(source, 0, 5), Some(&b"hello"[..]));
/// assert_eq!(safe_slice(source, 10, 20), None);
/// ```
pub fn safe_slice(source: &[u8], start: usize, end: usize) -> Option<&[u8]> {
    if start <= end && end <= source.len() {
        Some(&source[start..end])
    } else {
        None
    }
}

/// Text of a tree-sitter node, or None when the span is out of bounds or not UTF-8.
pub fn node_text<'a>(node: &tree_sitter::Node, source: &'a [u8]) -> Option<&'a str> {
    let bytes = safe_slice(source, node.start_byte(), node.end_byte())?;
    std::str::from_utf8(bytes).ok()
}

/// Repository-relative label for a path, using `/` separators on every platform.
///
/// Returns None when `path` is not under `root`.
pub fn file_label(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Convert a 0-based byte column on `line` to a UTF-16 code unit offset.
///
/// Columns past the end of the line are clamped to the line length.
pub fn byte_col_to_utf16(line: &str, byte_col: usize) -> u32 {
    let mut units = 0u32;
    for (idx, ch) in line.char_indices() {
        if idx >= byte_col {
            break;
        }
        units += ch.len_utf16() as u32;
    }
    units
}

/// Convert a UTF-16 code unit offset on `line` back to a 0-based byte column.
pub fn utf16_to_byte_col(line: &str, utf16_col: u32) -> usize {
    let mut units = 0u32;
    for (idx, ch) in line.char_indices() {
        if units >= utf16_col {
            return idx;
        }
        units += ch.len_utf16() as u32;
    }
    line.len()
}

/// Return line `line` (1-based) of `text`, without its terminator.
pub fn line_at(text: &str, line: usize) -> Option<&str> {
    if line == 0 {
        return None;
    }
    text.lines().nth(line - 1)
}

/// First `max_lines` lines of the 1-based inclusive line span, joined with `\n`.
pub fn snippet_lines(text: &str, start_line: usize, end_line: usize, max_lines: usize) -> String {
    if start_line == 0 || end_line < start_line {
        return String::new();
    }
    let take = (end_line - start_line + 1).min(max_lines);
    text.lines()
        .skip(start_line - 1)
        .take(take)
        .collect::<Vec<_>>()
        .join("\n")
}
