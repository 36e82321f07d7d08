// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! File names for generated pages and copied assets.

use std::collections::HashSet;

const MAX_STEM_LEN: usize = 120;

/// Reduces `raw` to a portable file name component.
///
/// Keeps ASCII letters, digits, `-`, `_` and `.`; every other run of
/// characters becomes a single `_`. Leading and trailing separators are
/// stripped so the result is never a hidden file.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let is_separator = |c: char| matches!(c, '.' | '_' | '-');
    let mut name = out.trim_matches(is_separator);
    if name.len() > MAX_STEM_LEN {
        // ASCII only at this point, so any byte index is a char boundary
        name = name[..MAX_STEM_LEN].trim_end_matches(is_separator);
    }

    if name.is_empty() {
        "untitled".to_owned()
    } else {
        name.to_owned()
    }
}

/// Splits a sanitized file name into stem and extension (with its dot).
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    }
}

/// Hands out file names that are unique within one output directory.
///
/// Comparison is case-insensitive so the result is safe on
/// case-folding file systems.
#[derive(Debug, Default)]
pub struct NameRegistry {
    taken: HashSet<String>,
}

impl NameRegistry {
    /// Marks `name` as used without handing it out.
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_ascii_lowercase());
    }

    /// Returns `{stem}{extension}`, or `{stem}__{n}{extension}` for the
    /// first `n >= 2` that is still free.
    pub fn claim(&mut self, stem: &str, extension: &str) -> String {
        let mut candidate = format!("{stem}{extension}");
        let mut n = 2;
        while !self.taken.insert(candidate.to_ascii_lowercase()) {
            candidate = format!("{stem}__{n}{extension}");
            n += 1;
        }
        candidate
    }
}
