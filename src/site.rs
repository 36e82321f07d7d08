// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Writing a whole archive out as a static site.

use crate::assets::{AssetStats, AssetStore};
use crate::index::{self, IndexEntry};
use crate::names::{self, NameRegistry};
use crate::parser::Archive;
use crate::renderer::{self, RenderOptions};
use snafu::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// File name of the index page.
pub const INDEX_FILE: &str = "index.html";

/// Errors that stop a site build.
#[derive(Debug, Snafu)]
pub enum SiteError {
    /// The output directory could not be created.
    #[snafu(display("failed to create output directory {}: {source}", path.display()))]
    CreateOutputDir {
        /// The directory that was being created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The index could not be serialized.
    #[snafu(display("failed to serialize the search index: {source}"))]
    SerializeIndex {
        /// The underlying serialization error.
        source: serde_json::Error,
    },

    /// The index page could not be written.
    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteIndex {
        /// The index file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Inputs for [`build_site`].
#[derive(Debug, Clone)]
pub struct SiteOptions {
    /// How pages are rendered.
    pub render: RenderOptions,
    /// Directory holding the export's asset files.
    pub archive_dir: PathBuf,
    /// Directory that receives the site.
    pub out_dir: PathBuf,
    /// Log what would be written without touching the file system.
    pub dry_run: bool,
}

/// What a build produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Conversation pages written (or that would be, in a dry run).
    pub pages: usize,
    /// Conversation pages that could not be written.
    pub failed: usize,
    /// Asset counters.
    pub assets: AssetStats,
}

/// Renders every conversation in `archive` and writes the site.
///
/// Pages are named after the conversation id. A page that cannot be
/// written is logged, left out of the index and counted in
/// [`BuildSummary::failed`]; the build carries on with the rest.
///
/// # Errors
///
/// Returns an error if the output directory cannot be created or the
/// index page cannot be produced.
pub fn build_site(archive: &Archive, opts: &SiteOptions) -> Result<BuildSummary, SiteError> {
    let out_dir = &opts.out_dir;
    if !opts.dry_run {
        fs::create_dir_all(out_dir).context(CreateOutputDirSnafu { path: out_dir })?;
    }

    let mut assets = AssetStore::scan(&opts.archive_dir, out_dir, opts.dry_run);
    let mut file_names = NameRegistry::default();
    file_names.reserve(INDEX_FILE);

    let mut entries = Vec::with_capacity(archive.conversations.len());
    let mut summary = BuildSummary::default();

    for conversation in &archive.conversations {
        let file_name = file_names.claim(&names::sanitize(&conversation.id), ".html");
        let path = out_dir.join(&file_name);
        let page = renderer::render_conversation(conversation, &opts.render, &mut assets);

        if opts.dry_run {
            info!(path = %path.display(), title = %conversation.title, "would write page");
        } else if let Err(error) = fs::write(&path, page) {
            error!(path = %path.display(), %error, "failed to write page; skipping");
            summary.failed += 1;
            continue;
        } else {
            debug!(path = %path.display(), messages = conversation.messages.len(), "wrote page");
        }

        summary.pages += 1;
        entries.push(IndexEntry::new(conversation, &file_name, &opts.render));
    }

    let index_html = index::render_index(&entries, &opts.render).context(SerializeIndexSnafu)?;
    let index_path = out_dir.join(INDEX_FILE);
    if opts.dry_run {
        info!(path = %index_path.display(), entries = entries.len(), "would write index");
    } else {
        fs::write(&index_path, index_html).context(WriteIndexSnafu { path: &index_path })?;
    }

    summary.assets = assets.stats();
    Ok(summary)
}

/// Whether `out_dir` already holds a generated site.
#[must_use]
pub fn has_existing_site(out_dir: &Path) -> bool {
    out_dir.join(INDEX_FILE).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Conversation, Message, Part, Role};
    use tempfile::TempDir;

    fn make_conversation(id: &str, title: &str) -> Conversation {
        Conversation {
            id: id.into(),
            title: title.into(),
            created: None,
            updated: None,
            messages: vec![Message {
                id: None,
                role: Role::User,
                recipient: None,
                timestamp: None,
                hidden: false,
                parts: vec![Part::Text(format!("About {title}"))],
                attachments: vec![],
            }],
        }
    }

    fn options(dir: &TempDir, dry_run: bool) -> SiteOptions {
        SiteOptions {
            render: RenderOptions::default(),
            archive_dir: dir.path().to_path_buf(),
            out_dir: dir.path().join("site"),
            dry_run,
        }
    }

    #[test]
    fn writes_page_per_conversation_and_index() {
        let dir = TempDir::new().unwrap();
        let archive = Archive {
            conversations: vec![
                make_conversation("a1", "First"),
                make_conversation("b2", "Second"),
            ],
        };

        let summary = build_site(&archive, &options(&dir, false)).unwrap();

        assert_eq!(summary.pages, 2);
        assert_eq!(summary.failed, 0);
        let site = dir.path().join("site");
        assert!(site.join("a1.html").is_file());
        assert!(site.join("b2.html").is_file());
        let index = fs::read_to_string(site.join(INDEX_FILE)).unwrap();
        assert!(index.contains("<a href=\"a1.html\">First</a>"));
        assert!(index.contains("<a href=\"b2.html\">Second</a>"));
        assert!(has_existing_site(&site));
    }

    #[test]
    fn keeps_page_names_unique() {
        let dir = TempDir::new().unwrap();
        let archive = Archive {
            conversations: vec![
                make_conversation("same", "One"),
                make_conversation("SAME", "Two"),
                make_conversation("index", "Three"),
                make_conversation("", "Four"),
            ],
        };

        build_site(&archive, &options(&dir, false)).unwrap();

        let site = dir.path().join("site");
        let index = fs::read_to_string(site.join(INDEX_FILE)).unwrap();
        assert!(index.contains("<a href=\"same.html\">One</a>"));
        assert!(index.contains("<a href=\"SAME__2.html\">Two</a>"));
        assert!(index.contains("<a href=\"index__2.html\">Three</a>"));
        assert!(index.contains("<a href=\"untitled.html\">Four</a>"));
        assert!(site.join("index__2.html").is_file());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let archive = Archive {
            conversations: vec![make_conversation("a1", "First")],
        };

        let summary = build_site(&archive, &options(&dir, true)).unwrap();

        assert_eq!(summary.pages, 1);
        assert!(!dir.path().join("site").exists());
    }

    #[test]
    fn skips_unwritable_pages() {
        let dir = TempDir::new().unwrap();
        let site = dir.path().join("site");
        // a directory where the page file should go makes the write fail
        fs::create_dir_all(site.join("bad.html")).unwrap();
        let archive = Archive {
            conversations: vec![
                make_conversation("bad", "Broken"),
                make_conversation("good", "Fine"),
            ],
        };

        let summary = build_site(&archive, &options(&dir, false)).unwrap();

        assert_eq!(summary.pages, 1);
        assert_eq!(summary.failed, 1);
        let index = fs::read_to_string(site.join(INDEX_FILE)).unwrap();
        assert!(index.contains("good.html"));
        assert!(!index.contains("Broken"));
    }

    #[test]
    fn fails_when_output_dir_cannot_be_created() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("site");
        fs::write(&blocker, "not a directory").unwrap();

        let result = build_site(&Archive::default(), &options(&dir, false));

        assert!(matches!(result, Err(SiteError::CreateOutputDir { .. })));
    }

    #[test]
    fn writes_index_for_empty_archive() {
        let dir = TempDir::new().unwrap();

        let summary = build_site(&Archive::default(), &options(&dir, false)).unwrap();

        assert_eq!(summary, BuildSummary::default());
        let index = fs::read_to_string(dir.path().join("site").join(INDEX_FILE)).unwrap();
        assert!(index.contains("No conversations found."));
    }
}
