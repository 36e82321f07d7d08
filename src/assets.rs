// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Lookup and placement of files referenced by messages.
//!
//! An export ships uploaded images and files next to `conversations.json`,
//! either at the top level or inside `user-*` and `dalle-generations`
//! folders, named after their file id. [`AssetStore`] indexes that
//! directory once, and copies every file a page refers to into the
//! `assets/` folder of the generated site.
//!
//! Rendering code only sees the [`AssetResolver`] trait, so it never
//! touches the file system directly.

use crate::names::{self, NameRegistry};
use crate::parser::AssetRef;
use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Folder inside the output directory that receives copied assets.
pub const ASSET_DIR: &str = "assets";

/// How deep to look for files below the archive directory.
const SCAN_DEPTH: usize = 4;

/// Outcome of resolving an asset reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The asset is available at `href`, relative to the page.
    Linked {
        /// Relative URL of the placed file.
        href: String,
    },
    /// The asset could not be found or copied.
    Missing {
        /// What to show in the placeholder.
        reference: String,
    },
}

/// Turns asset references into links usable from a generated page.
pub trait AssetResolver {
    /// Resolves a file-id based reference from the export.
    fn resolve(&mut self, asset: &AssetRef) -> Resolved;

    /// Resolves a local link target found in Markdown text, such as
    /// `chart.png` or `sandbox:/mnt/data/chart.png`.
    fn resolve_link(&mut self, target: &str) -> Resolved;

    /// Stores an uploaded text file and links to it.
    fn store_text(&mut self, name: &str, contents: &str) -> Resolved;
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetStats {
    /// Files copied from the archive directory.
    pub copied: usize,
    /// Uploaded text files written out.
    pub written: usize,
    /// Distinct references that ended up as placeholders.
    pub missing: usize,
}

/// Where a file sits inside the archive directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Root,
    Uploads,
    Generated,
    Elsewhere,
}

impl Location {
    fn of(path: &Path) -> Self {
        let mut components = path.components();
        let first = components.next();
        if components.next().is_none() {
            return Self::Root;
        }
        match first.and_then(|c| c.as_os_str().to_str()) {
            Some(dir) if dir.starts_with("dalle-generations") => Self::Generated,
            Some(dir) if dir.starts_with("user-") => Self::Uploads,
            _ => Self::Elsewhere,
        }
    }

    /// Lower is preferred.
    const fn rank(self, generated: bool) -> u8 {
        match (self, generated) {
            (Self::Generated, true) | (Self::Root, false) => 0,
            (Self::Uploads, _) => 1,
            (Self::Root, true) | (Self::Generated, false) => 2,
            (Self::Elsewhere, _) => 3,
        }
    }
}

/// File-system backed [`AssetResolver`].
#[derive(Debug)]
pub struct AssetStore {
    archive_dir: PathBuf,
    target_dir: PathBuf,
    dry_run: bool,
    /// Files below `archive_dir`, relative to it, sorted.
    files: Vec<PathBuf>,
    placed: HashMap<PathBuf, String>,
    uploads: HashMap<(String, String), String>,
    names: NameRegistry,
    warned: HashSet<String>,
    target_ready: bool,
    stats: AssetStats,
}

impl AssetStore {
    /// Indexes `archive_dir` and prepares to copy into `out_dir/assets`.
    ///
    /// The output directory is skipped while indexing, so an output folder
    /// inside the archive directory is never picked up as a source. With
    /// `dry_run` nothing is copied or written, but references are still
    /// resolved and counted.
    #[must_use]
    pub fn scan(archive_dir: &Path, out_dir: &Path, dry_run: bool) -> Self {
        let mut store = Self {
            archive_dir: archive_dir.to_path_buf(),
            target_dir: out_dir.join(ASSET_DIR),
            dry_run,
            files: Vec::new(),
            placed: HashMap::new(),
            uploads: HashMap::new(),
            names: NameRegistry::default(),
            warned: HashSet::new(),
            target_ready: false,
            stats: AssetStats::default(),
        };

        if !archive_dir.is_dir() {
            warn!(
                dir = %archive_dir.display(),
                "archive directory not found; asset references will be placeholders"
            );
            return store;
        }

        let skip = out_dir.canonicalize().ok();
        let mut files: Vec<PathBuf> = WalkDir::new(archive_dir)
            .max_depth(SCAN_DEPTH)
            .into_iter()
            .filter_entry(|entry| {
                // depth 0 is the archive directory itself, which may also be the output
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || skip.is_none()
                    || entry.path().canonicalize().ok() != skip
            })
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(archive_dir)
                    .ok()
                    .map(Path::to_path_buf)
            })
            .collect();
        files.sort();

        debug!(count = files.len(), dir = %archive_dir.display(), "indexed archive files");
        store.files = files;
        store
    }

    /// Counters for everything resolved so far.
    #[must_use]
    pub const fn stats(&self) -> AssetStats {
        self.stats
    }

    /// Finds the best file for a file-id reference.
    fn find_by_id(&self, asset: &AssetRef) -> Option<PathBuf> {
        self.files
            .iter()
            .filter(|path| {
                path.file_name()
                    .and_then(OsStr::to_str)
                    .is_some_and(|name| name.starts_with(&asset.file_id))
            })
            .min_by_key(|path| Location::of(path).rank(asset.generated))
            .cloned()
    }

    /// Finds a file for a link target: the exact relative path if it lies
    /// inside the archive directory, else any file with the same name.
    fn find_by_link(&self, target: &str) -> Option<PathBuf> {
        let path = Path::new(target.trim_start_matches('/'));
        let contained = path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        if contained {
            let normalized: PathBuf = path
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect();
            if self.files.binary_search(&normalized).is_ok() {
                return Some(normalized);
            }
        }

        let name = path.file_name()?;
        self.files
            .iter()
            .find(|candidate| candidate.file_name() == Some(name))
            .cloned()
    }

    /// Copies `source` into the asset folder once and returns its link.
    fn place(&mut self, source: &Path, reference: &str) -> Resolved {
        if let Some(href) = self.placed.get(source) {
            return Resolved::Linked { href: href.clone() };
        }

        let raw_name = source
            .file_name()
            .map_or_else(|| "asset".into(), OsStr::to_string_lossy);
        let file_name = self.claim(&raw_name);

        if !self.dry_run {
            let from = self.archive_dir.join(source);
            let to = self.target_dir.join(&file_name);
            if let Err(error) = self.ensure_target().and_then(|()| copy_if_new(&from, &to)) {
                return self.failed(reference, &error);
            }
        }

        debug!(asset = reference, file = %file_name, "placed asset");
        self.stats.copied += 1;
        let href = format!("{ASSET_DIR}/{file_name}");
        self.placed.insert(source.to_path_buf(), href.clone());
        Resolved::Linked { href }
    }

    fn claim(&mut self, raw_name: &str) -> String {
        let sanitized = names::sanitize(raw_name);
        let (stem, extension) = names::split_extension(&sanitized);
        self.names.claim(stem, extension)
    }

    fn ensure_target(&mut self) -> io::Result<()> {
        if !self.target_ready {
            fs::create_dir_all(&self.target_dir)?;
            self.target_ready = true;
        }
        Ok(())
    }

    fn missing(&mut self, reference: &str) -> Resolved {
        if self.warned.insert(reference.to_owned()) {
            warn!(asset = reference, "referenced asset not found; using placeholder");
            self.stats.missing += 1;
        }
        Resolved::Missing {
            reference: reference.to_owned(),
        }
    }

    fn failed(&mut self, reference: &str, error: &io::Error) -> Resolved {
        if self.warned.insert(reference.to_owned()) {
            warn!(asset = reference, %error, "failed to copy asset; using placeholder");
            self.stats.missing += 1;
        }
        Resolved::Missing {
            reference: reference.to_owned(),
        }
    }
}

impl AssetResolver for AssetStore {
    fn resolve(&mut self, asset: &AssetRef) -> Resolved {
        match self.find_by_id(asset) {
            Some(source) => self.place(&source, asset.label()),
            None => self.missing(asset.label()),
        }
    }

    fn resolve_link(&mut self, target: &str) -> Resolved {
        let target = target.strip_prefix("sandbox:").unwrap_or(target);
        match self.find_by_link(target) {
            Some(source) => self.place(&source, target),
            None => self.missing(target),
        }
    }

    fn store_text(&mut self, name: &str, contents: &str) -> Resolved {
        let key = (name.to_owned(), contents.to_owned());
        if let Some(href) = self.uploads.get(&key) {
            return Resolved::Linked { href: href.clone() };
        }

        let file_name = self.claim(name);
        if !self.dry_run {
            let to = self.target_dir.join(&file_name);
            if let Err(error) = self.ensure_target().and_then(|()| fs::write(&to, contents)) {
                return self.failed(name, &error);
            }
        }

        self.stats.written += 1;
        let href = format!("{ASSET_DIR}/{file_name}");
        self.uploads.insert(key, href.clone());
        Resolved::Linked { href }
    }
}

/// Copies `from` to `to` unless `to` already exists.
fn copy_if_new(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        return Ok(());
    }
    fs::copy(from, to).map(|_| ())
}

/// In-memory resolver for rendering tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::{AssetResolver, Resolved};
    use crate::parser::AssetRef;

    /// Knows a fixed set of file ids and file names.
    #[derive(Debug, Default)]
    pub struct StubAssets {
        pub known: Vec<&'static str>,
        pub stored: Vec<String>,
    }

    impl StubAssets {
        pub fn with(known: &[&'static str]) -> Self {
            Self {
                known: known.to_vec(),
                stored: Vec::new(),
            }
        }
    }

    impl AssetResolver for StubAssets {
        fn resolve(&mut self, asset: &AssetRef) -> Resolved {
            if self.known.contains(&asset.file_id.as_str()) {
                Resolved::Linked {
                    href: format!("assets/{}.png", asset.file_id),
                }
            } else {
                Resolved::Missing {
                    reference: asset.label().to_owned(),
                }
            }
        }

        fn resolve_link(&mut self, target: &str) -> Resolved {
            let name = target.rsplit('/').next().unwrap_or(target);
            if self.known.contains(&name) {
                Resolved::Linked {
                    href: format!("assets/{name}"),
                }
            } else {
                Resolved::Missing {
                    reference: target.to_owned(),
                }
            }
        }

        fn store_text(&mut self, name: &str, _contents: &str) -> Resolved {
            self.stored.push(name.to_owned());
            Resolved::Linked {
                href: format!("assets/{name}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn archive_with(files: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, format!("contents of {file}")).unwrap();
        }
        dir
    }

    fn pointer(id: &str, generated: bool) -> AssetRef {
        let mut asset = AssetRef::from_pointer(&format!("file-service://{id}")).unwrap();
        asset.generated = generated;
        asset
    }

    #[test]
    fn copies_asset_found_by_file_id() {
        let archive = archive_with(&["file-abc123-photo.png", "conversations.json"]);
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(archive.path(), out.path(), false);

        let resolved = store.resolve(&pointer("file-abc123", false));

        assert_eq!(
            resolved,
            Resolved::Linked {
                href: "assets/file-abc123-photo.png".into()
            }
        );
        assert!(out.path().join("assets/file-abc123-photo.png").is_file());
        assert_eq!(store.stats().copied, 1);
    }

    #[test]
    fn copies_each_source_once() {
        let archive = archive_with(&["file-abc.png"]);
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(archive.path(), out.path(), false);

        let first = store.resolve(&pointer("file-abc", false));
        let second = store.resolve(&pointer("file-abc", false));

        assert_eq!(first, second);
        assert_eq!(store.stats().copied, 1);
    }

    #[test]
    fn prefers_generation_folder_for_generated_images() {
        let archive = archive_with(&[
            "file-gen.webp",
            "dalle-generations/file-gen-1.webp",
            "user-xyz/file-gen-2.webp",
        ]);
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(archive.path(), out.path(), true);

        assert_eq!(
            store.resolve(&pointer("file-gen", true)),
            Resolved::Linked {
                href: "assets/file-gen-1.webp".into()
            }
        );
    }

    #[test]
    fn prefers_top_level_for_uploads() {
        let archive = archive_with(&["dalle-generations/file-up-a.png", "file-up-b.png"]);
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(archive.path(), out.path(), true);

        assert_eq!(
            store.resolve(&pointer("file-up", false)),
            Resolved::Linked {
                href: "assets/file-up-b.png".into()
            }
        );
    }

    #[test]
    fn reports_missing_asset() {
        let archive = archive_with(&["unrelated.png"]);
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(archive.path(), out.path(), false);

        let resolved = store.resolve(&pointer("file-gone", false));
        store.resolve(&pointer("file-gone", false));

        assert_eq!(
            resolved,
            Resolved::Missing {
                reference: "file-service://file-gone".into()
            }
        );
        assert_eq!(store.stats().missing, 1);
        assert!(!out.path().join(ASSET_DIR).exists());
    }

    #[test]
    fn uses_attachment_name_in_placeholder() {
        let archive = archive_with(&[]);
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(archive.path(), out.path(), false);
        let mut asset = pointer("file-x", false);
        asset.name = Some("report.pdf".into());

        assert_eq!(
            store.resolve(&asset),
            Resolved::Missing {
                reference: "report.pdf".into()
            }
        );
    }

    #[test]
    fn renames_colliding_file_names() {
        let archive = archive_with(&["user-a/chart.png", "user-b/chart.png"]);
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(archive.path(), out.path(), false);

        let first = store.resolve_link("user-a/chart.png");
        let second = store.resolve_link("user-b/chart.png");

        assert_eq!(first, Resolved::Linked { href: "assets/chart.png".into() });
        assert_eq!(second, Resolved::Linked { href: "assets/chart__2.png".into() });
        assert_eq!(
            fs::read_to_string(out.path().join("assets/chart__2.png")).unwrap(),
            "contents of user-b/chart.png"
        );
    }

    #[test]
    fn resolves_links_by_file_name() {
        let archive = archive_with(&["user-a/plot.png"]);
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(archive.path(), out.path(), true);

        assert_eq!(
            store.resolve_link("sandbox:/mnt/data/plot.png"),
            Resolved::Linked { href: "assets/plot.png".into() }
        );
    }

    #[test]
    fn does_not_follow_parent_components() {
        let outer = tempfile::tempdir().unwrap();
        fs::write(outer.path().join("secret.txt"), "x").unwrap();
        let archive = outer.path().join("archive");
        fs::create_dir(&archive).unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(&archive, out.path(), false);

        assert!(matches!(
            store.resolve_link("../secret.txt"),
            Resolved::Missing { .. }
        ));
    }

    #[test]
    fn skips_output_directory_inside_archive() {
        let archive = archive_with(&["site/assets/file-old.png"]);
        let out = archive.path().join("site");
        let mut store = AssetStore::scan(archive.path(), &out, true);

        assert!(matches!(
            store.resolve(&pointer("file-old", false)),
            Resolved::Missing { .. }
        ));
    }

    #[test]
    fn indexes_archive_used_as_output_directory() {
        let archive = archive_with(&["file-abc-photo.png"]);
        let mut store = AssetStore::scan(archive.path(), archive.path(), false);

        let resolved = store.resolve(&pointer("file-abc", false));

        assert_eq!(
            resolved,
            Resolved::Linked { href: "assets/file-abc-photo.png".into() }
        );
        assert_eq!(store.stats().missing, 0);
        assert!(archive.path().join("assets/file-abc-photo.png").is_file());
    }

    #[test]
    fn writes_uploaded_text() {
        let archive = archive_with(&[]);
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(archive.path(), out.path(), false);

        let first = store.store_text("notes.txt", "hello");
        let again = store.store_text("notes.txt", "hello");
        let other = store.store_text("notes.txt", "changed");

        assert_eq!(first, Resolved::Linked { href: "assets/notes.txt".into() });
        assert_eq!(first, again);
        assert_eq!(other, Resolved::Linked { href: "assets/notes__2.txt".into() });
        assert_eq!(
            fs::read_to_string(out.path().join("assets/notes.txt")).unwrap(),
            "hello"
        );
        assert_eq!(store.stats().written, 2);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let archive = archive_with(&["file-abc.png"]);
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(archive.path(), out.path(), true);

        assert!(matches!(
            store.resolve(&pointer("file-abc", false)),
            Resolved::Linked { .. }
        ));
        store.store_text("a.txt", "x");

        assert!(!out.path().join(ASSET_DIR).exists());
    }

    #[test]
    fn tolerates_missing_archive_directory() {
        let out = tempfile::tempdir().unwrap();
        let mut store = AssetStore::scan(&out.path().join("nope"), out.path(), false);

        assert!(matches!(
            store.resolve(&pointer("file-abc", false)),
            Resolved::Missing { .. }
        ));
    }
}
