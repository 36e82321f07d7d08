// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Convert ChatGPT conversation exports to a static HTML site.
//!
//! This crate provides parsing and rendering functionality for turning the
//! `conversations.json` file of a ChatGPT data export into browsable,
//! self-contained HTML pages with a searchable index.
//!
//! # Overview
//!
//! A data export is a JSON list of conversations, each a tree of message
//! nodes, plus the uploaded and generated files those messages refer to.
//! This crate:
//!
//! 1. Parses the JSON structure into typed Rust representations
//! 2. Renders each conversation's Markdown as an HTML page
//! 3. Copies referenced files next to the pages and writes an index
//!
//! # Example
//!
//! ```no_run
//! use chat2html::{parser, renderer, site};
//!
//! let json = std::fs::read_to_string("export/conversations.json").unwrap();
//! let archive = parser::parse_archive(&json).unwrap();
//!
//! let opts = site::SiteOptions {
//!     render: renderer::RenderOptions {
//!         show_timestamps: true,
//!         ..Default::default()
//!     },
//!     archive_dir: "export".into(),
//!     out_dir: "site_out".into(),
//!     dry_run: false,
//! };
//!
//! let summary = site::build_site(&archive, &opts).unwrap();
//! println!("wrote {} pages", summary.pages);
//! ```
//!
//! # Modules
//!
//! - [`parser`]: JSON parsing and type definitions for the export
//! - [`markdown`]: Markdown to HTML conversion for message text
//! - [`assets`]: lookup and copying of referenced files
//! - [`renderer`]: conversation pages with configurable output options
//! - [`index`]: the searchable index page
//! - [`site`]: writing a whole archive to an output directory

#![deny(missing_docs)]

pub mod assets;
mod html;
pub mod index;
pub mod markdown;
mod names;
pub mod parser;
pub mod renderer;
pub mod site;
