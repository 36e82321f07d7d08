// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! HTML rendering for parsed conversations.
//!
//! This module turns one [`Conversation`] into a complete, self-contained
//! HTML page. Styling and the small script that collapses long code
//! blocks are embedded in the page, so the output works when opened
//! straight from disk.
//!
//! # Output Format
//!
//! Each page contains:
//! - A link back to `index.html`, the conversation title and its date
//! - One block per visible message, labelled with the author's role
//! - A recipient badge for messages addressed to a tool
//! - Images in a grid, and uploaded files in an attachment list
//!
//! # Example
//!
//! ```
//! use chat2html::assets::AssetStore;
//! use chat2html::parser::{Conversation, Message, Part, Role};
//! use chat2html::renderer::{render_conversation, RenderOptions};
//! use std::path::Path;
//!
//! let conversation = Conversation {
//!     id: "c1".into(),
//!     title: "Greetings".into(),
//!     created: None,
//!     updated: None,
//!     messages: vec![Message {
//!         id: None,
//!         role: Role::User,
//!         recipient: None,
//!         timestamp: None,
//!         hidden: false,
//!         parts: vec![Part::Text("Hello *there*".into())],
//!         attachments: vec![],
//!     }],
//! };
//!
//! let mut assets = AssetStore::scan(Path::new("export"), Path::new("site_out"), true);
//! let html = render_conversation(&conversation, &RenderOptions::default(), &mut assets);
//!
//! assert!(html.contains("<title>Greetings</title>"));
//! assert!(html.contains("<em>there</em>"));
//! ```

use crate::assets::{AssetResolver, Resolved};
use crate::html;
use crate::markdown;
use crate::parser::{AssetRef, Conversation, Message, Part, Role};
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::Write;

pub(crate) const STYLE: &str = include_str!("templates/style.css");
pub(crate) const GENERATOR: &str =
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

const PAGE_TEMPLATE: &str = include_str!("templates/page.html");
const PAGE_SCRIPT: &str = include_str!("templates/page.js");

/// Default title of the index page.
pub const DEFAULT_SITE_TITLE: &str = "Conversations";

/// Configuration options for HTML rendering.
///
/// Controls the labels used for each role and which optional content is
/// included in the rendered pages.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct RenderOptions {
    /// Label shown on user messages.
    pub user_name: String,

    /// Label shown on assistant messages.
    pub assistant_name: String,

    /// Title of the index page.
    pub site_title: String,

    /// Whether to include system and developer messages, messages the
    /// export marks as hidden, and the user's custom instructions.
    pub show_system: bool,

    /// Whether to include tool output and assistant messages addressed to
    /// a tool (code sent to `python`, browsing commands and so on).
    pub show_tools: bool,

    /// Whether to include reasoning steps.
    ///
    /// They are rendered collapsed, so this defaults to on.
    pub show_thoughts: bool,

    /// Whether to show when each message was written.
    pub show_timestamps: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            user_name: "User".into(),
            assistant_name: "Assistant".into(),
            site_title: DEFAULT_SITE_TITLE.into(),
            show_system: false,
            show_tools: false,
            show_thoughts: true,
            show_timestamps: false,
        }
    }
}

impl RenderOptions {
    /// The label shown above a message from `role`.
    #[must_use]
    pub fn role_label<'a>(&'a self, role: &'a Role) -> Cow<'a, str> {
        match role {
            Role::User => Cow::Borrowed(&self.user_name),
            Role::Assistant => Cow::Borrowed(&self.assistant_name),
            Role::System => Cow::Borrowed("System"),
            Role::Tool => Cow::Borrowed("Tool"),
            Role::Developer => Cow::Borrowed("Developer"),
            Role::Unknown => Cow::Borrowed("Message"),
            Role::Other(name) => Cow::Owned(capitalize(name)),
        }
    }

    /// Whether a single part is rendered.
    #[must_use]
    pub const fn shows_part(&self, part: &Part) -> bool {
        match part {
            Part::Thought { .. } => self.show_thoughts,
            Part::UserContext { .. } => self.show_system,
            _ => true,
        }
    }

    /// Whether `message` appears on the page at all.
    #[must_use]
    pub fn is_visible(&self, message: &Message) -> bool {
        if message.hidden && !self.show_system {
            return false;
        }
        let role_shown = match message.role {
            Role::System | Role::Developer => self.show_system,
            Role::Tool => self.show_tools,
            Role::Assistant if message.recipient.is_some() => self.show_tools,
            _ => true,
        };
        role_shown
            && (!message.attachments.is_empty()
                || message.parts.iter().any(|part| self.shows_part(part)))
    }
}

/// Formats a timestamp the way pages and the index show it.
#[must_use]
pub fn format_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%B %-d, %Y %-I:%M %p UTC").to_string()
}

/// Renders a conversation as a complete HTML page.
///
/// Asset references are resolved through `assets`; missing ones become
/// placeholder links.
pub fn render_conversation(
    conversation: &Conversation,
    opts: &RenderOptions,
    assets: &mut dyn AssetResolver,
) -> String {
    let mut body = String::new();
    for message in conversation.messages.iter().filter(|m| opts.is_visible(m)) {
        render_message(&mut body, message, opts, assets);
    }
    if body.is_empty() {
        body.push_str("<p class=\"empty\">This conversation has no visible messages.</p>\n");
    }

    let title = html::escape(&conversation.title);
    let date = conversation
        .timestamp()
        .map(format_date)
        .unwrap_or_default();

    html::fill(
        PAGE_TEMPLATE,
        &[
            ("generator", GENERATOR),
            ("title", &title),
            ("date", &date),
            ("css", STYLE),
            ("body", &body),
            ("script", PAGE_SCRIPT),
        ],
    )
}

fn render_message(
    out: &mut String,
    message: &Message,
    opts: &RenderOptions,
    assets: &mut dyn AssetResolver,
) {
    write!(out, "<div class=\"message message--{}", css_ident(message.role.as_str())).unwrap();
    if let Some(recipient) = &message.recipient {
        write!(out, " message--r-{}", css_ident(recipient)).unwrap();
    }
    out.push_str("\">\n<div class=\"role\">");
    out.push_str(&html::escape(&opts.role_label(&message.role)));
    if let Some(recipient) = &message.recipient {
        write!(out, "<span class=\"badge\">{}</span>", html::escape(recipient)).unwrap();
    }
    if opts.show_timestamps
        && let Some(timestamp) = message.timestamp
    {
        write!(out, "<span class=\"msg-time\">{}</span>", format_date(timestamp)).unwrap();
    }
    out.push_str("</div>\n<div class=\"msg-body\">\n");

    let mut files = Vec::new();
    let mut shown_images = HashSet::new();
    let mut in_grid = false;

    for part in message.parts.iter().filter(|p| opts.shows_part(p)) {
        let is_image = matches!(part, Part::Image(_));
        if is_image && !in_grid {
            out.push_str("<div class=\"image-grid\">\n");
            in_grid = true;
        } else if !is_image && in_grid {
            out.push_str("</div>\n");
            in_grid = false;
        }

        match part {
            Part::Text(text) => out.push_str(&markdown::render_markdown(text, assets)),
            Part::Code { language, text } => {
                out.push_str(&markdown::code_block(language.as_deref(), text));
            }
            Part::Thought { summary, content } => {
                let summary = if summary.trim().is_empty() {
                    "Thinking"
                } else {
                    summary.as_str()
                };
                write!(
                    out,
                    "<details class=\"thought\"><summary>{}</summary>\n{}</details>\n",
                    html::escape(summary),
                    markdown::render_markdown(content, assets)
                )
                .unwrap();
            }
            Part::Image(asset) => {
                shown_images.insert(asset.file_id.as_str());
                out.push_str(&image_html(asset, assets));
            }
            Part::Upload { name, text } => {
                files.push(file_link(&assets.store_text(name, text), name));
            }
            Part::UserContext {
                profile,
                instructions,
            } => render_user_context(out, profile.as_deref(), instructions.as_deref(), assets),
            Part::Other { content_type, text } => {
                write!(
                    out,
                    "<div class=\"unrecognized\" data-content-type=\"{}\"><pre>{}</pre></div>\n",
                    html::escape(content_type),
                    html::escape(text)
                )
                .unwrap();
            }
        }
    }
    if in_grid {
        out.push_str("</div>\n");
    }
    out.push_str("</div>\n");

    for attachment in &message.attachments {
        if !shown_images.contains(attachment.file_id.as_str()) {
            files.push(file_link(&assets.resolve(attachment), attachment.label()));
        }
    }
    if !files.is_empty() {
        out.push_str("<div class=\"attachments\">Attachments\n<ul>\n");
        for file in &files {
            writeln!(out, "<li>{file}</li>").unwrap();
        }
        out.push_str("</ul>\n</div>\n");
    }

    out.push_str("</div>\n");
}

fn render_user_context(
    out: &mut String,
    profile: Option<&str>,
    instructions: Option<&str>,
    assets: &mut dyn AssetResolver,
) {
    out.push_str("<details class=\"user-context\"><summary>Custom instructions</summary>\n");
    if let Some(profile) = profile {
        out.push_str("<h4>About the user</h4>\n");
        out.push_str(&markdown::render_markdown(profile, assets));
    }
    if let Some(instructions) = instructions {
        out.push_str("<h4>Response preferences</h4>\n");
        out.push_str(&markdown::render_markdown(instructions, assets));
    }
    out.push_str("</details>\n");
}

fn image_html(asset: &AssetRef, assets: &mut dyn AssetResolver) -> String {
    match assets.resolve(asset) {
        Resolved::Linked { href } => {
            let href = html::escape(&href);
            format!(
                "<a href=\"{href}\" target=\"_blank\"><img src=\"{href}\" alt=\"{}\" loading=\"lazy\"></a>\n",
                html::escape(asset.label())
            )
        }
        Resolved::Missing { reference } => format!("{}\n", html::missing_asset(&reference)),
    }
}

fn file_link(resolved: &Resolved, label: &str) -> String {
    match resolved {
        Resolved::Linked { href } => format!(
            "<a href=\"{}\" target=\"_blank\">{}</a>",
            html::escape(href),
            html::escape(label)
        ),
        Resolved::Missing { reference } => html::missing_asset(reference),
    }
}

/// Reduces a role or recipient name to a CSS class suffix
/// (`web.run` becomes `web-run`).
fn css_ident(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
