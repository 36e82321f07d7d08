// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Markdown to HTML conversion for message bodies.
//!
//! Message text is CommonMark with a few common extensions (tables,
//! strikethrough, task lists). The conversion differs from a plain
//! [`pulldown_cmark::html::push_html`] in three ways:
//!
//! - Raw HTML inside a message is shown as literal text, never injected.
//! - Fenced code blocks carry their language as a `data-lang` attribute
//!   and a `language-*` class for styling.
//! - Links and images that point at local files go through an
//!   [`AssetResolver`], so they end up pointing at the copied asset, or at
//!   a placeholder when the file is missing.
//!
//! # Example
//!
//! ```
//! use chat2html::assets::{AssetResolver, Resolved};
//! use chat2html::markdown::render_markdown;
//! use chat2html::parser::AssetRef;
//!
//! struct NoAssets;
//!
//! impl AssetResolver for NoAssets {
//!     fn resolve(&mut self, asset: &AssetRef) -> Resolved {
//!         Resolved::Missing { reference: asset.pointer.clone() }
//!     }
//!     fn resolve_link(&mut self, target: &str) -> Resolved {
//!         Resolved::Missing { reference: target.to_owned() }
//!     }
//!     fn store_text(&mut self, name: &str, _contents: &str) -> Resolved {
//!         Resolved::Missing { reference: name.to_owned() }
//!     }
//! }
//!
//! let html = render_markdown("# Title\n\n```py\nprint(1)\n```", &mut NoAssets);
//! assert!(html.contains("<h1>Title</h1>"));
//! assert!(html.contains("<code class=\"language-py\">print(1)"));
//! ```

use crate::assets::{AssetResolver, Resolved};
use crate::html;
use percent_encoding::percent_decode_str;
use pulldown_cmark::{CodeBlockKind, Event, LinkType, Options, Parser, Tag, TagEnd};
use std::borrow::Cow;

/// Where a link or image points.
#[derive(Debug, PartialEq, Eq)]
enum LinkTarget<'a> {
    /// Anything with a URL scheme, a fragment or a network path.
    External,
    /// A script URL that must not be emitted.
    Unsafe,
    /// A path to a file that may ship with the export.
    Local(&'a str),
}

fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// Renders Markdown `text` as an HTML fragment.
///
/// Never fails: syntax that is not recognized is emitted as escaped text.
pub fn render_markdown(text: &str, assets: &mut dyn AssetResolver) -> String {
    let mut parser = Parser::new_ext(text, options());
    let mut events = Vec::new();
    // One entry per open link: true when its opening tag was emitted as raw HTML
    let mut rewritten_links: Vec<bool> = Vec::new();

    while let Some(event) = parser.next() {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let language = match &kind {
                    CodeBlockKind::Fenced(info) => info.split_whitespace().next(),
                    CodeBlockKind::Indented => None,
                };
                events.push(Event::Html(code_block_open(language).into()));
            }
            Event::End(TagEnd::CodeBlock) => events.push(Event::Html("</code></pre>\n".into())),
            Event::Start(Tag::HtmlBlock) => {
                events.push(Event::Html("<pre class=\"raw-html\">".into()));
            }
            Event::End(TagEnd::HtmlBlock) => events.push(Event::Html("</pre>\n".into())),
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            Event::Start(Tag::Image {
                dest_url, title, ..
            }) => {
                let alt = collect_alt_text(&mut parser);
                events.push(Event::Html(image_html(&dest_url, &title, &alt, assets).into()));
            }
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => match link_target_of(link_type, &dest_url) {
                LinkTarget::External => {
                    rewritten_links.push(false);
                    events.push(Event::Start(Tag::Link {
                        link_type,
                        dest_url: dest_url.clone(),
                        title,
                        id,
                    }));
                }
                LinkTarget::Unsafe => {
                    rewritten_links.push(true);
                    let open = format!("<a href=\"#\"{}>", title_attr(&title));
                    events.push(Event::Html(open.into()));
                }
                LinkTarget::Local(target) => {
                    rewritten_links.push(true);
                    let open = match assets.resolve_link(&decode_path(target)) {
                        Resolved::Linked { href } => {
                            format!("<a href=\"{}\"{}>", html::escape(&href), title_attr(&title))
                        }
                        Resolved::Missing { reference } => html::missing_asset_open(&reference),
                    };
                    events.push(Event::Html(open.into()));
                }
            },
            Event::End(TagEnd::Link) => {
                if rewritten_links.pop().unwrap_or(false) {
                    events.push(Event::Html("</a>".into()));
                } else {
                    events.push(Event::End(TagEnd::Link));
                }
            }
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(text.len() + text.len() / 2);
    pulldown_cmark::html::push_html(&mut out, events.into_iter());
    out
}

/// Renders a code block with the same markup as fenced Markdown code.
pub fn code_block(language: Option<&str>, code: &str) -> String {
    let mut out = code_block_open(language);
    out.push_str(&html::escape(code));
    if !code.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</code></pre>\n");
    out
}

/// Strips Markdown down to its visible text, with blocks separated by
/// spaces.
pub fn plain_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for event in Parser::new_ext(text, options()) {
        match event {
            Event::Text(t) | Event::Code(t) | Event::Html(t) | Event::InlineHtml(t) => {
                out.push_str(&t);
            }
            Event::SoftBreak
            | Event::HardBreak
            | Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::TableCell,
            ) => out.push(' '),
            _ => {}
        }
    }
    out
}

fn code_block_open(language: Option<&str>) -> String {
    match language.map(sanitize_language).filter(|l| !l.is_empty()) {
        Some(lang) => format!(
            "<pre class=\"code-block\" data-lang=\"{lang}\"><code class=\"language-{lang}\">"
        ),
        None => "<pre class=\"code-block\"><code>".to_owned(),
    }
}

fn sanitize_language(language: &str) -> String {
    language
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#' | '.'))
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Consumes the events inside an image and returns them as alt text.
fn collect_alt_text(parser: &mut Parser<'_>) -> String {
    let mut alt = String::new();
    let mut depth = 0usize;
    for event in parser.by_ref() {
        match event {
            Event::Start(Tag::Image { .. }) => depth += 1,
            Event::End(TagEnd::Image) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Text(t) | Event::Code(t) => alt.push_str(&t),
            Event::SoftBreak | Event::HardBreak => alt.push(' '),
            _ => {}
        }
    }
    alt
}

fn image_html(dest: &str, title: &str, alt: &str, assets: &mut dyn AssetResolver) -> String {
    let src = match link_target(dest) {
        LinkTarget::External => dest.to_owned(),
        LinkTarget::Unsafe => return html::missing_asset(if alt.is_empty() { dest } else { alt }),
        LinkTarget::Local(target) => match assets.resolve_link(&decode_path(target)) {
            Resolved::Linked { href } => href,
            Resolved::Missing { reference } => return html::missing_asset(&reference),
        },
    };
    format!(
        "<img src=\"{}\" alt=\"{}\"{} loading=\"lazy\">",
        html::escape(&src),
        html::escape(alt),
        title_attr(title)
    )
}

fn title_attr(title: &str) -> String {
    if title.is_empty() {
        String::new()
    } else {
        format!(" title=\"{}\"", html::escape(title))
    }
}

/// Email autolinks carry a bare address; the HTML writer adds `mailto:`.
fn link_target_of(link_type: LinkType, dest: &str) -> LinkTarget<'_> {
    if link_type == LinkType::Email {
        LinkTarget::External
    } else {
        link_target(dest)
    }
}

/// Undoes `%20`-style escapes so the target matches names on disk.
fn decode_path(target: &str) -> Cow<'_, str> {
    percent_decode_str(target).decode_utf8_lossy()
}

fn link_target(dest: &str) -> LinkTarget<'_> {
    let dest = dest.trim();
    if dest.is_empty() || dest.starts_with('#') || dest.starts_with("//") {
        return LinkTarget::External;
    }
    if let Some(path) = dest.strip_prefix("sandbox:") {
        return LinkTarget::Local(path);
    }
    match dest.split_once(':') {
        Some((scheme, _)) if is_scheme(scheme) => {
            if scheme.eq_ignore_ascii_case("javascript") || scheme.eq_ignore_ascii_case("vbscript")
            {
                LinkTarget::Unsafe
            } else {
                LinkTarget::External
            }
        }
        _ => LinkTarget::Local(dest),
    }
}

/// A URL scheme per RFC 3986, at least two characters long so Windows
/// drive letters stay local paths.
fn is_scheme(s: &str) -> bool {
    s.len() > 1
        && s.starts_with(|c: char| c.is_ascii_alphabetic())
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
