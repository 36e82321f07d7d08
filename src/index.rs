// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! The searchable index page.
//!
//! The index lists every rendered conversation as a card and embeds the
//! same data as JSON, which a small script uses to filter the cards as
//! the user types. Everything happens in the browser, so the site can be
//! served as plain files or opened from disk.

use crate::html;
use crate::markdown;
use crate::parser::{Conversation, Part, Role};
use crate::renderer::{self, GENERATOR, RenderOptions, STYLE};
use serde::Serialize;
use std::fmt::Write;

const INDEX_TEMPLATE: &str = include_str!("templates/index.html");
const INDEX_SCRIPT: &str = include_str!("templates/index.js");

const SNIPPET_LEN: usize = 160;

/// One conversation as listed on the index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    /// Conversation title.
    pub title: String,
    /// Page file name, relative to the index.
    pub href: String,
    /// Formatted conversation date, empty when unknown.
    pub date: String,
    /// Start of the first visible user message, as plain text.
    pub snippet: String,
    /// Number of visible messages.
    pub messages: usize,
}

impl IndexEntry {
    /// Summarizes `conversation`, whose page was written to `href`.
    #[must_use]
    pub fn new(conversation: &Conversation, href: &str, opts: &RenderOptions) -> Self {
        let visible: Vec<_> = conversation
            .messages
            .iter()
            .filter(|m| opts.is_visible(m))
            .collect();

        let snippet = visible
            .iter()
            .filter(|m| m.role == Role::User)
            .flat_map(|m| &m.parts)
            .find_map(|part| match part {
                Part::Text(text) if !text.trim().is_empty() => Some(snippet(text)),
                _ => None,
            })
            .unwrap_or_default();

        Self {
            title: conversation.title.clone(),
            href: href.to_owned(),
            date: conversation
                .timestamp()
                .map(renderer::format_date)
                .unwrap_or_default(),
            snippet,
            messages: visible.len(),
        }
    }
}

/// Collapses the plain text of a Markdown message to a short single line.
fn snippet(text: &str) -> String {
    let plain = markdown::plain_text(text);
    let mut words = plain.split_whitespace();
    let mut out = String::new();
    if let Some(first) = words.next() {
        out.push_str(first);
    }
    for word in words {
        out.push(' ');
        out.push_str(word);
    }

    if out.chars().count() > SNIPPET_LEN {
        out = out.chars().take(SNIPPET_LEN).collect();
        out.truncate(out.trim_end().len());
        out.push('…');
    }
    out
}

/// Renders the index page for `entries`, in the given order.
///
/// # Errors
///
/// Returns an error if the entries cannot be serialized as JSON.
pub fn render_index(
    entries: &[IndexEntry],
    opts: &RenderOptions,
) -> Result<String, serde_json::Error> {
    let mut items = String::new();
    for entry in entries {
        let href = html::escape(&entry.href);
        let date = if entry.date.is_empty() {
            String::new()
        } else {
            format!("{} · ", html::escape(&entry.date))
        };
        let plural = if entry.messages == 1 { "" } else { "s" };

        writeln!(items, "<div class=\"card\" data-href=\"{href}\">").unwrap();
        writeln!(
            items,
            "<h3><a href=\"{href}\">{}</a></h3>",
            html::escape(&entry.title)
        )
        .unwrap();
        writeln!(
            items,
            "<div class=\"small\">{date}{} message{plural}</div>",
            entry.messages
        )
        .unwrap();
        if !entry.snippet.is_empty() {
            writeln!(
                items,
                "<p class=\"snippet\">{}</p>",
                html::escape(&entry.snippet)
            )
            .unwrap();
        }
        items.push_str("</div>\n");
    }
    if entries.is_empty() {
        items.push_str("<p class=\"empty\">No conversations found.</p>\n");
    }

    // keep the payload from closing its own script element
    let index = serde_json::to_string(entries)?.replace('<', "\\u003c");
    let title = html::escape(&opts.site_title);
    let count = match entries.len() {
        1 => "1 conversation".to_owned(),
        n => format!("{n} conversations"),
    };

    Ok(html::fill(
        INDEX_TEMPLATE,
        &[
            ("generator", GENERATOR),
            ("title", &title),
            ("css", STYLE),
            ("count", &count),
            ("items", &items),
            ("index", &index),
            ("script", INDEX_SCRIPT),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Message;
    use chrono::DateTime;

    fn make_message(role: Role, text: &str) -> Message {
        Message {
            id: None,
            role,
            recipient: None,
            timestamp: None,
            hidden: false,
            parts: vec![Part::Text(text.into())],
            attachments: vec![],
        }
    }

    fn make_conversation(title: &str, messages: Vec<Message>) -> Conversation {
        Conversation {
            id: "c1".into(),
            title: title.into(),
            created: DateTime::from_timestamp(1_704_207_840, 0), // 2024-01-02 15:04 UTC
            updated: None,
            messages,
        }
    }

    fn entry(title: &str, href: &str) -> IndexEntry {
        IndexEntry {
            title: title.into(),
            href: href.into(),
            date: "January 2, 2024 3:04 PM UTC".into(),
            snippet: "hello".into(),
            messages: 2,
        }
    }

    #[test]
    fn summarizes_conversation() {
        let conversation = make_conversation(
            "Rust questions",
            vec![
                make_message(Role::System, "be helpful"),
                make_message(Role::User, "How do I **borrow**\n\nsafely?"),
                make_message(Role::Assistant, "Like this."),
            ],
        );

        let entry = IndexEntry::new(&conversation, "c1.html", &RenderOptions::default());

        assert_eq!(entry.title, "Rust questions");
        assert_eq!(entry.href, "c1.html");
        assert_eq!(entry.date, "January 2, 2024 3:04 PM UTC");
        assert_eq!(entry.snippet, "How do I borrow safely?");
        assert_eq!(entry.messages, 2);
    }

    #[test]
    fn truncates_long_snippets() {
        let long = "word ".repeat(100);
        let conversation = make_conversation("Long", vec![make_message(Role::User, &long)]);

        let entry = IndexEntry::new(&conversation, "c1.html", &RenderOptions::default());

        assert!(entry.snippet.ends_with('…'));
        assert!(entry.snippet.chars().count() <= SNIPPET_LEN + 1);
        assert!(!entry.snippet.contains("  "));
    }

    #[test]
    fn handles_conversation_without_user_text() {
        let mut conversation = make_conversation("Empty", vec![]);
        conversation.created = None;

        let entry = IndexEntry::new(&conversation, "c1.html", &RenderOptions::default());

        assert_eq!(entry.snippet, "");
        assert_eq!(entry.date, "");
        assert_eq!(entry.messages, 0);
    }

    #[test]
    fn renders_card_per_entry() {
        let html = render_index(
            &[entry("First <one>", "a.html"), entry("Second", "b.html")],
            &RenderOptions::default(),
        )
        .unwrap();

        assert!(html.contains("<input id=\"q\" type=\"search\""));
        assert_eq!(html.matches("<div class=\"card\"").count(), 2);
        assert!(html.contains("<h3><a href=\"a.html\">First &lt;one&gt;</a></h3>"));
        assert!(html.contains("<h3><a href=\"b.html\">Second</a></h3>"));
        assert!(html.contains("January 2, 2024 3:04 PM UTC · 2 messages"));
        assert!(html.contains("<title>Conversations</title>"));
        assert!(html.contains("2 conversations"));
    }

    #[test]
    fn embeds_search_index() {
        let html = render_index(
            &[entry("</script><b>", "a.html")],
            &RenderOptions::default(),
        )
        .unwrap();

        let start = html.find("id=\"search-index\">").unwrap();
        let json = &html[start + "id=\"search-index\">".len()..];
        let json = &json[..json.find("</script>").unwrap()];
        let parsed: serde_json::Value = serde_json::from_str(json).unwrap();

        assert_eq!(parsed[0]["title"], "</script><b>");
        assert_eq!(parsed[0]["href"], "a.html");
        assert_eq!(parsed[0]["messages"], 2);
    }

    #[test]
    fn counts_single_conversation() {
        let html = render_index(&[entry("Only", "a.html")], &RenderOptions::default()).unwrap();

        assert!(html.contains("<span id=\"count\" class=\"count\">1 conversation</span>"));
    }

    #[test]
    fn uses_site_title() {
        let opts = RenderOptions {
            site_title: "My & chats".into(),
            ..Default::default()
        };

        let html = render_index(&[], &opts).unwrap();

        assert!(html.contains("<title>My &amp; chats</title>"));
        assert!(html.contains("No conversations found."));
    }
}
