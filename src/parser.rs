// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! JSON parsing for exported chat archives.
//!
//! This module turns the `conversations.json` file of a chat export into
//! typed conversations. Two layouts are understood:
//!
//! - The tree layout, where every conversation carries a `mapping` object
//!   of nodes and each node holds one message (or `null`).
//! - A flat layout, where every conversation carries a `messages` array.
//!
//! The top level is either a plain array of conversations or an object
//! holding that array under a well-known key such as `conversations`.
//!
//! # Example
//!
//! ```
//! use chat2html::parser::{parse_archive, Part, Role};
//!
//! let json = r#"[{
//!     "id": "c1",
//!     "title": "Greetings",
//!     "create_time": 1733356800.0,
//!     "mapping": {
//!         "root": { "message": null },
//!         "n1": { "message": {
//!             "author": { "role": "user" },
//!             "create_time": 1733356801.0,
//!             "content": { "content_type": "text", "parts": ["Hello"] }
//!         }}
//!     }
//! }]"#;
//!
//! let archive = parse_archive(json).unwrap();
//! let conversation = &archive.conversations[0];
//! assert_eq!(conversation.title, "Greetings");
//! assert_eq!(conversation.messages[0].role, Role::User);
//! assert_eq!(conversation.messages[0].parts, vec![Part::Text("Hello".into())]);
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use snafu::prelude::*;
use tracing::debug;

/// Title used when a conversation has none.
pub const UNTITLED: &str = "Untitled";

const ROOT_LIST_KEYS: [&str; 4] = ["conversations", "items", "data", "threads"];
const MESSAGE_LIST_KEYS: [&str; 3] = ["messages", "msgs", "entries"];
const ID_KEYS: [&str; 3] = ["id", "conversation_id", "uuid"];
const TIME_KEYS: [&str; 3] = ["create_time", "timestamp", "created_at"];

/// Content types that carry tool plumbing rather than conversation text.
const SILENT_CONTENT_TYPES: [&str; 5] = [
    "execution_output",
    "reasoning_recap",
    "tether_browsing_display",
    "tether_quote",
    "system_error",
];

/// Error type for archive loading failures.
#[derive(Debug, Snafu)]
pub enum ParseError {
    /// Failed to parse JSON content.
    #[snafu(display("failed to parse JSON: {source}"))]
    Json {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },

    /// The top level is neither a list nor an object holding one.
    #[snafu(display("expected a list of conversations at the top level"))]
    UnexpectedRoot,

    /// A conversation entry is not a JSON object.
    #[snafu(display("conversation #{index} is not an object"))]
    NotAnObject {
        /// Zero-based position in the archive.
        index: usize,
    },

    /// A conversation lacks a field every conversation must have.
    #[snafu(display("conversation #{index} is missing required field `{field}`"))]
    MissingField {
        /// Zero-based position in the archive.
        index: usize,
        /// Name of the missing field.
        field: &'static str,
    },

    /// The `mapping` field is not an object of nodes.
    #[snafu(display("conversation #{index} has a `mapping` that is not an object"))]
    InvalidMapping {
        /// Zero-based position in the archive.
        index: usize,
    },

    /// The message list is not an array.
    #[snafu(display("conversation #{index} has a message list that is not an array"))]
    InvalidMessages {
        /// Zero-based position in the archive.
        index: usize,
    },
}

/// The full exported dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    /// Conversations in file order.
    pub conversations: Vec<Conversation>,
}

/// One chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Stable identifier, used for the output file name.
    pub id: String,

    /// Display title ([`UNTITLED`] when the export has none).
    pub title: String,

    /// When the conversation was started.
    pub created: Option<DateTime<Utc>>,

    /// When the conversation was last updated.
    pub updated: Option<DateTime<Utc>>,

    /// Messages in conversation order.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// The time shown for the conversation: creation, else last update.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.created.or(self.updated)
    }
}

/// Who authored a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// The human side of the conversation.
    User,
    /// The model's replies.
    Assistant,
    /// System prompts.
    System,
    /// Tool or function output.
    Tool,
    /// Developer instructions.
    Developer,
    /// No role was recorded.
    Unknown,
    /// Any other role name, lowercased.
    Other(String),
}

impl Role {
    /// Maps a role name from the export to a [`Role`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "tool" | "function" => Self::Tool,
            "developer" => Self::Developer,
            "" | "unknown" => Self::Unknown,
            _ => Self::Other(name),
        }
    }

    /// The lowercase role name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
            Self::Developer => "developer",
            Self::Unknown => "unknown",
            Self::Other(name) => name,
        }
    }
}

/// A single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message identifier, when the export has one.
    pub id: Option<String>,

    /// Who wrote the message.
    pub role: Role,

    /// The tool a message is addressed to (e.g. `python`, `web.run`).
    ///
    /// `None` for messages addressed to everyone.
    pub recipient: Option<String>,

    /// When the message was written.
    pub timestamp: Option<DateTime<Utc>>,

    /// The export marks the message as hidden from the conversation view.
    pub hidden: bool,

    /// Content in display order.
    pub parts: Vec<Part>,

    /// Files attached to the message.
    pub attachments: Vec<AssetRef>,
}

/// A piece of message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Markdown text.
    Text(String),

    /// Source code sent to or produced by a tool.
    Code {
        /// Language tag, if known.
        language: Option<String>,
        /// The code itself.
        text: String,
    },

    /// A reasoning step.
    Thought {
        /// Short heading for the step (may be empty).
        summary: String,
        /// Markdown body of the step.
        content: String,
    },

    /// An inline image.
    Image(AssetRef),

    /// A text file uploaded into the conversation.
    Upload {
        /// The file name as uploaded.
        name: String,
        /// The file contents.
        text: String,
    },

    /// The user's custom instructions.
    UserContext {
        /// What the user told the assistant about themselves.
        profile: Option<String>,
        /// How the user wants the assistant to respond.
        instructions: Option<String>,
    },

    /// A content type this tool does not know, kept as literal text.
    Other {
        /// The `content_type` from the export.
        content_type: String,
        /// Best-effort textual payload.
        text: String,
    },
}

/// A reference to a file shipped alongside the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// The reference as it appears in the export.
    pub pointer: String,

    /// The file id; exported files are named with this prefix.
    pub file_id: String,

    /// Original file name, when known.
    pub name: Option<String>,

    /// Whether the asset came from an image generator.
    pub generated: bool,
}

impl AssetRef {
    /// Builds a reference from an asset pointer such as
    /// `file-service://file-abc123` or `sediment://file_0042`.
    ///
    /// Returns `None` if the pointer carries no file id.
    #[must_use]
    pub fn from_pointer(pointer: &str) -> Option<Self> {
        let pointer = pointer.trim();
        let file_id = pointer
            .split_once("://")
            .map_or(pointer, |(_, rest)| rest)
            .trim_matches('/');
        if file_id.is_empty() {
            return None;
        }
        Some(Self {
            pointer: pointer.to_owned(),
            file_id: file_id.to_owned(),
            name: None,
            generated: false,
        })
    }

    /// The text to show for this asset.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.pointer)
    }
}

/// Parses a JSON string into an [`Archive`].
///
/// # Errors
///
/// Returns an error if the JSON is malformed, the top level is not a list
/// of conversations, or a conversation lacks its id or its messages.
/// Problems inside individual messages never fail the load; such content
/// is skipped or kept as [`Part::Other`].
pub fn parse_archive(json_str: &str) -> Result<Archive, ParseError> {
    let root: Value = serde_json::from_str(json_str).context(JsonSnafu)?;
    let items = root_items(&root).context(UnexpectedRootSnafu)?;

    let conversations = items
        .iter()
        .enumerate()
        .map(|(index, value)| parse_conversation(index, value))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Archive { conversations })
}

fn root_items(root: &Value) -> Option<&Vec<Value>> {
    match root {
        Value::Array(items) => Some(items),
        Value::Object(map) => ROOT_LIST_KEYS
            .iter()
            .find_map(|key| map.get(*key)?.as_array()),
        _ => None,
    }
}

fn parse_conversation(index: usize, value: &Value) -> Result<Conversation, ParseError> {
    let obj = value.as_object().context(NotAnObjectSnafu { index })?;

    let id = ID_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(id_string))
        .context(MissingFieldSnafu { index, field: "id" })?;

    let title = get_str(value, &["title"])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_owned();

    let messages = if let Some(mapping) = obj.get("mapping") {
        let mapping = mapping.as_object().context(InvalidMappingSnafu { index })?;
        messages_from_mapping(mapping)
    } else if let Some(list) = MESSAGE_LIST_KEYS.iter().find_map(|key| obj.get(*key)) {
        let list = list.as_array().context(InvalidMessagesSnafu { index })?;
        list.iter().filter_map(parse_message).collect()
    } else {
        return MissingFieldSnafu {
            index,
            field: "mapping",
        }
        .fail();
    };

    Ok(Conversation {
        id,
        title,
        created: obj.get("create_time").and_then(timestamp),
        updated: obj.get("update_time").and_then(timestamp),
        messages,
    })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Flattens the node tree into messages ordered by creation time.
///
/// The sort is stable, so nodes without a time keep their file order
/// ahead of timed ones.
fn messages_from_mapping(mapping: &Map<String, Value>) -> Vec<Message> {
    let mut nodes: Vec<(f64, &Value)> = mapping
        .values()
        .filter_map(|node| {
            let message = node.get("message").filter(|m| !m.is_null())?;
            let order = message
                .get("create_time")
                .or_else(|| node.get("create_time"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            Some((order, message))
        })
        .collect();

    nodes.sort_by(|a, b| a.0.total_cmp(&b.0));
    nodes
        .into_iter()
        .filter_map(|(_, message)| parse_message(message))
        .collect()
}

fn parse_message(value: &Value) -> Option<Message> {
    if !value.is_object() {
        debug!("skipping message that is not an object");
        return None;
    }

    let recipient = get_str(value, &["recipient"])
        .map(str::trim)
        .filter(|r| !r.is_empty() && *r != "all")
        .map(str::to_owned);

    let timestamp = TIME_KEYS
        .iter()
        .find_map(|key| value.get(*key).and_then(timestamp));

    let hidden = value
        .pointer("/metadata/is_visually_hidden_from_conversation")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let parts = match value.get("content").or_else(|| value.get("text")) {
        Some(content) => parse_content(content),
        None => Vec::new(),
    };

    let attachments = value
        .get("metadata")
        .map(extract_attachments)
        .unwrap_or_default();

    Some(Message {
        id: get_string(value, &["id"]),
        role: parse_role(value),
        recipient,
        timestamp,
        hidden,
        parts,
        attachments,
    })
}

/// Reads the role from `role`, `author` or `sender`, each of which may be
/// a plain string or an object with a `role` or `name`.
fn parse_role(value: &Value) -> Role {
    let raw = value
        .get("role")
        .or_else(|| value.get("author"))
        .or_else(|| value.get("sender"));

    let name = match raw {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(author) if author.is_object() => {
            get_str(author, &["role"]).or_else(|| get_str(author, &["name"]))
        }
        _ => None,
    };

    name.map_or(Role::Unknown, Role::from_name)
}

fn parse_content(content: &Value) -> Vec<Part> {
    match content {
        Value::String(text) => text_part(text).into_iter().collect(),
        Value::Array(items) => items.iter().filter_map(parse_content_part).collect(),
        Value::Object(_) => parse_typed_content(content),
        _ => Vec::new(),
    }
}

fn parse_typed_content(content: &Value) -> Vec<Part> {
    let Some(content_type) = get_str(content, &["content_type"]) else {
        return parse_untyped_content(content);
    };

    match content_type {
        "text" | "multimodal_text" => content
            .get("parts")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(parse_content_part)
            .collect(),
        "code" => vec![Part::Code {
            language: get_str(content, &["language"])
                .map(str::trim)
                .filter(|l| !l.is_empty() && *l != "unknown")
                .map(str::to_owned),
            text: get_string(content, &["text"]).unwrap_or_default(),
        }],
        "thoughts" => parse_thoughts(content),
        "user_editable_context" => {
            let profile = non_blank(content, "user_profile");
            let instructions = non_blank(content, "user_instructions");
            if profile.is_none() && instructions.is_none() {
                return Vec::new();
            }
            vec![Part::UserContext {
                profile,
                instructions,
            }]
        }
        kind if SILENT_CONTENT_TYPES.contains(&kind) => Vec::new(),
        other => vec![Part::Other {
            content_type: other.to_owned(),
            text: other_text(content),
        }],
    }
}

fn parse_untyped_content(content: &Value) -> Vec<Part> {
    if let (Some(name), Some(text)) = (get_str(content, &["title"]), get_str(content, &["text"])) {
        return vec![Part::Upload {
            name: name.to_owned(),
            text: text.to_owned(),
        }];
    }
    if content.get("thoughts").is_some() {
        return parse_thoughts(content);
    }
    if let Some(text) = get_str(content, &["text"]) {
        return text_part(text).into_iter().collect();
    }
    if let Some(parts) = content.get("parts") {
        return parse_content(parts);
    }

    debug!("skipping content object without a recognizable shape");
    Vec::new()
}

fn parse_content_part(part: &Value) -> Option<Part> {
    match part {
        Value::String(text) => text_part(text),
        Value::Object(_) => match get_str(part, &["content_type"]) {
            Some("image_asset_pointer") => {
                let mut asset = AssetRef::from_pointer(get_str(part, &["asset_pointer"])?)?;
                asset.generated = part
                    .pointer("/metadata/dalle")
                    .is_some_and(|dalle| !dalle.is_null());
                Some(Part::Image(asset))
            }
            Some("audio_transcription") | None => get_str(part, &["text"]).and_then(text_part),
            Some(kind) if SILENT_CONTENT_TYPES.contains(&kind) => None,
            Some(kind) => Some(Part::Other {
                content_type: kind.to_owned(),
                text: other_text(part),
            }),
        },
        _ => None,
    }
}

fn parse_thoughts(content: &Value) -> Vec<Part> {
    if let Some(thoughts) = content.get("thoughts").and_then(Value::as_array) {
        return thoughts
            .iter()
            .map(|thought| Part::Thought {
                summary: get_string(thought, &["summary"]).unwrap_or_default(),
                content: get_string(thought, &["content"]).unwrap_or_default(),
            })
            .filter(|part| {
                !matches!(part, Part::Thought { summary, content }
                    if summary.is_empty() && content.is_empty())
            })
            .collect();
    }

    get_str(content, &["text"])
        .map(|text| Part::Thought {
            summary: String::new(),
            content: text.to_owned(),
        })
        .into_iter()
        .collect()
}

/// Extracts file references from `metadata.attachments`.
fn extract_attachments(metadata: &Value) -> Vec<AssetRef> {
    metadata
        .get("attachments")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|attachment| {
            let id = get_str(attachment, &["id"])?.trim();
            if id.is_empty() {
                return None;
            }
            Some(AssetRef {
                pointer: id.to_owned(),
                file_id: id.to_owned(),
                name: get_string(attachment, &["name"]),
                generated: false,
            })
        })
        .collect()
}

fn text_part(text: &str) -> Option<Part> {
    (!text.trim().is_empty()).then(|| Part::Text(text.to_owned()))
}

fn non_blank(value: &Value, key: &str) -> Option<String> {
    get_str(value, &[key])
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned)
}

fn other_text(content: &Value) -> String {
    ["content", "text", "result"]
        .iter()
        .find_map(|key| get_string(content, &[*key]))
        .unwrap_or_else(|| content.to_string())
}

/// Reads a timestamp given as epoch seconds, epoch milliseconds or an
/// RFC 3339 string.
fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => epoch(n.as_f64()?),
        Value::String(s) => s
            .parse::<DateTime<Utc>>()
            .ok()
            .or_else(|| epoch(s.trim().parse().ok()?)),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    // 1e11 seconds is past the year 5000; anything larger is milliseconds
    if value.abs() >= 1e11 {
        return DateTime::from_timestamp_millis(value as i64);
    }
    let secs = value.floor();
    let nanos = ((value - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
}

/// Navigates a JSON path and returns the string value at the end.
///
/// # Arguments
///
/// * `value` - The root JSON value to navigate from
/// * `path` - A sequence of keys to follow through the JSON structure
fn get_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

/// Like [`get_str`] but returns an owned `String`.
fn get_string(value: &Value, path: &[&str]) -> Option<String> {
    get_str(value, path).map(str::to_owned)
}
