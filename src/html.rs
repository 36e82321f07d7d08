// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Small helpers shared by the HTML emitters.

/// Escapes text for element content and quoted attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Placeholder link for an asset that could not be resolved.
pub fn missing_asset(reference: &str) -> String {
    let reference = escape(reference);
    format!(
        "<a class=\"missing-asset\" href=\"#missing-asset\" title=\"Missing asset: {reference}\">[missing: {reference}]</a>"
    )
}

/// Opening tag of a placeholder link that wraps the original link text.
pub fn missing_asset_open(reference: &str) -> String {
    format!(
        "<a class=\"missing-asset\" href=\"#missing-asset\" title=\"Missing asset: {}\">",
        escape(reference)
    )
}

/// Substitutes `{{key}}` markers in a template.
///
/// Markers without a matching key are left in place. Substituted values
/// are not scanned again.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + end + 4]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(escape("just words"), "just words");
        assert_eq!(escape(""), "");
    }

    #[test]
    fn fills_known_keys() {
        let out = fill("<h1>{{title}}</h1>{{body}}", &[("title", "Hi"), ("body", "<p>x</p>")]);
        assert_eq!(out, "<h1>Hi</h1><p>x</p>");
    }

    #[test]
    fn keeps_unknown_markers() {
        assert_eq!(fill("a {{nope}} b", &[("title", "x")]), "a {{nope}} b");
    }

    #[test]
    fn does_not_rescan_substituted_values() {
        let out = fill("{{a}}{{b}}", &[("a", "{{b}}"), ("b", "B")]);
        assert_eq!(out, "{{b}}B");
    }

    #[test]
    fn handles_unterminated_marker() {
        assert_eq!(fill("x {{open", &[]), "x {{open");
    }

    #[test]
    fn placeholder_escapes_reference() {
        let html = missing_asset("a<b>.png");
        assert!(html.contains("class=\"missing-asset\""));
        assert!(html.contains("[missing: a&lt;b&gt;.png]"));
    }
}
