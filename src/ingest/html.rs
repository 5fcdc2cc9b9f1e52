//! Minimal HTML extraction: page metadata and visible text.

use std::sync::OnceLock;

use regex::Regex;

/// Metadata pulled from a page's head.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub language: String,
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").unwrap())
}

fn meta_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap())
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
    })
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<html\b[^>]*>").unwrap())
}

fn hidden_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<head\b.*?</head\s*>|<!--.*?-->",
        )
        .unwrap()
    })
}

fn block_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</(?:p|div|h[1-6]|li|tr|section|article|pre|blockquote)\s*>")
            .unwrap()
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap())
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n(?:\s*\n)*").unwrap())
}

fn attributes(tag: &str) -> Vec<(String, String)> {
    attr_re()
        .captures_iter(tag)
        .map(|caps| {
            let name = caps[1].to_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (name, decode_entities(value))
        })
        .collect()
}

pub fn extract_metadata(html: &str) -> PageMetadata {
    let title = title_re()
        .captures(html)
        .map(|caps| collapse_whitespace(&decode_entities(&caps[1])))
        .unwrap_or_default();

    let description = meta_re()
        .find_iter(html)
        .map(|m| attributes(m.as_str()))
        .find(|attrs| {
            attrs
                .iter()
                .any(|(k, v)| k == "name" && v.eq_ignore_ascii_case("description"))
        })
        .and_then(|attrs| attrs.into_iter().find(|(k, _)| k == "content"))
        .map(|(_, v)| v.trim().to_string())
        .unwrap_or_default();

    let language = html_tag_re()
        .find(html)
        .map(|m| attributes(m.as_str()))
        .and_then(|attrs| attrs.into_iter().find(|(k, _)| k == "lang"))
        .map(|(_, v)| v.trim().to_string())
        .unwrap_or_default();

    PageMetadata {
        title,
        description,
        language,
    }
}

/// Visible text of a page: hidden blocks dropped, tags stripped, runs of
/// blank lines collapsed to one.
pub fn extract_text(html: &str) -> String {
    let without_hidden = hidden_block_re().replace_all(html, " ");
    let with_breaks = block_break_re().replace_all(&without_hidden, "\n");
    let stripped = tag_re().replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);

    let lines: Vec<String> = decoded
        .lines()
        .map(collapse_whitespace)
        .collect();
    let joined = lines.join("\n");

    blank_lines_re()
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
