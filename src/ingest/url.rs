//! URL validation and title resolution for URL ingestion.

use std::sync::OnceLock;

use regex::Regex;

use crate::store::Document;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^https?://(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+[A-Z]{2,6}\.?|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$",
        )
        .unwrap()
    })
}

/// http(s) URL with a domain, `localhost` or IPv4 host, optional port and path.
pub fn is_valid_url(url: &str) -> bool {
    url_re().is_match(url)
}

/// The authority part of a URL (`host[:port]`), if any.
pub fn url_host(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map(|(_, rest)| rest)?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    let host = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    (!host.is_empty()).then_some(host)
}

/// Page title, else the source URL's host, else `"Untitled"`.
pub fn resolve_title(docs: &[Document]) -> String {
    let Some(first) = docs.first() else {
        return "Untitled".to_string();
    };

    let title = first.title().trim();
    if !title.is_empty() {
        return title.to_string();
    }

    url_host(first.source())
        .map(str::to_string)
        .unwrap_or_else(|| "Untitled".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_urls() {
        for url in [
            "https://example.com",
            "http://example.com/",
            "https://docs.example.co.uk/path/page?x=1",
            "http://localhost:8080/index.html",
            "http://127.0.0.1:3000",
            "HTTPS://EXAMPLE.COM/Path",
        ] {
            assert!(is_valid_url(url), "{url}");
        }
    }

    #[test]
    fn rejects_malformed_urls() {
        for url in [
            "",
            "example.com",
            "ftp://example.com",
            "https://",
            "https://exa mple.com",
            "https://example.com/with space",
            "not a url",
        ] {
            assert!(!is_valid_url(url), "{url}");
        }
    }

    #[test]
    fn host_extraction() {
        assert_eq!(url_host("https://example.com/a/b"), Some("example.com"));
        assert_eq!(url_host("http://user@localhost:8080?q"), Some("localhost:8080"));
        assert_eq!(url_host("no scheme"), None);
    }

    #[test]
    fn title_falls_back_to_host_then_untitled() {
        let titled = Document::new("x")
            .with_metadata("title", " Rust Book ")
            .with_metadata("source", "https://doc.rust-lang.org/book");
        assert_eq!(resolve_title(&[titled]), "Rust Book");

        let untitled = Document::new("x")
            .with_metadata("title", "")
            .with_metadata("source", "https://doc.rust-lang.org/book");
        assert_eq!(resolve_title(&[untitled]), "doc.rust-lang.org");

        assert_eq!(resolve_title(&[Document::new("x")]), "Untitled");
        assert_eq!(resolve_title(&[]), "Untitled");
    }
}
