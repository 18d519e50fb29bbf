//! Asset absolutization: rewrite server-relative asset URLs to `file://` URLs.
//!
//! The renderer loads the HTML from a temporary file, outside the web
//! server's URL space, so `<img src="/static/logo.png">` would resolve to
//! nothing. Each configured [`AssetOverride`] maps a URL prefix to the
//! directory that backs it; quoted references starting with that prefix are
//! rewritten to point at the file on disk.
//!
//! Rewriting happens per override in two steps:
//!
//! 1. collect the distinct quoted strings (`"…"` or `'…'`) that start with
//!    the prefix; a quote that closes one string may open the next;
//! 2. replace every literal occurrence of those strings in one pass,
//!    longest first, so a short match (`/static/`) never re-matches inside the
//!    output produced for a longer one (`/static/img.png`).
//!
//! Every quoted reference that starts with the prefix is rewritten in the
//! same pass, including ones that begin at the previous reference's closing
//! quote, so running the pass again with the same overrides changes nothing.

use crate::config::AssetOverride;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

static RE_HAS_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^:/]+://").unwrap());

/// Rewrite asset references in `html` according to `overrides`.
pub fn absolutize(html: &str, overrides: &[AssetOverride]) -> String {
    let mut content = html.to_string();

    for ov in overrides {
        if ov.url_prefix.is_empty() || RE_HAS_SCHEME.is_match(&ov.url_prefix) {
            debug!(
                "Skipping asset override '{}': prefix is empty or already absolute",
                ov.url_prefix
            );
            continue;
        }

        let Some(base) = directory_file_url(&ov.root) else {
            warn!(
                "Skipping asset override '{}': root {} is not an absolute path",
                ov.url_prefix,
                ov.root.display()
            );
            continue;
        };

        content = rewrite_prefix(&content, &ov.url_prefix, &base);
    }

    content
}

/// `file://` URL of a directory, percent-encoded and ending with `/`.
pub fn directory_file_url(root: &Path) -> Option<String> {
    Url::from_directory_path(root).ok().map(String::from)
}

fn rewrite_prefix(content: &str, prefix: &str, base: &str) -> String {
    // No lookaround in `regex`: match the unquoted run and check the quote
    // bytes on either side, so one quote can close a match and open the next.
    let pattern = format!(r#"{}[^"'\n]*"#, regex::escape(prefix));
    let candidate = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!("Cannot scan for asset prefix '{}': {}", prefix, e);
            return content.to_string();
        }
    };

    let bytes = content.as_bytes();
    let is_quote = |b: Option<&u8>| matches!(b, Some(b'"') | Some(b'\''));
    let occurrences: BTreeSet<&str> = candidate
        .find_iter(content)
        .filter(|m| {
            let opened = m.start() > 0 && is_quote(bytes.get(m.start() - 1));
            opened && is_quote(bytes.get(m.end()))
        })
        .map(|m| m.as_str())
        .collect();

    if occurrences.is_empty() {
        return content.to_string();
    }

    let mut ordered: Vec<&str> = occurrences.into_iter().collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    debug!(
        "Rewriting {} asset reference(s) under '{}' to {}",
        ordered.len(),
        prefix,
        base
    );

    let alternation = ordered
        .iter()
        .map(|o| regex::escape(o))
        .collect::<Vec<_>>()
        .join("|");
    let literal = match Regex::new(&alternation) {
        Ok(re) => re,
        Err(e) => {
            warn!("Cannot rewrite asset prefix '{}': {}", prefix, e);
            return content.to_string();
        }
    };

    literal
        .replace_all(content, |caps: &Captures<'_>| {
            format!("{}{}", base, &caps[0][prefix.len()..])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn static_override() -> AssetOverride {
        AssetOverride::new("/srv/static/", "/static/")
    }

    #[test]
    fn rewrites_quoted_static_reference() {
        let html = r#"<img src="/static/img/x.png">"#;
        let out = absolutize(html, &[static_override()]);
        assert!(out.contains("file:///srv/static/img/x.png"), "got: {out}");
        assert!(!out.contains(r#""/static/img/x.png""#));
    }

    #[test]
    fn root_without_trailing_slash_is_normalised() {
        let ov = AssetOverride::new("/srv/static", "/static/");
        let out = absolutize(r#"<link href='/static/app.css'>"#, &[ov]);
        assert_eq!(out, "<link href='file:///srv/static/app.css'>");
    }

    #[test]
    fn is_idempotent() {
        let html = r#"<img src="/static/a.png"><link href='/static/css/b.css'> /static/a.png"#;
        let once = absolutize(html, &[static_override()]);
        let twice = absolutize(&once, &[static_override()]);
        assert_eq!(once, twice);

        let adjacent = r#"<x a="/static/a"/static/b">"#;
        let once = absolutize(adjacent, &[static_override()]);
        assert_eq!(once, r#"<x a="file:///srv/static/a"file:///srv/static/b">"#);
        assert_eq!(absolutize(&once, &[static_override()]), once);
    }

    #[test]
    fn skips_absolute_and_empty_prefixes() {
        let html = r#"<img src="https://cdn.example.com/static/a.png"><img src="/x.png">"#;
        let overrides = [
            AssetOverride::new("/srv/cdn/", "https://cdn.example.com/static/"),
            AssetOverride::new("/srv/root/", ""),
        ];
        assert_eq!(absolutize(html, &overrides), html);
    }

    #[test]
    fn root_is_percent_encoded() {
        let ov = AssetOverride::new("/srv/my assets/", "/media/");
        let out = absolutize(r#"<img src="/media/logo.png">"#, &[ov]);
        assert_eq!(out, r#"<img src="file:///srv/my%20assets/logo.png">"#);
    }

    #[test]
    fn unquoted_copies_of_a_quoted_match_are_rewritten_too() {
        let html = r#"<link href="/static/a.css"><style>@import /static/a.css;</style>"#;
        let out = absolutize(html, &[static_override()]);
        assert_eq!(out.matches("file:///srv/static/a.css").count(), 2);
    }

    #[test]
    fn nested_matches_do_not_corrupt_each_other() {
        let html = r#"<base href="/static/"><img src="/static/img.png">"#;
        let out = absolutize(html, &[static_override()]);
        assert_eq!(
            out,
            r#"<base href="file:///srv/static/"><img src="file:///srv/static/img.png">"#
        );
    }

    #[test]
    fn applies_every_override() {
        let overrides = [
            AssetOverride::new("/srv/media/", "/media/"),
            static_override(),
        ];
        let html = r#"<img src="/media/u/1.jpg"><script src="/static/app.js"></script>"#;
        let out = absolutize(html, &overrides);
        assert!(out.contains("file:///srv/media/u/1.jpg"));
        assert!(out.contains("file:///srv/static/app.js"));
    }

    #[test]
    fn relative_root_is_skipped() {
        let ov = AssetOverride {
            root: PathBuf::from("www/static"),
            url_prefix: "/static/".into(),
        };
        let html = r#"<img src="/static/a.png">"#;
        assert_eq!(absolutize(html, &[ov]), html);
    }
}
