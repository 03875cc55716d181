//! HTML base-href injection and absolute-path URL rewriting for the Reverse
//! Proxy (§4.5, §8 scenario 4). Pure string transforms; the proxy itself
//! decides when to invoke them based on `Content-Type`.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Attributes whose value is a single URL, rewritten when it starts with `/`.
static ATTR_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(src|href|action)(\s*=\s*)(["'])(/[^"']*)(["'])"#).unwrap()
});

/// CSS `url(...)` references, quoted or bare.
static CSS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)url\(\s*(["']?)(/[^)"']*)\1\s*\)"#).unwrap());

static HEAD_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<head[^>]*>").unwrap());

/// `<base href="...">` built for a given proxy mount base, e.g. `/tentacle/main/`.
fn base_tag(base: &str) -> String {
    format!("<base href=\"{base}\">")
}

/// Insert `<base href="{base}">` immediately after the first `<head>` literal.
/// A no-op if the document has no `<head>` or already carries this exact base
/// tag (§8: applying the rewrite twice must not add a second tag).
fn inject_base(html: &str, base: &str) -> String {
    let tag = base_tag(base);
    if html.contains(&tag) {
        return html.to_string();
    }

    match HEAD_OPEN.find(html) {
        Some(m) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..m.end()]);
            out.push_str(&tag);
            out.push_str(&html[m.end()..]);
            out
        }
        None => html.to_string(),
    }
}

/// True when `path` is not absolute-path relative to the site root: already
/// fully qualified, an anchor/scheme link, or already under `base`.
fn is_exempt(path: &str, base: &str) -> bool {
    path.starts_with(base)
        || path.starts_with("//")
        || path.starts_with("http://")
        || path.starts_with("https://")
        || path.starts_with("data:")
        || path.starts_with('#')
        || path.starts_with("mailto:")
}

fn prefixed(base: &str, path: &str) -> String {
    // `base` always ends in `/`; `path` always starts with `/`, so drop one.
    format!("{base}{}", &path[1..])
}

/// Rewrite absolute-path URLs in `src=`/`href=`/`action=` attributes and CSS
/// `url(...)` expressions, prefixing them with `base` unless already
/// qualified or already prefixed.
fn rewrite_urls(html: &str, base: &str) -> String {
    let html = ATTR_URL.replace_all(html, |caps: &Captures| {
        let attr = &caps[1];
        let eq = &caps[2];
        let q1 = &caps[3];
        let path = &caps[4];
        let q2 = &caps[5];
        if is_exempt(path, base) {
            caps[0].to_string()
        } else {
            format!("{attr}{eq}{q1}{}{q2}", prefixed(base, path))
        }
    });

    CSS_URL
        .replace_all(&html, |caps: &Captures| {
            let quote = &caps[1];
            let path = &caps[2];
            if is_exempt(path, base) {
                caps[0].to_string()
            } else {
                format!("url({quote}{}{quote})", prefixed(base, path))
            }
        })
        .into_owned()
}

/// Apply base injection then URL rewriting. Idempotent: a second call on
/// already-rewritten output changes nothing (§8).
pub fn rewrite_html(html: &str, base: &str) -> String {
    let with_base = inject_base(html, base);
    rewrite_urls(&with_base, base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_four_from_testable_properties() {
        let input = "<html><head></head><body><a href='/a.css'>";
        let expected =
            "<html><head><base href=\"/tentacle/main/\"></head><body><a href='/tentacle/main/a.css'>";
        assert_eq!(rewrite_html(input, "/tentacle/main/"), expected);
    }

    #[test]
    fn rewrite_is_idempotent() {
        let input = "<html><head></head><body><a href='/a.css'><img src=\"/b.png\">";
        let once = rewrite_html(input, "/tentacle/main/");
        let twice = rewrite_html(&once, "/tentacle/main/");
        assert_eq!(once, twice);
        assert_eq!(once.matches("<base").count(), 1);
    }

    #[test]
    fn does_not_rewrite_already_absolute_urls() {
        let input = "<a href=\"https://example.com/x\"><img src=\"//cdn.example.com/y.png\">";
        let out = rewrite_html(input, "/tentacle/main/");
        assert_eq!(out, input);
    }

    #[test]
    fn rewrites_css_url_expressions() {
        let input = "body { background: url(/bg.png); }";
        let out = rewrite_html(input, "/tentacle/main/");
        assert_eq!(out, "body { background: url(/tentacle/main/bg.png); }");
    }

    #[test]
    fn does_not_double_prefix_already_prefixed_paths() {
        let input = "<a href=\"/tentacle/main/already.css\">";
        let out = rewrite_html(input, "/tentacle/main/");
        assert_eq!(out, input);
    }

    #[test]
    fn missing_head_tag_skips_base_injection_but_still_rewrites_urls() {
        let input = "<body><a href='/a.css'>";
        let out = rewrite_html(input, "/tentacle/main/");
        assert_eq!(out, "<body><a href='/tentacle/main/a.css'>");
    }

    #[test]
    fn anchor_and_mailto_links_are_exempt() {
        let input = "<a href=\"#section\"><a href=\"mailto:a@b.com\">";
        let out = rewrite_html(input, "/tentacle/main/");
        assert_eq!(out, input);
    }
}
