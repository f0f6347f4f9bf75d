//! Markup rewriting for served content.
//!
//! Everything here is a pure transformation from input markup plus a base
//! path to output markup, so the whole policy is testable without a server.
//! Served HTML must work from under the reserved prefix, which means:
//! absolute-rooted references become relative (the injected `<base>` then
//! resolves them inside the site scope), exactly one base tag survives, and
//! a small navigation script keeps in-page link clicks under the prefix.

use std::sync::LazyLock;

use regex::Regex;

// Lazy static regex patterns for markup rewriting
static BASE_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<base\b[^>]*>").unwrap());

static HEAD_OPEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").unwrap());

static HTML_OPEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<html(\s[^>]*)?>").unwrap());

static BODY_CLOSE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</body\s*>").unwrap());

static ROOTED_ATTR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?P<pre><(?:a|link|script|img|source|iframe|embed)\b[^>]*?\s(?:href|src)\s*=\s*["'])(?P<url>/[^"']*)(?P<post>["'])"#,
    )
    .unwrap()
});

static SRCSET_ATTR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?P<pre><(?:img|source)\b[^>]*?\ssrcset\s*=\s*["'])(?P<value>[^"']*)(?P<post>["'])"#,
    )
    .unwrap()
});

static CSS_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)url\(\s*(?P<quote>["']?)(?P<url>/[^"')]*)"#).unwrap());

/// Navigation overlay appended to every served HTML page. Provides a way
/// back to the resolver and intercepts same-tab, non-download link clicks
/// whose targets would escape the reserved prefix.
const NAV_OVERLAY_SCRIPT: &str = r#"<script>
(function () {
  var segments = window.location.pathname.split("/").filter(Boolean);
  var root = "/" + segments.slice(0, 3).join("/") + "/";
  var overlay = document.createElement("div");
  overlay.style.cssText = "position:fixed;bottom:12px;right:12px;z-index:2147483647;font:13px sans-serif;";
  var back = document.createElement("a");
  back.href = "/";
  back.textContent = "back to resolver";
  back.style.cssText = "background:rgba(0,0,0,0.7);color:#fff;padding:6px 10px;border-radius:4px;text-decoration:none;";
  overlay.appendChild(back);
  document.body.appendChild(overlay);
  document.addEventListener("click", function (ev) {
    if (ev.defaultPrevented || ev.button !== 0) return;
    if (ev.metaKey || ev.ctrlKey || ev.shiftKey || ev.altKey) return;
    var anchor = ev.target && ev.target.closest ? ev.target.closest("a[href]") : null;
    if (!anchor || anchor === back) return;
    if (anchor.target && anchor.target !== "_self") return;
    if (anchor.hasAttribute("download")) return;
    var url = new URL(anchor.href, window.location.href);
    if (url.origin !== window.location.origin) return;
    if (url.pathname.indexOf(root) === 0) return;
    ev.preventDefault();
    window.location.assign(root + url.pathname.replace(/^\//, "") + url.search);
  }, true);
})();
</script>"#;

fn strip_root(url: &str) -> Option<&str> {
    // protocol-relative urls keep both slashes
    if url.starts_with('/') && !url.starts_with("//") {
        Some(&url[1..])
    } else {
        None
    }
}

fn rewrite_rooted_attrs(html: &str) -> String {
    let html = ROOTED_ATTR_REGEX.replace_all(html, |caps: &regex::Captures| {
        match strip_root(&caps["url"]) {
            Some(stripped) => format!("{}{}{}", &caps["pre"], stripped, &caps["post"]),
            None => caps[0].to_string(),
        }
    });

    SRCSET_ATTR_REGEX
        .replace_all(&html, |caps: &regex::Captures| {
            format!(
                "{}{}{}",
                &caps["pre"],
                rewrite_srcset_value(&caps["value"]),
                &caps["post"]
            )
        })
        .into_owned()
}

fn rewrite_srcset_value(value: &str) -> String {
    value
        .split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            let mut parts = candidate.splitn(2, char::is_whitespace);
            let url = parts.next().unwrap_or("");
            let descriptor = parts.next();
            let url = strip_root(url).unwrap_or(url);
            match descriptor {
                Some(descriptor) => format!("{url} {descriptor}"),
                None => url.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn inject_base(html: &str, base_href: &str) -> String {
    let base_tag = format!(r#"<base href="{base_href}">"#);
    if let Some(head) = HEAD_OPEN_REGEX.find(html) {
        let mut out = String::with_capacity(html.len() + base_tag.len());
        out.push_str(&html[..head.end()]);
        out.push_str(&base_tag);
        out.push_str(&html[head.end()..]);
        out
    } else if let Some(html_open) = HTML_OPEN_REGEX.find(html) {
        let mut out = String::with_capacity(html.len() + base_tag.len() + 13);
        out.push_str(&html[..html_open.end()]);
        out.push_str("<head>");
        out.push_str(&base_tag);
        out.push_str("</head>");
        out.push_str(&html[html_open.end()..]);
        out
    } else {
        format!("<head>{base_tag}</head>{html}")
    }
}

fn append_nav_overlay(html: &str) -> String {
    match BODY_CLOSE_REGEX.find(html) {
        Some(body_close) => {
            let mut out = String::with_capacity(html.len() + NAV_OVERLAY_SCRIPT.len());
            out.push_str(&html[..body_close.start()]);
            out.push_str(NAV_OVERLAY_SCRIPT);
            out.push_str(&html[body_close.start()..]);
            out
        }
        None => format!("{html}{NAV_OVERLAY_SCRIPT}</body>"),
    }
}

/// Rewrite served HTML for the reserved prefix rooted at `base_href`.
///
/// Drops any pre-existing base tags, strips the leading slash from
/// absolute-rooted href/src/srcset attributes, injects exactly one
/// `<base href>` after the head element (synthesizing head/html wrappers
/// when absent), and appends the navigation overlay before `</body>`.
pub fn rewrite_html(input: &str, base_href: &str) -> String {
    let stripped = BASE_TAG_REGEX.replace_all(input, "");
    let rewritten = rewrite_rooted_attrs(&stripped);
    let with_base = inject_base(&rewritten, base_href);
    append_nav_overlay(&with_base)
}

/// Rewrite `url(/path)` references in CSS to be base-relative. Data URLs,
/// protocol-relative and already-relative URLs are untouched.
pub fn rewrite_css(input: &str) -> String {
    CSS_URL_REGEX
        .replace_all(input, |caps: &regex::Captures| {
            match strip_root(&caps["url"]) {
                Some(stripped) => format!("url({}{}", &caps["quote"], stripped),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
