//! Structured reply content and the HTML allow-list sanitizer.
//!
//! Generators build `ContentNode` trees instead of concatenating HTML, so
//! the allow-list policy is enforced exactly once, at the final
//! render-then-sanitize step, no matter which generator produced the
//! content. Provider-returned markup enters the tree as `Raw` and gets the
//! same treatment.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentNode {
    Heading { level: u8, text: String },
    Paragraph(String),
    List(Vec<String>),
    Link { href: String, label: String },
    /// Markup straight from the generation provider. Trusted for structure,
    /// never for safety; the sanitizer decides what survives.
    Raw(String),
}

pub fn render(nodes: &[ContentNode]) -> String {
    let mut html = String::new();
    for node in nodes {
        match node {
            ContentNode::Heading { level, text } => {
                let level = (*level).clamp(1, 6);
                html.push_str(&format!("<h{level}>{}</h{level}>", escape_html(text)));
            }
            ContentNode::Paragraph(text) => {
                html.push_str(&format!("<p>{}</p>", escape_html(text)));
            }
            ContentNode::List(items) => {
                html.push_str("<ul>");
                for item in items {
                    html.push_str(&format!("<li>{}</li>", escape_html(item)));
                }
                html.push_str("</ul>");
            }
            ContentNode::Link { href, label } => {
                html.push_str(&format!(
                    "<a href=\"{}\">{}</a>",
                    escape_html(href),
                    escape_html(label)
                ));
            }
            ContentNode::Raw(markup) => html.push_str(markup),
        }
    }
    html
}

/// Tag/attribute allow-list applied to rendered output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SanitizePolicy {
    pub allowed_tags: &'static [&'static str],
    pub allowed_attrs: &'static [&'static str],
}

impl SanitizePolicy {
    pub const fn new(
        allowed_tags: &'static [&'static str],
        allowed_attrs: &'static [&'static str],
    ) -> Self {
        Self { allowed_tags, allowed_attrs }
    }

    /// Full reply markup: narrative responses, paper cards, comparisons.
    pub const fn rich() -> Self {
        Self::new(
            &["div", "h2", "h3", "h4", "ul", "ol", "li", "span", "p", "a", "em", "strong", "code"],
            &["class", "href", "identifier"],
        )
    }

    /// Error notices and disambiguation prompts: text only, no links.
    pub const fn minimal() -> Self {
        Self::new(&["p", "ul", "li", "em", "strong"], &[])
    }

    fn allows_tag(&self, name: &str) -> bool {
        self.allowed_tags.iter().any(|tag| tag.eq_ignore_ascii_case(name))
    }

    fn allows_attr(&self, name: &str) -> bool {
        self.allowed_attrs.iter().any(|attr| attr.eq_ignore_ascii_case(name))
    }
}

/// Strip everything outside the allow-list from `html`.
///
/// Guarantee: the output contains no tag and no attribute beyond the policy,
/// regardless of what the provider returned. Disallowed tags are dropped but
/// their inner text is kept, except `script`/`style` elements which are
/// removed body and all.
pub fn sanitize(html: &str, policy: &SanitizePolicy) -> String {
    let without_blocks = strip_dangerous_blocks(html, policy);
    let mut output = String::with_capacity(without_blocks.len());
    let mut rest = without_blocks.as_str();

    while let Some(open) = rest.find('<') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('>') {
            Some(close) => {
                let body = &after[..close];
                if let Some(tag) = rebuild_tag(body, policy) {
                    output.push_str(&tag);
                }
                rest = &after[close + 1..];
            }
            None => {
                // Dangling `<` with no closing bracket: neutralize it.
                output.push_str("&lt;");
                rest = after;
            }
        }
    }
    output.push_str(rest);
    output
}

fn strip_dangerous_blocks(html: &str, policy: &SanitizePolicy) -> String {
    let mut cleaned = html.to_string();
    for element in ["script", "style"] {
        if policy.allows_tag(element) {
            continue;
        }
        let pattern = block_regex(element);
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    cleaned
}

fn block_regex(element: &str) -> Regex {
    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    static STYLE: OnceLock<Regex> = OnceLock::new();
    let cell = if element == "script" { &SCRIPT } else { &STYLE };
    cell.get_or_init(|| {
        Regex::new(&format!(r"(?is)<{element}\b[^>]*>.*?</{element}\s*>")).expect("static pattern")
    })
    .clone()
}

/// Reassemble one tag body (the text between `<` and `>`) from scratch,
/// keeping only the allowed name and attributes. Returns `None` when the
/// whole tag must be dropped.
fn rebuild_tag(body: &str, policy: &SanitizePolicy) -> Option<String> {
    static NAME: OnceLock<Regex> = OnceLock::new();
    static ATTR: OnceLock<Regex> = OnceLock::new();
    let name_re = NAME
        .get_or_init(|| Regex::new(r"^(/?)\s*([a-zA-Z][a-zA-Z0-9]*)").expect("static pattern"));
    let attr_re = ATTR.get_or_init(|| {
        Regex::new(r#"([a-zA-Z][a-zA-Z0-9_-]*)\s*=\s*"([^"]*)""#).expect("static pattern")
    });

    let captures = name_re.captures(body)?;
    let closing = !captures[1].is_empty();
    let name = captures[2].to_ascii_lowercase();
    if !policy.allows_tag(&name) {
        return None;
    }
    if closing {
        return Some(format!("</{name}>"));
    }

    let mut tag = format!("<{name}");
    for attr in attr_re.captures_iter(body) {
        let attr_name = attr[1].to_ascii_lowercase();
        if !policy.allows_attr(&attr_name) {
            continue;
        }
        let value = &attr[2];
        if attr_name == "href" && !is_safe_href(value) {
            continue;
        }
        tag.push_str(&format!(" {attr_name}=\"{value}\""));
    }
    if body.trim_end().ends_with('/') {
        tag.push_str(" /");
    }
    tag.push('>');
    Some(tag)
}

fn is_safe_href(value: &str) -> bool {
    let trimmed = value.trim().to_ascii_lowercase();
    trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
        || trimmed.starts_with('#')
        || trimmed.starts_with('/')
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
