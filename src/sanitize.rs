use std::collections::HashSet;

use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{Html, Selector};

const FORBIDDEN_ELEMENTS: [&str; 3] = ["script", "style", "link"];

const ALLOWED_ATTRIBUTES: [&str; 10] = [
    "id", "name", "href", "src", "alt", "title", "lang", "class", "colspan", "rowspan",
];

// Elements serialized without a closing tag.
const VOID_ELEMENTS: [&str; 12] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "meta", "source", "track", "wbr",
];

/// Fixed allow-policy for attaching untrusted book markup to a page.
/// Forbidden elements are dropped with their entire subtree; every other
/// element survives with only allow-listed attributes. Element `id`s pass
/// through verbatim so in-document anchors keep working.
#[derive(Debug, Clone)]
pub struct SanitizePolicy {
    forbidden_elements: HashSet<&'static str>,
    allowed_attributes: HashSet<&'static str>,
}

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            forbidden_elements: FORBIDDEN_ELEMENTS.into_iter().collect(),
            allowed_attributes: ALLOWED_ATTRIBUTES.into_iter().collect(),
        }
    }
}

impl SanitizePolicy {
    fn is_forbidden(&self, element: &str) -> bool {
        self.forbidden_elements.contains(element)
    }

    fn allows_attribute(&self, attribute: &str) -> bool {
        self.allowed_attributes.contains(attribute)
    }
}

/// Sanitizes raw markup under the default policy. Pure: same input, same
/// output; disallowed content is removed silently, never reported.
pub fn sanitize(raw_html: &str) -> String {
    sanitize_with_policy(raw_html, &SanitizePolicy::default())
}

/// Returns the serialized `<body>` children of the parsed document, ready
/// for direct attachment. Head content, comments, and doctypes are gone.
pub fn sanitize_with_policy(raw_html: &str, policy: &SanitizePolicy) -> String {
    let doc = Html::parse_document(raw_html);
    let body = Selector::parse("body").expect("static css selector");

    let mut out = String::with_capacity(raw_html.len());
    if let Some(body) = doc.select(&body).next() {
        for child in body.children() {
            serialize_node(&mut out, child, policy);
        }
    }
    out
}

fn serialize_node(out: &mut String, node: NodeRef<'_, Node>, policy: &SanitizePolicy) {
    match node.value() {
        Node::Text(text) => push_escaped_text(out, &text),
        Node::Element(element) => {
            let name = element.name();
            if policy.is_forbidden(name) {
                return;
            }

            out.push('<');
            out.push_str(name);
            for (attr, value) in element.attrs() {
                if !policy.allows_attribute(attr) {
                    continue;
                }
                if matches!(attr, "href" | "src") && is_script_url(value) {
                    continue;
                }
                out.push(' ');
                out.push_str(attr);
                out.push_str("=\"");
                push_escaped_attribute(out, value);
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            for child in node.children() {
                serialize_node(out, child, policy);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        // Comments, doctypes, and processing instructions are dropped.
        _ => {}
    }
}

fn is_script_url(value: &str) -> bool {
    value
        .trim()
        .to_ascii_lowercase()
        .starts_with("javascript:")
}

fn push_escaped_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn push_escaped_attribute(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_style_and_link_but_keeps_anchor_ids() {
        let raw = r#"<body><script>alert(1)</script><style>p { color: red }</style>
<link rel="stylesheet" href="pg.css"><a id="x">ok</a></body>"#;
        let clean = sanitize(raw);

        assert!(!clean.contains("script"));
        assert!(!clean.contains("alert"));
        assert!(!clean.contains("style"));
        assert!(!clean.contains("link"));
        assert!(clean.contains(r#"<a id="x">ok</a>"#));
    }

    #[test]
    fn drops_forbidden_subtrees_entirely() {
        let raw = "<div><script><span>inner</span></script><p>kept</p></div>";
        let clean = sanitize(raw);
        assert!(!clean.contains("inner"));
        assert!(clean.contains("<p>kept</p>"));
    }

    #[test]
    fn strips_event_handler_attributes() {
        let clean = sanitize(r##"<a id="ch1" onclick="evil()" href="#ch1">Chapter</a>"##);
        assert!(!clean.contains("onclick"));
        assert!(clean.contains(r##"href="#ch1""##));
        assert!(clean.contains(r#"id="ch1""#));
    }

    #[test]
    fn strips_javascript_urls() {
        let clean = sanitize(r#"<a href="JavaScript:evil()">x</a>"#);
        assert!(!clean.to_ascii_lowercase().contains("javascript"));
        assert!(clean.contains("<a>x</a>"));
    }

    #[test]
    fn keeps_structural_markup_and_escapes_text() {
        let clean = sanitize("<h2 id=\"c1\">Fish &amp; Chips</h2><p>1 &lt; 2</p>");
        assert!(clean.contains(r#"<h2 id="c1">Fish &amp; Chips</h2>"#));
        assert!(clean.contains("<p>1 &lt; 2</p>"));
    }

    #[test]
    fn void_elements_have_no_closing_tag() {
        let clean = sanitize(r#"<p>one<br>two</p><img src="cover.jpg" alt="cover">"#);
        assert!(clean.contains("<br>"));
        assert!(!clean.contains("</br>"));
        assert!(!clean.contains("</img>"));
        assert!(clean.contains(r#"<img src="cover.jpg" alt="cover">"#));
    }

    #[test]
    fn is_deterministic() {
        let raw = r##"<div id="a"><a href="#a">A</a><script>x</script></div>"##;
        assert_eq!(sanitize(raw), sanitize(raw));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(sanitize(""), "");
    }
}
