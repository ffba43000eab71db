use std::collections::{HashMap, HashSet};
use std::io::Write as _;

use anyhow::Context as _;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::cli::TocArgs;

/// Anchor id prefix used by one long-lived generation of the corpus's
/// generated HTML (e.g. `link2HCH0001`).
const LEGACY_ANCHOR_SELECTOR: &str = "a[id^=\"link2H\"]";

/// Outline level assigned to anchor-derived entries.
const ANCHOR_LEVEL: u8 = 2;

const MAX_TITLE_CHARS: usize = 140;

/// Boilerplate markers from the corpus's licensing front- and back-matter.
/// Matched case-insensitively against candidate titles.
const NOISE_MARKERS: [&str; 4] = [
    "project gutenberg",
    "gutenberg-tm license",
    "full license",
    "end of the project gutenberg",
];

/// One navigable outline entry. `id` is unique within an extraction
/// result; entries keep encounter order and are never re-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocNode {
    pub id: String,
    pub title: String,
    pub level: u8,
}

/// CLI entry: extract a table of contents from a local HTML file.
pub fn run(args: TocArgs) -> anyhow::Result<()> {
    let html = std::fs::read_to_string(&args.input)
        .with_context(|| format!("read html: {}", args.input))?;
    let entries = extract_toc(&html);

    let mut stdout = std::io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut stdout, &entries).context("write toc json")?;
        writeln!(stdout).context("write trailing newline")?;
    } else if entries.is_empty() {
        writeln!(stdout, "no chapters found").context("write toc")?;
    } else {
        for node in &entries {
            let indent = "  ".repeat(usize::from(node.level.saturating_sub(1)));
            writeln!(stdout, "{indent}{} [#{}]", node.title, node.id).context("write toc")?;
        }
    }
    Ok(())
}

/// Walks the document with four candidate passes feeding one
/// de-duplicating merge (first occurrence of an id wins):
///
/// 1. internal `href="#id"` links build an id -> label map — a document's
///    own contents block is the most reliable title source;
/// 2. legacy-prefix anchors;
/// 3. any remaining anchor with an id, synthesizing `Section <id>` when no
///    text can be found (bare anchors still mark real structural breaks);
/// 4. `h1`/`h2`/`h3` carrying their own id, preferring the contents-block
///    label over the heading's own text.
///
/// Never fails: a document with no usable anchors yields an empty outline.
pub fn extract_toc(raw_html: &str) -> Vec<TocNode> {
    let doc = Html::parse_document(raw_html);
    let labels = collect_link_labels(&doc);

    let mut nodes = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let legacy = selector(LEGACY_ANCHOR_SELECTOR);
    for anchor in doc.select(&legacy) {
        let Some(id) = anchor.value().attr("id") else {
            continue;
        };
        let title = anchor_title(anchor, &labels, id);
        push_once(&mut nodes, &mut seen, id, &title, ANCHOR_LEVEL, true);
    }

    let any_anchor = selector("a[id]");
    for anchor in doc.select(&any_anchor) {
        let Some(id) = anchor.value().attr("id") else {
            continue;
        };
        if seen.contains(id) {
            continue;
        }
        let title = anchor_title(anchor, &labels, id);
        push_once(&mut nodes, &mut seen, id, &title, ANCHOR_LEVEL, true);
    }

    let headings = selector("h1[id], h2[id], h3[id]");
    for heading in doc.select(&headings) {
        let Some(id) = heading.value().attr("id") else {
            continue;
        };
        if seen.contains(id) {
            continue;
        }
        let title = labels
            .get(id)
            .cloned()
            .unwrap_or_else(|| element_text(heading));
        let level = heading_level(heading.value().name());
        push_once(&mut nodes, &mut seen, id, &title, level, false);
    }

    nodes
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static css selector")
}

/// id -> visible link text for every internal same-document link, first
/// occurrence wins.
fn collect_link_labels(doc: &Html) -> HashMap<String, String> {
    let internal_links = selector(r##"a[href^="#"]"##);
    let mut labels = HashMap::new();
    for link in doc.select(&internal_links) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let id = &href[1..];
        if id.is_empty() {
            continue;
        }
        let text = element_text(link);
        if text.is_empty() {
            continue;
        }
        labels.entry(id.to_owned()).or_insert(text);
    }
    labels
}

/// Resolves an anchor's title: contents-block label, the anchor's own
/// text, the enclosing heading, the next sibling heading, or the nearest
/// ancestor heading — in that order.
fn anchor_title(anchor: ElementRef<'_>, labels: &HashMap<String, String>, id: &str) -> String {
    if let Some(label) = labels.get(id) {
        return label.clone();
    }

    let own = element_text(anchor);
    if !own.is_empty() {
        return own;
    }

    if let Some(parent) = anchor.parent().and_then(ElementRef::wrap)
        && is_heading(parent.value().name())
    {
        return element_text(parent);
    }

    if let Some(next) = anchor.next_siblings().find_map(ElementRef::wrap)
        && is_heading(next.value().name())
    {
        return element_text(next);
    }

    for ancestor in anchor.ancestors() {
        if let Some(element) = ElementRef::wrap(ancestor)
            && is_heading(element.value().name())
        {
            return element_text(element);
        }
    }

    String::new()
}

fn push_once(
    nodes: &mut Vec<TocNode>,
    seen: &mut HashSet<String>,
    id: &str,
    raw_title: &str,
    level: u8,
    allow_fallback: bool,
) {
    if id.is_empty() || !seen.insert(id.to_owned()) {
        return;
    }

    let mut title = normalize_title(raw_title);
    if title.is_empty() && allow_fallback {
        title = format!("Section {id}");
    }
    if title.is_empty() || is_noise_title(&title) {
        return;
    }

    nodes.push(TocNode {
        id: id.to_owned(),
        title,
        level,
    });
}

fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn heading_level(name: &str) -> u8 {
    match name {
        "h1" => 1,
        "h2" => 2,
        _ => 3,
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace and truncates overly long titles so the outline
/// stays usable; full story titles under the limit are kept as-is.
fn normalize_title(raw: &str) -> String {
    let title = collapse_whitespace(raw);
    if title.chars().count() > MAX_TITLE_CHARS {
        let mut cut: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
        cut.push('…');
        return cut;
    }
    title
}

fn is_noise_title(title: &str) -> bool {
    let lowered = title.to_lowercase();
    if NOISE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return true;
    }
    title.chars().count() < 2
}
