use std::io::Write as _;

use anyhow::Context as _;
use url::Url;

use crate::catalog::{CatalogGateway, Outcome};
use crate::cli::FetchArgs;
use crate::clock;
use crate::sanitize::sanitize;
use crate::toc::{TocNode, extract_toc};
use crate::upstream::UpstreamClient;

/// Everything a reading view needs from one raw content body.
#[derive(Debug, Clone)]
pub struct PreparedContent {
    /// Markup safe to attach directly to the page.
    pub html: String,
    /// Navigable outline; empty when the document has no usable anchors.
    pub toc: Vec<TocNode>,
}

/// Sanitizes the body and extracts its outline in one pass over the raw
/// markup. The extractor runs on the raw input — it only reads anchors
/// and headings, and those survive sanitization unchanged.
pub fn prepare(raw_html: &str) -> PreparedContent {
    PreparedContent {
        html: sanitize(raw_html),
        toc: extract_toc(raw_html),
    }
}

/// CLI entry: fetch a book's content body through the gateway, sanitized
/// unless `--raw` is given.
pub async fn fetch(args: FetchArgs) -> anyhow::Result<()> {
    let upstream_url = Url::parse(&args.upstream_url).context("parse --upstream-url")?;
    let upstream = UpstreamClient::new(upstream_url)?;
    let gateway = CatalogGateway::new(upstream, clock::system())?;

    let body = match gateway.get_content_body(args.id).await {
        Outcome::Success(body) => body,
        Outcome::NotFound => anyhow::bail!("book {} has no html content", args.id),
        Outcome::TimedOut => anyhow::bail!("upstream timed out fetching book {}", args.id),
        Outcome::UpstreamError(detail) => anyhow::bail!("upstream fetch failed: {detail}"),
    };

    let output = if args.raw { body } else { sanitize(&body) };

    match &args.out {
        Some(path) => {
            std::fs::write(path, &output).with_context(|| format!("write output: {path}"))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(output.as_bytes())
                .context("write output to stdout")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_sanitizes_and_extracts_in_one_call() {
        let raw = r##"<body>
            <script>alert(1)</script>
            <p><a href="#link2HCH0001">Chapter One</a></p>
            <h2><a id="link2HCH0001"></a>CHAPTER I</h2>
        </body>"##;
        let prepared = prepare(raw);

        assert!(!prepared.html.contains("script"));
        assert!(prepared.html.contains(r#"id="link2HCH0001""#));
        assert_eq!(prepared.toc.len(), 1);
        assert_eq!(prepared.toc[0].title, "Chapter One");
    }

    #[test]
    fn toc_anchors_survive_sanitization() {
        let raw = r#"<body><a id="pgepubid00002"></a><h2 id="c1">Chapter</h2></body>"#;
        let prepared = prepare(raw);
        for node in &prepared.toc {
            assert!(
                prepared.html.contains(&format!(r#"id="{}""#, node.id)),
                "anchor {} must survive sanitization",
                node.id
            );
        }
    }
}
