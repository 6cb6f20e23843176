use std::time::Duration;

use anyhow::{Context, Result};
use scraper::{Html, Node};
use tracing::debug;

/// Elements whose text never reaches the reader.
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

/// Fetch a page and return its readable text. Non-HTML bodies are returned as is.
pub async fn fetch_text(url: &str, timeout_secs: u64) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to fetch {url}"))?
        .error_for_status()
        .with_context(|| format!("failed to fetch {url}"))?;

    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |ct| ct.contains("html"));
    let body = response
        .text()
        .await
        .with_context(|| format!("failed to read body of {url}"))?;
    debug!(url, bytes = body.len(), is_html, "fetched page");

    Ok(if is_html { html_to_text(&body) } else { body })
}

/// Visible text of an HTML document, one trimmed line per text run.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut lines = Vec::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_visible_text_only() {
        let html = r#"<html>
            <head><title>Ignored title</title><style>p { color: red; }</style></head>
            <body>
              <h1>Rust ownership</h1>
              <script>var tracking = 1;</script>
              <p>Every value has
                 one owner.</p>
              <noscript>Enable JS</noscript>
            </body></html>"#;

        assert_eq!(
            html_to_text(html),
            "Rust ownership\nEvery value has\none owner."
        );
    }

    #[test]
    fn empty_page_gives_empty_text() {
        assert_eq!(html_to_text("<html><body>   </body></html>"), "");
    }
}
