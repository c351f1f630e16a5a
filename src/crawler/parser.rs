//! HTML parser for extracting the page assets analyzers care about
//!
//! This module extracts:
//! - Inline `<script>` bodies
//! - External script URLs (absolute, de-duplicated, in document order)
//! - The page title and `<meta name="generator">` value

use scraper::{Html, Selector};
use url::Url;

/// Extracted assets of an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAssets {
    pub title: Option<String>,
    pub generator: Option<String>,
    pub inline_scripts: Vec<String>,
    pub script_sources: Vec<String>,
}

/// Parses HTML content and extracts scripts and metadata
///
/// # Script Source Rules
///
/// **Include:**
/// - `<script src="...">` resolved against `base_url`
///
/// **Exclude:**
/// - `javascript:` and `data:` sources
/// - Non-HTTP(S) URLs after resolution
/// - Duplicates (first occurrence wins)
///
/// # Example
///
/// ```
/// use site_sentinel::crawler::parse_page_assets;
/// use url::Url;
///
/// let html = r#"<html><head><title>Shop</title><script src="/app.js"></script></head></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let assets = parse_page_assets(html, &base_url);
/// assert_eq!(assets.title, Some("Shop".to_string()));
/// assert_eq!(assets.script_sources, vec!["https://example.com/app.js".to_string()]);
/// ```
pub fn parse_page_assets(html: &str, base_url: &Url) -> PageAssets {
    let document = Html::parse_document(html);

    PageAssets {
        title: extract_title(&document),
        generator: extract_generator(&document),
        inline_scripts: extract_inline_scripts(&document),
        script_sources: extract_script_sources(&document, base_url),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_generator(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[name='generator'][content]").ok()?;

    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_inline_scripts(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("script:not([src])") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|element| element.text().collect::<String>())
        .filter(|body| !body.trim().is_empty())
        .collect()
}

fn extract_script_sources(document: &Html, base_url: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("script[src]") else {
        return Vec::new();
    };

    let mut sources: Vec<String> = Vec::new();
    for element in document.select(&selector) {
        if let Some(src) = element.value().attr("src") {
            if let Some(absolute) = resolve_source(src, base_url) {
                if !sources.contains(&absolute) {
                    sources.push(absolute);
                }
            }
        }
    }
    sources
}

/// Resolves a script src to an absolute HTTP(S) URL
fn resolve_source(src: &str, base_url: &Url) -> Option<String> {
    let src = src.trim();

    if src.is_empty() || src.starts_with("javascript:") || src.starts_with("data:") {
        return None;
    }

    match base_url.join(src) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn test_extract_title_with_whitespace() {
        let html = r#"<html><head><title>  Test Page  </title></head><body></body></html>"#;
        let assets = parse_page_assets(html, &base_url());
        assert_eq!(assets.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let assets = parse_page_assets("<html><head></head><body></body></html>", &base_url());
        assert_eq!(assets.title, None);
    }

    #[test]
    fn test_extract_generator() {
        let html = r#"<html><head><meta name="generator" content="WordPress 6.4.2"></head></html>"#;
        let assets = parse_page_assets(html, &base_url());
        assert_eq!(assets.generator, Some("WordPress 6.4.2".to_string()));
    }

    #[test]
    fn test_inline_scripts_skip_external_and_empty() {
        let html = r#"
            <html><body>
                <script>window.config = { api: "/api/chat" };</script>
                <script src="/bundle.js"></script>
                <script>   </script>
            </body></html>
        "#;
        let assets = parse_page_assets(html, &base_url());
        assert_eq!(assets.inline_scripts.len(), 1);
        assert!(assets.inline_scripts[0].contains("/api/chat"));
    }

    #[test]
    fn test_script_sources_resolved_and_deduplicated() {
        let html = r#"
            <html><body>
                <script src="/static/app.js"></script>
                <script src="https://cdn.example.net/lib.js"></script>
                <script src="/static/app.js"></script>
                <script src="data:text/javascript,alert(1)"></script>
            </body></html>
        "#;
        let assets = parse_page_assets(html, &base_url());
        assert_eq!(
            assets.script_sources,
            vec![
                "https://example.com/static/app.js".to_string(),
                "https://cdn.example.net/lib.js".to_string(),
            ]
        );
    }

    #[test]
    fn test_relative_source_resolves_against_page() {
        assert_eq!(
            resolve_source("js/app.js", &base_url()),
            Some("https://example.com/js/app.js".to_string())
        );
        assert_eq!(resolve_source("javascript:void(0)", &base_url()), None);
    }
}
