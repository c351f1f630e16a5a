//! AI deep-dive analyzers
//!
//! These run only when the AI indicator is at least moderately confident, so
//! they may assume the page talks to a language model somewhere.

use crate::analysis::types::{
    Analyzer, AnalyzerError, AnalyzerOutput, Finding, Severity, Wave,
};
use crate::crawler::CrawlResult;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_SYSTEM_PROMPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:system_?prompt|systemMessage|"role"\s*:\s*"system"\s*,\s*"content"\s*:\s*"([^"]{0,80}))"#)
        .unwrap()
});
static RE_PROMPT_TEMPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:you are an? [a-z ]{3,40}assistant|ignore (?:all )?previous instructions)"#).unwrap()
});
static RE_PROVIDER_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(https://(?:api\.openai\.com|api\.anthropic\.com|generativelanguage\.googleapis\.com|api\.cohere\.(?:ai|com)|api\.mistral\.ai)/[\w/.-]*)").unwrap()
});
static RE_UNSAFE_SINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:innerHTML\s*=|insertAdjacentHTML\(|dangerouslySetInnerHTML|document\.write\()[^;\n]{0,120}?(?i:response|completion|answer|reply|message|choices)").unwrap()
});
static RE_MARKDOWN_RENDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:marked\.parse|marked\(|markdownit\(\)\.render)\(?").unwrap());
static RE_SANITIZER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DOMPurify\.sanitize|sanitizeHtml\(|sanitize-html").unwrap());

fn script_corpus(crawl: &CrawlResult) -> impl Iterator<Item = &str> {
    std::iter::once(crawl.html.as_str()).chain(crawl.scripts.iter().map(String::as_str))
}

/// Reports system prompts and prompt templates shipped to the browser
pub struct PromptExposureAnalyzer;

#[async_trait]
impl Analyzer for PromptExposureAnalyzer {
    fn name(&self) -> &'static str {
        "llm-prompt-exposure"
    }

    fn wave(&self) -> Wave {
        Wave::AiDeepDive
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
        Ok(AnalyzerOutput::with_findings(find_prompt_exposure(crawl)))
    }
}

fn find_prompt_exposure(crawl: &CrawlResult) -> Vec<Finding> {
    let mut findings = Vec::new();

    if let Some(m) = script_corpus(crawl).find_map(|text| RE_SYSTEM_PROMPT.find(text)) {
        findings.push(
            Finding::new(
                "llm-system-prompt-exposed",
                Severity::High,
                "System prompt is visible in client-side code",
            )
            .with_evidence(truncate(m.as_str(), 100))
            .with_impact("Attackers can read the model's instructions and craft targeted prompt injections")
            .with_recommendation("Assemble prompts on the server"),
        );
    }

    if let Some(m) = script_corpus(crawl).find_map(|text| RE_PROMPT_TEMPLATE.find(text)) {
        findings.push(
            Finding::new(
                "llm-prompt-template-exposed",
                Severity::Medium,
                "Prompt template text found in client-side code",
            )
            .with_evidence(truncate(m.as_str(), 100)),
        );
    }

    findings
}

/// Reports browser code that calls an LLM provider directly
pub struct ProviderCallAnalyzer;

#[async_trait]
impl Analyzer for ProviderCallAnalyzer {
    fn name(&self) -> &'static str {
        "llm-direct-provider-call"
    }

    fn wave(&self) -> Wave {
        Wave::AiDeepDive
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
        Ok(AnalyzerOutput::with_findings(find_provider_calls(crawl)))
    }
}

fn find_provider_calls(crawl: &CrawlResult) -> Vec<Finding> {
    let from_scripts = crawl
        .scripts
        .iter()
        .find_map(|s| RE_PROVIDER_CALL.captures(s).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string());

    let from_requests = crawl.network_requests.as_ref().and_then(|requests| {
        requests
            .iter()
            .find(|r| RE_PROVIDER_CALL.is_match(&r.url))
            .map(|r| r.url.clone())
    });

    match from_scripts.or(from_requests) {
        Some(endpoint) => vec![Finding::new(
            "llm-client-side-provider-call",
            Severity::High,
            "Browser calls an LLM provider API directly",
        )
        .with_evidence(endpoint)
        .with_impact("The provider credential must be present in the browser")
        .with_recommendation("Route model calls through a server-side endpoint that holds the key")],
        None => Vec::new(),
    }
}

/// Reports model output written into the DOM as HTML
pub struct UnsafeOutputAnalyzer;

#[async_trait]
impl Analyzer for UnsafeOutputAnalyzer {
    fn name(&self) -> &'static str {
        "llm-unsafe-output-rendering"
    }

    fn wave(&self) -> Wave {
        Wave::AiDeepDive
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
        Ok(AnalyzerOutput::with_findings(find_unsafe_output(crawl)))
    }
}

fn find_unsafe_output(crawl: &CrawlResult) -> Vec<Finding> {
    let sanitized = script_corpus(crawl).any(|text| RE_SANITIZER.is_match(text));
    if sanitized {
        return Vec::new();
    }

    let sink = script_corpus(crawl).find_map(|text| RE_UNSAFE_SINK.find(text));
    let markdown = script_corpus(crawl).find_map(|text| RE_MARKDOWN_RENDER.find(text));

    match (sink, markdown) {
        (Some(m), _) => vec![Finding::new(
            "llm-insecure-output-rendering",
            Severity::Medium,
            "Model output is inserted into the page as HTML",
        )
        .with_evidence(truncate(m.as_str(), 100))
        .with_impact("A prompt injection can become stored or reflected cross-site scripting")
        .with_recommendation("Render model output as text or sanitize it with DOMPurify")],
        (None, Some(m)) => vec![Finding::new(
            "llm-unsanitized-markdown",
            Severity::Low,
            "Markdown from the model is rendered without a sanitizer",
        )
        .with_evidence(truncate(m.as_str(), 100))],
        (None, None) => Vec::new(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
