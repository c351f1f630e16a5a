//! AI implementation indicators
//!
//! Counts independent signals that the site ships an AI feature: LLM provider
//! endpoints or SDKs, chat widgets, chat-completion style API routes and
//! assistant markup. The count drives `AiConfidence`, which gates the AI
//! deep-dive wave.

use crate::analysis::types::{AiDetection, Analyzer, AnalyzerError, AnalyzerOutput};
use crate::crawler::CrawlResult;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

/// (provider, markers)
const PROVIDERS: &[(&str, &[&str])] = &[
    ("openai", &["api.openai.com", "openai.azure.com", "\"openai\""]),
    ("anthropic", &["api.anthropic.com", "@anthropic-ai/sdk"]),
    ("google-gemini", &["generativelanguage.googleapis.com", "@google/generative-ai"]),
    ("cohere", &["api.cohere.ai", "api.cohere.com"]),
    ("huggingface", &["api-inference.huggingface.co"]),
    ("mistral", &["api.mistral.ai"]),
];

/// (widget, markers)
const CHAT_WIDGETS: &[(&str, &[&str])] = &[
    ("intercom", &["widget.intercom.io", "intercomSettings"]),
    ("drift", &["js.driftt.com"]),
    ("crisp", &["client.crisp.chat"]),
    ("tawk", &["embed.tawk.to"]),
    ("zendesk", &["static.zdassets.com"]),
    ("botpress", &["cdn.botpress.cloud"]),
    ("voiceflow", &["cdn.voiceflow.com"]),
    ("chatbase", &["www.chatbase.co/embed"]),
];

static RE_CHAT_ENDPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'`](/(?:api/)?(?:v\d+/)?(?:chat|completions?|assistant|ask|llm)(?:/[\w-]*)?)["'`?]"#).unwrap());
static RE_ASSISTANT_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:ai[\s-]assistant|ai[\s-]powered|chat\s*with\s*(?:our\s*)?ai|ask\s+(?:our\s+)?ai|chatbot)"#)
        .unwrap()
});

/// Detects AI features and reports how confident the detection is
pub struct AiIndicatorAnalyzer;

#[async_trait]
impl Analyzer for AiIndicatorAnalyzer {
    fn name(&self) -> &'static str {
        "ai-indicator"
    }

    fn default_output(&self) -> AnalyzerOutput {
        AnalyzerOutput {
            ai_detection: Some(AiDetection::default()),
            ..AnalyzerOutput::default()
        }
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
        let detection = detect(crawl);
        Ok(AnalyzerOutput {
            technologies: detection
                .providers
                .iter()
                .chain(&detection.chat_widgets)
                .cloned()
                .collect(),
            ai_detection: Some(detection),
            ..AnalyzerOutput::default()
        })
    }
}

fn detect(crawl: &CrawlResult) -> AiDetection {
    let mut corpus = crawl.html.clone();
    for script in &crawl.scripts {
        corpus.push('\n');
        corpus.push_str(script);
    }
    for src in &crawl.script_sources {
        corpus.push('\n');
        corpus.push_str(src);
    }
    if let Some(requests) = &crawl.network_requests {
        for request in requests {
            corpus.push('\n');
            corpus.push_str(&request.url);
        }
    }

    let mut signals = Vec::new();

    let providers = matching_names(&corpus, PROVIDERS);
    signals.extend(providers.iter().map(|p| format!("provider:{}", p)));

    let chat_widgets = matching_names(&corpus, CHAT_WIDGETS);
    signals.extend(chat_widgets.iter().map(|w| format!("widget:{}", w)));

    if let Some(endpoint) = RE_CHAT_ENDPOINT
        .captures(&corpus)
        .and_then(|c| c.get(1))
    {
        signals.push(format!("endpoint:{}", endpoint.as_str()));
    }

    if RE_ASSISTANT_MARKUP.is_match(&crawl.html) {
        signals.push("markup:assistant".to_string());
    }

    AiDetection::from_signals(signals, providers, chat_widgets)
}

fn matching_names(corpus: &str, table: &[(&str, &[&str])]) -> Vec<String> {
    table
        .iter()
        .filter(|(_, markers)| markers.iter().any(|m| corpus.contains(m)))
        .map(|(name, _)| name.to_string())
        .collect()
}
